//! Shared interface block access
//!
//! The block is one byte region reused for three payloads at different
//! times: tx command words, the input tensor and the output tensors. The
//! driver gives no locking of its own, so the client keeps a phase tag and
//! checks it on every payload access.
//!
//! ```text
//! Idle ──▶ CommandStaging ──▶ Idle
//! Idle ──▶ TensorIn ──▶ TensorOut ──▶ Idle
//! ```

use crate::error::{IntuitusError, Result};
use intuitus_abi::interface::{
    BUFFER_CAPACITY, DEPTH_OFFSET, HEIGHT_OFFSET, LENGTH_OFFSET, STATUS_OFFSET,
};
use intuitus_abi::ProxyStatus;

/// What the payload buffer currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SharedPhase {
    /// Nothing in flight
    #[default]
    Idle,
    /// Command words of one tx command
    CommandStaging,
    /// Input tensor, before `NETWORK_EXECUTE`
    TensorIn,
    /// Output tensors, after `NETWORK_EXECUTE`
    TensorOut,
}

/// Phase tag of the shared block
#[derive(Debug, Default)]
pub struct PhaseTracker {
    phase: SharedPhase,
}

impl PhaseTracker {
    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> SharedPhase {
        self.phase
    }

    /// Move to `next`, rejecting transitions the protocol does not allow
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` on an illegal transition.
    pub fn advance(&mut self, next: SharedPhase) -> Result<()> {
        use SharedPhase::{CommandStaging, Idle, TensorIn, TensorOut};

        let legal = matches!(
            (self.phase, next),
            (Idle, CommandStaging | TensorIn) | (TensorIn, TensorOut) | (_, Idle)
        );
        if !legal {
            return Err(IntuitusError::protocol_violation(format!(
                "cannot enter {next:?} while in {:?}",
                self.phase
            )));
        }
        tracing::trace!("Shared block {:?} -> {next:?}", self.phase);
        self.phase = next;
        Ok(())
    }

    /// Return to `Idle`
    pub fn reset(&mut self) {
        self.phase = SharedPhase::Idle;
    }

    /// Fail unless the block is in one of `allowed`
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` naming the attempted access.
    pub fn require(&self, allowed: &[SharedPhase], access: &str) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(IntuitusError::protocol_violation(format!(
                "{access} not allowed while in {:?}",
                self.phase
            )))
        }
    }
}

/// Declared dimensions of the current payload (`length`, `height`, `depth`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dims {
    /// Width, or byte length for command payloads
    pub length: u32,
    /// Height
    pub height: u32,
    /// Channels
    pub depth: u32,
}

impl Dims {
    /// `length * height * depth` in bytes, `None` on overflow
    #[must_use]
    pub fn extent(&self) -> Option<usize> {
        (self.length as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.depth as usize)
    }
}

fn read_word(region: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&region[offset..offset + 4]);
    u32::from_ne_bytes(word)
}

fn write_word(region: &mut [u8], offset: usize, value: u32) {
    region[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

/// Read the declared dimensions
#[must_use]
pub fn dims(region: &[u8]) -> Dims {
    Dims {
        length: read_word(region, LENGTH_OFFSET),
        height: read_word(region, HEIGHT_OFFSET),
        depth: read_word(region, DEPTH_OFFSET),
    }
}

/// Write the declared dimensions
pub fn set_dims(region: &mut [u8], dims: Dims) {
    write_word(region, LENGTH_OFFSET, dims.length);
    write_word(region, HEIGHT_OFFSET, dims.height);
    write_word(region, DEPTH_OFFSET, dims.depth);
}

/// Write only the `length` field
pub fn set_length(region: &mut [u8], length: u32) {
    write_word(region, LENGTH_OFFSET, length);
}

/// Raw status word
#[must_use]
pub fn status_raw(region: &[u8]) -> u32 {
    read_word(region, STATUS_OFFSET)
}

/// Write the status word
pub fn set_status(region: &mut [u8], status: ProxyStatus) {
    write_word(region, STATUS_OFFSET, status.raw());
}

/// Copy `data` into the payload buffer at `offset`
///
/// # Errors
///
/// Returns `MaxMemoryLimitExceeded` if the write would leave the buffer.
pub fn write_payload(region: &mut [u8], offset: usize, data: &[u8], what: &'static str) -> Result<()> {
    let end = checked_end(offset, data.len(), what)?;
    region[offset..end].copy_from_slice(data);
    Ok(())
}

/// Borrow `len` payload bytes starting at `offset`
///
/// # Errors
///
/// Returns `MaxMemoryLimitExceeded` if the range leaves the buffer.
pub fn payload<'a>(region: &'a [u8], offset: usize, len: usize, what: &'static str) -> Result<&'a [u8]> {
    let end = checked_end(offset, len, what)?;
    Ok(&region[offset..end])
}

fn checked_end(offset: usize, len: usize, what: &'static str) -> Result<usize> {
    offset
        .checked_add(len)
        .filter(|end| *end <= BUFFER_CAPACITY)
        .ok_or(IntuitusError::MaxMemoryLimitExceeded {
            what,
            requested: offset.saturating_add(len),
            capacity: BUFFER_CAPACITY,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use intuitus_abi::INTERFACE_SIZE;

    #[test]
    fn command_and_tensor_cycles_are_legal() {
        let mut phase = PhaseTracker::default();
        phase.advance(SharedPhase::CommandStaging).unwrap();
        phase.advance(SharedPhase::Idle).unwrap();
        phase.advance(SharedPhase::TensorIn).unwrap();
        phase.advance(SharedPhase::TensorOut).unwrap();
        phase.advance(SharedPhase::Idle).unwrap();
        assert_eq!(phase.phase(), SharedPhase::Idle);
    }

    #[test]
    fn overlapping_payloads_are_rejected() {
        let mut phase = PhaseTracker::default();
        phase.advance(SharedPhase::TensorIn).unwrap();
        let err = phase.advance(SharedPhase::CommandStaging).unwrap_err();
        assert!(matches!(err, IntuitusError::ProtocolViolation { .. }));

        let mut phase = PhaseTracker::default();
        assert!(phase.advance(SharedPhase::TensorOut).is_err());
        phase.advance(SharedPhase::CommandStaging).unwrap();
        assert!(phase.advance(SharedPhase::TensorIn).is_err());
    }

    #[test]
    fn reads_require_output_phase() {
        let mut phase = PhaseTracker::default();
        assert!(phase.require(&[SharedPhase::TensorOut], "output read").is_err());
        phase.advance(SharedPhase::TensorIn).unwrap();
        phase.advance(SharedPhase::TensorOut).unwrap();
        assert!(phase.require(&[SharedPhase::TensorOut], "output read").is_ok());
    }

    #[test]
    fn extent_overflow_is_none() {
        let d = Dims { length: 1 << 20, height: 1 << 22, depth: 1 << 22 };
        assert_eq!(d.extent(), None);
        assert_eq!(Dims::default().extent(), Some(0));
    }

    #[test]
    fn scalar_fields_sit_behind_the_buffer() {
        let mut region = vec![0u8; INTERFACE_SIZE];
        set_dims(&mut region, Dims { length: 224, height: 112, depth: 3 });
        set_status(&mut region, ProxyStatus::Busy);

        let d = dims(&region);
        assert_eq!(d, Dims { length: 224, height: 112, depth: 3 });
        assert_eq!(d.extent(), Some(224 * 112 * 3));
        assert_eq!(status_raw(&region), 1);
        assert!(region[..BUFFER_CAPACITY].iter().all(|b| *b == 0));
    }

    #[test]
    fn payload_bounds() {
        let mut region = vec![0u8; INTERFACE_SIZE];
        write_payload(&mut region, BUFFER_CAPACITY - 2, &[1, 2], "tail").unwrap();
        assert_eq!(payload(&region, BUFFER_CAPACITY - 2, 2, "tail").unwrap(), &[1, 2]);

        let err = write_payload(&mut region, BUFFER_CAPACITY - 1, &[1, 2], "tail").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MaxMemoryLimitExceeded);
        assert!(payload(&region, usize::MAX, 2, "tail").is_err());
    }
}
