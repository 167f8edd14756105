//! Shared interface block (`struct intuitus_interface`).
//!
//! One memory-mapped region carries every bulk transfer between userspace and
//! the driver: command words while a layer is built, the input tensor before
//! execution and the concatenated output tensors afterwards.
//!
//! ```text
//! offset             field
//! 0                  buffer[BUFFER_CAPACITY]
//! BUFFER_CAPACITY    length  u32
//!            + 4     height  u32
//!            + 8     depth   u32
//!            + 12    status  enum proxy_status (u32)
//! ```
//!
//! Scalar fields are native-endian; the driver runs on the same CPU.

/// Capacity of the byte buffer (`INTF_BUFFER_SIZE`), sized for a
/// 32-channel 220x220 map at two bytes per element.
pub const BUFFER_CAPACITY: usize = 32 * 220 * 220 * 2;

/// Offset of the `length` field.
pub const LENGTH_OFFSET: usize = BUFFER_CAPACITY;
/// Offset of the `height` field.
pub const HEIGHT_OFFSET: usize = BUFFER_CAPACITY + 4;
/// Offset of the `depth` field.
pub const DEPTH_OFFSET: usize = BUFFER_CAPACITY + 8;
/// Offset of the `status` field.
pub const STATUS_OFFSET: usize = BUFFER_CAPACITY + 12;

/// Total size of the mapping.
pub const INTERFACE_SIZE: usize = BUFFER_CAPACITY + 16;

/// Interface status (`enum proxy_status`).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProxyStatus {
    /// Idle, last transfer succeeded.
    #[default]
    NoError = 0,
    /// The driver is using the block.
    Busy = 1,
    /// The last transfer timed out.
    Timeout = 2,
    /// The last transfer failed.
    Error = 3,
}

impl ProxyStatus {
    /// Decode the raw status word.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::NoError),
            1 => Some(Self::Busy),
            2 => Some(Self::Timeout),
            3 => Some(Self::Error),
            _ => None,
        }
    }

    /// Raw status word.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_matches_header() {
        assert_eq!(BUFFER_CAPACITY, 3_097_600);
        assert_eq!(INTERFACE_SIZE, 3_097_616);
        assert_eq!(BUFFER_CAPACITY % 4, 0);
    }

    #[test]
    fn trailing_fields_are_packed_words() {
        assert_eq!(HEIGHT_OFFSET - LENGTH_OFFSET, 4);
        assert_eq!(DEPTH_OFFSET - HEIGHT_OFFSET, 4);
        assert_eq!(STATUS_OFFSET - DEPTH_OFFSET, 4);
        assert_eq!(INTERFACE_SIZE - STATUS_OFFSET, 4);
    }

    #[test]
    fn status_round_trip() {
        for s in [ProxyStatus::NoError, ProxyStatus::Busy, ProxyStatus::Timeout, ProxyStatus::Error] {
            assert_eq!(ProxyStatus::from_raw(s.raw()), Some(s));
        }
        assert_eq!(ProxyStatus::from_raw(4), None);
    }
}
