//! Whole-network execution
//!
//! One synchronous round trip through the shared block: stage the input
//! tensor, `NETWORK_EXECUTE`, copy out the concatenated output layers. No
//! partial results, no streaming, no cancellation.

use crate::accelerator::{Accelerator, ChannelState};
use crate::backend::{DriverBackend, Request};
use crate::error::{IntuitusError, Result};
use crate::shared::{self, Dims, SharedPhase};
use bytes::Bytes;
use intuitus_abi::interface::BUFFER_CAPACITY;
use intuitus_abi::ProxyStatus;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Byte extent one output layer contributes to the execution result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputExtent {
    /// Output layer id
    pub layer_id: i32,
    /// Offset within the concatenated output
    pub offset: usize,
    /// Bytes
    pub bytes: usize,
}

/// Client-side output buffer, grown by every `output_layer`
#[derive(Debug, Default)]
pub struct OutputAccumulator {
    extents: Vec<OutputExtent>,
    buffer: Vec<u8>,
}

impl OutputAccumulator {
    /// Reserve room for one more output layer
    ///
    /// # Errors
    ///
    /// Returns `MemoryAllocation` if the buffer cannot grow.
    pub fn grow(&mut self, layer_id: i32, bytes: usize) -> Result<()> {
        let offset = self.buffer.len();
        self.buffer.try_reserve_exact(bytes).map_err(|e| {
            IntuitusError::memory_allocation(format!(
                "output buffer of {} bytes: {e}",
                offset.saturating_add(bytes)
            ))
        })?;
        self.buffer.resize(offset + bytes, 0);
        self.extents.push(OutputExtent {
            layer_id,
            offset,
            bytes,
        });
        debug!("New output size: {}", self.buffer.len());
        Ok(())
    }

    /// Total bytes across all output layers
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no output layer has been declared
    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    /// Output layers in declaration order
    pub fn extents(&self) -> &[OutputExtent] {
        &self.extents
    }

    /// Output bytes of the last execution
    pub fn last_output(&self) -> &[u8] {
        &self.buffer
    }

    pub(crate) fn clear(&mut self) {
        self.extents.clear();
        self.buffer = Vec::new();
    }
}

/// Execution result with timings
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// All output layers, concatenated in declaration order
    pub output: Bytes,

    /// Where each output layer sits in `output`
    pub extents: Vec<OutputExtent>,

    /// Input bytes staged
    pub input_bytes: usize,

    /// Output bytes collected
    pub output_bytes: usize,

    /// Copying the input into the shared block
    pub staging_duration: Duration,

    /// `NETWORK_EXECUTE` round trip
    pub execution_duration: Duration,

    /// Copying the outputs out of the shared block
    pub collection_duration: Duration,

    /// Whole call
    pub total_duration: Duration,
}

impl ExecutionResult {
    /// Bytes of one output layer, sharing the result's allocation
    pub fn output_of(&self, layer_id: i32) -> Option<Bytes> {
        self.extents
            .iter()
            .find(|e| e.layer_id == layer_id)
            .map(|e| self.output.slice(e.offset..e.offset + e.bytes))
    }
}

impl<B: DriverBackend> Accelerator<B> {
    /// Declared output layers
    pub fn output_extents(&self) -> &[OutputExtent] {
        self.outputs.extents()
    }

    /// Total output bytes the next execution returns
    pub fn output_size(&self) -> usize {
        self.outputs.len()
    }

    /// Run the whole network on one input tensor
    ///
    /// `input` holds `channels * height * length` bytes in the layout the
    /// input layer was declared with.
    ///
    /// # Errors
    ///
    /// Checked before anything is copied or sent:
    /// - `MaxMemoryLimitExceeded` if the tensor does not fit the shared buffer
    /// - `DimensionMismatch` if `input.len()` is not `channels * height * length`
    /// - `ProtocolViolation` if no input layer was declared
    /// - `MaxMemoryLimitExceeded` if the outputs do not fit behind the input
    ///
    /// Afterwards the driver's code if `NETWORK_EXECUTE` fails.
    pub fn execute(
        &mut self,
        input: &[u8],
        channels: u32,
        height: u32,
        length: u32,
    ) -> Result<ExecutionResult> {
        let dims = Dims {
            length,
            height,
            depth: channels,
        };
        // overflow counts as too large
        let size_in = dims.extent().unwrap_or(usize::MAX);

        if size_in > BUFFER_CAPACITY {
            return Err(IntuitusError::MaxMemoryLimitExceeded {
                what: "input tensor",
                requested: size_in,
                capacity: BUFFER_CAPACITY,
            });
        }
        if input.len() != size_in {
            return Err(IntuitusError::dimension_mismatch(format!(
                "input tensor has {} bytes, expected {channels}x{height}x{length} = {size_in}",
                input.len()
            )));
        }
        let geometry = self.input.ok_or_else(|| {
            IntuitusError::protocol_violation("execute called before input_layer")
        })?;
        let out_offset = geometry.extent().unwrap_or(usize::MAX);
        let out_size = self.outputs.len();
        if out_offset.saturating_add(out_size) > BUFFER_CAPACITY {
            return Err(IntuitusError::MaxMemoryLimitExceeded {
                what: "output tensors",
                requested: out_offset.saturating_add(out_size),
                capacity: BUFFER_CAPACITY,
            });
        }

        self.phase.advance(SharedPhase::TensorIn)?;
        self.state = ChannelState::Executing;
        let result = self.round_trip(input, dims, out_offset);
        self.state = ChannelState::Ready;
        self.phase.reset();
        result
    }

    fn round_trip(&mut self, input: &[u8], dims: Dims, out_offset: usize) -> Result<ExecutionResult> {
        debug!("Starting execution with {} byte input", input.len());
        let start = Instant::now();

        let region = self.backend.interface_mut();
        shared::write_payload(region, 0, input, "input tensor")?;
        shared::set_status(region, ProxyStatus::NoError);
        shared::set_dims(region, dims);
        let staging_duration = start.elapsed();

        let exec_start = Instant::now();
        self.transact(&mut Request::ExecuteNetwork)?;
        let execution_duration = exec_start.elapsed();

        self.phase.advance(SharedPhase::TensorOut)?;
        self.phase.require(&[SharedPhase::TensorOut], "output read")?;

        let collect_start = Instant::now();
        let out_size = self.outputs.len();
        let payload = shared::payload(self.backend.interface(), out_offset, out_size, "output tensors")?;
        self.outputs.buffer.copy_from_slice(payload);
        let output = Bytes::copy_from_slice(&self.outputs.buffer);
        let collection_duration = collect_start.elapsed();

        let total_duration = start.elapsed();
        info!(
            "Execution complete in {total_duration:?} ({} bytes in, {out_size} bytes out)",
            input.len()
        );

        Ok(ExecutionResult {
            output,
            extents: self.outputs.extents.clone(),
            input_bytes: input.len(),
            output_bytes: out_size,
            staging_duration,
            execution_duration,
            collection_duration,
            total_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_tracks_offsets() {
        let mut acc = OutputAccumulator::default();
        assert!(acc.is_empty());
        acc.grow(4, 100).unwrap();
        acc.grow(7, 0).unwrap();
        acc.grow(9, 28).unwrap();

        assert_eq!(acc.len(), 128);
        let offsets: Vec<_> = acc.extents().iter().map(|e| (e.layer_id, e.offset)).collect();
        assert_eq!(offsets, vec![(4, 0), (7, 100), (9, 100)]);
    }

    #[test]
    fn result_slices_per_output() {
        let result = ExecutionResult {
            output: Bytes::from_static(&[1, 2, 3, 4, 5]),
            extents: vec![
                OutputExtent { layer_id: 2, offset: 0, bytes: 2 },
                OutputExtent { layer_id: 3, offset: 2, bytes: 3 },
            ],
            input_bytes: 0,
            output_bytes: 5,
            staging_duration: Duration::ZERO,
            execution_duration: Duration::ZERO,
            collection_duration: Duration::ZERO,
            total_duration: Duration::ZERO,
        };
        assert_eq!(&result.output_of(3).unwrap()[..], &[3, 4, 5]);
        assert!(result.output_of(1).is_none());
    }
}
