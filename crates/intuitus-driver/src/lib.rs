//! Userspace control plane for the Intuitus FPGA CNN accelerator.
//!
//! Translates a layer graph into the `intuitus` kernel module's ioctl
//! protocol: per-layer tile descriptors and command streams, DMA scatter
//! sizing, and a synchronous execute round trip through one memory-mapped
//! shared buffer.
//!
//! # Backend hierarchy
//!
//! ```text
//! Hardware:
//!   KernelBackend     /dev/intuitus_vdma ioctls + mmap'd shared block
//!
//! Development / CI:
//!   SoftwareBackend   in-process virtual driver, no FPGA model
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use intuitus_driver::prelude::*;
//!
//! # fn main() -> intuitus_driver::Result<()> {
//! let mut acc = Accelerator::open(DriverConfig::from_env())?;
//!
//! acc.input_layer(3, 224, 224)?;
//! acc.conv(&ConvLayer {
//!     layer_id: 1,
//!     kind: LayerKind::Conv1x1,
//!     source_id: 0,
//!     in_channels: 3,
//!     out_channels: 16,
//!     out_height: 224,
//!     out_width: 224,
//!     scattered_lines: 0,
//!     tx_tiles: &[TxTile::new(0, 224, 0, 224)],
//!     rx_tiles: &[RxTile::new(0, 224, 0, 224, 0, 16)],
//!     commands: &[0; 12],
//!     command_lengths: &[4, 4, 4],
//! })?;
//! acc.output_layer(2, 1)?;
//!
//! let frame = vec![0u8; 3 * 224 * 224];
//! let result = acc.execute(&frame, 3, 224, 224)?;
//! let values = quant::decode(&result.output);
//! println!("{} outputs in {:?}", values.len(), result.total_duration);
//! # Ok(())
//! # }
//! ```
//!
//! # Shared block discipline
//!
//! The shared buffer carries command words, the input tensor and the output
//! tensors at different times. [`Accelerator`] tags it with a
//! [`SharedPhase`] and refuses out-of-order access with
//! [`IntuitusError::ProtocolViolation`].

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod accelerator;
mod backend;
pub mod backends;
pub mod config;
mod device;
pub mod encoder;
mod error;
mod execution;
mod graph;
pub mod planner;
pub mod quant;
pub mod setup;
pub mod shared;

/// Wire types (re-exported from intuitus-abi).
pub mod abi {
    pub use intuitus_abi::{
        codes, interface, ioctl, CommandArgs, ConcatArgs, IoctlCommand, LayerArgs, LayerKind,
        OptArgs, ProxyStatus, RxTileArgs, SplitArgs, TileIdx, BUFFER_CAPACITY, INTERFACE_SIZE,
    };
}

pub use accelerator::{Accelerator, ChannelState, InputGeometry};
pub use backend::{select_backend, BackendSelection, BackendType, DriverBackend, Request};
pub use backends::software::{TxRecord, VirtualLayer};
pub use backends::{KernelBackend, SoftwareBackend};
pub use config::DriverConfig;
pub use device::DeviceHandle;
pub use encoder::{CommandBlock, TxTile};
pub use error::{ErrorKind, IntuitusError, Result};
pub use execution::{ExecutionResult, OutputAccumulator, OutputExtent};
pub use graph::ConvLayer;
pub use intuitus_abi::{LayerKind, ProxyStatus, TileIdx};
pub use planner::{DmaPlan, RxDescriptor, RxPlan, RxTile};
pub use shared::SharedPhase;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        quant, Accelerator, BackendSelection, ConvLayer, DriverBackend, DriverConfig,
        ExecutionResult, IntuitusError, LayerKind, Result, RxTile, SoftwareBackend, TxTile,
    };
}
