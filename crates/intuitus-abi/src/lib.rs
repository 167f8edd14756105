//! Wire model of the Intuitus CNN accelerator driver interface.
//!
//! This crate performs **no I/O**. It is a byte-exact description of what
//! crosses the boundary between userspace and the `intuitus` kernel module:
//! ioctl command numbers, the fixed-layout argument structures, the
//! memory-mapped shared interface block and the driver's error codes.
//!
//! The kernel module is built from the same C header independently of this
//! crate, so every layout here is a protocol constant. Adding, removing or
//! reordering a field is a breaking change on both sides.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`ioctl`] | Command codes and `_IO` / `_IOW` request numbers |
//! | [`layer`] | Layer kinds understood by the hardware pipeline |
//! | [`args`] | `#[repr(C)]` ioctl argument structures |
//! | [`interface`] | Shared interface block offsets, capacity and proxy status |
//! | [`codes`] | Negative error codes returned by the driver |

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod args;
pub mod codes;
pub mod interface;
pub mod ioctl;
pub mod layer;

pub use args::{ConcatArgs, CommandArgs, LayerArgs, OptArgs, RxTileArgs, SplitArgs, TileIdx};
pub use interface::{ProxyStatus, BUFFER_CAPACITY, INTERFACE_SIZE};
pub use ioctl::IoctlCommand;
pub use layer::LayerKind;
