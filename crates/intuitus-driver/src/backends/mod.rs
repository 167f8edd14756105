//! Driver backend implementations
//!
//! Two backends available:
//! - **Kernel**: `/dev/intuitus_vdma` ioctls plus the mmap'd shared block
//!   (requires the `intuitus` kernel module and root)
//! - **Software**: in-process virtual driver (CI, simulation)

pub mod kernel;
pub mod mmap;
pub mod software;

pub use kernel::KernelBackend;
pub use software::SoftwareBackend;
