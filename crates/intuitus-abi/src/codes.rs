//! Error codes returned by the driver.
//!
//! The driver reports failures as negative integers. Userspace surfaces the
//! same values, so a code seen in the kernel log matches the one a caller
//! receives.

/// Kernel-side allocation failed.
pub const MEMORY_ALLOC_FAIL: i32 = -1;
/// Tile, channel or command counts disagree.
pub const DIMENSION_MISMATCH: i32 = -2;
/// A required argument was missing.
pub const NULL_POINTER_PARAMETER: i32 = -3;
/// The shared interface block is too small for the request.
pub const MAX_MEMORY_LIMIT: i32 = -4;
/// Device bring-up failed.
pub const CREATE_DEVICE: i32 = -5;
/// A DMA transfer reported an error.
pub const DMA: i32 = -6;
/// Any other driver error.
pub const OTHER: i32 = -7;

/// All codes, most specific first.
pub const ALL: [i32; 7] = [
    MEMORY_ALLOC_FAIL,
    DIMENSION_MISMATCH,
    NULL_POINTER_PARAMETER,
    MAX_MEMORY_LIMIT,
    CREATE_DEVICE,
    DMA,
    OTHER,
];
