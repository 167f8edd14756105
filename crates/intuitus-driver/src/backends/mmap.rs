//! Memory-mapped shared interface block
//!
//! Minimal unsafe, confined to `mmap` / `munmap` and the slice views over
//! the mapping. The type holds a raw pointer and is therefore neither `Send`
//! nor `Sync`: one client owns the block for the lifetime of the device.

use crate::device::DeviceHandle;
use crate::error::{IntuitusError, Result};
use intuitus_abi::INTERFACE_SIZE;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::ptr::NonNull;

/// `struct intuitus_interface` mapped from the device at offset 0
#[derive(Debug)]
pub struct InterfaceMapping {
    ptr: NonNull<u8>,
    size: usize,
    mapped: bool,
}

impl InterfaceMapping {
    /// Map the shared interface block of an open device
    ///
    /// # Errors
    ///
    /// Returns `DeviceCreation` if `mmap` fails.
    pub fn new(device: &DeviceHandle) -> Result<Self> {
        let size = INTERFACE_SIZE;

        tracing::debug!("Mapping {size} byte interface of {}", device.path().display());

        // SAFETY: the fd is open for the duration of the call, `size` is the
        // non-zero size of the driver's interface structure, offset 0 is the
        // only offset the driver serves, and the result is checked before use.
        // The pointer is released exactly once, in `unmap`.
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                device,
                0,
            )
        }
        .map_err(|e| IntuitusError::device_creation(format!("mmap of shared interface failed: {e}")))?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| IntuitusError::device_creation("mmap returned a null mapping"))?;

        tracing::info!("Mapped shared interface ({} KiB at {ptr:p})", size / 1024);

        Ok(Self {
            ptr,
            size,
            mapped: true,
        })
    }

    /// Whole block as bytes; empty once unmapped
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        if !self.mapped {
            return &[];
        }
        // SAFETY: `ptr` is valid for `size` bytes while mapped; `unmap`
        // takes `&mut self`, so no view can outlive the mapping. The driver
        // only touches the block inside an ioctl, during which no view is
        // held.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// Whole block as mutable bytes
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if !self.mapped {
            return &mut [];
        }
        // SAFETY: as for `as_slice`; `&mut self` makes the view exclusive.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    /// Mapping size
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Release the mapping
    ///
    /// # Errors
    ///
    /// Returns `DeviceCreation` if `munmap` fails. The mapping is considered
    /// gone either way and `Drop` will not retry.
    pub fn unmap(&mut self) -> Result<()> {
        if !self.mapped {
            return Ok(());
        }
        self.mapped = false;

        // SAFETY: `ptr` / `size` are exactly what `mmap` returned and were
        // passed; `mapped` guarantees this runs once. Views borrow `self`,
        // so none are alive here.
        unsafe { munmap(self.ptr.as_ptr().cast(), self.size) }
            .map_err(|e| IntuitusError::device_creation(format!("error unmapping kernel interface: {e}")))?;

        tracing::debug!("Unmapped shared interface");
        Ok(())
    }
}

impl Drop for InterfaceMapping {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            tracing::error!("{e}");
        }
    }
}
