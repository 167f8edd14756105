//! Kernel backend
//!
//! Talks to the `intuitus` kernel module through `/dev/intuitus_vdma`:
//! control transactions are ioctls, bulk data moves through the mmap'd
//! shared interface block.

use super::mmap::InterfaceMapping;
use crate::backend::{BackendType, DriverBackend, Request};
use crate::config::DriverConfig;
use crate::device::DeviceHandle;
use crate::error::{IntuitusError, Result};
use crate::setup;
use std::os::unix::io::AsRawFd;

/// Kernel driver backend
#[derive(Debug)]
pub struct KernelBackend {
    mapping: InterfaceMapping,
    device: DeviceHandle,
}

impl KernelBackend {
    /// Device node in use
    #[must_use]
    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }
}

/// Pointer to the argument structure of `request`. Bare `_IO` commands get
/// `scratch`, which the driver ignores.
fn argument_ptr(request: &mut Request, scratch: &mut libc::c_int) -> *mut libc::c_void {
    fn ptr<T>(value: &mut T) -> *mut libc::c_void {
        std::ptr::from_mut(value).cast()
    }

    match request {
        Request::InputLayer(args) | Request::OutputLayer(args) | Request::LayerCreate(args) => {
            ptr(args)
        }
        Request::AddRxTile(args) => ptr(args),
        Request::AddTxCommand(args) => ptr(args),
        Request::Concat(args) => ptr(args),
        Request::Split(args) => ptr(args),
        Request::OptimizeDma(args) => ptr(args),
        Request::PrintLayer(layer_id) => ptr(layer_id),
        Request::ExecuteNetwork | Request::PrintNetwork | Request::SelfTest => ptr(scratch),
    }
}

impl DriverBackend for KernelBackend {
    fn init(config: &DriverConfig) -> Result<Self> {
        tracing::info!("Initializing kernel backend on {}", config.device_path.display());

        setup::check_privileges()?;
        setup::ensure_module_loaded(config)?;

        let device = DeviceHandle::open(&config.device_path)?;
        let mapping = InterfaceMapping::new(&device)?;

        Ok(Self { mapping, device })
    }

    fn transact(&mut self, request: &mut Request) -> Result<()> {
        let command = request.command();
        let mut scratch: libc::c_int = 0;
        let arg = argument_ptr(request, &mut scratch);

        tracing::debug!("ioctl {command} (0x{:08x})", command.request());

        // SAFETY: the fd is open for the lifetime of `self`. `arg` points at
        // a live `#[repr(C)]` structure laid out exactly like the driver's
        // header (or at a local int), borrowed mutably for the duration of
        // the call. The driver touches the shared block only inside this call
        // and no slice view of the mapping is held across it (`&mut self`).
        let ret = unsafe { libc::ioctl(self.device.as_raw_fd(), command.request() as _, arg) };

        if ret < 0 {
            let err = std::io::Error::last_os_error();
            let code = err.raw_os_error().map_or(intuitus_abi::codes::OTHER, |errno| -errno);
            tracing::debug!("ioctl {command} failed: {err}");
            return Err(IntuitusError::driver(command, code));
        }
        if ret > 0 {
            return Err(IntuitusError::driver(command, ret));
        }
        Ok(())
    }

    fn interface(&self) -> &[u8] {
        self.mapping.as_slice()
    }

    fn interface_mut(&mut self) -> &mut [u8] {
        self.mapping.as_mut_slice()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.mapping.unmap()
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Kernel
    }
}
