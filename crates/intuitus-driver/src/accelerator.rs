//! Execution channel
//!
//! [`Accelerator`] owns one backend (device handle plus shared interface
//! block) for its whole lifetime. Construction performs bring-up and
//! dropping it performs teardown. Graph building, command encoding and
//! execution are implemented on it in their own modules.
//!
//! ```text
//! open() ──▶ Ready ──execute()──▶ Executing ──▶ Ready ──close()/drop──▶ (gone)
//! ```

use crate::backend::{select_backend, BackendSelection, DriverBackend, Request};
use crate::backends::KernelBackend;
use crate::config::DriverConfig;
use crate::error::{IntuitusError, Result};
use crate::execution::OutputAccumulator;
use crate::shared::{self, PhaseTracker, SharedPhase};
use intuitus_abi::ProxyStatus;
use tracing::{debug, info};

/// Execution channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Brought up, no execution in flight
    Ready,
    /// `NETWORK_EXECUTE` in flight
    Executing,
}

/// Geometry declared by `input_layer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputGeometry {
    /// Channels
    pub depth: u32,
    /// Rows
    pub height: u32,
    /// Columns
    pub length: u32,
}

impl InputGeometry {
    /// Input tensor size in bytes, also the offset of the first output.
    /// `None` on overflow.
    #[must_use]
    pub fn extent(&self) -> Option<usize> {
        (self.depth as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.length as usize)
    }
}

/// Userspace handle on the Intuitus accelerator
#[derive(Debug)]
pub struct Accelerator<B: DriverBackend> {
    pub(crate) backend: B,
    pub(crate) config: DriverConfig,
    pub(crate) phase: PhaseTracker,
    pub(crate) state: ChannelState,
    pub(crate) input: Option<InputGeometry>,
    pub(crate) outputs: OutputAccumulator,
}

impl Accelerator<KernelBackend> {
    /// Bring up the kernel driver
    ///
    /// Requires root. Loads the kernel module if the device node is missing,
    /// opens the node and maps the shared interface block.
    ///
    /// # Errors
    ///
    /// Returns the bring-up failure. Callers treat it as fatal: there is no
    /// degraded mode without the accelerator.
    pub fn open(config: DriverConfig) -> Result<Self> {
        let backend = KernelBackend::init(&config)?;
        Ok(Self::with_backend(backend, config))
    }
}

impl Accelerator<Box<dyn DriverBackend>> {
    /// Bring up whichever backend `selection` picks
    ///
    /// # Errors
    ///
    /// Returns the bring-up failure of the selected backend.
    pub fn select(selection: BackendSelection, config: DriverConfig) -> Result<Self> {
        let backend = select_backend(selection, &config)?;
        Ok(Self::with_backend(backend, config))
    }
}

impl<B: DriverBackend> Accelerator<B> {
    /// Wrap an already initialised backend
    pub fn with_backend(backend: B, config: DriverConfig) -> Self {
        info!("Accelerator ready ({})", backend.backend_type());
        Self {
            backend,
            config,
            phase: PhaseTracker::default(),
            state: ChannelState::Ready,
            input: None,
            outputs: OutputAccumulator::default(),
        }
    }

    /// Backend
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Backend, mutable
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Configuration in use
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Channel state
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    /// Current shared block phase
    pub const fn shared_phase(&self) -> SharedPhase {
        self.phase.phase()
    }

    /// Input geometry, once `input_layer` succeeded
    pub const fn input_geometry(&self) -> Option<InputGeometry> {
        self.input
    }

    /// Status word of the shared block
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if the driver left an unknown value.
    pub fn interface_status(&self) -> Result<ProxyStatus> {
        let raw = shared::status_raw(self.backend.interface());
        ProxyStatus::from_raw(raw)
            .ok_or_else(|| IntuitusError::protocol_violation(format!("unknown proxy status {raw}")))
    }

    /// Run the driver self test
    ///
    /// # Errors
    ///
    /// Returns the driver's code if the self test fails.
    pub fn self_test(&mut self) -> Result<()> {
        self.transact(&mut Request::SelfTest)
    }

    /// Dump the driver-side network to the driver log
    ///
    /// # Errors
    ///
    /// Returns the driver's code on failure.
    pub fn print_network(&mut self) -> Result<()> {
        self.transact(&mut Request::PrintNetwork)
    }

    /// Dump one layer to the driver log
    ///
    /// # Errors
    ///
    /// Returns the driver's code on failure, e.g. for an unknown layer.
    pub fn print_layer(&mut self, layer_id: i32) -> Result<()> {
        self.transact(&mut Request::PrintLayer(layer_id))
    }

    /// Tear down: release the output buffer and unmap the shared block
    ///
    /// # Errors
    ///
    /// Returns the unmap failure. The device is closed either way.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        self.outputs.clear();
        self.input = None;
        self.backend.shutdown()
    }

    pub(crate) fn transact(&mut self, request: &mut Request) -> Result<()> {
        let command = request.command();
        debug!("-> {command}");
        self.backend.transact(request).inspect_err(|e| debug!("<- {command}: {e}"))
    }
}

impl<B: DriverBackend> Drop for Accelerator<B> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::error!("Accelerator teardown failed: {e}");
        }
    }
}
