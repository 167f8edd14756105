//! Control-channel abstraction
//!
//! A backend does two things: issue one synchronous control transaction,
//! and expose the shared interface block as bytes. Everything above this
//! seam (encoding, planning, graph building, execution) is backend-agnostic.

use crate::config::DriverConfig;
use crate::error::Result;
use intuitus_abi::{
    CommandArgs, ConcatArgs, IoctlCommand, LayerArgs, OptArgs, RxTileArgs, SplitArgs,
};
use std::fmt::Debug;

/// One control transaction with its argument structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// `INPUT_LAYER`
    InputLayer(LayerArgs),
    /// `OUTPUT_LAYER`
    OutputLayer(LayerArgs),
    /// `LAYER_CREATE`
    LayerCreate(LayerArgs),
    /// `LAYER_ADD_RX_TILE`
    AddRxTile(RxTileArgs),
    /// `LAYER_ADD_TX_COM`; command words are staged in the shared block
    AddTxCommand(CommandArgs),
    /// `LAYER_CONCAT`
    Concat(ConcatArgs),
    /// `BUFFER_SPLIT`
    Split(SplitArgs),
    /// `LAYER_OPTIMIZE_DMA`
    OptimizeDma(OptArgs),
    /// `NETWORK_EXECUTE`; the input tensor is staged in the shared block
    ExecuteNetwork,
    /// `PRINT_NETWORK`
    PrintNetwork,
    /// `PRINT_LAYER`
    PrintLayer(i32),
    /// `SELF_TEST`
    SelfTest,
}

impl Request {
    /// Command code of this request
    #[must_use]
    pub const fn command(&self) -> IoctlCommand {
        match self {
            Self::InputLayer(_) => IoctlCommand::InputLayer,
            Self::OutputLayer(_) => IoctlCommand::OutputLayer,
            Self::LayerCreate(_) => IoctlCommand::LayerCreate,
            Self::AddRxTile(_) => IoctlCommand::LayerAddRxTile,
            Self::AddTxCommand(_) => IoctlCommand::LayerAddTxCommand,
            Self::Concat(_) => IoctlCommand::LayerConcat,
            Self::Split(_) => IoctlCommand::BufferSplit,
            Self::OptimizeDma(_) => IoctlCommand::LayerOptimizeDma,
            Self::ExecuteNetwork => IoctlCommand::NetworkExecute,
            Self::PrintNetwork => IoctlCommand::PrintNetwork,
            Self::PrintLayer(_) => IoctlCommand::PrintLayer,
            Self::SelfTest => IoctlCommand::SelfTest,
        }
    }
}

/// Driver backend: control channel plus shared interface block
pub trait DriverBackend: Debug {
    /// Bring the backend up
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be brought up. For hardware
    /// this is fatal; there is no degraded mode without the accelerator.
    fn init(config: &DriverConfig) -> Result<Self>
    where
        Self: Sized;

    /// Issue one blocking control transaction
    ///
    /// # Errors
    ///
    /// Returns `IntuitusError::Driver` carrying the driver's code verbatim
    /// when the transaction reports a non-zero result.
    fn transact(&mut self, request: &mut Request) -> Result<()>;

    /// Shared interface block (`INTERFACE_SIZE` bytes)
    fn interface(&self) -> &[u8];

    /// Shared interface block, writable
    fn interface_mut(&mut self) -> &mut [u8];

    /// Release device resources ahead of drop
    ///
    /// # Errors
    ///
    /// Returns `DeviceCreation` if the shared block cannot be unmapped.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Backend type for logs
    fn backend_type(&self) -> BackendType;
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Kernel driver (`/dev/intuitus_vdma`)
    Kernel,

    /// In-process virtual driver, no hardware required
    Software,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kernel => write!(f, "Kernel"),
            Self::Software => write!(f, "Software (virtual driver)"),
        }
    }
}

/// Backend selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSelection {
    /// Kernel if it comes up, otherwise software
    Auto,

    /// Force kernel driver
    Kernel,

    /// Force the virtual driver
    Software,
}

/// Select a backend
///
/// # Errors
///
/// Returns the kernel bring-up error when `Kernel` is forced and fails.
pub fn select_backend(
    selection: BackendSelection,
    config: &DriverConfig,
) -> Result<Box<dyn DriverBackend>> {
    use crate::backends::kernel::KernelBackend;
    use crate::backends::software::SoftwareBackend;

    match selection {
        BackendSelection::Auto => match KernelBackend::init(config) {
            Ok(backend) => {
                tracing::info!("Using kernel backend on {}", config.device_path.display());
                Ok(Box::new(backend))
            }
            Err(e) => {
                tracing::warn!("Kernel backend unavailable ({e}), using virtual driver");
                SoftwareBackend::init(config).map(|b| Box::new(b) as Box<dyn DriverBackend>)
            }
        },

        BackendSelection::Kernel => {
            KernelBackend::init(config).map(|b| Box::new(b) as Box<dyn DriverBackend>)
        }

        BackendSelection::Software => {
            SoftwareBackend::init(config).map(|b| Box::new(b) as Box<dyn DriverBackend>)
        }
    }
}

impl DriverBackend for Box<dyn DriverBackend> {
    fn init(config: &DriverConfig) -> Result<Self> {
        select_backend(BackendSelection::Auto, config)
    }

    fn transact(&mut self, request: &mut Request) -> Result<()> {
        (**self).transact(request)
    }

    fn interface(&self) -> &[u8] {
        (**self).interface()
    }

    fn interface_mut(&mut self) -> &mut [u8] {
        (**self).interface_mut()
    }

    fn shutdown(&mut self) -> Result<()> {
        (**self).shutdown()
    }

    fn backend_type(&self) -> BackendType {
        (**self).backend_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intuitus_abi::LayerKind;

    #[test]
    fn requests_map_to_header_commands() {
        let layer = LayerArgs::new(LayerKind::Conv1x1, 1, 0);
        assert_eq!(Request::InputLayer(layer).command(), IoctlCommand::InputLayer);
        assert_eq!(Request::LayerCreate(layer).command(), IoctlCommand::LayerCreate);
        assert_eq!(Request::ExecuteNetwork.command(), IoctlCommand::NetworkExecute);
        assert_eq!(Request::PrintLayer(3).command(), IoctlCommand::PrintLayer);
    }

    #[test]
    fn forced_software_selection() {
        let backend = select_backend(BackendSelection::Software, &DriverConfig::default()).unwrap();
        assert_eq!(backend.backend_type(), BackendType::Software);
        assert_eq!(backend.interface().len(), intuitus_abi::INTERFACE_SIZE);
    }
}
