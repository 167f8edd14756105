//! Error types for Intuitus driver operations

use intuitus_abi::{codes, IoctlCommand};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Intuitus operations
pub type Result<T> = std::result::Result<T, IntuitusError>;

/// Failure classes shared with the kernel driver.
///
/// Every [`IntuitusError`] belongs to exactly one kind, and every kind has the
/// negative code the driver itself would report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Allocation failed
    MemoryAllocation,
    /// Tile, channel or command counts disagree
    DimensionMismatch,
    /// A required parameter was missing
    NullParameter,
    /// Shared interface block capacity exceeded
    MaxMemoryLimitExceeded,
    /// Device bring-up or teardown failed
    DeviceCreation,
    /// Driver-reported DMA failure
    Dma,
    /// Anything else
    Other,
}

impl ErrorKind {
    /// Classify a driver return code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            codes::MEMORY_ALLOC_FAIL => Self::MemoryAllocation,
            codes::DIMENSION_MISMATCH => Self::DimensionMismatch,
            codes::NULL_POINTER_PARAMETER => Self::NullParameter,
            codes::MAX_MEMORY_LIMIT => Self::MaxMemoryLimitExceeded,
            codes::CREATE_DEVICE => Self::DeviceCreation,
            codes::DMA => Self::Dma,
            _ => Self::Other,
        }
    }

    /// Driver code for this kind.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::MemoryAllocation => codes::MEMORY_ALLOC_FAIL,
            Self::DimensionMismatch => codes::DIMENSION_MISMATCH,
            Self::NullParameter => codes::NULL_POINTER_PARAMETER,
            Self::MaxMemoryLimitExceeded => codes::MAX_MEMORY_LIMIT,
            Self::DeviceCreation => codes::CREATE_DEVICE,
            Self::Dma => codes::DMA,
            Self::Other => codes::OTHER,
        }
    }
}

/// Errors that can occur during Intuitus operations
#[derive(Debug, Error)]
pub enum IntuitusError {
    /// Allocation failed on the client side
    #[error("Memory allocation failed: {reason}")]
    MemoryAllocation {
        /// Reason for failure
        reason: String,
    },

    /// Structural validation failed before any transaction was issued
    #[error("Dimension mismatch: {reason}")]
    DimensionMismatch {
        /// Reason for failure
        reason: String,
    },

    /// A required parameter was missing or empty
    #[error("Parameter {name} must not be empty")]
    NullParameter {
        /// Parameter name
        name: &'static str,
    },

    /// Request does not fit the shared interface block
    #[error("{what} needs {requested} bytes, shared buffer holds {capacity}")]
    MaxMemoryLimitExceeded {
        /// What was being staged
        what: &'static str,
        /// Bytes requested
        requested: usize,
        /// Bytes available
        capacity: usize,
    },

    /// Device bring-up failed
    #[error("Device creation failed: {reason}")]
    DeviceCreation {
        /// Reason for failure
        reason: String,
    },

    /// Device node missing after module load
    #[error("Device not found: {path}")]
    DeviceNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// The driver rejected a control transaction
    #[error("{command} failed with code {code} ({kind:?})")]
    Driver {
        /// Command that failed
        command: IoctlCommand,
        /// Classified code
        kind: ErrorKind,
        /// Raw code, as returned by the driver
        code: i32,
    },

    /// A layer-build step failed; names the layer and, where known, the
    /// tile and channel being processed
    #[error("layer {layer_id}{}: {source}", location(.tile, .channel))]
    Layer {
        /// Layer being built
        layer_id: i32,
        /// Tile index, if the failure happened inside the tile loop
        tile: Option<usize>,
        /// Channel index, if the failure happened inside the channel loop
        channel: Option<u32>,
        /// Underlying failure
        source: Box<IntuitusError>,
    },

    /// Shared interface block used out of order
    #[error("Shared interface protocol violation: {reason}")]
    ProtocolViolation {
        /// What was attempted in which phase
        reason: String,
    },

    /// I/O error during device communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

#[allow(clippy::ref_option)]
fn location(tile: &Option<usize>, channel: &Option<u32>) -> String {
    match (tile, channel) {
        (Some(t), Some(c)) => format!(" (tile {t}, channel {c})"),
        (Some(t), None) => format!(" (tile {t})"),
        (None, Some(c)) => format!(" (channel {c})"),
        (None, None) => String::new(),
    }
}

impl IntuitusError {
    /// Create a dimension mismatch error
    pub fn dimension_mismatch(reason: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            reason: reason.into(),
        }
    }

    /// Create a device creation error
    pub fn device_creation(reason: impl Into<String>) -> Self {
        Self::DeviceCreation {
            reason: reason.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol_violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }

    /// Create an allocation error
    pub fn memory_allocation(reason: impl Into<String>) -> Self {
        Self::MemoryAllocation {
            reason: reason.into(),
        }
    }

    /// Wrap a driver return code
    #[must_use]
    pub const fn driver(command: IoctlCommand, code: i32) -> Self {
        Self::Driver {
            command,
            kind: ErrorKind::from_code(code),
            code,
        }
    }

    /// Tag `source` with the layer (and tile / channel) being built
    #[must_use]
    pub fn in_layer(source: Self, layer_id: i32, tile: Option<usize>, channel: Option<u32>) -> Self {
        Self::Layer {
            layer_id,
            tile,
            channel,
            source: Box::new(source),
        }
    }

    /// Failure class
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MemoryAllocation { .. } => ErrorKind::MemoryAllocation,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::NullParameter { .. } => ErrorKind::NullParameter,
            Self::MaxMemoryLimitExceeded { .. } => ErrorKind::MaxMemoryLimitExceeded,
            Self::DeviceCreation { .. } | Self::DeviceNotFound { .. } => ErrorKind::DeviceCreation,
            Self::Driver { kind, .. } => *kind,
            Self::Layer { source, .. } => source.kind(),
            Self::ProtocolViolation { .. } | Self::Io { .. } => ErrorKind::Other,
        }
    }

    /// Code to report for this error. Driver failures keep their raw code.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Driver { code, .. } => *code,
            Self::Layer { source, .. } => source.code(),
            other => other.kind().code(),
        }
    }
}
