//! Control-channel command codes and ioctl request numbers.
//!
//! The driver header builds every request with the generic Linux `_IOC`
//! encoding and type `0`:
//!
//! ```text
//! bits 31..30  direction   (1 = write, for _IOW)
//! bits 29..16  size
//! bits 15..8   type        (always 0)
//! bits  7..0   nr          (IoctlCommand discriminant)
//! ```
//!
//! The header passes `sizeof(struct ...)` as the *type* argument of `_IOW`,
//! which applies `sizeof` a second time. The size field therefore holds the
//! width of the C `size_t`, not the argument structure size. Both sides
//! expand the same macro, so the request numbers below reproduce that.

/// `_IOC_WRITE` direction bit.
const IOC_WRITE: u32 = 1;
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;

/// ioctl type byte used by the driver.
pub const IOCTL_TYPE: u32 = 0;

/// Value carried in the size field of every `_IOW` request.
#[allow(clippy::cast_possible_truncation)]
pub const IOW_SIZE_FIELD: u32 = std::mem::size_of::<usize>() as u32;

/// Command codes (`enum intuitus_ioctl_cmd`).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoctlCommand {
    /// Create the input layer.
    InputLayer = 0,
    /// Create an output layer.
    OutputLayer = 1,
    /// Create any other layer node.
    LayerCreate = 2,
    /// Attach one rx tile descriptor to a layer.
    LayerAddRxTile = 3,
    /// Attach one tx command stream to a layer.
    LayerAddTxCommand = 4,
    /// Concatenate two layer buffers.
    LayerConcat = 5,
    /// Split a layer buffer into groups.
    BufferSplit = 6,
    /// Hint the scatter-list sizes of a layer.
    LayerOptimizeDma = 7,
    /// Execute a single layer.
    LayerExecute = 8,
    /// Execute the whole network.
    NetworkExecute = 9,
    /// Query network status.
    NetworkStatus = 10,
    /// Query execution status.
    ExecutionStatus = 11,
    /// Request the shared interface.
    RequestInterface = 12,
    /// Dump the network to the kernel log.
    PrintNetwork = 13,
    /// Dump one layer to the kernel log.
    PrintLayer = 14,
    /// Run the driver self test.
    SelfTest = 15,
}

impl IoctlCommand {
    /// Every command, in discriminant order.
    pub const ALL: [Self; 16] = [
        Self::InputLayer,
        Self::OutputLayer,
        Self::LayerCreate,
        Self::LayerAddRxTile,
        Self::LayerAddTxCommand,
        Self::LayerConcat,
        Self::BufferSplit,
        Self::LayerOptimizeDma,
        Self::LayerExecute,
        Self::NetworkExecute,
        Self::NetworkStatus,
        Self::ExecutionStatus,
        Self::RequestInterface,
        Self::PrintNetwork,
        Self::PrintLayer,
        Self::SelfTest,
    ];

    /// Command number (`_IOC_NR`).
    #[must_use]
    pub const fn nr(self) -> u32 {
        self as u32
    }

    /// Whether the header issues this command with `_IOW` (argument struct
    /// written to the driver) rather than bare `_IO`.
    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(
            self,
            Self::NetworkExecute
                | Self::NetworkStatus
                | Self::ExecutionStatus
                | Self::RequestInterface
                | Self::PrintNetwork
                | Self::PrintLayer
                | Self::SelfTest
        )
    }

    /// Full ioctl request number.
    #[must_use]
    pub const fn request(self) -> u32 {
        if self.is_write() {
            iow(IOCTL_TYPE, self.nr(), IOW_SIZE_FIELD)
        } else {
            io(IOCTL_TYPE, self.nr())
        }
    }
}

impl std::fmt::Display for IoctlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InputLayer => "INPUT_LAYER",
            Self::OutputLayer => "OUTPUT_LAYER",
            Self::LayerCreate => "LAYER_CREATE",
            Self::LayerAddRxTile => "LAYER_ADD_RX_TILE",
            Self::LayerAddTxCommand => "LAYER_ADD_TX_COM",
            Self::LayerConcat => "LAYER_CONCAT",
            Self::BufferSplit => "BUFFER_SPLIT",
            Self::LayerOptimizeDma => "LAYER_OPTIMIZE_DMA",
            Self::LayerExecute => "LAYER_EXECUTE",
            Self::NetworkExecute => "NETWORK_EXECUTE",
            Self::NetworkStatus => "NETWORK_STATUS",
            Self::ExecutionStatus => "EXECUTION_STATUS",
            Self::RequestInterface => "REQUEST_INTF",
            Self::PrintNetwork => "PRINT_NETWORK",
            Self::PrintLayer => "PRINT_LAYER",
            Self::SelfTest => "SELF_TEST",
        };
        f.write_str(name)
    }
}

/// `_IOC(dir, ty, nr, size)`.
#[must_use]
pub const fn ioc(dir: u32, ty: u32, nr: u32, size: u32) -> u32 {
    (dir << IOC_DIRSHIFT) | (size << IOC_SIZESHIFT) | (ty << IOC_TYPESHIFT) | (nr << IOC_NRSHIFT)
}

/// `_IO(ty, nr)`.
#[must_use]
pub const fn io(ty: u32, nr: u32) -> u32 {
    ioc(0, ty, nr, 0)
}

/// `_IOW(ty, nr, size)` with the size field already resolved.
#[must_use]
pub const fn iow(ty: u32, nr: u32, size: u32) -> u32 {
    ioc(IOC_WRITE, ty, nr, size)
}
