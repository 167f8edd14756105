//! ioctl argument structures.
//!
//! Each type mirrors one C struct of the driver header field for field.
//! Compiler padding in the C layout is spelled out as explicit `_pad`
//! bytes so every type is `Pod` and its byte image is fully defined.

use bytemuck::{Pod, Zeroable};

use crate::layer::LayerKind;

/// Half-open rectangle over a feature map (`struct tile_idx`).
///
/// `x0`/`y0` are included, `x1`/`y1` are not.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct TileIdx {
    /// First column.
    pub x0: u32,
    /// First row.
    pub y0: u32,
    /// One past the last column.
    pub x1: u32,
    /// One past the last row.
    pub y1: u32,
}

impl TileIdx {
    /// Build from the `(y0, y1, x0, x1)` order used by tile arrays.
    #[must_use]
    pub const fn from_rows(y0: u32, y1: u32, x0: u32, x1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Rows covered.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    /// Columns covered.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    /// Whether the rectangle covers at least one element.
    #[must_use]
    pub const fn is_non_empty(&self) -> bool {
        self.x1 > self.x0 && self.y1 > self.y0
    }
}

/// Layer creation arguments (`struct intuitus_layer_args`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LayerArgs {
    /// [`LayerKind`] discriminant.
    pub layer_type: u32,
    /// Buffer read by the layer; the previous layer's output when 0.
    pub src_buffer_id: i32,
    /// Layer id, also the id of the layer's output buffer.
    pub layer_id: i32,
    /// Number of rx tiles.
    pub rx_tile_cnt: u32,
    /// Number of tx tiles.
    pub tx_tile_cnt: u32,
    /// Input channels.
    pub ci_cnt: u32,
    /// Output channels.
    pub co_cnt: u32,
    /// Output width.
    pub dst_length: u32,
    /// Output height.
    pub dst_height: u32,
    /// Scattered lines; stride for max pooling.
    pub scattered_lines: i8,
    /// C tail padding.
    pub _pad: [u8; 3],
}

impl LayerArgs {
    /// Arguments for `kind` with every count zeroed.
    #[must_use]
    pub fn new(kind: LayerKind, layer_id: i32, src_buffer_id: i32) -> Self {
        Self {
            layer_type: kind.raw(),
            src_buffer_id,
            layer_id,
            ..Self::zeroed()
        }
    }

    /// Decoded layer kind, if the raw value is known.
    #[must_use]
    pub fn kind(&self) -> Option<LayerKind> {
        LayerKind::from_raw(self.layer_type)
    }

    /// Declared output extent in bytes (`co * height * length`), `None` on
    /// overflow.
    #[must_use]
    pub fn output_extent(&self) -> Option<usize> {
        (self.co_cnt as usize)
            .checked_mul(self.dst_height as usize)?
            .checked_mul(self.dst_length as usize)
    }
}

/// Tx command arguments (`struct intuitus_command_args`).
///
/// The command words themselves travel through the shared interface block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CommandArgs {
    /// Owning layer.
    pub layer_id: i32,
    /// Source tile the commands fetch.
    pub src_tile: TileIdx,
    /// Input channel index.
    pub channel_idx: i32,
    /// `tile * input_channels + channel`.
    pub command_id: i32,
}

/// Rx tile arguments (`struct intuitus_rx_tile_args`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RxTileArgs {
    /// Owning layer.
    pub layer_id: i32,
    /// Destination tile.
    pub dst_tile: TileIdx,
    /// Output channel index.
    pub channel_idx: i32,
    /// Non-zero on the terminal descriptor of the layer.
    pub last_tile: u8,
    /// C padding before `tile_id`.
    pub _pad: [u8; 3],
    /// Sequence number within the layer.
    pub tile_id: i32,
}

impl RxTileArgs {
    /// Build one rx descriptor.
    #[must_use]
    pub fn new(layer_id: i32, dst_tile: TileIdx, channel_idx: i32, tile_id: i32, last: bool) -> Self {
        Self {
            layer_id,
            dst_tile,
            channel_idx,
            last_tile: u8::from(last),
            _pad: [0; 3],
            tile_id,
        }
    }

    /// Whether this is the terminal descriptor.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.last_tile != 0
    }
}

/// Concat arguments (`struct intuitus_concat_args`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ConcatArgs {
    /// Id of the new concat layer.
    pub concat_layer_id: i32,
    /// First buffer.
    pub layer1_id: i32,
    /// Second buffer.
    pub layer2_id: i32,
}

/// Split arguments (`struct intuitus_split_args`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SplitArgs {
    /// First id of the `groups` new layers.
    pub split_layer_id: i32,
    /// Buffer to split.
    pub in_layer_id: i32,
    /// Number of parts.
    pub groups: i32,
}

/// DMA optimisation hint (`struct intuitus_opt_args`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct OptArgs {
    /// Layer the hint applies to.
    pub layer_id: i32,
    /// Tx scatter-list entries.
    pub tx_scatterlist_size: u32,
    /// Rx scatter-list entries.
    pub rx_scatterlist_size: u32,
}

const _: () = assert!(std::mem::size_of::<TileIdx>() == 16);
const _: () = assert!(std::mem::size_of::<LayerArgs>() == 40);
const _: () = assert!(std::mem::size_of::<CommandArgs>() == 28);
const _: () = assert!(std::mem::size_of::<RxTileArgs>() == 32);
const _: () = assert!(std::mem::size_of::<ConcatArgs>() == 12);
const _: () = assert!(std::mem::size_of::<SplitArgs>() == 12);
const _: () = assert!(std::mem::size_of::<OptArgs>() == 12);
