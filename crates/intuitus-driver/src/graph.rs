//! Layer graph builder
//!
//! One call per layer. Each call creates exactly one node in the driver's
//! graph; tiled layers then attach their tx commands and rx descriptors.
//! Ids must be introduced before they are used as a source, so the graph is
//! built in topological order.
//!
//! A failed call leaves the driver-side graph partially configured. There is
//! no rollback: discard the accelerator and rebuild.

use crate::accelerator::{Accelerator, InputGeometry};
use crate::backend::{DriverBackend, Request};
use crate::encoder::{self, TxTile};
use crate::error::{IntuitusError, Result};
use crate::planner::{self, DmaPlan, RxTile};
use crate::shared;
use intuitus_abi::interface::BUFFER_CAPACITY;
use intuitus_abi::{ConcatArgs, LayerArgs, LayerKind, RxTileArgs, SplitArgs};
use std::ops::Range;
use tracing::debug;

/// A convolution-family layer with its tiles and command streams
#[derive(Debug, Clone, Copy)]
pub struct ConvLayer<'a> {
    /// Layer id, also the id of its output buffer
    pub layer_id: i32,
    /// `Conv1x1`, `Conv3x3`, `Conv5x5`, `InvBottleneck3x3`,
    /// `InvBottleneck5x5`, `Residual` or `TestLoop`
    pub kind: LayerKind,
    /// Buffer read by the layer
    pub source_id: i32,
    /// Input channels
    pub in_channels: u32,
    /// Output channels
    pub out_channels: u32,
    /// Output rows
    pub out_height: u32,
    /// Output columns
    pub out_width: u32,
    /// Scattered lines
    pub scattered_lines: i8,
    /// Source tiles
    pub tx_tiles: &'a [TxTile],
    /// Destination tiles
    pub rx_tiles: &'a [RxTile],
    /// All command words, tile-major
    pub commands: &'a [i32],
    /// Words per (tile, channel) stream
    pub command_lengths: &'a [u32],
}

fn count(what: &str, n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| IntuitusError::dimension_mismatch(format!("{n} {what} out of range")))
}

impl<B: DriverBackend> Accelerator<B> {
    /// Declare the input layer (always id 0)
    ///
    /// The outputs of the network land right behind the input tensor in the
    /// shared block, at offset `depth * height * length`.
    ///
    /// # Errors
    ///
    /// `MaxMemoryLimitExceeded` if the tensor cannot fit the shared buffer,
    /// otherwise the driver's code.
    pub fn input_layer(&mut self, depth: u32, height: u32, length: u32) -> Result<()> {
        let geometry = InputGeometry {
            depth,
            height,
            length,
        };
        let extent = geometry.extent().unwrap_or(usize::MAX);
        if extent > BUFFER_CAPACITY {
            return Err(IntuitusError::in_layer(
                IntuitusError::MaxMemoryLimitExceeded {
                    what: "input tensor",
                    requested: extent,
                    capacity: BUFFER_CAPACITY,
                },
                0,
                None,
                None,
            ));
        }

        let mut args = LayerArgs::new(LayerKind::Input, 0, 0);
        args.rx_tile_cnt = 1;
        args.tx_tile_cnt = 1;
        args.ci_cnt = depth;
        args.co_cnt = depth;
        args.dst_length = length;
        args.dst_height = height;

        self.transact(&mut Request::InputLayer(args))
            .map_err(|e| IntuitusError::in_layer(e, 0, None, None))?;

        self.input = Some(geometry);
        debug!("Input layer {depth}x{height}x{length}, outputs at offset {extent}");
        Ok(())
    }

    /// Declare an output layer fed by `source_id`
    ///
    /// The driver answers by declaring the layer's extent in the shared
    /// block's `length`, `height` and `depth` fields. The output buffer grows
    /// by whatever extent is declared there once the call returns.
    ///
    /// Returns the bytes this output adds.
    ///
    /// # Errors
    ///
    /// The driver's code, `MaxMemoryLimitExceeded` if the declared extent
    /// exceeds the shared buffer, or `MemoryAllocation` if the output buffer
    /// cannot grow.
    pub fn output_layer(&mut self, layer_id: i32, source_id: i32) -> Result<usize> {
        let wrap = |e| IntuitusError::in_layer(e, layer_id, None, None);

        let mut args = LayerArgs::new(LayerKind::Output, layer_id, source_id);
        args.rx_tile_cnt = 1;
        args.tx_tile_cnt = 1;
        self.transact(&mut Request::OutputLayer(args)).map_err(wrap)?;

        let extent = shared::dims(self.backend.interface()).extent().unwrap_or(usize::MAX);
        if extent > BUFFER_CAPACITY {
            return Err(wrap(IntuitusError::MaxMemoryLimitExceeded {
                what: "output layer",
                requested: extent,
                capacity: BUFFER_CAPACITY,
            }));
        }
        self.outputs.grow(layer_id, extent).map_err(wrap)?;
        Ok(extent)
    }

    /// Create a convolution-family layer
    ///
    /// All tile and command arrays are validated before the layer is
    /// created; a malformed layer issues no transaction at all. Then one
    /// `LAYER_CREATE`, one `LAYER_ADD_TX_COM` per (tile, input channel) and
    /// one `LAYER_ADD_RX_TILE` per (tile, output channel), tile-major.
    ///
    /// Returns the scatter-list sizes of the layer.
    ///
    /// # Errors
    ///
    /// Validation failures (`DimensionMismatch`, `NullParameter`,
    /// `MaxMemoryLimitExceeded`) or the first driver failure, tagged with the
    /// layer and, inside the loops, the tile and channel.
    pub fn conv(&mut self, layer: &ConvLayer<'_>) -> Result<DmaPlan> {
        let id = layer.layer_id;
        let wrap = |e| IntuitusError::in_layer(e, id, None, None);

        if !layer.kind.carries_tiles() {
            return Err(wrap(IntuitusError::protocol_violation(format!(
                "{} is not a tiled layer kind",
                layer.kind
            ))));
        }
        let blocks =
            encoder::split_commands(layer.tx_tiles, layer.in_channels, layer.commands, layer.command_lengths)
                .map_err(wrap)?;
        planner::validate_rx(layer.rx_tiles, layer.out_channels).map_err(wrap)?;
        let rx = planner::plan_rx(layer.rx_tiles, layer.out_height, layer.out_width).map_err(wrap)?;

        let mut args = LayerArgs::new(layer.kind, id, layer.source_id);
        args.rx_tile_cnt = count("rx tiles", layer.rx_tiles.len()).map_err(wrap)?;
        args.tx_tile_cnt = count("tx tiles", layer.tx_tiles.len()).map_err(wrap)?;
        args.ci_cnt = layer.in_channels;
        args.co_cnt = layer.out_channels;
        args.dst_length = layer.out_width;
        args.dst_height = layer.out_height;
        args.scattered_lines = layer.scattered_lines;
        self.transact(&mut Request::LayerCreate(args)).map_err(wrap)?;

        for block in &blocks {
            self.encode_and_send(block.tile, block.words, block.channel, block.command_id, id)
                .map_err(|e| IntuitusError::in_layer(e, id, Some(block.tile_index), Some(block.channel)))?;
        }

        for d in &rx.descriptors {
            let channel = i32::try_from(d.channel).map_err(|_| {
                wrap(IntuitusError::dimension_mismatch(format!("channel {} out of range", d.channel)))
            })?;
            let mut request = Request::AddRxTile(RxTileArgs::new(id, d.tile, channel, d.tile_id, d.last));
            self.transact(&mut request)
                .map_err(|e| IntuitusError::in_layer(e, id, Some(d.tile_index), Some(d.channel)))?;
        }

        let plan = DmaPlan {
            tx_scatterlist_size: planner::tx_scatterlist_size(layer.tx_tiles, layer.in_channels),
            rx_scatterlist_size: rx.scatterlist_size,
        };
        debug!(
            "Layer {id} ({}): {} tx commands, {} rx descriptors",
            layer.kind,
            blocks.len(),
            rx.descriptors.len()
        );
        self.optimize_dma(id, plan);
        Ok(plan)
    }

    /// Concatenate the output buffers of `first_id` and `second_id`
    ///
    /// # Errors
    ///
    /// The driver's code.
    pub fn concat(&mut self, concat_id: i32, first_id: i32, second_id: i32) -> Result<()> {
        let mut request = Request::Concat(ConcatArgs {
            concat_layer_id: concat_id,
            layer1_id: first_id,
            layer2_id: second_id,
        });
        self.transact(&mut request)
            .map_err(|e| IntuitusError::in_layer(e, concat_id, None, None))
    }

    /// Split the output buffer of `in_id` into `groups` parts
    ///
    /// The parts become layers `split_id`, `split_id + 1`, ..., returned as
    /// a range.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` for `groups < 1` or an id range past `i32::MAX`
    /// (nothing is sent), otherwise the driver's code.
    pub fn split(&mut self, split_id: i32, in_id: i32, groups: i32) -> Result<Range<i32>> {
        let wrap = |e| IntuitusError::in_layer(e, split_id, None, None);

        if groups < 1 {
            return Err(wrap(IntuitusError::dimension_mismatch(format!(
                "split into {groups} groups"
            ))));
        }
        let end = split_id
            .checked_add(groups)
            .ok_or_else(|| wrap(IntuitusError::dimension_mismatch("split layer ids overflow")))?;

        let mut request = Request::Split(SplitArgs {
            split_layer_id: split_id,
            in_layer_id: in_id,
            groups,
        });
        self.transact(&mut request).map_err(wrap)?;
        Ok(split_id..end)
    }

    /// 2x upsampling of `source_id`
    ///
    /// # Errors
    ///
    /// The driver's code.
    pub fn upsample(&mut self, layer_id: i32, source_id: i32, channels: u32, out_height: u32, out_width: u32) -> Result<()> {
        self.structural(LayerKind::Upsample, layer_id, source_id, channels, out_height, out_width, 0)
    }

    /// 2x2 max pooling of `source_id` with `stride`
    ///
    /// # Errors
    ///
    /// The driver's code.
    pub fn maxpool2d(
        &mut self,
        layer_id: i32,
        source_id: i32,
        channels: u32,
        out_height: u32,
        out_width: u32,
        stride: i8,
    ) -> Result<()> {
        self.structural(LayerKind::Maxpool2d, layer_id, source_id, channels, out_height, out_width, stride)
    }

    /// Copy the output of `source_id` into a new buffer
    ///
    /// # Errors
    ///
    /// The driver's code.
    pub fn copy(&mut self, layer_id: i32, source_id: i32, channels: u32, out_height: u32, out_width: u32) -> Result<()> {
        self.structural(LayerKind::Copy, layer_id, source_id, channels, out_height, out_width, 0)
    }

    #[allow(clippy::too_many_arguments)]
    fn structural(
        &mut self,
        kind: LayerKind,
        layer_id: i32,
        source_id: i32,
        channels: u32,
        out_height: u32,
        out_width: u32,
        scattered_lines: i8,
    ) -> Result<()> {
        let mut args = LayerArgs::new(kind, layer_id, source_id);
        args.ci_cnt = channels;
        args.co_cnt = channels;
        args.dst_length = out_width;
        args.dst_height = out_height;
        args.scattered_lines = scattered_lines;

        self.transact(&mut Request::LayerCreate(args))
            .map_err(|e| IntuitusError::in_layer(e, layer_id, None, None))
    }
}
