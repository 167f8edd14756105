//! DMA descriptor planning
//!
//! Turns the rx tile list of a layer into one descriptor per (tile, output
//! channel), numbers them, and marks where the layer ends. Also sizes the tx
//! and rx scatter lists for the optional `LAYER_OPTIMIZE_DMA` hint.

use crate::accelerator::Accelerator;
use crate::backend::{DriverBackend, Request};
use crate::encoder::TxTile;
use crate::error::{IntuitusError, Result};
use intuitus_abi::{OptArgs, TileIdx};
use std::ops::Range;

/// Fields per row of a flat rx tile array
/// (`y0, y1, x0, x1, channel_start, channel_end`)
pub const RX_TILE_WIDTH: usize = 6;

/// Destination tile with the output channels it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxTile {
    /// Rectangle written in the output buffer
    pub tile: TileIdx,
    /// First output channel
    pub channel_start: u32,
    /// One past the last output channel
    pub channel_end: u32,
}

impl RxTile {
    /// Tile from `(y0, y1, x0, x1)` carrying channels `start..end`
    #[must_use]
    pub const fn new(y0: u32, y1: u32, x0: u32, x1: u32, channel_start: u32, channel_end: u32) -> Self {
        Self {
            tile: TileIdx::from_rows(y0, y1, x0, x1),
            channel_start,
            channel_end,
        }
    }

    /// Parse a flat tile array with `width` fields per row
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` unless `width` is 6 and `flat` holds a
    /// whole number of rows.
    pub fn from_flat(flat: &[u32], width: usize) -> Result<Vec<Self>> {
        if width != RX_TILE_WIDTH {
            return Err(IntuitusError::dimension_mismatch(format!(
                "rx tile array has {width} fields per tile, expected {RX_TILE_WIDTH}"
            )));
        }
        if flat.len() % width != 0 {
            return Err(IntuitusError::dimension_mismatch(format!(
                "rx tile array of {} values is not a multiple of {width}",
                flat.len()
            )));
        }
        Ok(flat
            .chunks_exact(width)
            .map(|r| Self::new(r[0], r[1], r[2], r[3], r[4], r[5]))
            .collect())
    }

    /// Output channels carried
    #[must_use]
    pub const fn channels(&self) -> Range<u32> {
        self.channel_start..self.channel_end
    }
}

/// One `LAYER_ADD_RX_TILE` descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxDescriptor {
    /// Position of the tile in the rx tile list
    pub tile_index: usize,
    /// Destination tile
    pub tile: TileIdx,
    /// Output channel
    pub channel: u32,
    /// Sequence number within the layer
    pub tile_id: i32,
    /// Terminal flag
    pub last: bool,
}

/// Rx descriptors of a layer with their scatter-list size
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RxPlan {
    /// Descriptors in send order
    pub descriptors: Vec<RxDescriptor>,
    /// `Σ (y1 − y0)` over all descriptors
    pub scatterlist_size: u32,
}

/// Scatter-list sizes of one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaPlan {
    /// Tx scatter-list entries
    pub tx_scatterlist_size: u32,
    /// Rx scatter-list entries
    pub rx_scatterlist_size: u32,
}

/// Tx scatter-list size: `Σ (y1 − y0 + 1)` per (tile, input channel)
#[must_use]
pub fn tx_scatterlist_size(tx_tiles: &[TxTile], in_channels: u32) -> u32 {
    tx_tiles
        .iter()
        .map(|t| (t.tile.height() + 1).saturating_mul(in_channels))
        .fold(0, u32::saturating_add)
}

/// Check rx tiles against the layer's output channels
///
/// # Errors
///
/// `NullParameter` for an empty list, `DimensionMismatch` for an empty
/// rectangle or a channel range outside `0..out_channels`.
pub fn validate_rx(rx_tiles: &[RxTile], out_channels: u32) -> Result<()> {
    if rx_tiles.is_empty() {
        return Err(IntuitusError::NullParameter { name: "rx_tiles" });
    }
    for (k, rx) in rx_tiles.iter().enumerate() {
        if !rx.tile.is_non_empty() {
            return Err(IntuitusError::dimension_mismatch(format!(
                "rx tile {k} is empty: {:?}",
                rx.tile
            )));
        }
        if rx.channel_start > rx.channel_end || rx.channel_end > out_channels {
            return Err(IntuitusError::dimension_mismatch(format!(
                "rx tile {k} channels {}..{} outside 0..{out_channels}",
                rx.channel_start, rx.channel_end
            )));
        }
    }
    Ok(())
}

/// Expand rx tiles into descriptors
///
/// Descriptors are numbered in tile-then-channel order. The terminal flag
/// goes up on the last tile, or on the first tile whose bottom-right corner
/// reaches `(out_height, out_width)`, and stays up for every descriptor after
/// it.
///
/// # Errors
///
/// Returns `DimensionMismatch` if the descriptor count overflows the
/// driver's `tile_id`.
pub fn plan_rx(rx_tiles: &[RxTile], out_height: u32, out_width: u32) -> Result<RxPlan> {
    let mut plan = RxPlan::default();
    let mut last = false;

    for (k, rx) in rx_tiles.iter().enumerate() {
        if k + 1 == rx_tiles.len() || (rx.tile.y1 == out_height && rx.tile.x1 == out_width) {
            last = true;
        }
        for channel in rx.channels() {
            let tile_id = i32::try_from(plan.descriptors.len()).map_err(|_| {
                IntuitusError::dimension_mismatch("rx descriptor count exceeds tile id range")
            })?;
            plan.descriptors.push(RxDescriptor {
                tile_index: k,
                tile: rx.tile,
                channel,
                tile_id,
                last,
            });
            plan.scatterlist_size = plan.scatterlist_size.saturating_add(rx.tile.height());
        }
    }
    Ok(plan)
}

impl<B: DriverBackend> Accelerator<B> {
    /// Forward scatter-list sizes to the driver, if enabled
    ///
    /// Best effort: a rejected hint is logged and otherwise ignored.
    pub fn optimize_dma(&mut self, layer_id: i32, plan: DmaPlan) {
        if !self.config.optimize_dma {
            return;
        }
        tracing::debug!(
            "Layer {layer_id}: tx scatterlist {}, rx scatterlist {}",
            plan.tx_scatterlist_size,
            plan.rx_scatterlist_size
        );
        let mut request = Request::OptimizeDma(OptArgs {
            layer_id,
            tx_scatterlist_size: plan.tx_scatterlist_size,
            rx_scatterlist_size: plan.rx_scatterlist_size,
        });
        if let Err(e) = self.transact(&mut request) {
            tracing::warn!("DMA optimisation for layer {layer_id} rejected: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn flags(plan: &RxPlan) -> Vec<bool> {
        plan.descriptors.iter().map(|d| d.last).collect()
    }

    #[test]
    fn last_tile_in_sequence_is_terminal() {
        let rx = [RxTile::new(0, 8, 0, 16, 0, 1), RxTile::new(8, 14, 0, 16, 0, 1)];
        let plan = plan_rx(&rx, 16, 16).unwrap();
        assert_eq!(flags(&plan), vec![false, true]);
    }

    #[test]
    fn full_extent_tile_closes_the_layer() {
        let rx = [
            RxTile::new(0, 8, 0, 16, 0, 2),
            RxTile::new(8, 16, 0, 16, 0, 2),
            RxTile::new(0, 16, 0, 16, 2, 3),
        ];
        let plan = plan_rx(&rx, 16, 16).unwrap();
        // Second tile reaches (16, 16); the flag stays up afterwards
        assert_eq!(flags(&plan), vec![false, false, true, true, true]);
    }

    #[test]
    fn descriptors_are_numbered_across_tiles() {
        let rx = [RxTile::new(0, 4, 0, 4, 1, 3), RxTile::new(4, 8, 0, 4, 0, 2)];
        let plan = plan_rx(&rx, 8, 4).unwrap();
        let seq: Vec<_> = plan.descriptors.iter().map(|d| (d.tile_id, d.tile_index, d.channel)).collect();
        assert_eq!(seq, vec![(0, 0, 1), (1, 0, 2), (2, 1, 0), (3, 1, 1)]);
        assert_eq!(plan.scatterlist_size, 4 * 4);
    }

    #[test]
    fn tx_scatterlist_counts_inclusive_rows() {
        let tx = [TxTile::new(0, 9, 0, 16), TxTile::new(8, 16, 0, 16)];
        // (9 + 1) * 3 + (8 + 1) * 3
        assert_eq!(tx_scatterlist_size(&tx, 3), 57);
    }

    #[test]
    fn rx_validation() {
        assert!(validate_rx(&[RxTile::new(0, 4, 0, 4, 0, 8)], 8).is_ok());

        let err = validate_rx(&[RxTile::new(0, 4, 0, 4, 0, 9)], 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);

        let err = validate_rx(&[RxTile::new(0, 4, 4, 4, 0, 1)], 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);

        let err = validate_rx(&[], 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NullParameter);
    }

    #[test]
    fn flat_rx_tiles_need_six_fields() {
        let parsed = RxTile::from_flat(&[0, 8, 0, 16, 0, 4], 6).unwrap();
        assert_eq!(parsed, vec![RxTile::new(0, 8, 0, 16, 0, 4)]);
        assert_eq!(RxTile::from_flat(&[0, 8, 0, 16], 4).unwrap_err().kind(), ErrorKind::DimensionMismatch);
    }
}
