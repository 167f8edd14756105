//! Tile command encoder
//!
//! A tiled layer carries one command stream per (tx tile, input channel).
//! Callers hand over all streams of a layer as one flat word array plus one
//! length per stream, tile-major:
//!
//! ```text
//! lengths:  [t0c0, t0c1, ..., t0c(ci-1), t1c0, ...]
//! commands: [ words of t0c0 | words of t0c1 | ... ]
//! ```
//!
//! [`split_commands`] checks that the arrays agree and cuts the flat array
//! into [`CommandBlock`]s. Each block is then staged in the shared block and
//! sent with one `LAYER_ADD_TX_COM`.

use crate::accelerator::Accelerator;
use crate::backend::{DriverBackend, Request};
use crate::error::{IntuitusError, Result};
use crate::shared::{self, SharedPhase};
use intuitus_abi::interface::BUFFER_CAPACITY;
use intuitus_abi::{CommandArgs, TileIdx};

/// Fields per row of a flat tx tile array (`y0, y1, x0, x1`)
pub const TX_TILE_WIDTH: usize = 4;

/// Source tile of a tiled layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxTile {
    /// Rectangle fetched from the source buffer
    pub tile: TileIdx,
}

impl TxTile {
    /// Tile from `(y0, y1, x0, x1)`
    #[must_use]
    pub const fn new(y0: u32, y1: u32, x0: u32, x1: u32) -> Self {
        Self {
            tile: TileIdx::from_rows(y0, y1, x0, x1),
        }
    }

    /// Parse a flat tile array with `width` fields per row
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` unless `width` is 4 and `flat` holds a
    /// whole number of rows.
    pub fn from_flat(flat: &[u32], width: usize) -> Result<Vec<Self>> {
        if width != TX_TILE_WIDTH {
            return Err(IntuitusError::dimension_mismatch(format!(
                "tx tile array has {width} fields per tile, expected {TX_TILE_WIDTH}"
            )));
        }
        if flat.len() % width != 0 {
            return Err(IntuitusError::dimension_mismatch(format!(
                "tx tile array of {} values is not a multiple of {width}",
                flat.len()
            )));
        }
        Ok(flat
            .chunks_exact(width)
            .map(|r| Self::new(r[0], r[1], r[2], r[3]))
            .collect())
    }
}

/// One (tile, channel) command stream of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBlock<'a> {
    /// Position of the tile in the tx tile list
    pub tile_index: usize,
    /// Tile the commands fetch
    pub tile: TileIdx,
    /// Input channel
    pub channel: u32,
    /// `tile_index * input_channels + channel`
    pub command_id: i32,
    /// Command words
    pub words: &'a [i32],
}

/// Validate the command arrays of a layer and cut them into blocks
///
/// Nothing is sent; a failure here leaves no driver state behind.
///
/// # Errors
///
/// - `NullParameter` if there are no tx tiles
/// - `DimensionMismatch` if a tile is empty, if the number of lengths is
///   not `tiles * in_channels`, or if the lengths do not sum to
///   `commands.len()`
/// - `MaxMemoryLimitExceeded` if one block does not fit the shared buffer
pub fn split_commands<'a>(
    tx_tiles: &[TxTile],
    in_channels: u32,
    commands: &'a [i32],
    lengths: &[u32],
) -> Result<Vec<CommandBlock<'a>>> {
    if tx_tiles.is_empty() {
        return Err(IntuitusError::NullParameter { name: "tx_tiles" });
    }
    if let Some((k, t)) = tx_tiles.iter().enumerate().find(|(_, t)| !t.tile.is_non_empty()) {
        return Err(IntuitusError::dimension_mismatch(format!(
            "tx tile {k} is empty: {:?}",
            t.tile
        )));
    }

    let channels = in_channels as usize;
    let expected = tx_tiles.len() * channels;
    if lengths.len() != expected {
        return Err(IntuitusError::dimension_mismatch(format!(
            "got {} command blocks, expected {} tiles times {in_channels} channels",
            lengths.len(),
            tx_tiles.len()
        )));
    }

    let total: u64 = lengths.iter().map(|l| u64::from(*l)).sum();
    if total != commands.len() as u64 {
        return Err(IntuitusError::dimension_mismatch(format!(
            "command block length {} does not match sum of command lengths {total}",
            commands.len()
        )));
    }

    let mut blocks = Vec::with_capacity(expected);
    let mut pos = 0usize;
    for (k, tile) in tx_tiles.iter().enumerate() {
        for j in 0..in_channels {
            let index = k * channels + j as usize;
            let len = lengths[index] as usize;
            let bytes = len * std::mem::size_of::<i32>();
            if bytes > BUFFER_CAPACITY {
                return Err(IntuitusError::MaxMemoryLimitExceeded {
                    what: "command block",
                    requested: bytes,
                    capacity: BUFFER_CAPACITY,
                });
            }
            let command_id = i32::try_from(index).map_err(|_| {
                IntuitusError::dimension_mismatch(format!("command id {index} out of range"))
            })?;

            blocks.push(CommandBlock {
                tile_index: k,
                tile: tile.tile,
                channel: j,
                command_id,
                words: &commands[pos..pos + len],
            });
            pos += len;
        }
    }
    Ok(blocks)
}

impl<B: DriverBackend> Accelerator<B> {
    /// Stage one command stream in the shared block and send it
    ///
    /// # Errors
    ///
    /// Returns `MaxMemoryLimitExceeded` if the words do not fit the shared
    /// buffer (nothing is sent), `ProtocolViolation` if the block is busy
    /// with a tensor, or the driver's code if `LAYER_ADD_TX_COM` fails.
    pub fn encode_and_send(
        &mut self,
        tile: TileIdx,
        words: &[i32],
        channel: u32,
        command_id: i32,
        layer_id: i32,
    ) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(words);
        if bytes.len() > BUFFER_CAPACITY {
            return Err(IntuitusError::MaxMemoryLimitExceeded {
                what: "command block",
                requested: bytes.len(),
                capacity: BUFFER_CAPACITY,
            });
        }
        let channel_idx = i32::try_from(channel)
            .map_err(|_| IntuitusError::dimension_mismatch(format!("channel {channel} out of range")))?;

        self.phase.advance(SharedPhase::CommandStaging)?;
        let sent = self.send_staged_command(bytes, CommandArgs {
            layer_id,
            src_tile: tile,
            channel_idx,
            command_id,
        });
        self.phase.reset();
        sent
    }

    fn send_staged_command(&mut self, bytes: &[u8], args: CommandArgs) -> Result<()> {
        let region = self.backend.interface_mut();
        shared::write_payload(region, 0, bytes, "command block")?;
        // bounded by BUFFER_CAPACITY above
        #[allow(clippy::cast_possible_truncation)]
        shared::set_length(region, bytes.len() as u32);

        tracing::trace!(
            "tx command {} of layer {}: {} words, channel {}",
            args.command_id,
            args.layer_id,
            bytes.len() / 4,
            args.channel_idx
        );
        self.transact(&mut Request::AddTxCommand(args))
    }
}
