//! Software (virtual driver) backend
//!
//! Implements `DriverBackend` in-process: it keeps the layer graph the
//! kernel module would keep, reads command words out of its own shared
//! block exactly where the kernel would, and answers with the driver's
//! negative codes. This enables:
//!
//! 1. **CI without hardware**: the whole graph protocol (validation, ioctl
//!    ordering, shared-block staging, output collection) runs on any host.
//!
//! 2. **Fault injection**: any transaction can be made to fail with any
//!    code, to exercise error propagation through the graph builder.
//!
//! ## What it does not do
//!
//! There is no model of the FPGA pipeline. `NETWORK_EXECUTE` checks the
//! graph and the staged tensor, then writes a deterministic byte pattern for
//! every output layer. The pattern only uses exponent 0 of the float8
//! format, so decoded values lie in `[0, 15/16]`.

use crate::backend::{BackendType, DriverBackend, Request};
use crate::config::DriverConfig;
use crate::error::{IntuitusError, Result};
use crate::shared;
use intuitus_abi::interface::BUFFER_CAPACITY;
use intuitus_abi::{
    codes, CommandArgs, IoctlCommand, LayerArgs, LayerKind, OptArgs, ProxyStatus, RxTileArgs,
    INTERFACE_SIZE,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Driver reply: `Ok` or a negative driver code
type Reply = std::result::Result<(), i32>;

/// One tx command as the driver received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    /// Argument structure
    pub args: CommandArgs,
    /// Command words read from the shared block
    pub words: Vec<i32>,
}

/// Driver-side state of one layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualLayer {
    /// Creation arguments (output layers inherit their source's extent)
    pub args: LayerArgs,
    /// Tx commands, in arrival order
    pub tx_commands: Vec<TxRecord>,
    /// Rx descriptors, in arrival order
    pub rx_tiles: Vec<RxTileArgs>,
    /// Last `LAYER_OPTIMIZE_DMA` hint
    pub dma_hint: Option<OptArgs>,
}

impl VirtualLayer {
    fn new(args: LayerArgs) -> Self {
        Self {
            args,
            tx_commands: Vec::new(),
            rx_tiles: Vec::new(),
            dma_hint: None,
        }
    }

    fn kind(&self) -> Option<LayerKind> {
        self.args.kind()
    }

    fn expected_commands(&self) -> usize {
        self.args.tx_tile_cnt as usize * self.args.ci_cnt as usize
    }

    /// Whether every tx command arrived and the rx list was closed
    pub fn is_complete(&self) -> bool {
        if !self.kind().is_some_and(LayerKind::carries_tiles) {
            return true;
        }
        self.tx_commands.len() == self.expected_commands()
            && self.rx_tiles.last().is_some_and(RxTileArgs::is_last)
    }
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    command: IoctlCommand,
    nth: usize,
    code: i32,
}

/// Software (virtual driver) backend.
pub struct SoftwareBackend {
    interface: Vec<u8>,
    layers: BTreeMap<i32, VirtualLayer>,
    outputs: Vec<i32>,
    log: Vec<IoctlCommand>,
    faults: Vec<Fault>,
    executions: u64,
}

impl std::fmt::Debug for SoftwareBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareBackend")
            .field("layers", &self.layers.len())
            .field("outputs", &self.outputs)
            .field("transactions", &self.log.len())
            .field("executions", &self.executions)
            .finish_non_exhaustive()
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    /// Empty virtual driver with a zeroed shared block
    pub fn new() -> Self {
        Self {
            interface: vec![0u8; INTERFACE_SIZE],
            layers: BTreeMap::new(),
            outputs: Vec::new(),
            log: Vec::new(),
            faults: Vec::new(),
            executions: 0,
        }
    }

    /// Fail the `nth` (0-based) transaction of `command` with `code`
    pub fn inject_fault(&mut self, command: IoctlCommand, nth: usize, code: i32) {
        self.faults.push(Fault { command, nth, code });
    }

    /// Every transaction received, failed ones included
    pub fn transactions(&self) -> &[IoctlCommand] {
        &self.log
    }

    /// Number of transactions of one command
    pub fn count(&self, command: IoctlCommand) -> usize {
        self.log.iter().filter(|c| **c == command).count()
    }

    /// Driver-side state of a layer
    pub fn layer(&self, layer_id: i32) -> Option<&VirtualLayer> {
        self.layers.get(&layer_id)
    }

    /// Output layer ids in declaration order
    pub fn outputs(&self) -> &[i32] {
        &self.outputs
    }

    /// Completed `NETWORK_EXECUTE` calls
    pub const fn executions(&self) -> u64 {
        self.executions
    }

    /// Byte pattern written for output `layer_id`
    #[allow(clippy::cast_possible_truncation)]
    pub fn output_pattern(layer_id: i32, index: usize) -> u8 {
        // Low nibble only: mantissa with exponent 0
        ((layer_id.unsigned_abs() as usize).wrapping_mul(7).wrapping_add(index) % 16) as u8
    }

    fn injected(&self, command: IoctlCommand) -> Option<i32> {
        let seen = self.count(command);
        self.faults
            .iter()
            .find(|f| f.command == command && f.nth + 1 == seen)
            .map(|f| f.code)
    }

    fn source_exists(&self, src: i32) -> bool {
        if src == 0 {
            !self.layers.is_empty()
        } else {
            self.layers.contains_key(&src)
        }
    }

    fn insert(&mut self, args: LayerArgs) -> Reply {
        if self.layers.contains_key(&args.layer_id) {
            debug!("Layer {} already exists", args.layer_id);
            return Err(codes::OTHER);
        }
        self.layers.insert(args.layer_id, VirtualLayer::new(args));
        Ok(())
    }

    fn layer_mut(&mut self, layer_id: i32) -> std::result::Result<&mut VirtualLayer, i32> {
        self.layers.get_mut(&layer_id).ok_or(codes::OTHER)
    }

    fn input_layer(&mut self, args: &LayerArgs) -> Reply {
        if args.layer_id != 0 || args.kind() != Some(LayerKind::Input) {
            return Err(codes::OTHER);
        }
        self.insert(*args)
    }

    fn output_layer(&mut self, args: &LayerArgs) -> Reply {
        if !self.source_exists(args.src_buffer_id) {
            return Err(codes::OTHER);
        }
        let source = self
            .layers
            .get(&args.src_buffer_id)
            .or_else(|| self.layers.values().next_back())
            .ok_or(codes::OTHER)?;

        let mut declared = *args;
        declared.co_cnt = source.args.co_cnt;
        declared.dst_height = source.args.dst_height;
        declared.dst_length = source.args.dst_length;

        self.insert(declared)?;
        self.outputs.push(declared.layer_id);

        shared::set_dims(
            &mut self.interface,
            shared::Dims {
                length: declared.dst_length,
                height: declared.dst_height,
                depth: declared.co_cnt,
            },
        );
        Ok(())
    }

    fn layer_create(&mut self, args: &LayerArgs) -> Reply {
        match args.kind() {
            None | Some(LayerKind::Input | LayerKind::Output) => return Err(codes::OTHER),
            Some(_) => {}
        }
        if !self.source_exists(args.src_buffer_id) {
            debug!("Source {} of layer {} unknown", args.src_buffer_id, args.layer_id);
            return Err(codes::OTHER);
        }
        self.insert(*args)
    }

    fn add_tx_command(&mut self, args: &CommandArgs) -> Reply {
        let length = shared::dims(&self.interface).length as usize;
        if length > BUFFER_CAPACITY {
            return Err(codes::MAX_MEMORY_LIMIT);
        }
        if length % 4 != 0 {
            return Err(codes::DIMENSION_MISMATCH);
        }
        let words: Vec<i32> = self.interface[..length]
            .chunks_exact(4)
            .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let layer = self.layer_mut(args.layer_id)?;
        if !layer.kind().is_some_and(LayerKind::carries_tiles) {
            return Err(codes::OTHER);
        }
        if layer.tx_commands.len() >= layer.expected_commands() {
            return Err(codes::DIMENSION_MISMATCH);
        }
        if usize::try_from(args.command_id).ok() != Some(layer.tx_commands.len()) {
            return Err(codes::OTHER);
        }
        layer.tx_commands.push(TxRecord { args: *args, words });
        Ok(())
    }

    fn add_rx_tile(&mut self, args: &RxTileArgs) -> Reply {
        let layer = self.layer_mut(args.layer_id)?;
        if !layer.kind().is_some_and(LayerKind::carries_tiles) {
            return Err(codes::OTHER);
        }
        if u32::try_from(args.channel_idx).map_or(true, |c| c >= layer.args.co_cnt) {
            return Err(codes::DIMENSION_MISMATCH);
        }
        if usize::try_from(args.tile_id).ok() != Some(layer.rx_tiles.len()) {
            return Err(codes::OTHER);
        }
        layer.rx_tiles.push(*args);
        Ok(())
    }

    fn concat(&mut self, concat_id: i32, a: i32, b: i32) -> Reply {
        let first = self.layers.get(&a).ok_or(codes::OTHER)?.args;
        let second = self.layers.get(&b).ok_or(codes::OTHER)?.args;
        if first.dst_height != second.dst_height || first.dst_length != second.dst_length {
            return Err(codes::DIMENSION_MISMATCH);
        }
        let mut args = LayerArgs::new(LayerKind::Concat, concat_id, a);
        args.ci_cnt = first
            .co_cnt
            .checked_add(second.co_cnt)
            .ok_or(codes::DIMENSION_MISMATCH)?;
        args.co_cnt = args.ci_cnt;
        args.dst_height = first.dst_height;
        args.dst_length = first.dst_length;
        self.insert(args)
    }

    fn split(&mut self, split_id: i32, in_id: i32, groups: i32) -> Reply {
        let source = self.layers.get(&in_id).ok_or(codes::OTHER)?.args;
        let parts = u32::try_from(groups).map_err(|_| codes::DIMENSION_MISMATCH)?;
        if parts == 0 || source.co_cnt % parts != 0 {
            return Err(codes::DIMENSION_MISMATCH);
        }
        if (split_id..split_id.saturating_add(groups)).any(|id| self.layers.contains_key(&id)) {
            return Err(codes::OTHER);
        }
        for id in split_id..split_id.saturating_add(groups) {
            let mut args = LayerArgs::new(LayerKind::Split, id, in_id);
            args.ci_cnt = source.co_cnt / parts;
            args.co_cnt = args.ci_cnt;
            args.dst_height = source.dst_height;
            args.dst_length = source.dst_length;
            self.insert(args)?;
        }
        Ok(())
    }

    fn execute_network(&mut self) -> Reply {
        let input = self.layers.get(&0).ok_or(codes::OTHER)?.args;

        let input_extent = input.output_extent().ok_or(codes::MAX_MEMORY_LIMIT)?;
        let staged = shared::dims(&self.interface);
        if staged.extent() != Some(input_extent) {
            debug!("Staged tensor {staged:?} does not match input layer ({input_extent} bytes)");
            return Err(codes::DIMENSION_MISMATCH);
        }

        if let Some((id, _)) = self.layers.iter().find(|(_, l)| !l.is_complete()) {
            debug!("Layer {id} incomplete at execution");
            return Err(codes::DIMENSION_MISMATCH);
        }

        let mut offset = input_extent;
        for id in &self.outputs {
            let extent = match self.layers.get(id) {
                Some(layer) => layer.args.output_extent().ok_or(codes::MAX_MEMORY_LIMIT)?,
                None => 0,
            };
            let end = offset.checked_add(extent).ok_or(codes::MAX_MEMORY_LIMIT)?;
            if end > BUFFER_CAPACITY {
                shared::set_status(&mut self.interface, ProxyStatus::Error);
                return Err(codes::MAX_MEMORY_LIMIT);
            }
            for (i, byte) in self.interface[offset..end].iter_mut().enumerate() {
                *byte = Self::output_pattern(*id, i);
            }
            offset = end;
        }

        shared::set_status(&mut self.interface, ProxyStatus::NoError);
        self.executions += 1;
        Ok(())
    }

    fn print_network(&self) {
        info!("Virtual network: {} layers, outputs {:?}", self.layers.len(), self.outputs);
        for layer in self.layers.values() {
            self.print_layer_state(layer);
        }
    }

    #[allow(clippy::unused_self)]
    fn print_layer_state(&self, layer: &VirtualLayer) {
        let a = &layer.args;
        info!(
            "  layer {:>3} {:<16} src {:>3}  ci {:>4} co {:>4}  {}x{}  tx {}/{} rx {}",
            a.layer_id,
            a.kind().map_or_else(|| format!("?{}", a.layer_type), |k| k.to_string()),
            a.src_buffer_id,
            a.ci_cnt,
            a.co_cnt,
            a.dst_height,
            a.dst_length,
            layer.tx_commands.len(),
            layer.expected_commands(),
            layer.rx_tiles.len(),
        );
    }

    fn dispatch(&mut self, request: &Request) -> Reply {
        match request {
            Request::InputLayer(args) => self.input_layer(args),
            Request::OutputLayer(args) => self.output_layer(args),
            Request::LayerCreate(args) => self.layer_create(args),
            Request::AddTxCommand(args) => self.add_tx_command(args),
            Request::AddRxTile(args) => self.add_rx_tile(args),
            Request::Concat(args) => {
                self.concat(args.concat_layer_id, args.layer1_id, args.layer2_id)
            }
            Request::Split(args) => self.split(args.split_layer_id, args.in_layer_id, args.groups),
            Request::OptimizeDma(args) => {
                self.layer_mut(args.layer_id)?.dma_hint = Some(*args);
                Ok(())
            }
            Request::ExecuteNetwork => self.execute_network(),
            Request::PrintNetwork => {
                self.print_network();
                Ok(())
            }
            Request::PrintLayer(layer_id) => {
                let layer = self.layers.get(layer_id).ok_or(codes::OTHER)?;
                self.print_layer_state(layer);
                Ok(())
            }
            Request::SelfTest => {
                info!("Virtual driver self test passed");
                Ok(())
            }
        }
    }
}

impl DriverBackend for SoftwareBackend {
    fn init(_config: &DriverConfig) -> Result<Self> {
        info!("Initializing virtual driver backend");
        Ok(Self::new())
    }

    fn transact(&mut self, request: &mut Request) -> Result<()> {
        let command = request.command();
        self.log.push(command);

        if let Some(code) = self.injected(command) {
            debug!("Injected fault on {command}: {code}");
            return Err(IntuitusError::driver(command, code));
        }

        self.dispatch(request)
            .map_err(|code| IntuitusError::driver(command, code))
    }

    fn interface(&self) -> &[u8] {
        &self.interface
    }

    fn interface_mut(&mut self) -> &mut [u8] {
        &mut self.interface
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }
}
