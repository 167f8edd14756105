//! `intuitus`: command-line interface for the Intuitus CNN accelerator.
//!
//! ```text
//! USAGE:
//!   intuitus self-test                 Run the driver self test (root)
//!   intuitus print-network             Dump the driver-side graph (root)
//!   intuitus print-layer <id>          Dump one layer (root)
//!   intuitus abi                       Struct sizes and ioctl numbers
//!   intuitus decode <file> -c -H -w    Decode a float8 output dump
//!   intuitus simulate                  Run a demo network on the virtual driver
//! ```
//!
//! Device commands take `--backend kernel|software|auto` (default kernel).
//! A failed bring-up exits with the driver's error code.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use intuitus_abi::{args, IoctlCommand, BUFFER_CAPACITY, INTERFACE_SIZE};
use intuitus_driver::{
    quant, Accelerator, BackendSelection, ConvLayer, DriverBackend, DriverConfig, LayerKind,
    RxTile, SoftwareBackend, TxTile,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "intuitus", about = "Intuitus CNN accelerator CLI", version)]
struct Cli {
    /// Driver backend for device commands.
    #[arg(long, value_enum, global = true, default_value_t = BackendArg::Kernel)]
    backend: BackendArg,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Auto,
    Kernel,
    Software,
}

impl From<BackendArg> for BackendSelection {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => Self::Auto,
            BackendArg::Kernel => Self::Kernel,
            BackendArg::Software => Self::Software,
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the driver self test.
    SelfTest,
    /// Dump the driver-side network to the driver log.
    PrintNetwork,
    /// Dump one layer to the driver log.
    PrintLayer {
        /// Layer id.
        layer_id: i32,
    },
    /// Print wire struct sizes and ioctl request numbers.
    Abi,
    /// Decode a float8 output dump to f32.
    Decode {
        /// Raw output bytes, channel-major.
        input: PathBuf,
        /// Channels.
        #[arg(short, long)]
        channels: usize,
        /// Height.
        #[arg(short = 'H', long)]
        height: usize,
        /// Width.
        #[arg(short, long)]
        width: usize,
        /// Write the decoded values here as native-endian f32.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Build and run a demo network on the virtual driver.
    Simulate {
        /// Input channels.
        #[arg(long, default_value_t = 3)]
        channels: u32,
        /// Input height and width.
        #[arg(long, default_value_t = 224)]
        size: u32,
        /// Output channels of the 1x1 convolution.
        #[arg(long, default_value_t = 16)]
        out_channels: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::SelfTest => {
            let mut acc = bring_up(cli.backend);
            acc.self_test()?;
            println!("Self test passed ({})", acc.backend().backend_type());
            print_status(&acc);
            acc.close()?;
        }
        Cmd::PrintNetwork => {
            let mut acc = bring_up(cli.backend);
            acc.print_network()?;
            acc.close()?;
        }
        Cmd::PrintLayer { layer_id } => {
            let mut acc = bring_up(cli.backend);
            acc.print_layer(layer_id)?;
            acc.close()?;
        }
        Cmd::Abi => cmd_abi(),
        Cmd::Decode {
            input,
            channels,
            height,
            width,
            out,
        } => cmd_decode(&input, channels, height, width, out.as_ref())?,
        Cmd::Simulate {
            channels,
            size,
            out_channels,
        } => cmd_simulate(channels, size, out_channels)?,
    }

    Ok(())
}

/// Bring the accelerator up or exit with the driver's code
fn bring_up(backend: BackendArg) -> Accelerator<Box<dyn DriverBackend>> {
    match Accelerator::select(backend.into(), DriverConfig::from_env()) {
        Ok(acc) => acc,
        Err(e) => {
            eprintln!("intuitus: bring-up failed: {e}");
            std::process::exit(e.code());
        }
    }
}

fn print_status<B: DriverBackend>(acc: &Accelerator<B>) {
    match acc.interface_status() {
        Ok(status) => println!("Interface status: {status:?}"),
        Err(e) => println!("Interface status: {e}"),
    }
}

fn cmd_abi() {
    use std::mem::size_of;

    println!("Shared interface");
    println!("  buffer capacity  {BUFFER_CAPACITY} bytes");
    println!("  mapping size     {INTERFACE_SIZE} bytes");
    println!();
    println!("Argument structures");
    println!("  tile_idx               {:>3} bytes", size_of::<args::TileIdx>());
    println!("  intuitus_layer_args    {:>3} bytes", size_of::<args::LayerArgs>());
    println!("  intuitus_command_args  {:>3} bytes", size_of::<args::CommandArgs>());
    println!("  intuitus_rx_tile_args  {:>3} bytes", size_of::<args::RxTileArgs>());
    println!("  intuitus_concat_args   {:>3} bytes", size_of::<args::ConcatArgs>());
    println!("  intuitus_split_args    {:>3} bytes", size_of::<args::SplitArgs>());
    println!("  intuitus_opt_args      {:>3} bytes", size_of::<args::OptArgs>());
    println!();
    println!("ioctl requests");
    for cmd in IoctlCommand::ALL {
        let kind = if cmd.is_write() { "_IOW" } else { "_IO " };
        println!("  {:>2}  {kind}  0x{:08x}  {cmd}", cmd.nr(), cmd.request());
    }
}

fn cmd_decode(
    input: &PathBuf,
    channels: usize,
    height: usize,
    width: usize,
    out: Option<&PathBuf>,
) -> Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let map = quant::decode_feature_map(&bytes, channels, height, width)?;

    let (min, max, sum) = map
        .data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY, 0f64), |(lo, hi, s), v| {
            (lo.min(*v), hi.max(*v), s + f64::from(*v))
        });
    #[allow(clippy::cast_precision_loss)]
    let mean = if map.data.is_empty() { 0.0 } else { sum / map.data.len() as f64 };

    println!("{channels}x{height}x{width} feature map ({} values)", map.data.len());
    println!("  min {min:.6}  max {max:.6}  mean {mean:.6}");

    if let Some(path) = out {
        std::fs::write(path, bytemuck::cast_slice::<f32, u8>(&map.data))
            .with_context(|| format!("writing {}", path.display()))?;
        println!("  written to {}", path.display());
    }
    Ok(())
}

fn cmd_simulate(channels: u32, size: u32, out_channels: u32) -> Result<()> {
    let mut acc = Accelerator::with_backend(SoftwareBackend::new(), DriverConfig::from_env());

    // one command stream of four words per input channel
    let commands: Vec<i32> = (0..channels * 4).map(|w| w as i32).collect();
    let lengths = vec![4u32; channels as usize];

    acc.input_layer(channels, size, size)?;
    let plan = acc.conv(&ConvLayer {
        layer_id: 1,
        kind: LayerKind::Conv1x1,
        source_id: 0,
        in_channels: channels,
        out_channels,
        out_height: size,
        out_width: size,
        scattered_lines: 0,
        tx_tiles: &[TxTile::new(0, size, 0, size)],
        rx_tiles: &[RxTile::new(0, size, 0, size, 0, out_channels)],
        commands: &commands,
        command_lengths: &lengths,
    })?;
    acc.output_layer(2, 1)?;

    let frame = vec![0u8; (channels * size * size) as usize];
    let result = acc.execute(&frame, channels, size, size)?;

    let backend = acc.backend();
    println!("Virtual network: Input({channels}x{size}x{size}) -> Conv1x1({out_channels}) -> Output");
    println!("Transactions");
    for cmd in IoctlCommand::ALL {
        let n = backend.count(cmd);
        if n > 0 {
            println!("  {:<20} {n}", cmd.to_string());
        }
    }
    println!(
        "DMA plan: tx scatterlist {}, rx scatterlist {}",
        plan.tx_scatterlist_size, plan.rx_scatterlist_size
    );
    println!(
        "Output: {} bytes in {:?} (execute {:?})",
        result.output_bytes, result.total_duration, result.execution_duration
    );

    let values = quant::decode(&result.output);
    let max = values.iter().copied().fold(0f32, f32::max);
    println!("Decoded {} values, max {max}", values.len());

    acc.close()?;
    Ok(())
}
