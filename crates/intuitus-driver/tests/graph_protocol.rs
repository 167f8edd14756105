//! Graph protocol tests against the virtual driver
//!
//! Every builder call must issue exactly the transactions the driver expects
//! and nothing at all when the layer is malformed.

use intuitus_driver::abi::{codes, IoctlCommand};
use intuitus_driver::{
    Accelerator, ConvLayer, DriverConfig, ErrorKind, IntuitusError, LayerKind, RxTile,
    SoftwareBackend, TxTile,
};

fn accelerator() -> Accelerator<SoftwareBackend> {
    Accelerator::with_backend(SoftwareBackend::new(), DriverConfig::default())
}

const TX: [TxTile; 2] = [TxTile::new(0, 9, 0, 16), TxTile::new(7, 16, 0, 16)];
const RX: [RxTile; 2] = [RxTile::new(0, 8, 0, 16, 0, 4), RxTile::new(8, 16, 0, 16, 0, 4)];

fn two_tile_conv<'a>(commands: &'a [i32], lengths: &'a [u32]) -> ConvLayer<'a> {
    ConvLayer {
        layer_id: 1,
        kind: LayerKind::Conv3x3,
        source_id: 0,
        in_channels: 2,
        out_channels: 4,
        out_height: 16,
        out_width: 16,
        scattered_lines: 0,
        tx_tiles: &TX,
        rx_tiles: &RX,
        commands,
        command_lengths: lengths,
    }
}

#[test]
fn conv_layer_transaction_sequence() {
    let mut acc = accelerator();
    acc.input_layer(2, 16, 16).unwrap();

    let commands: Vec<i32> = (100..110).collect();
    let plan = acc.conv(&two_tile_conv(&commands, &[1, 2, 3, 4])).unwrap();

    let log = acc.backend().transactions();
    assert_eq!(log[0], IoctlCommand::InputLayer);
    assert_eq!(log[1], IoctlCommand::LayerCreate);
    assert!(log[2..6].iter().all(|c| *c == IoctlCommand::LayerAddTxCommand));
    assert!(log[6..].iter().all(|c| *c == IoctlCommand::LayerAddRxTile));
    assert_eq!(log.len(), 6 + 8);
    assert_eq!(acc.backend().count(IoctlCommand::LayerOptimizeDma), 0);

    let layer = acc.backend().layer(1).unwrap();
    assert!(layer.is_complete());

    // Command ids follow tile * in_channels + channel, words arrive intact
    let tx: Vec<_> = layer
        .tx_commands
        .iter()
        .map(|t| (t.args.command_id, t.args.channel_idx, t.words.clone()))
        .collect();
    assert_eq!(
        tx,
        vec![
            (0, 0, vec![100]),
            (1, 1, vec![101, 102]),
            (2, 0, vec![103, 104, 105]),
            (3, 1, vec![106, 107, 108, 109]),
        ]
    );
    assert_eq!(layer.tx_commands[2].args.src_tile, TX[1].tile);

    // (9 + 1) * 2 + (9 + 1) * 2 tx rows, 8 rows per rx descriptor
    assert_eq!(plan.tx_scatterlist_size, 40);
    assert_eq!(plan.rx_scatterlist_size, 64);
}

#[test]
fn terminal_flag_marks_the_end_of_the_layer() {
    let mut acc = accelerator();
    acc.input_layer(2, 16, 16).unwrap();

    let commands = [0i32; 4];
    acc.conv(&two_tile_conv(&commands, &[1, 1, 1, 1])).unwrap();

    let rx = &acc.backend().layer(1).unwrap().rx_tiles;
    let ids: Vec<i32> = rx.iter().map(|r| r.tile_id).collect();
    assert_eq!(ids, (0..8).collect::<Vec<_>>());

    let flags: Vec<bool> = rx.iter().map(|r| r.is_last()).collect();
    assert_eq!(flags, [false, false, false, false, true, true, true, true]);
}

#[test]
fn length_mismatch_issues_no_transaction() {
    let mut acc = accelerator();
    acc.input_layer(2, 16, 16).unwrap();
    let before = acc.backend().transactions().len();

    let commands = [0i32; 9];
    let err = acc.conv(&two_tile_conv(&commands, &[2, 2, 2, 2])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    assert!(matches!(err, IntuitusError::Layer { layer_id: 1, .. }));
    assert_eq!(acc.backend().transactions().len(), before);
    assert!(acc.backend().layer(1).is_none());
}

#[test]
fn block_count_mismatch_issues_no_transaction() {
    let mut acc = accelerator();
    acc.input_layer(2, 16, 16).unwrap();
    let before = acc.backend().transactions().len();

    let commands = [0i32; 3];
    let err = acc.conv(&two_tile_conv(&commands, &[1, 1, 1])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    assert_eq!(acc.backend().transactions().len(), before);
}

#[test]
fn flat_tile_arrays_with_wrong_width_are_rejected() {
    let err = RxTile::from_flat(&[0, 8, 0, 16, 0, 4, 0, 0], 8).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    let err = TxTile::from_flat(&[0, 8, 0, 16, 0, 4], 6).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}

#[test]
fn output_accumulator_follows_declared_extents() {
    let mut acc = accelerator();
    acc.input_layer(0, 0, 0).unwrap();
    acc.upsample(1, 0, 3, 64, 64).unwrap();
    assert_eq!(acc.output_layer(2, 1).unwrap(), 12288);
    assert_eq!(acc.output_size(), 3 * 64 * 64);

    acc.maxpool2d(3, 1, 3, 32, 32, 2).unwrap();
    acc.output_layer(4, 3).unwrap();

    let extents: Vec<_> = acc.output_extents().iter().map(|e| (e.layer_id, e.offset, e.bytes)).collect();
    assert_eq!(extents, vec![(2, 0, 12288), (4, 12288, 3072)]);
    assert_eq!(acc.output_size(), 12288 + 3072);
}

#[test]
fn driver_failure_names_layer_tile_and_channel() {
    let mut backend = SoftwareBackend::new();
    // third tx command: tile 1, channel 0
    backend.inject_fault(IoctlCommand::LayerAddTxCommand, 2, codes::DMA);
    let mut acc = Accelerator::with_backend(backend, DriverConfig::default());
    acc.input_layer(2, 16, 16).unwrap();

    let commands = [0i32; 4];
    let err = acc.conv(&two_tile_conv(&commands, &[1, 1, 1, 1])).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Dma);
    assert_eq!(err.code(), codes::DMA);
    match &err {
        IntuitusError::Layer { layer_id, tile, channel, .. } => {
            assert_eq!((*layer_id, *tile, *channel), (1, Some(1), Some(0)));
        }
        other => panic!("unexpected error {other:?}"),
    }
    // fail fast: nothing after the failing command
    assert_eq!(acc.backend().count(IoctlCommand::LayerAddTxCommand), 3);
    assert_eq!(acc.backend().count(IoctlCommand::LayerAddRxTile), 0);
}

#[test]
fn unknown_driver_code_is_surfaced_verbatim() {
    let mut backend = SoftwareBackend::new();
    backend.inject_fault(IoctlCommand::LayerConcat, 0, -22);
    let mut acc = Accelerator::with_backend(backend, DriverConfig::default());
    acc.input_layer(1, 4, 4).unwrap();
    acc.copy(1, 0, 1, 4, 4).unwrap();

    let err = acc.concat(2, 0, 1).unwrap_err();
    assert_eq!(err.code(), -22);
    assert_eq!(err.kind(), ErrorKind::Other);
}

#[test]
fn unknown_source_is_reported_by_the_driver() {
    let mut acc = accelerator();
    acc.input_layer(1, 4, 4).unwrap();
    let err = acc.copy(1, 7, 1, 4, 4).unwrap_err();
    assert_eq!(err.code(), codes::OTHER);
}

#[test]
fn overflowing_input_layer_is_rejected_locally() {
    let mut acc = accelerator();
    let err = acc.input_layer(1 << 22, 1 << 22, 1 << 20).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MaxMemoryLimitExceeded);
    assert!(acc.backend().transactions().is_empty());
    assert!(acc.input_geometry().is_none());
}

#[test]
fn overflowing_declared_output_extent_is_rejected() {
    let mut acc = accelerator();
    acc.input_layer(1, 4, 4).unwrap();
    acc.upsample(1, 0, 1 << 22, 1 << 22, 1 << 20).unwrap();

    let err = acc.output_layer(2, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MaxMemoryLimitExceeded);
    assert!(matches!(err, IntuitusError::Layer { layer_id: 2, .. }));
    assert_eq!(acc.output_size(), 0);
    assert!(acc.output_extents().is_empty());
}
