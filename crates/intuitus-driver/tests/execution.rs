//! Execution round trips against the virtual driver

use intuitus_driver::abi::{IoctlCommand, BUFFER_CAPACITY};
use intuitus_driver::{
    quant, Accelerator, ChannelState, ConvLayer, DriverBackend, DriverConfig, ErrorKind,
    IntuitusError, LayerKind, ProxyStatus, RxTile, SharedPhase, SoftwareBackend, TxTile,
};

fn accelerator() -> Accelerator<SoftwareBackend> {
    Accelerator::with_backend(SoftwareBackend::new(), DriverConfig::default())
}

/// Input(3, 224, 224) -> Conv1x1(3 -> 16, one full tile) -> Output
fn build_conv_network(acc: &mut Accelerator<SoftwareBackend>) {
    acc.input_layer(3, 224, 224).unwrap();
    acc.conv(&ConvLayer {
        layer_id: 1,
        kind: LayerKind::Conv1x1,
        source_id: 0,
        in_channels: 3,
        out_channels: 16,
        out_height: 224,
        out_width: 224,
        scattered_lines: 0,
        tx_tiles: &[TxTile::new(0, 224, 0, 224)],
        rx_tiles: &[RxTile::new(0, 224, 0, 224, 0, 16)],
        commands: &[1, 2, 3, 4, 5, 6],
        command_lengths: &[2, 2, 2],
    })
    .unwrap();
    acc.output_layer(2, 1).unwrap();
}

#[test]
fn end_to_end_conv_network() {
    let mut acc = accelerator();
    build_conv_network(&mut acc);
    assert_eq!(acc.output_size(), 16 * 224 * 224);

    let frame = vec![0x42u8; 3 * 224 * 224];
    let result = acc.execute(&frame, 3, 224, 224).unwrap();

    assert_eq!(result.output.len(), 16 * 224 * 224);
    assert_eq!(result.input_bytes, frame.len());
    assert_eq!(result.output_bytes, 16 * 224 * 224);
    assert_eq!(result.output_of(2).unwrap().len(), 16 * 224 * 224);
    assert!(result.total_duration >= result.execution_duration);

    let values = quant::decode(&result.output);
    assert!(values.iter().all(|v| (0.0..=0.9375).contains(v)));

    let map = quant::decode_feature_map(&result.output, 16, 224, 224).unwrap();
    assert_eq!(map.get(0, 0, 1), Some(quant::decode_byte(SoftwareBackend::output_pattern(2, 1))));

    assert_eq!(acc.state(), ChannelState::Ready);
    assert_eq!(acc.shared_phase(), SharedPhase::Idle);
    assert_eq!(acc.interface_status().unwrap(), ProxyStatus::NoError);
    assert_eq!(acc.backend().executions(), 1);
}

#[test]
fn outputs_are_read_behind_the_input() {
    let mut acc = accelerator();
    acc.input_layer(1, 8, 8).unwrap();
    acc.copy(1, 0, 1, 8, 8).unwrap();
    acc.output_layer(2, 1).unwrap();
    acc.upsample(3, 1, 1, 16, 16).unwrap();
    acc.output_layer(4, 3).unwrap();

    let frame = vec![0xffu8; 64];
    let result = acc.execute(&frame, 1, 8, 8).unwrap();
    assert_eq!(result.output.len(), 64 + 256);

    let first = result.output_of(2).unwrap();
    let second = result.output_of(4).unwrap();
    let expected_first: Vec<u8> = (0..64).map(|i| SoftwareBackend::output_pattern(2, i)).collect();
    let expected_second: Vec<u8> = (0..256).map(|i| SoftwareBackend::output_pattern(4, i)).collect();
    assert_eq!(&first[..], &expected_first[..]);
    assert_eq!(&second[..], &expected_second[..]);
}

#[test]
fn execution_can_repeat() {
    let mut acc = accelerator();
    build_conv_network(&mut acc);
    let frame = vec![0u8; 3 * 224 * 224];

    let a = acc.execute(&frame, 3, 224, 224).unwrap();
    let b = acc.execute(&frame, 3, 224, 224).unwrap();
    assert_eq!(a.output, b.output);
    assert_eq!(acc.backend().count(IoctlCommand::NetworkExecute), 2);
}

#[test]
fn oversized_input_fails_before_any_transaction() {
    let mut acc = accelerator();
    let (c, h, w) = (64u32, 256u32, 256u32);
    assert!((c * h * w) as usize > BUFFER_CAPACITY);

    let frame = vec![0u8; (c * h * w) as usize];
    let err = acc.execute(&frame, c, h, w).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MaxMemoryLimitExceeded);
    assert!(acc.backend().transactions().is_empty());
    assert!(acc.backend().interface()[..16].iter().all(|b| *b == 0));
}

#[test]
fn overflowing_dimensions_never_reach_the_driver() {
    let mut acc = accelerator();
    acc.input_layer(1, 1, 1).unwrap();
    let before = acc.backend().transactions().len();

    let err = acc.execute(&[], 1 << 22, 1 << 22, 1 << 20).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MaxMemoryLimitExceeded);
    assert_eq!(acc.backend().transactions().len(), before);
    assert_eq!(acc.backend().count(IoctlCommand::NetworkExecute), 0);
}

#[test]
fn outputs_must_fit_behind_the_input() {
    let mut acc = accelerator();
    // 64x220x220 fills the whole buffer on its own
    assert_eq!(64 * 220 * 220, BUFFER_CAPACITY);
    acc.input_layer(64, 220, 200).unwrap();
    acc.upsample(1, 0, 64, 220, 220).unwrap();
    acc.output_layer(2, 1).unwrap();

    let frame = vec![0u8; 64 * 220 * 200];
    let err = acc.execute(&frame, 64, 220, 200).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MaxMemoryLimitExceeded);
    assert_eq!(acc.backend().count(IoctlCommand::NetworkExecute), 0);
    assert_eq!(acc.shared_phase(), SharedPhase::Idle);
    assert_eq!(acc.state(), ChannelState::Ready);
}

#[test]
fn input_length_must_match_dimensions() {
    let mut acc = accelerator();
    build_conv_network(&mut acc);
    let before = acc.backend().transactions().len();

    let err = acc.execute(&[0u8; 10], 3, 224, 224).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    assert_eq!(acc.backend().transactions().len(), before);
}

#[test]
fn execute_requires_an_input_layer() {
    let mut acc = accelerator();
    let err = acc.execute(&[0u8; 4], 1, 2, 2).unwrap_err();
    assert!(matches!(err, IntuitusError::ProtocolViolation { .. }));
    assert!(acc.backend().transactions().is_empty());
}

#[test]
fn driver_failure_leaves_channel_usable() {
    let mut backend = SoftwareBackend::new();
    backend.inject_fault(IoctlCommand::NetworkExecute, 0, intuitus_driver::abi::codes::DMA);
    let mut acc = Accelerator::with_backend(backend, DriverConfig::default());
    build_conv_network(&mut acc);

    let frame = vec![0u8; 3 * 224 * 224];
    let err = acc.execute(&frame, 3, 224, 224).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Dma);
    assert_eq!(acc.state(), ChannelState::Ready);
    assert_eq!(acc.shared_phase(), SharedPhase::Idle);

    assert!(acc.execute(&frame, 3, 224, 224).is_ok());
}

#[test]
fn commands_can_be_staged_after_execution() {
    let mut acc = accelerator();
    acc.input_layer(1, 4, 4).unwrap();
    acc.copy(1, 0, 1, 4, 4).unwrap();
    acc.output_layer(2, 1).unwrap();
    acc.execute(&[0u8; 16], 1, 4, 4).unwrap();

    acc.conv(&ConvLayer {
        layer_id: 3,
        kind: LayerKind::Residual,
        source_id: 1,
        in_channels: 1,
        out_channels: 1,
        out_height: 4,
        out_width: 4,
        scattered_lines: 0,
        tx_tiles: &[TxTile::new(0, 4, 0, 4)],
        rx_tiles: &[RxTile::new(0, 4, 0, 4, 0, 1)],
        commands: &[9],
        command_lengths: &[1],
    })
    .unwrap();
    assert_eq!(acc.shared_phase(), SharedPhase::Idle);
}

#[test]
fn close_tears_down() {
    let mut acc = accelerator();
    build_conv_network(&mut acc);
    acc.close().unwrap();
}
