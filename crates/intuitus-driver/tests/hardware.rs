//! Hardware tests
//!
//! Need root, the `intuitus` kernel module and the FPGA bitstream loaded.
//! Run with `cargo test -- --ignored` on the board.

use intuitus_driver::{
    select_backend, Accelerator, BackendSelection, BackendType, DriverBackend, DriverConfig,
};

#[test]
#[ignore] // Requires hardware
fn test_kernel_backend_bring_up() {
    let backend = select_backend(BackendSelection::Kernel, &DriverConfig::from_env())
        .expect("Kernel backend init");
    assert_eq!(backend.backend_type(), BackendType::Kernel);
    assert_eq!(backend.interface().len(), intuitus_driver::abi::INTERFACE_SIZE);
}

#[test]
#[ignore] // Requires hardware
fn test_self_test() {
    let mut acc = Accelerator::open(DriverConfig::from_env()).expect("bring-up");
    acc.self_test().expect("self test");
    println!("Interface status: {:?}", acc.interface_status());
    acc.close().expect("teardown");
}

#[test]
#[ignore] // Requires hardware
fn test_print_empty_network() {
    let mut acc = Accelerator::open(DriverConfig::from_env()).expect("bring-up");
    acc.print_network().expect("print network");
}

#[test]
#[ignore] // Requires hardware
fn test_auto_selection_prefers_kernel() {
    let acc = Accelerator::select(BackendSelection::Auto, DriverConfig::from_env())
        .expect("Auto backend");
    println!("Selected backend: {}", acc.backend().backend_type());
}
