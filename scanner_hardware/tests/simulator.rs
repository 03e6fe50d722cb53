use rstest::rstest;
use scanner_hardware::SimulatedScanner;
use scanner_hardware::error::UsbError;
use scanner_traits::Transport;

#[test]
fn scan_bit_and_motor_start_enable_data() {
    let mut sim = SimulatedScanner::new();
    sim.write_registers(&[(0x25, 0x00), (0x26, 0x00), (0x27, 0x20), (0x01, 0x01)])
        .unwrap();
    sim.write_register(0x0f, 0x00).unwrap();
    assert_eq!(sim.read_register(0x40).unwrap() & 0x01, 0x01);
    assert_eq!(sim.read_register(0x41).unwrap() & 0x40, 0, "buffer not empty");
    assert_eq!(sim.read_register(0x4f).unwrap(), 0x20);

    sim.write_register(0x01, 0x00).unwrap();
    assert_eq!(sim.read_register(0x40).unwrap(), 0);
}

#[test]
fn pixel_source_sees_running_offset() {
    let mut sim = SimulatedScanner::new().with_pixel_source(|st, buf| {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = ((st.bulk_bytes_read + i) % 251) as u8;
        }
    });
    let mut first = [0u8; 4];
    let mut second = [0u8; 4];
    sim.bulk_read(0x45, &mut first).unwrap();
    sim.bulk_read(0x45, &mut second).unwrap();
    assert_eq!(first, [0, 1, 2, 3]);
    assert_eq!(second, [4, 5, 6, 7]);
}

#[rstest]
#[case(0x28, &[(0x5b, 0x40), (0x5c, 0x00)], 0x40000)]
#[case(0x28, &[(0x5b, 0x48), (0x5c, 0x00)], 0x48000)]
#[case(0x3c, &[(0x2a, 0x10), (0x2b, 0x00)], 0x100)]
fn bulk_writes_record_ram_address(#[case] port: u8, #[case] addr: &[(u8, u8)], #[case] expected: u32) {
    let mut sim = SimulatedScanner::new();
    sim.write_registers(addr).unwrap();
    sim.bulk_write(port, &[1, 2, 3, 4]).unwrap();
    let w = &sim.bulk_writes()[0];
    assert_eq!(w.port, port);
    assert_eq!(w.ram_address, expected);
    assert_eq!(w.data, vec![1, 2, 3, 4]);
}

#[test]
fn stuck_motor_never_finishes() {
    let mut sim = SimulatedScanner::new();
    sim.with_state(|s| s.motor_stuck = true);
    sim.write_register(0x0f, 0x01).unwrap();
    for _ in 0..10 {
        assert_eq!(sim.read_register(0x41).unwrap() & 0x01, 0x01);
    }
    sim.write_register(0x01, 0x00).unwrap();
    assert_eq!(sim.read_register(0x40).unwrap() & 0x02, 0x02);
}

#[test]
fn rejected_motor_start_is_a_typed_error() {
    let mut sim = SimulatedScanner::new();
    sim.with_state(|s| s.fail_motor_start = true);
    let err = sim.write_register(0x0f, 0x01).unwrap_err();
    assert!(matches!(err.downcast_ref::<UsbError>(), Some(UsbError::Injected(_))));
    assert_eq!(sim.write_count(), 0);
    sim.write_register(0x0f, 0x00).expect("stopping is always accepted");
}

#[test]
fn clearing_line_counter_resets_scan_count() {
    let mut sim = SimulatedScanner::new();
    sim.set_scan_count(0x012345);
    assert_eq!(sim.read_register(0x4d).unwrap(), 0x01);
    assert_eq!(sim.read_register(0x4e).unwrap(), 0x23);
    sim.write_register(0x0d, 0x01).unwrap();
    assert_eq!(sim.read_register(0x4f).unwrap(), 0);
}
