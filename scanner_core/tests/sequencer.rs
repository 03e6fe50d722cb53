use std::sync::Arc;

use rstest::{fixture, rstest};
use scanner_core::config::EngineCfg;
use scanner_core::device::ByteCounters;
use scanner_core::gl843::{REG01, REG0B, REG0E};
use scanner_core::mocks::{FailingTransport, ManualClock, demo_model};
use scanner_core::sequencer::{
    begin_scan, boot, detect_document_end, end_scan, feed, init_regs_for_scan, slow_back_home,
    stop_action,
};
use scanner_core::{CommandSet, Device, Gl843, ScanError, ScanMode, ScanParams, ScannerState};
use scanner_hardware::SimulatedScanner;
use scanner_traits::LinkSpeed;

struct Rig {
    sim: SimulatedScanner,
    clock: Arc<ManualClock>,
    dev: Device<SimulatedScanner>,
}

fn rig_for(model: scanner_core::ModelDescriptor) -> Rig {
    let sim = SimulatedScanner::new();
    let clock = Arc::new(ManualClock::new());
    let mut dev = Device::with_clock(sim.clone(), model, EngineCfg::default(), clock.clone());
    boot(&mut dev, false).expect("warm boot");
    Rig { sim, clock, dev }
}

#[fixture]
fn rig() -> Rig {
    rig_for(demo_model())
}

fn last_writes(sim: &SimulatedScanner, n: usize) -> Vec<(u8, u8)> {
    sim.with_state(|s| s.write_log[s.write_log.len() - n..].to_vec())
}

#[test]
fn cold_boot_pulses_reset_and_enables_dram_on_an_edge() {
    let sim = SimulatedScanner::new();
    sim.with_state(|s| s.link_speed = LinkSpeed::Full);
    let mut dev = Device::with_clock(
        sim.clone(),
        demo_model(),
        EngineCfg::default(),
        Arc::new(ManualClock::new()),
    );
    boot(&mut dev, true).unwrap();

    let log = sim.with_state(|s| s.write_log.clone());
    assert_eq!(&log[..2], &[(REG0E, 0x01), (REG0E, 0x00)]);
    let ram: Vec<u8> = log.iter().filter(|(a, _)| *a == REG0B).map(|&(_, v)| v).collect();
    assert_eq!(ram, vec![0x62, 0x6a]);
    assert_eq!(dev.state, ScannerState::Idle);
    assert_eq!(dev.bulk_chunk, 0x1000);
    assert_eq!(dev.head_pos, 300);
    // gpio idle values land in the register file
    assert_eq!(sim.reg(0xa7), 0x04);
    // frontend programmed from the model
    assert_eq!(sim.fe_reg(0x28), 0x80);
}

#[test]
fn failed_boot_leaves_device_powered_off() {
    let mut dev = Device::with_clock(
        FailingTransport,
        demo_model(),
        EngineCfg::default(),
        Arc::new(ManualClock::new()),
    );
    let err = boot(&mut dev, true).unwrap_err();
    assert!(matches!(err, ScanError::Transport(_)));
    assert_eq!(dev.state, ScannerState::PoweredOff);
}

#[test]
fn operations_before_boot_are_rejected() {
    let mut dev = Device::new(SimulatedScanner::new(), demo_model(), EngineCfg::default());
    assert!(matches!(feed(&mut dev, 10), Err(ScanError::InvalidState(_))));
    assert!(matches!(slow_back_home(&mut dev, true), Err(ScanError::InvalidState(_))));
}

#[rstest]
fn stop_twice_writes_at_most_once(rig: Rig) {
    let Rig { sim, mut dev, .. } = rig;
    sim.with_state(|s| s.data_enabled = true);
    let before = sim.write_count();
    stop_action(&mut dev).unwrap();
    stop_action(&mut dev).unwrap();
    assert!(sim.write_count() - before <= 1);
    assert_eq!(sim.reg(REG01) & 0x01, 0);
}

#[rstest]
fn stop_on_idle_device_writes_nothing(rig: Rig) {
    let Rig { sim, mut dev, .. } = rig;
    let before = sim.write_count();
    stop_action(&mut dev).unwrap();
    assert_eq!(sim.write_count(), before);
}

#[rstest]
fn feed_advances_head_position(rig: Rig) {
    let Rig { sim, mut dev, .. } = rig;
    feed(&mut dev, 500).unwrap();
    assert_eq!(dev.head_pos, 500);
    assert!(!sim.with_state(|s| s.at_home));
}

#[rstest]
fn stuck_feed_times_out(rig: Rig) {
    let Rig { sim, clock, mut dev } = rig;
    sim.with_state(|s| s.motor_stuck = true);
    let err = feed(&mut dev, 500).unwrap_err();
    assert_eq!(err, ScanError::Timeout("feed"));
    assert!(clock.elapsed().as_secs() <= 31);
    assert_eq!(dev.head_pos, 0);
}

#[rstest]
fn home_from_away_reaches_sensor(rig: Rig) {
    let Rig { sim, mut dev, .. } = rig;
    feed(&mut dev, 200).unwrap();
    slow_back_home(&mut dev, true).unwrap();
    assert_eq!(dev.head_pos, 0);
    assert!(sim.with_state(|s| s.at_home));
    // reverse and auto-home bits were programmed for the move
    assert_eq!(sim.reg(0x02) & 0x24, 0x24);
}

#[rstest]
fn stuck_home_times_out_and_stops_motor(rig: Rig) {
    let Rig { sim, mut dev, .. } = rig;
    sim.with_state(|s| {
        s.at_home = false;
        s.motor_stuck = true;
    });
    let err = slow_back_home(&mut dev, true).unwrap_err();
    assert_eq!(err, ScanError::Timeout("home sensor"));
    assert_eq!(sim.reg(REG01) & 0x01, 0);
}

#[rstest]
fn failed_motor_start_restores_known_good_registers(rig: Rig) {
    let Rig { sim, mut dev, .. } = rig;
    sim.with_state(|s| s.fail_motor_start = true);
    let err = feed(&mut dev, 100).unwrap_err();
    assert!(matches!(&err, ScanError::Transport(m) if m.contains("motor start")), "{err}");

    let snapshot = dev.reg.to_pairs();
    assert_eq!(last_writes(&sim, snapshot.len()), snapshot);
    assert_eq!(dev.state, ScannerState::Idle);
}

#[rstest]
fn scan_start_and_end_track_state(rig: Rig) {
    let Rig { sim, mut dev, .. } = rig;
    let params = ScanParams {
        pixels: 100,
        lines: 10,
        ..ScanParams::default()
    };
    init_regs_for_scan(&mut dev, &params).unwrap();
    begin_scan(&mut dev, true).unwrap();
    assert_eq!(dev.state, ScannerState::Scanning);
    assert!(sim.with_state(|s| s.data_enabled));
    end_scan(&mut dev).unwrap();
    assert_eq!(dev.state, ScannerState::Idle);
    assert!(!sim.with_state(|s| s.data_enabled));
}

#[rstest]
fn gamma_tables_are_uploaded_for_eight_bit_scans(rig: Rig) {
    let Rig { sim, mut dev, .. } = rig;
    let params = ScanParams {
        pixels: 100,
        lines: 10,
        ..ScanParams::default()
    };
    init_regs_for_scan(&mut dev, &params).unwrap();
    let gamma = sim
        .bulk_writes()
        .into_iter()
        .find(|w| w.port == 0x28 && w.ram_address == 0)
        .expect("gamma upload");
    assert_eq!(gamma.data.len(), 3 * 256 * 2);
}

#[test]
fn paper_leaving_trims_transfer_budgets() {
    let mut model = demo_model();
    model.is_sheetfed = true;
    let Rig { sim, mut dev, .. } = rig_for(model);

    let params = ScanParams {
        pixels: 100,
        lines: 100,
        channels: 1,
        mode: ScanMode::Gray,
        ..ScanParams::default()
    };
    let session = init_regs_for_scan(&mut dev, &params).unwrap();
    let read_total = session.layout.read_bytes_total;
    assert_eq!(dev.counters.total_bytes_to_read, 100 * 100);

    dev.document = true;
    sim.set_paper_present(false);
    sim.set_scan_count(20);
    detect_document_end(&mut dev).unwrap();

    assert!(!dev.document);
    // 20 lines scanned, none delivered, no post-scan margin: 80 lines cut
    assert_eq!(
        dev.counters,
        ByteCounters {
            total_bytes_read: 0,
            total_bytes_to_read: 20 * 100,
            read_bytes_left: read_total - 80 * 100,
        }
    );
}

#[test]
fn paper_still_present_changes_nothing() {
    let mut model = demo_model();
    model.is_sheetfed = true;
    let Rig { sim, mut dev, .. } = rig_for(model);
    dev.document = true;
    sim.set_paper_present(true);
    let before = dev.counters;
    detect_document_end(&mut dev).unwrap();
    assert!(dev.document);
    assert_eq!(dev.counters, before);
}

#[rstest]
fn command_set_forwards_motion(rig: Rig) {
    let Rig { mut dev, .. } = rig;
    let cmd = Gl843;
    cmd.feed(&mut dev, 50).unwrap();
    assert_eq!(dev.head_pos, 50);
    cmd.slow_back_home(&mut dev, true).unwrap();
    assert_eq!(dev.head_pos, 0);
    assert!(!cmd.get_paper_sensor(&mut dev).unwrap());
}
