use proptest::prelude::*;
use rstest::rstest;
use scanner_core::config::MotionCfg;
use scanner_core::gl843;
use scanner_core::mocks::demo_model;
use scanner_core::optical::{compute_layout, line_bytes};
use scanner_core::sensor::SensorDescriptor;
use scanner_core::session::{ScanFlags, ScanMode, ScanParams, build_scan_session};
use scanner_core::ScanError;

fn params(xres: u32, pixels: u32, lines: u32, depth: u32, channels: u32) -> ScanParams {
    ScanParams {
        xres,
        yres: xres,
        pixels,
        lines,
        depth,
        channels,
        mode: match (depth, channels) {
            (1, _) => ScanMode::Lineart,
            (_, 1) => ScanMode::Gray,
            _ => ScanMode::Color,
        },
        ..ScanParams::default()
    }
}

#[test]
fn letter_page_at_300_dpi_color() {
    let l = compute_layout(&params(300, 2550, 3300, 8, 3), &SensorDescriptor::default(), 1200).unwrap();
    assert_eq!(l.total_bytes_to_read, 2550 * 3300 * 3);
    assert_eq!(l.hwdpi, 600);
}

#[test]
fn lineart_line_bytes_round_up() {
    let l = compute_layout(&params(300, 1700, 10, 1, 1), &SensorDescriptor::default(), 1200).unwrap();
    assert_eq!(l.output_line_bytes_requested, 213);
    assert_eq!(l.total_bytes_to_read, 213 * 10);
}

#[test]
fn motor_only_moves_keep_the_lamp_off() {
    let model = demo_model();
    let sensor = &model.sensors[0];
    let mut p = params(75, 100, 3, 8, 1);
    let lamp = |p: &ScanParams| {
        let plan = build_scan_session(&model, sensor, p, &gl843::default_registers(), &MotionCfg::default())
            .unwrap();
        plan.registers.get8(gl843::REG03).unwrap() & gl843::REG03_LAMPPWR != 0
    };
    assert!(lamp(&p));
    p.flags = ScanFlags {
        feeding: true,
        ..ScanFlags::default()
    };
    assert!(!lamp(&p));
}

#[rstest]
#[case(75)]
#[case(150)]
#[case(300)]
#[case(600)]
#[case(1200)]
fn session_programs_window_registers(#[case] dpi: u32) {
    let model = demo_model();
    let sensor = &model.sensors[0];
    let plan = build_scan_session(
        &model,
        sensor,
        &params(dpi, dpi * 2, 20, 8, 3),
        &gl843::default_registers(),
        &MotionCfg::default(),
    )
    .unwrap();
    let regs = &plan.registers;
    let l = &plan.session.layout;
    assert_eq!(u32::from(regs.get16(gl843::REG_STRPIXEL).unwrap()), l.pixel_startx);
    assert_eq!(u32::from(regs.get16(gl843::REG_ENDPIXEL).unwrap()), l.pixel_endx);
    assert_eq!(u32::from(regs.get16(gl843::REG_DPISET).unwrap()), l.dpiset);
    assert_eq!(regs.get24(gl843::REG_LINCNT).unwrap(), l.output_line_count);
    assert_eq!(plan.slopes.len(), 5);
    if dpi > 600 {
        assert_eq!(regs.get24(gl843::REG_Z1MOD).unwrap(), 0);
        assert_eq!(regs.get24(gl843::REG_Z2MOD).unwrap(), 0);
    }
}

#[test]
fn resolution_above_sensor_is_rejected() {
    let err = compute_layout(&params(2400, 100, 1, 8, 3), &SensorDescriptor::default(), 1200).unwrap_err();
    assert!(matches!(err, ScanError::InvalidGeometry(_)));
}

proptest! {
    #[test]
    fn requested_bytes_cover_every_line(
        xres in prop::sample::select(vec![75u32, 100, 150, 200, 300, 600, 1200]),
        pixels in 1u32..5_000,
        lines in 1u32..500,
        depth in prop::sample::select(vec![1u32, 8, 16]),
        channels in prop::sample::select(vec![1u32, 3]),
    ) {
        let p = params(xres, pixels, lines, depth, channels);
        let l = compute_layout(&p, &SensorDescriptor::default(), 1200).unwrap();
        prop_assert_eq!(l.output_line_bytes_requested, line_bytes(pixels, channels, depth));
        prop_assert_eq!(l.output_line_bytes_requested * u64::from(l.output_line_count), l.output_total_bytes);
        prop_assert_eq!(l.output_line_bytes_requested * u64::from(lines), l.total_bytes_to_read);
        prop_assert!(l.output_pixels >= pixels);
        prop_assert!(l.pixel_endx > l.pixel_startx);
    }
}
