use proptest::prelude::*;
use scanner_core::motor::{MotorSlope, StepType};
use scanner_core::session::plan_feed;
use scanner_core::slope::{
    MAX_SLOPE_TABLE_SIZE, create_slope_table, create_slope_table_fastest,
    create_slope_table_for_speed,
};

fn step_type() -> impl Strategy<Value = StepType> {
    prop_oneof![
        Just(StepType::Full),
        Just(StepType::Half),
        Just(StepType::Quarter),
    ]
}

proptest! {
    #[test]
    fn scan_tables_are_bounded_monotonic_and_summed(
        initial in 2_000u32..60_000,
        max_frac in 5u32..100,
        ramp in 1u32..600,
        exposure in 1u32..120_000,
        ydpi in prop::sample::select(vec![75u32, 150, 300, 600, 1200, 2400]),
        step_type in step_type(),
        mult in prop::sample::select(vec![1u32, 2, 4]),
    ) {
        let slope = MotorSlope::create_from_steps(initial, initial * max_frac / 100, ramp);
        let t = create_slope_table(&slope, ydpi, exposure, 1200, step_type, mult, MAX_SLOPE_TABLE_SIZE);

        prop_assert!(!t.table.is_empty());
        prop_assert!(t.steps_count() <= MAX_SLOPE_TABLE_SIZE);
        prop_assert!(t.table.windows(2).all(|w| w[1] <= w[0]), "not monotonic: {:?}", t.table);
        let sum: u64 = t.table.iter().map(|&v| u64::from(v)).sum();
        prop_assert_eq!(sum, t.pixeltime_sum);
    }

    #[test]
    fn fastest_table_ends_at_max_speed(
        initial in 2_000u32..60_000,
        max_frac in 5u32..100,
        ramp in 1u32..200,
        step_type in step_type(),
    ) {
        let slope = MotorSlope::create_from_steps(initial, initial * max_frac / 100, ramp);
        let t = create_slope_table_fastest(&slope, step_type, 1, MAX_SLOPE_TABLE_SIZE);
        prop_assert!(u32::from(t.last()) >= slope.max_speed_w >> step_type.shift());
        prop_assert!(t.steps_count() <= MAX_SLOPE_TABLE_SIZE);
    }

    #[test]
    fn short_feeds_never_use_the_fast_table(
        feed in 0u32..2_000,
        step_type in step_type(),
        scan_target in 1_000u32..8_000,
    ) {
        let slope = MotorSlope::create_from_steps(10_000, 800, 150);
        let scan = create_slope_table_for_speed(&slope, scan_target, step_type, 1, 2, MAX_SLOPE_TABLE_SIZE);
        let fast = create_slope_table_fastest(&slope, StepType::Full, 1, MAX_SLOPE_TABLE_SIZE);
        let min = 2 * fast.steps_count() as u32 + ((scan.steps_count() as u32) >> step_type.shift());
        let (fast_used, feedl) = plan_feed(feed, step_type, &scan, &fast, 1, 1_000_000, true);
        if feed < min {
            prop_assert!(!fast_used);
        }
        prop_assert!(feedl >= 1);
    }
}

#[test]
fn table_respects_configured_cap() {
    let slope = MotorSlope::create_from_steps(60_000, 100, 1_000);
    let t = create_slope_table_for_speed(&slope, 100, StepType::Full, 1, 2, 64);
    assert!(t.steps_count() <= 64);
    assert!(t.steps_count() >= 2);
}
