//! Motor slope tables: per-step periods ramping from start speed to cruise.

use tracing::warn;

use crate::motor::{MotorSlope, StepType};
use crate::util::clamp_u16;

/// Hardware limit on slope table entries.
pub const MAX_SLOPE_TABLE_SIZE: usize = 256;

/// Fixed slope-table slots in ASIC RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeSlot {
    Scan = 0,
    Backtrack = 1,
    Stop = 2,
    Fast = 3,
    Home = 4,
}

impl SlopeSlot {
    pub const ALL: [SlopeSlot; 5] = [
        SlopeSlot::Scan,
        SlopeSlot::Backtrack,
        SlopeSlot::Stop,
        SlopeSlot::Fast,
        SlopeSlot::Home,
    ];

    pub fn ram_address(self) -> u32 {
        crate::gl843::SLOPE_RAM_BASE + crate::gl843::SLOPE_RAM_STRIDE * self as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlopeTable {
    pub table: Vec<u16>,
    /// Sum of every entry; the time the ramp takes in pixel-clock ticks.
    pub pixeltime_sum: u64,
}

impl SlopeTable {
    pub fn steps_count(&self) -> usize {
        self.table.len()
    }

    pub fn last(&self) -> u16 {
        self.table.last().copied().unwrap_or(0)
    }

    fn generate_pixeltime_sum(&mut self) {
        self.pixeltime_sum = self.table.iter().map(|&v| u64::from(v)).sum();
    }

    /// Sum of the first `steps` entries.
    pub fn partial_sum(&self, steps: usize) -> u64 {
        self.table.iter().take(steps).map(|&v| u64::from(v)).sum()
    }

    /// Pad with the cruise value up to `size` entries. The sum still
    /// describes the ramp, not the padding.
    pub fn expanded(&self, size: usize) -> Vec<u16> {
        let mut out = self.table.clone();
        let last = self.last();
        if out.len() < size {
            out.resize(size, last);
        }
        out
    }
}

/// Ramp from `slope.initial_speed_w` to `target_speed_w`.
///
/// The table stops as soon as the ramp reaches the target (or the motor's
/// maximum speed, whichever is slower), then pads with the final value
/// until its length is a multiple of `steps_alignment` and at least
/// `min_size`, never exceeding `max_size`.
pub fn create_slope_table_for_speed(
    slope: &MotorSlope,
    target_speed_w: u32,
    step_type: StepType,
    steps_alignment: usize,
    min_size: usize,
    max_size: usize,
) -> SlopeTable {
    let shift = step_type.shift();
    let max_size = max_size.clamp(2, MAX_SLOPE_TABLE_SIZE);
    let steps_alignment = steps_alignment.max(1);
    let target_shifted = target_speed_w >> shift;
    let max_shifted = slope.max_speed_w >> shift;

    if target_shifted < max_shifted {
        warn!(
            target = target_shifted,
            max = max_shifted,
            "requested speed is faster than the motor allows"
        );
    }
    let final_speed = target_shifted.max(max_shifted);

    let mut table = SlopeTable::default();
    table.table.reserve(max_size);
    while table.table.len() < max_size - 1 {
        let step = u32::try_from(table.table.len()).unwrap_or(u32::MAX);
        let current = slope.table_step_shifted(step, step_type);
        if current <= final_speed {
            break;
        }
        table.table.push(clamp_u16(current));
    }
    table.table.push(clamp_u16(final_speed));

    while table.table.len() < max_size - 1
        && (table.table.len() % steps_alignment != 0 || table.table.len() < min_size)
    {
        let last = table.last();
        table.table.push(last);
    }

    table.generate_pixeltime_sum();
    table
}

/// Scan-speed table: cruise matches one line per `exposure` at `ydpi`.
pub fn create_slope_table(
    slope: &MotorSlope,
    ydpi: u32,
    exposure: u32,
    base_ydpi: u32,
    step_type: StepType,
    step_multiplier: u32,
    max_size: usize,
) -> SlopeTable {
    let target_speed_w = crate::util::scale(exposure, ydpi, base_ydpi.max(1));
    let mult = step_multiplier.max(1) as usize;
    create_slope_table_for_speed(slope, target_speed_w, step_type, mult, 2 * mult, max_size)
}

/// Table that accelerates all the way to the motor's maximum speed.
pub fn create_slope_table_fastest(
    slope: &MotorSlope,
    step_type: StepType,
    step_multiplier: u32,
    max_size: usize,
) -> SlopeTable {
    let mult = step_multiplier.max(1) as usize;
    create_slope_table_for_speed(slope, slope.max_speed_w, step_type, mult, 2 * mult, max_size)
}

/// Phase of the first scanned line relative to the line period once the
/// ramp and `buffer_acc_steps` cruise steps have run.
pub fn compute_z1_mod(
    table: &SlopeTable,
    acc_steps: usize,
    buffer_acc_steps: u32,
    exposure: u32,
) -> u32 {
    if exposure == 0 || table.table.is_empty() {
        return 0;
    }
    let acc_steps = acc_steps.clamp(1, table.steps_count());
    let sum = table.partial_sum(acc_steps)
        + u64::from(buffer_acc_steps) * u64::from(table.table[acc_steps - 1]);
    (sum % u64::from(exposure)) as u32
}

/// Phase after the feed move; a two-table move adds a single cruise step.
pub fn compute_z2_mod(
    table: &SlopeTable,
    acc_steps: usize,
    move_steps: u32,
    two_table: bool,
    exposure: u32,
) -> u32 {
    if exposure == 0 || table.table.is_empty() {
        return 0;
    }
    let acc_steps = acc_steps.clamp(1, table.steps_count());
    let cruise = u64::from(table.table[acc_steps - 1]);
    let extra = if two_table {
        cruise
    } else {
        u64::from(move_steps) * cruise
    };
    ((table.partial_sum(acc_steps) + extra) % u64::from(exposure)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slope() -> MotorSlope {
        MotorSlope::create_from_steps(20_000, 3_000, 120)
    }

    #[test]
    fn stops_at_target_speed() {
        let t = create_slope_table_for_speed(&slope(), 10_000, StepType::Full, 1, 1, 256);
        assert_eq!(t.last(), 10_000);
        assert!(t.steps_count() < 256);
        assert_eq!(t.table[0], 20_000);
    }

    #[test]
    fn too_fast_target_is_clamped_to_motor_max() {
        let t = create_slope_table_for_speed(&slope(), 1_000, StepType::Full, 1, 1, 256);
        assert_eq!(t.last(), 3_000);
    }

    #[test]
    fn alignment_and_min_size_pad_with_cruise() {
        let t = create_slope_table_for_speed(&slope(), 19_000, StepType::Full, 4, 8, 256);
        assert!(t.steps_count() >= 8);
        assert_eq!(t.steps_count() % 4, 0);
        assert!(t.table[t.steps_count() - 1] == t.table[t.steps_count() - 2]);
    }

    #[test]
    fn step_type_shifts_periods() {
        let full = create_slope_table_for_speed(&slope(), 10_000, StepType::Full, 1, 1, 256);
        let half = create_slope_table_for_speed(&slope(), 10_000, StepType::Half, 1, 1, 256);
        assert_eq!(half.table[0], full.table[0] / 2);
        assert_eq!(half.last(), 5_000);
    }

    #[test]
    fn slot_addresses() {
        assert_eq!(SlopeSlot::Scan.ram_address(), 0x40000);
        assert_eq!(SlopeSlot::Home.ram_address(), 0x60000);
    }

    #[test]
    fn z_mod_is_below_exposure() {
        let t = create_slope_table_for_speed(&slope(), 10_000, StepType::Full, 1, 1, 256);
        let n = t.steps_count();
        assert!(compute_z1_mod(&t, n, 1, 7_000) < 7_000);
        assert!(compute_z2_mod(&t, n, 40, false, 7_000) < 7_000);
        assert_eq!(compute_z1_mod(&t, n, 0, 0), 0);
    }
}
