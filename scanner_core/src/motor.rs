//! Motor descriptors, acceleration profiles and profile selection.

use crate::error::{Result, ScanError};

/// Microstepping mode; the value is the right shift applied to full-step timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum StepType {
    #[default]
    Full = 0,
    Half = 1,
    Quarter = 2,
    Eighth = 3,
}

impl StepType {
    pub fn shift(self) -> u32 {
        self as u32
    }

    /// STEPSEL / FSTPSEL field value.
    pub fn register_bits(self) -> u8 {
        (self as u8) << 6
    }
}

/// Constant angular acceleration from `initial_speed_w` down to `max_speed_w`.
///
/// Speeds are step periods in pixel-clock ticks, so a smaller value is faster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorSlope {
    pub initial_speed_w: u32,
    pub max_speed_w: u32,
    pub acceleration: f64,
}

impl MotorSlope {
    /// Slope reaching `max_speed_w` after `steps` steps.
    pub fn create_from_steps(initial_speed_w: u32, max_speed_w: u32, steps: u32) -> Self {
        let initial_speed_w = initial_speed_w.max(1);
        let max_speed_w = max_speed_w.clamp(1, initial_speed_w);
        let initial_v = 1.0 / f64::from(initial_speed_w);
        let max_v = 1.0 / f64::from(max_speed_w);
        let acceleration = (max_v * max_v - initial_v * initial_v) / (2.0 * f64::from(steps.max(1)));
        Self {
            initial_speed_w,
            max_speed_w,
            acceleration,
        }
    }

    /// Period of step `step` of the ramp, shifted for `step_type`.
    pub fn table_step_shifted(&self, step: u32, step_type: StepType) -> u32 {
        // the first two steps both run at the initial speed
        if step < 2 {
            return self.initial_speed_w >> step_type.shift();
        }
        let step = f64::from(step - 1);
        let initial_v = 1.0 / f64::from(self.initial_speed_w);
        let speed_v = (initial_v * initial_v + 2.0 * self.acceleration * step).sqrt();
        ((1.0 / speed_v) as u32) >> step_type.shift()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotorProfile {
    pub slope: MotorSlope,
    pub step_type: StepType,
    /// y resolutions this profile serves; empty means all.
    pub resolutions: Vec<u32>,
    /// Longest exposure the profile is tuned for; 0 is unbounded.
    pub max_exposure: u32,
}

impl MotorProfile {
    fn serves(&self, ydpi: u32) -> bool {
        self.resolutions.is_empty() || self.resolutions.contains(&ydpi)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotorDescriptor {
    /// Resolution of one full step.
    pub base_ydpi: u32,
    /// Microsteps per table entry (programmed into 0x9d).
    pub step_multiplier: u32,
    pub profiles: Vec<MotorProfile>,
    pub fast_profiles: Vec<MotorProfile>,
    pub power_mode_count: u32,
    /// Supported y resolutions.
    pub ydpi_values: Vec<u32>,
}

impl MotorDescriptor {
    /// Lowest supported y resolution; drives fast, feed and home moves.
    pub fn lowest_ydpi(&self) -> u32 {
        self.ydpi_values
            .iter()
            .copied()
            .min()
            .unwrap_or(self.base_ydpi)
            .max(1)
    }

    /// Shortest line period the motor can keep up with at `ydpi`.
    pub fn min_exposure_for(&self, ydpi: u32) -> u32 {
        self.profiles
            .iter()
            .filter(|p| p.serves(ydpi))
            .map(|p| p.slope.max_speed_w)
            .min()
            .map_or(0, |w| crate::util::scale(w, self.base_ydpi, ydpi.max(1)))
    }
}

/// Pick the profile for `ydpi` and `exposure`.
///
/// An exact `max_exposure` match wins; otherwise the smallest
/// `max_exposure >= exposure`, with 0 treated as unbounded.
pub fn select_profile(
    profiles: &[MotorProfile],
    exposure: u32,
    ydpi: u32,
) -> Result<&MotorProfile> {
    let bound = |p: &MotorProfile| {
        if p.max_exposure == 0 {
            u32::MAX
        } else {
            p.max_exposure
        }
    };
    let candidates = profiles.iter().filter(|p| p.serves(ydpi));
    let mut best: Option<&MotorProfile> = None;
    for p in candidates {
        if p.max_exposure == exposure {
            return Ok(p);
        }
        if bound(p) >= exposure && best.is_none_or(|b| bound(p) < bound(b)) {
            best = Some(p);
        }
    }
    best.ok_or_else(|| {
        ScanError::UnsupportedConfiguration(format!(
            "no motor profile for {ydpi} dpi at exposure {exposure}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(max_exposure: u32, resolutions: &[u32]) -> MotorProfile {
        MotorProfile {
            slope: MotorSlope::create_from_steps(10_000, 2_000, 100),
            step_type: StepType::Half,
            resolutions: resolutions.to_vec(),
            max_exposure,
        }
    }

    #[test]
    fn exact_exposure_match_wins() {
        let table = [profile(0, &[]), profile(8000, &[]), profile(12000, &[])];
        assert_eq!(select_profile(&table, 12000, 300).unwrap().max_exposure, 12000);
    }

    #[test]
    fn smallest_bound_above_exposure() {
        let table = [profile(0, &[]), profile(12000, &[]), profile(8000, &[])];
        assert_eq!(select_profile(&table, 7000, 300).unwrap().max_exposure, 8000);
        assert_eq!(select_profile(&table, 20000, 300).unwrap().max_exposure, 0);
    }

    #[test]
    fn resolution_filter_applies() {
        let table = [profile(0, &[1200])];
        assert!(matches!(
            select_profile(&table, 100, 300),
            Err(ScanError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn ramp_starts_at_initial_speed_and_accelerates() {
        let slope = MotorSlope::create_from_steps(10_000, 2_000, 100);
        assert_eq!(slope.table_step_shifted(0, StepType::Full), 10_000);
        assert_eq!(slope.table_step_shifted(1, StepType::Full), 10_000);
        assert_eq!(slope.table_step_shifted(0, StepType::Quarter), 2_500);
        assert!(slope.table_step_shifted(50, StepType::Full) < 10_000);
        let end = slope.table_step_shifted(101, StepType::Full);
        assert!(end.abs_diff(2_000) <= 1, "end speed {end}");
    }
}
