//! Runtime configuration for the engine.
//!
//! These are the structs the sequencer and calibration code read. They are
//! separate from the TOML-deserialized config in `scanner_config`.

use std::time::Duration;

use crate::poll::PollBudget;

/// Poll budgets for every hardware wait.
#[derive(Debug, Clone)]
pub struct PollCfg {
    pub interval: Duration,
    pub stop_polls: u32,
    pub home_polls: u32,
    pub feed_polls: u32,
    pub buffer_polls: u32,
    pub buffer_interval: Duration,
}

impl Default for PollCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            stop_polls: 10,
            home_polls: 300,
            feed_polls: 300,
            buffer_polls: 1000,
            buffer_interval: Duration::from_millis(10),
        }
    }
}

impl PollCfg {
    pub fn stop(&self) -> PollBudget {
        PollBudget::new(self.stop_polls, self.interval)
    }
    pub fn home(&self) -> PollBudget {
        PollBudget::new(self.home_polls, self.interval)
    }
    pub fn feed(&self) -> PollBudget {
        PollBudget::new(self.feed_polls, self.interval)
    }
    pub fn buffer(&self) -> PollBudget {
        PollBudget::new(self.buffer_polls, self.buffer_interval)
    }
}

/// Calibration tuning.
#[derive(Debug, Clone)]
pub struct CalibrationCfg {
    pub led_max_iterations: u32,
    pub led_tolerance: f32,
    pub led_min_exposure: u16,
    pub led_max_exposure: u16,
    pub led_rescale_target: u16,
    pub offset_bottom: u8,
    pub offset_top: u8,
    pub offset_max_passes: u32,
    pub offset_lines: u32,
    pub gain_percentile: f32,
    pub gain_lines: u32,
    pub shading_lines: u32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            led_max_iterations: 100,
            led_tolerance: 0.05,
            led_min_exposure: 50,
            led_max_exposure: 3000,
            led_rescale_target: 2000,
            offset_bottom: 10,
            offset_top: 255,
            offset_max_passes: 32,
            offset_lines: 8,
            gain_percentile: 0.95,
            gain_lines: 10,
            shading_lines: 32,
        }
    }
}

/// Motor behaviour.
#[derive(Debug, Clone)]
pub struct MotionCfg {
    pub boot_settle_steps: u32,
    pub disable_fast_feed: bool,
    pub max_slope_steps: usize,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            boot_settle_steps: 300,
            disable_fast_feed: false,
            max_slope_steps: crate::slope::MAX_SLOPE_TABLE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineCfg {
    pub poll: PollCfg,
    pub calibration: CalibrationCfg,
    pub motion: MotionCfg,
}

impl From<&scanner_config::Config> for EngineCfg {
    fn from(c: &scanner_config::Config) -> Self {
        let t = &c.timeouts;
        let cal = &c.calibration;
        Self {
            poll: PollCfg {
                interval: Duration::from_millis(t.poll_interval_ms),
                stop_polls: t.stop_polls,
                home_polls: t.home_polls,
                feed_polls: t.feed_polls,
                buffer_polls: t.buffer_polls,
                buffer_interval: Duration::from_millis(t.buffer_interval_ms),
            },
            calibration: CalibrationCfg {
                led_max_iterations: cal.led_max_iterations,
                led_tolerance: cal.led_tolerance,
                led_min_exposure: cal.led_min_exposure,
                led_max_exposure: cal.led_max_exposure,
                led_rescale_target: cal.led_rescale_target,
                offset_bottom: cal.offset_bottom,
                offset_top: cal.offset_top,
                offset_max_passes: cal.offset_max_passes,
                offset_lines: cal.offset_lines,
                gain_percentile: cal.gain_percentile,
                gain_lines: cal.gain_lines,
                shading_lines: cal.shading_lines,
            },
            motion: MotionCfg {
                boot_settle_steps: c.motion.boot_settle_steps,
                disable_fast_feed: c.motion.disable_fast_feed,
                max_slope_steps: c.motion.max_slope_steps,
            },
        }
    }
}
