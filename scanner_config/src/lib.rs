#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Tuning configuration for the scanner engine.
//!
//! - `Config` and its sections are deserialized from TOML; every section
//!   and field has a default, so an empty document is a valid config.
//! - `Config::validate` rejects values the engine cannot run with.
use std::path::Path;

use eyre::WrapErr;
use serde::Deserialize;

/// Poll budgets. Every wait is `polls * poll_interval_ms` unless noted.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timeouts {
    /// Interval between status reads for motor waits (ms)
    pub poll_interval_ms: u64,
    pub stop_polls: u32,
    pub home_polls: u32,
    pub feed_polls: u32,
    /// Waiting for image data uses its own finer interval
    pub buffer_polls: u32,
    pub buffer_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            stop_polls: 10,
            home_polls: 300,
            feed_polls: 300,
            buffer_polls: 1000,
            buffer_interval_ms: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    pub led_max_iterations: u32,
    /// Channels are balanced when every pair of means is within this ratio
    pub led_tolerance: f32,
    pub led_min_exposure: u16,
    pub led_max_exposure: u16,
    /// Exposure the average is pulled back to when it overshoots the max
    pub led_rescale_target: u16,
    pub offset_bottom: u8,
    pub offset_top: u8,
    pub offset_max_passes: u32,
    pub offset_lines: u32,
    /// Fraction of the sorted inner samples taken as the channel peak
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MotionCfg {
    /// Distance fed after a cold boot to settle the motor (full steps)
    pub boot_settle_steps: u32,
    /// Never use fast repositioning even when it would be quicker
    pub disable_fast_feed: bool,
    /// Upper bound on slope table entries
    pub max_slope_steps: usize,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            boot_settle_steps: 300,
            disable_fast_feed: false,
            max_slope_steps: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UsbCfg {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Per-transfer timeout (ms)
    pub transfer_timeout_ms: u64,
}

impl Default for UsbCfg {
    fn default() -> Self {
        Self {
            vendor_id: 0x04a9,
            product_id: 0x2229,
            transfer_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub timeouts: Timeouts,
    pub calibration: CalibrationCfg,
    pub motion: MotionCfg,
    pub usb: UsbCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = load_toml(&text).wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Timeouts
        let t = &self.timeouts;
        if t.poll_interval_ms == 0 {
            eyre::bail!("timeouts.poll_interval_ms must be >= 1");
        }
        if t.poll_interval_ms > 10_000 {
            eyre::bail!("timeouts.poll_interval_ms is unreasonably large (>10s)");
        }
        if t.buffer_interval_ms == 0 {
            eyre::bail!("timeouts.buffer_interval_ms must be >= 1");
        }
        for (name, polls) in [
            ("stop_polls", t.stop_polls),
            ("home_polls", t.home_polls),
            ("feed_polls", t.feed_polls),
            ("buffer_polls", t.buffer_polls),
        ] {
            if polls == 0 {
                eyre::bail!("timeouts.{name} must be >= 1");
            }
        }

        // Calibration
        let c = &self.calibration;
        if c.led_max_iterations == 0 {
            eyre::bail!("calibration.led_max_iterations must be >= 1");
        }
        if !(c.led_tolerance > 0.0 && c.led_tolerance < 1.0) {
            eyre::bail!("calibration.led_tolerance must be in (0.0, 1.0)");
        }
        if c.led_min_exposure == 0 {
            eyre::bail!("calibration.led_min_exposure must be >= 1");
        }
        if c.led_min_exposure >= c.led_max_exposure {
            eyre::bail!("calibration.led_min_exposure must be < led_max_exposure");
        }
        if c.led_rescale_target < c.led_min_exposure || c.led_rescale_target > c.led_max_exposure {
            eyre::bail!("calibration.led_rescale_target must lie within [led_min_exposure, led_max_exposure]");
        }
        if c.offset_bottom >= c.offset_top {
            eyre::bail!("calibration.offset_bottom must be < offset_top");
        }
        if c.offset_max_passes == 0 {
            eyre::bail!("calibration.offset_max_passes must be >= 1");
        }
        if c.offset_lines < 2 {
            eyre::bail!("calibration.offset_lines must be >= 2 (the first line is discarded)");
        }
        if !(c.gain_percentile > 0.0 && c.gain_percentile <= 1.0) {
            eyre::bail!("calibration.gain_percentile must be in (0.0, 1.0]");
        }
        if c.gain_lines < 2 {
            eyre::bail!("calibration.gain_lines must be >= 2");
        }
        if c.shading_lines == 0 {
            eyre::bail!("calibration.shading_lines must be >= 1");
        }

        // Motion
        if self.motion.max_slope_steps < 2 || self.motion.max_slope_steps > 256 {
            eyre::bail!("motion.max_slope_steps must be in [2, 256]");
        }

        // Usb
        if self.usb.transfer_timeout_ms == 0 {
            eyre::bail!("usb.transfer_timeout_ms must be >= 1");
        }

        Ok(())
    }
}
