//! Calibration engine: LED exposure balancing, AFE offset search and AFE
//! gain. Each procedure scans with a scratch copy of the live registers
//! and returns the carriage home when done.

use scanner_traits::Transport;
use tracing::{debug, info, warn};

use crate::afe::{Frontend, gain_code, write_frontend};
use crate::config::CalibrationCfg;
use crate::device::{Device, ScannerState};
use crate::error::{Result, ScanError};
use crate::gl843::{REG_EXPB, REG_EXPG, REG_EXPR};
use crate::image::RawImage;
use crate::register::RegisterSet;
use crate::sensor::SensorExposure;
use crate::sequencer::{begin_scan, end_scan, read_data_from_scanner, slow_back_home};
use crate::session::{ScanFlags, ScanMode, ScanParams, SessionPlan};

/// Calibration scan kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationKind {
    Led,
    Offset,
    Gain,
    ShadingDark,
    ShadingWhite,
}

impl CalibrationKind {
    /// Whether the carriage moves during the scan.
    pub fn moves(self) -> bool {
        matches!(self, Self::Gain | Self::ShadingWhite)
    }
}

/// Scan parameters for a calibration pass at `dpi`.
pub fn calibration_params<T: Transport>(
    dev: &Device<T>,
    kind: CalibrationKind,
    dpi: u32,
) -> Result<ScanParams> {
    let sensor = dev.sensor(dpi, 3)?;
    let pixels = crate::util::scale(sensor.sensor_pixels, dpi, sensor.full_resolution);
    let cfg = &dev.cfg.calibration;
    let (lines, depth) = match kind {
        CalibrationKind::Led => (1, 16),
        CalibrationKind::Offset => (cfg.offset_lines, 8),
        CalibrationKind::Gain => (cfg.gain_lines, 8),
        CalibrationKind::ShadingDark | CalibrationKind::ShadingWhite => (cfg.shading_lines, 16),
    };
    Ok(ScanParams {
        xres: dpi,
        yres: dpi,
        startx: 0,
        starty: 0,
        pixels,
        lines,
        depth,
        channels: 3,
        mode: ScanMode::Color,
        flags: ScanFlags {
            disable_shading: true,
            disable_gamma: true,
            disable_lamp: kind == CalibrationKind::ShadingDark,
            ignore_stagger_offset: true,
            ignore_color_offset: true,
            single_line: kind == CalibrationKind::Led,
            ..ScanFlags::default()
        },
        ..ScanParams::default()
    })
}

/// Session for a calibration pass, built on the live registers.
pub fn build_calibration_session<T: Transport>(
    dev: &Device<T>,
    kind: CalibrationKind,
    dpi: u32,
) -> Result<SessionPlan> {
    let params = calibration_params(dev, kind, dpi)?;
    dev.build_scan_session(&params, &dev.reg)
}

/// Run one calibration scan and return the raw image.
pub(crate) fn capture<T: Transport>(
    dev: &mut Device<T>,
    params: &ScanParams,
    start_motor: bool,
) -> Result<RawImage> {
    let mut regs: RegisterSet = dev.reg.clone();
    let session = dev.setup_session(&mut regs, params)?;
    dev.write_registers(&regs)?;

    begin_scan(dev, start_motor)?;
    let len = usize::try_from(session.layout.read_bytes_total)
        .map_err(|_| ScanError::InvalidGeometry("calibration scan too large".into()))?;
    let mut data = vec![0u8; len];
    read_data_from_scanner(dev, &mut data)?;
    end_scan(dev)?;

    let p = &session.params;
    RawImage::new(
        session.layout.output_pixels,
        session.layout.output_line_count,
        p.channels,
        p.depth,
        data,
    )
}

/// Run `f` with the device marked as calibrating.
pub(crate) fn calibrating<T: Transport, R>(
    dev: &mut Device<T>,
    op: &str,
    f: impl FnOnce(&mut Device<T>) -> Result<R>,
) -> Result<R> {
    dev.ensure_ready(op)?;
    dev.state = ScannerState::Calibrating;
    let out = f(dev);
    dev.state = ScannerState::Idle;
    out
}

/// Outcome of one LED balancing iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedStep {
    Balanced,
    Adjust([u16; 3]),
}

/// Compare channel means and propose new exposures.
///
/// Channels are balanced when each mean is within `led_tolerance` of the
/// next. Otherwise every exposure is scaled by grand mean / channel mean,
/// and the set is pulled back into the configured exposure window.
pub fn led_balance_step(exposure: [u16; 3], means: [f64; 3], cfg: &CalibrationCfg) -> LedStep {
    let tol = f64::from(cfg.led_tolerance);
    let balanced = (0..3).all(|i| {
        let next = means[(i + 1) % 3];
        means[i] >= next * (1.0 - tol) && means[i] <= next * (1.0 + tol)
    });
    if balanced {
        return LedStep::Balanced;
    }

    let grand = means.iter().sum::<f64>() / 3.0;
    let mut next = [0f64; 3];
    for i in 0..3 {
        next[i] = if means[i] > 0.0 {
            f64::from(exposure[i]) * grand / means[i]
        } else {
            f64::from(cfg.led_max_exposure)
        };
    }
    let avg = next.iter().sum::<f64>() / 3.0;
    let max = f64::from(cfg.led_max_exposure);
    let min = f64::from(cfg.led_min_exposure);
    if avg > max {
        let k = f64::from(cfg.led_rescale_target) / avg;
        next.iter_mut().for_each(|e| *e *= k);
    }
    if avg < min && avg > 0.0 {
        let k = min / avg;
        next.iter_mut().for_each(|e| *e *= k);
    }
    LedStep::Adjust(next.map(|e| e.round().clamp(1.0, f64::from(u16::MAX)) as u16))
}

/// Balance per-channel LED exposure so the three channels read alike.
///
/// Stops after `led_max_iterations` even if unbalanced and keeps the last
/// exposures.
pub fn led_calibration<T: Transport>(dev: &mut Device<T>) -> Result<SensorExposure> {
    calibrating(dev, "led calibration", |dev| {
        let dpi = dev.calibration_dpi();
        let params = calibration_params(dev, CalibrationKind::Led, dpi)?;
        let mut exposure = dev.sensor(dpi, 3)?.exposure.as_array();
        let max_iterations = dev.cfg.calibration.led_max_iterations;

        let mut converged = false;
        for iteration in 0..max_iterations {
            dev.calibration.exposure = Some(SensorExposure::from_array(exposure));
            let image = capture(dev, &params, false)?;
            let means = [0, 1, 2].map(|ch| image.line_mean(0, ch));
            debug!(iteration, ?exposure, ?means, "led iteration");
            match led_balance_step(exposure, means, &dev.cfg.calibration) {
                LedStep::Balanced => {
                    converged = true;
                    break;
                }
                LedStep::Adjust(next) => exposure = next,
            }
        }
        if !converged {
            warn!(?exposure, "led exposure did not converge, using last values");
        }

        let result = SensorExposure::from_array(exposure);
        dev.calibration.exposure = Some(result);
        for (address, value) in [(REG_EXPR, result.red), (REG_EXPG, result.green), (REG_EXPB, result.blue)] {
            dev.reg.set16(address, value)?;
            let [hi, lo] = value.to_be_bytes();
            dev.write_register_pairs(&[(address, hi), (address + 1, lo)])?;
        }
        info!(red = result.red, green = result.green, blue = result.blue, "led calibration done");

        slow_back_home(dev, true)?;
        Ok(result)
    })
}

/// Binary search state for one offset calibration.
///
/// `top` starts at the offset that drives the dark level lowest. Each
/// pass probes the midpoint of every open bracket and moves whichever
/// end the probe replaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetSearch {
    pub bottom: [u16; 3],
    pub top: [u16; 3],
    pub bottom_avg: [f64; 3],
    pub top_avg: [f64; 3],
}

impl OffsetSearch {
    pub fn new(bottom: u16, top: u16, bottom_avg: [f64; 3], top_avg: [f64; 3]) -> Self {
        Self {
            bottom: [bottom; 3],
            top: [top; 3],
            bottom_avg,
            top_avg,
        }
    }

    pub fn is_open(&self, ch: usize) -> bool {
        self.top[ch].saturating_sub(self.bottom[ch]) > 1
    }

    pub fn converged(&self) -> bool {
        (0..3).all(|ch| !self.is_open(ch))
    }

    /// Offsets to probe next; closed channels keep `current`.
    pub fn probe(&self, current: [u16; 3]) -> [u16; 3] {
        let mut out = current;
        for ch in 0..3 {
            if self.is_open(ch) {
                out[ch] = (self.top[ch] + self.bottom[ch]) / 2;
            }
        }
        out
    }

    /// Narrow each open bracket with the dark level measured at `probe`.
    pub fn record(&mut self, probe: [u16; 3], avg: [f64; 3]) {
        for ch in 0..3 {
            if !self.is_open(ch) {
                continue;
            }
            if self.top_avg[ch] >= avg[ch] {
                self.top_avg[ch] = avg[ch];
                self.top[ch] = probe[ch];
            } else {
                self.bottom_avg[ch] = avg[ch];
                self.bottom[ch] = probe[ch];
            }
        }
    }
}

fn dark_levels(image: &RawImage, black_pixels: u32) -> [f64; 3] {
    [0, 1, 2].map(|ch| image.dark_average(ch, black_pixels))
}

/// Find per-channel AFE offsets from the optical-black margin.
pub fn offset_calibration<T: Transport>(dev: &mut Device<T>) -> Result<()> {
    calibrating(dev, "offset calibration", |dev| {
        let dpi = dev.calibration_dpi();
        let params = calibration_params(dev, CalibrationKind::Offset, dpi)?;
        let sensor = dev.sensor(dpi, 3)?;
        let black_pixels = sensor.black_pixels_at(dpi).max(1);
        let custom = sensor.custom_fe_regs.clone();
        let cfg = dev.cfg.calibration.clone();

        let mut fe: Frontend = dev.frontend.clone();
        fe.gain = [0; 3];

        let measure = |dev: &mut Device<T>, fe: &Frontend| -> Result<[f64; 3]> {
            write_frontend(dev, fe, &custom)?;
            let image = capture(dev, &params, false)?;
            Ok(dark_levels(&image, black_pixels))
        };

        fe.offset = [u16::from(cfg.offset_bottom); 3];
        let bottom_avg = measure(dev, &fe)?;
        fe.offset = [u16::from(cfg.offset_top); 3];
        let top_avg = measure(dev, &fe)?;
        debug!(?bottom_avg, ?top_avg, "offset bracket");

        let mut search = OffsetSearch::new(
            u16::from(cfg.offset_bottom),
            u16::from(cfg.offset_top),
            bottom_avg,
            top_avg,
        );
        let mut pass = 0;
        while pass < cfg.offset_max_passes && !search.converged() {
            pass += 1;
            fe.offset = search.probe(fe.offset);
            let avg = measure(dev, &fe)?;
            search.record(fe.offset, avg);
            debug!(pass, offset = ?fe.offset, ?avg, "offset pass");
        }
        if !search.converged() {
            warn!(passes = pass, "offset search hit its pass limit");
        }
        info!(offset = ?fe.offset, passes = pass, "offset calibration done");

        slow_back_home(dev, true)
    })
}

/// Value at `percentile` of the sorted inner half of line 1, channel `ch`.
pub fn channel_peak(image: &RawImage, ch: u32, percentile: f32) -> f32 {
    let y = 1.min(image.height.saturating_sub(1));
    let (start, end) = (image.width / 4, image.width * 3 / 4);
    let mut samples: Vec<u16> = (start..end).map(|x| image.sample(x, y, ch)).collect();
    if samples.is_empty() {
        return 0.0;
    }
    samples.sort_unstable();
    let idx = ((samples.len() - 1) as f32 * percentile) as usize;
    f32::from(samples[idx.min(samples.len() - 1)])
}

/// Set AFE gains so the white reference reaches the sensor's target level.
pub fn gain_calibration<T: Transport>(dev: &mut Device<T>, dpi: u32) -> Result<()> {
    calibrating(dev, "gain calibration", |dev| {
        let params = calibration_params(dev, CalibrationKind::Gain, dpi)?;
        let sensor = dev.sensor(dpi, 3)?;
        let image = capture(dev, &params, true)?;

        let percentile = dev.cfg.calibration.gain_percentile;
        let target = sensor.gain_white_ref as f32;
        let kind = dev.frontend.kind;
        let mut gains = [0u16; 3];
        for ch in 0..3 {
            let peak = channel_peak(&image, ch, percentile);
            gains[ch as usize] = gain_code(kind, target, peak)?;
            debug!(ch, peak, target, gain = gains[ch as usize], "gain channel");
        }
        if dev.model.is_cis {
            let min = gains.iter().copied().min().unwrap_or(0);
            gains = [min; 3];
        }

        let mut fe = dev.frontend.clone();
        fe.gain = gains;
        write_frontend(dev, &fe, &sensor.custom_fe_regs)?;
        info!(?gains, "gain calibration done");

        slow_back_home(dev, true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_means_stop() {
        let cfg = CalibrationCfg::default();
        assert_eq!(
            led_balance_step([1000; 3], [100.0, 102.0, 98.0], &cfg),
            LedStep::Balanced
        );
    }

    #[test]
    fn dim_channel_gets_more_exposure() {
        let cfg = CalibrationCfg::default();
        let LedStep::Adjust(next) = led_balance_step([1000; 3], [100.0, 200.0, 150.0], &cfg) else {
            panic!("expected adjustment");
        };
        assert!(next[0] > next[2] && next[2] > next[1]);
    }

    #[test]
    fn overexposure_rescales_to_target() {
        let cfg = CalibrationCfg::default();
        let LedStep::Adjust(next) = led_balance_step([5000; 3], [100.0, 200.0, 300.0], &cfg) else {
            panic!("expected adjustment");
        };
        let avg = next.iter().map(|&e| u32::from(e)).sum::<u32>() / 3;
        assert!(avg.abs_diff(2000) <= 2, "avg {avg}");
    }

    #[test]
    fn underexposure_is_lifted() {
        let cfg = CalibrationCfg::default();
        let LedStep::Adjust(next) = led_balance_step([10; 3], [100.0, 200.0, 300.0], &cfg) else {
            panic!("expected adjustment");
        };
        let avg = next.iter().map(|&e| u32::from(e)).sum::<u32>() / 3;
        assert!(avg >= 49, "avg {avg}");
    }

    #[test]
    fn offset_search_narrows_toward_clip_edge() {
        // dark level falls with offset and clips at 0 from offset 120
        let dark = |o: u16| f64::from(120u16.saturating_sub(o));
        let mut s = OffsetSearch::new(10, 255, [dark(10); 3], [dark(255); 3]);
        let mut current = [0u16; 3];
        let mut passes = 0;
        while !s.converged() {
            let width = s.top[0] - s.bottom[0];
            current = s.probe(current);
            s.record(current, current.map(dark));
            assert!(s.top[0] - s.bottom[0] < width);
            passes += 1;
        }
        assert!(passes <= 32);
        assert!(s.bottom[0] <= 120 && s.top[0] >= 119);
    }

    #[test]
    fn peak_uses_inner_half_of_line_one() {
        // 8 px gray, 2 lines; outer quarters hold outliers
        let mut data = vec![0u8; 16];
        data[8..16].copy_from_slice(&[255, 255, 10, 20, 30, 40, 255, 255]);
        let img = RawImage::new(8, 2, 1, 8, data).unwrap();
        assert_eq!(channel_peak(&img, 0, 0.95), 30.0);
        assert_eq!(channel_peak(&img, 0, 1.0), 40.0);
    }
}
