//! Shading calibration: per-pixel dark and white references folded into
//! gain coefficients the ASIC applies to every line.

use scanner_traits::Transport;
use tracing::{debug, info};

use crate::calibration::{CalibrationKind, calibrating, calibration_params, capture};
use crate::device::Device;
use crate::error::Result;
use crate::gl843::{PORT_SHADING, REG_SHADING_ADDR_HI, REG_SHADING_ADDR_LO};
use crate::image::RawImage;
use crate::sequencer::slow_back_home;
use crate::transport_error::TransportResultExt;

/// Coefficient value meaning unity gain.
pub const SHADING_UNIT: u32 = 0x4000;

/// Per-column mean of every channel over all lines.
pub fn column_means(image: &RawImage) -> Vec<[f64; 3]> {
    let rows = f64::from(image.height.max(1));
    (0..image.width)
        .map(|x| {
            let mut acc = [0f64; 3];
            for (ch, slot) in acc.iter_mut().enumerate().take(image.channels as usize) {
                let sum: u64 = (0..image.height)
                    .map(|y| u64::from(image.sample(x, y, ch as u32)))
                    .sum();
                *slot = sum as f64 / rows;
            }
            acc
        })
        .collect()
}

/// Gain coefficient mapping the `dark..white` span onto `target`.
pub fn shading_coefficient(dark: f64, white: f64, target: u32) -> u16 {
    let span = white - dark;
    if span <= 0.0 {
        return SHADING_UNIT as u16;
    }
    let coeff = f64::from(SHADING_UNIT) * f64::from(target) / span;
    coeff.min(f64::from(u16::MAX)) as u16
}

/// Encode shading RAM: per pixel, per channel, dark LE16 then coeff LE16.
pub fn encode_shading(dark: &[[f64; 3]], white: &[[f64; 3]], target: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(white.len() * 12);
    for (d, w) in dark.iter().zip(white) {
        for ch in 0..3 {
            let dark_level = d[ch].round().clamp(0.0, f64::from(u16::MAX)) as u16;
            out.extend_from_slice(&dark_level.to_le_bytes());
            out.extend_from_slice(&shading_coefficient(d[ch], w[ch], target).to_le_bytes());
        }
    }
    out
}

/// Capture dark and white references at `dpi`, store the coefficients
/// with the geometry they were taken at, and return home.
pub fn shading_calibration<T: Transport>(dev: &mut Device<T>, dpi: u32) -> Result<()> {
    calibrating(dev, "shading calibration", |dev| {
        let sensor = dev.sensor(dpi, 3)?;
        let dark_params = calibration_params(dev, CalibrationKind::ShadingDark, dpi)?;
        let white_params = calibration_params(dev, CalibrationKind::ShadingWhite, dpi)?;

        let dark_image = if dev.model.is_cis {
            None
        } else {
            Some(capture(dev, &dark_params, false)?)
        };
        let white_image = capture(dev, &white_params, true)?;
        let layout = dev.session.as_ref().map(|s| s.layout.clone());

        let white = column_means(&white_image);
        let dark = match dark_image {
            Some(image) => column_means(&image),
            None => {
                let black = sensor.black_pixels_at(dpi).max(1);
                let level = [0, 1, 2].map(|ch| white_image.dark_average(ch, black));
                vec![level; white.len()]
            }
        };

        let target = sensor.gain_white_ref * 256;
        let data = encode_shading(&dark, &white, target);
        debug!(pixels = white.len(), bytes = data.len(), target, "shading coefficients");
        dev.calibration.shading = Some(data);
        dev.calibration.layout = layout;
        info!(dpi, "shading calibration done");

        slow_back_home(dev, true)
    })
}

/// Write shading data to shading RAM from address 0.
pub fn upload_shading<T: Transport>(dev: &mut Device<T>, data: &[u8]) -> Result<()> {
    dev.write_register_pairs(&[(REG_SHADING_ADDR_LO, 0), (REG_SHADING_ADDR_HI, 0)])?;
    dev.transport
        .bulk_write(PORT_SHADING, data)
        .during("shading upload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_span_is_unity() {
        assert_eq!(shading_coefficient(100.0, 100.0, 50_000), 0x4000);
        assert_eq!(shading_coefficient(200.0, 100.0, 50_000), 0x4000);
    }

    #[test]
    fn coefficient_scales_and_saturates() {
        assert_eq!(shading_coefficient(0.0, 40_000.0, 40_000), 0x4000);
        assert_eq!(shading_coefficient(0.0, 20_000.0, 40_000), 0x8000);
        assert_eq!(shading_coefficient(0.0, 1.0, 40_000), u16::MAX);
    }

    #[test]
    fn layout_is_dark_then_coeff_per_channel() {
        let dark = vec![[1.0, 2.0, 3.0]];
        let white = vec![[1.0, 2.0, 3.0]];
        let data = encode_shading(&dark, &white, 1000);
        assert_eq!(data, vec![1, 0, 0, 0x40, 2, 0, 0, 0x40, 3, 0, 0, 0x40]);
    }

    #[test]
    fn column_means_average_lines() {
        // 2 px, 2 lines, 3 channels, 8-bit
        let data = vec![10, 20, 30, 0, 0, 0, 30, 40, 50, 2, 2, 2];
        let img = RawImage::new(2, 2, 3, 8, data).unwrap();
        let m = column_means(&img);
        assert_eq!(m[0], [20.0, 30.0, 40.0]);
        assert_eq!(m[1], [1.0, 1.0, 1.0]);
    }
}
