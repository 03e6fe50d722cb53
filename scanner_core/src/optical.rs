//! Optical window geometry and pipeline buffer sizing.
//!
//! Units: `startx`/`pixels` are in requested-resolution pixels; register
//! values (`pixel_startx`, `pixel_endx`) are physical sensor pixels at the
//! optical resolution in effect after the CCD-size divisor.

use crate::error::{Result, ScanError};
use crate::sensor::SensorDescriptor;
use crate::session::ScanParams;
use crate::util::{align_up, scale};

/// Lines of raw data in one pipeline block.
const BLOCK_LINES: u64 = 16;
/// Output buffer depth in lines.
const OUTPUT_BUFFER_LINES: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferSizes {
    /// Raw USB read buffer.
    pub read: u64,
    /// Line reassembly (stagger/color shift).
    pub lines: u64,
    pub shrink: u64,
    pub out: u64,
}

impl BufferSizes {
    fn any_zero(&self) -> bool {
        self.read == 0 || self.lines == 0 || self.shrink == 0 || self.out == 0
    }
}

/// Everything about a scan window that follows from the request and the
/// sensor. Two sessions with equal layouts program identical geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpticalLayout {
    pub hwdpi: u32,
    pub ccd_size_divisor: u32,
    pub optical_resolution: u32,
    pub optical_pixels: u32,
    pub output_pixels: u32,
    pub pixel_startx: u32,
    pub pixel_endx: u32,
    pub dpiset: u32,
    pub staggered: bool,
    pub stagger_lines: u32,
    pub max_color_shift_lines: u32,
    pub output_line_count: u32,
    pub output_line_bytes_raw: u64,
    pub output_line_bytes_requested: u64,
    pub output_total_bytes: u64,
    /// Logical bytes the consumer receives.
    pub total_bytes_to_read: u64,
    /// Physical bytes the ASIC will deliver.
    pub read_bytes_total: u64,
    pub buffers: BufferSizes,
}

impl OpticalLayout {
    /// Same sensor window: shading captured with `other` applies to `self`.
    /// Line count, depth and buffer sizing do not matter here.
    pub fn same_window(&self, other: &Self) -> bool {
        self.hwdpi == other.hwdpi
            && self.ccd_size_divisor == other.ccd_size_divisor
            && self.optical_resolution == other.optical_resolution
            && self.dpiset == other.dpiset
            && self.pixel_startx == other.pixel_startx
            && self.pixel_endx == other.pixel_endx
            && self.optical_pixels == other.optical_pixels
            && self.staggered == other.staggered
    }
}

/// Bytes for `pixels` samples of `channels x depth` bits, rounded up once.
pub fn line_bytes(pixels: u32, channels: u32, depth: u32) -> u64 {
    (u64::from(pixels) * u64::from(channels) * u64::from(depth)).div_ceil(8)
}

/// Geometry for `params` on `sensor`. `base_ydpi` is the motor's full-step
/// resolution, the unit of the sensor's line-distance table.
pub fn compute_layout(
    params: &ScanParams,
    sensor: &SensorDescriptor,
    base_ydpi: u32,
) -> Result<OpticalLayout> {
    if params.xres == 0 || params.yres == 0 {
        return Err(ScanError::InvalidGeometry("resolution must be non-zero".into()));
    }
    if params.lines == 0 {
        return Err(ScanError::InvalidGeometry("scan must cover at least one line".into()));
    }

    let hwdpi = sensor.hwdpi_for(params.xres);
    let ccd_size_divisor = sensor.ccd_size_divisor_for(params.xres);
    let optical_resolution = hwdpi / ccd_size_divisor;
    if params.xres > optical_resolution {
        return Err(ScanError::InvalidGeometry(format!(
            "{} dpi exceeds optical resolution {optical_resolution}",
            params.xres
        )));
    }

    let optical_pixels = align_up(
        crate::util::scale_ceil(params.pixels, optical_resolution, params.xres),
        2 * ccd_size_divisor,
    );
    let output_pixels = scale(optical_pixels, params.xres, optical_resolution);

    let ratio = sensor.pixel_count_ratio;
    let mut pixel_startx = scale(params.startx, optical_resolution, params.xres)
        .checked_add(sensor.dummy_pixel)
        .map(|x| ratio.apply(x))
        .ok_or_else(|| ScanError::InvalidGeometry(format!("start {} out of range", params.startx)))?;
    let mut pixel_endx = pixel_startx
        .checked_add(ratio.apply(optical_pixels))
        .ok_or_else(|| ScanError::InvalidGeometry("window end out of range".into()))?;

    let stagger_lines = if sensor.stagger_y > 0 && !params.flags.ignore_stagger_offset {
        scale(sensor.stagger_y, params.yres, sensor.full_resolution)
    } else {
        0
    };
    let staggered = stagger_lines > 0;
    if staggered && pixel_startx % 2 == 0 {
        pixel_startx = pixel_startx.saturating_add(1);
        pixel_endx = pixel_endx.saturating_add(1);
    }
    if pixel_endx > u32::from(u16::MAX) {
        return Err(ScanError::InvalidGeometry(format!(
            "end pixel {pixel_endx} does not fit the register"
        )));
    }

    let dpiset = params.xres * ccd_size_divisor;
    if dpiset == 0 {
        return Err(ScanError::InvalidGeometry("dpiset is zero".into()));
    }

    let max_color_shift_lines = if params.channels > 1 && !params.flags.ignore_color_offset {
        let ld = sensor.ld_shift.iter().copied().max().unwrap_or(0);
        scale(ld, params.yres, base_ydpi.max(1))
    } else {
        0
    };

    let output_line_count = params.lines + max_color_shift_lines + stagger_lines;
    let output_line_bytes_raw = line_bytes(output_pixels, params.channels, params.depth);
    let output_line_bytes_requested = line_bytes(params.pixels, params.channels, params.depth);
    let output_total_bytes = output_line_bytes_requested * u64::from(output_line_count);
    let total_bytes_to_read = output_line_bytes_requested * u64::from(params.lines);
    let read_bytes_total = output_line_bytes_raw * u64::from(output_line_count);

    // multiply before dividing so 1-bit rows do not truncate per pixel
    let extra_lines = u64::from(max_color_shift_lines + stagger_lines);
    let slack = extra_lines
        * u64::from(optical_pixels)
        * u64::from(params.channels)
        * u64::from(params.depth)
        / 8;
    let block = BLOCK_LINES * output_line_bytes_raw;
    let buffers = BufferSizes {
        read: 2 * block + slack,
        lines: 2 * block + slack,
        shrink: block,
        out: OUTPUT_BUFFER_LINES * output_line_bytes_requested,
    };
    if buffers.any_zero() {
        return Err(ScanError::InvalidGeometry(format!(
            "zero-sized pipeline buffer for {} pixels",
            params.pixels
        )));
    }

    Ok(OpticalLayout {
        hwdpi,
        ccd_size_divisor,
        optical_resolution,
        optical_pixels,
        output_pixels,
        pixel_startx,
        pixel_endx,
        dpiset,
        staggered,
        stagger_lines,
        max_color_shift_lines,
        output_line_count,
        output_line_bytes_raw,
        output_line_bytes_requested,
        output_total_bytes,
        total_bytes_to_read,
        read_bytes_total,
        buffers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::Ratio;
    use crate::session::{ScanFlags, ScanMode};

    fn params(xres: u32, pixels: u32, depth: u32, channels: u32) -> ScanParams {
        ScanParams {
            xres,
            yres: xres,
            startx: 0,
            starty: 0,
            pixels,
            lines: 100,
            depth,
            channels,
            mode: if channels == 3 { ScanMode::Color } else { ScanMode::Gray },
            ..ScanParams::default()
        }
    }

    #[test]
    fn half_resolution_mode_below_half_tier() {
        let sensor = SensorDescriptor {
            ccd_size_divisors: vec![2],
            ..SensorDescriptor::default()
        };
        let l = compute_layout(&params(300, 2550, 8, 3), &sensor, 1200).unwrap();
        assert_eq!(l.hwdpi, 600);
        assert_eq!(l.ccd_size_divisor, 2);
        assert_eq!(l.optical_resolution, 300);
        assert_eq!(l.optical_pixels, 2552);
        assert_eq!(l.dpiset, 600);
    }

    #[test]
    fn dummy_pixel_and_ratio_shift_start() {
        let sensor = SensorDescriptor {
            dummy_pixel: 10,
            pixel_count_ratio: Ratio::new(2, 1),
            ..SensorDescriptor::default()
        };
        let mut p = params(600, 100, 8, 1);
        p.startx = 50;
        let l = compute_layout(&p, &sensor, 1200).unwrap();
        assert_eq!(l.pixel_startx, 2 * (50 + 10));
        assert_eq!(l.pixel_endx, l.pixel_startx + 2 * l.optical_pixels);
    }

    #[test]
    fn staggered_start_is_odd() {
        let sensor = SensorDescriptor {
            stagger_y: 4,
            dummy_pixel: 16,
            ..SensorDescriptor::default()
        };
        let l = compute_layout(&params(1200, 1000, 8, 1), &sensor, 1200).unwrap();
        assert!(l.staggered);
        assert_eq!(l.pixel_startx % 2, 1);
        assert_eq!(l.stagger_lines, 4);
        assert_eq!(l.output_line_count, 104);

        let mut p = params(1200, 1000, 8, 1);
        p.flags = ScanFlags {
            ignore_stagger_offset: true,
            ..ScanFlags::default()
        };
        let l = compute_layout(&p, &sensor, 1200).unwrap();
        assert!(!l.staggered);
        assert_eq!(l.pixel_startx, 16);
    }

    #[test]
    fn color_shift_scales_with_yres() {
        let sensor = SensorDescriptor {
            ld_shift: [0, 12, 24],
            ..SensorDescriptor::default()
        };
        let l = compute_layout(&params(600, 500, 8, 3), &sensor, 1200).unwrap();
        assert_eq!(l.max_color_shift_lines, 12);
        let gray = compute_layout(&params(600, 500, 8, 1), &sensor, 1200).unwrap();
        assert_eq!(gray.max_color_shift_lines, 0);
    }

    #[test]
    fn lineart_rounds_once_per_line() {
        let l = compute_layout(&params(600, 1700, 1, 1), &SensorDescriptor::default(), 1200)
            .unwrap();
        assert_eq!(l.output_line_bytes_requested, 213);
    }

    #[test]
    fn too_high_resolution_is_rejected() {
        let err = compute_layout(&params(2400, 100, 8, 1), &SensorDescriptor::default(), 1200)
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidGeometry(_)));
    }

    #[test]
    fn huge_start_is_rejected() {
        let mut p = params(600, 100, 8, 1);
        p.startx = u32::MAX;
        let sensor = SensorDescriptor {
            dummy_pixel: 16,
            ..SensorDescriptor::default()
        };
        let err = compute_layout(&p, &sensor, 1200).unwrap_err();
        assert!(matches!(err, ScanError::InvalidGeometry(_)));
    }

    #[test]
    fn window_match_ignores_lines_and_depth() {
        let sensor = SensorDescriptor::default();
        let mut cal = params(600, 1000, 16, 3);
        cal.lines = 32;
        let a = compute_layout(&cal, &sensor, 1200).unwrap();
        let mut scan = params(600, 1000, 8, 3);
        scan.lines = 1000;
        let b = compute_layout(&scan, &sensor, 1200).unwrap();
        assert_ne!(a, b);
        assert!(a.same_window(&b));

        let wider = compute_layout(&params(600, 1200, 8, 3), &sensor, 1200).unwrap();
        assert!(!a.same_window(&wider));
    }

    #[test]
    fn empty_window_is_rejected() {
        let err = compute_layout(&params(600, 0, 8, 3), &SensorDescriptor::default(), 1200)
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidGeometry(_)));
    }
}
