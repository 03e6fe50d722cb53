//! Locate the scan area origin from the calibration target's black
//! margin and top stripe.

use scanner_traits::Transport;
use tracing::{debug, info};

use crate::calibration::{calibrating, capture};
use crate::device::{Device, StartOffset};
use crate::error::{Result, ScanError};
use crate::image::RawImage;
use crate::sequencer::slow_back_home;
use crate::session::{ScanFlags, ScanMode, ScanParams};

pub const SEARCH_DPI: u32 = 300;
pub const SEARCH_PIXELS: u32 = 600;

/// Rows sampled for the left margin.
const MARGIN_ROWS: std::ops::Range<u32> = 2..11;
/// Columns skipped at the left edge.
const MARGIN_SKIP: u32 = 8;

struct Plane {
    width: usize,
    height: usize,
    px: Vec<u32>,
}

impl Plane {
    fn at(&self, x: usize, y: usize) -> u32 {
        self.px[y * self.width + x]
    }

    fn from_image(image: &RawImage) -> Self {
        let (width, height) = (image.width as usize, image.height as usize);
        let mut px = Vec::with_capacity(width * height);
        for y in 0..image.height {
            for x in 0..image.width {
                px.push(u32::from(image.sample(x, y, 0)));
            }
        }
        Self { width, height, px }
    }

    /// 1-2-1 weighted 3x3 blur of the interior; borders are kept.
    fn smoothed(&self) -> Self {
        let mut out = self.px.clone();
        for y in 1..self.height.saturating_sub(1) {
            for x in 1..self.width.saturating_sub(1) {
                let sum = self.at(x - 1, y - 1)
                    + 2 * self.at(x, y - 1)
                    + self.at(x + 1, y - 1)
                    + 2 * self.at(x - 1, y)
                    + 4 * self.at(x, y)
                    + 2 * self.at(x + 1, y)
                    + self.at(x - 1, y + 1)
                    + 2 * self.at(x, y + 1)
                    + self.at(x + 1, y + 1);
                out[y * self.width + x] = sum / 16;
            }
        }
        Self {
            width: self.width,
            height: self.height,
            px: out,
        }
    }

    /// Absolute Sobel response clamped to 255, and its maximum.
    fn sobel(&self, horizontal: bool) -> (Self, u32) {
        let mut out = vec![0u32; self.px.len()];
        let mut max = 0;
        for y in 1..self.height.saturating_sub(1) {
            for x in 1..self.width.saturating_sub(1) {
                let p = |dx: usize, dy: usize| i64::from(self.at(x + dx - 1, y + dy - 1));
                let v = if horizontal {
                    -p(0, 0) + p(2, 0) - 2 * p(0, 1) + 2 * p(2, 1) - p(0, 2) + p(2, 2)
                } else {
                    -p(0, 0) - 2 * p(1, 0) - p(2, 0) + p(0, 2) + 2 * p(1, 2) + p(2, 2)
                };
                let v = v.unsigned_abs().min(255) as u32;
                max = max.max(v);
                out[y * self.width + x] = v;
            }
        }
        let plane = Self {
            width: self.width,
            height: self.height,
            px: out,
        };
        (plane, max)
    }
}

/// Left margin (pixels) and top edge (lines) of the reference pattern in
/// a gray search image.
pub fn find_reference_point(image: &RawImage) -> Result<(u32, u32)> {
    if image.width < 2 * MARGIN_SKIP + 2 || image.height < MARGIN_ROWS.end {
        return Err(ScanError::InvalidGeometry(format!(
            "search image {}x{} too small",
            image.width, image.height
        )));
    }
    let smooth = Plane::from_image(image).smoothed();
    let (w, h) = (smooth.width, smooth.height);

    let (edges, max) = smooth.sobel(true);
    let level = max / 3;
    let mut left = 0usize;
    for y in MARGIN_ROWS {
        let mut x = MARGIN_SKIP as usize;
        while x < w / 2 && edges.at(x, y as usize) < level {
            x += 1;
        }
        left += x;
    }
    let left = left / MARGIN_ROWS.len();

    let (edges, max) = smooth.sobel(false);
    let level = max / 3;
    let mut top = 0usize;
    let columns = w / 2..w - 1;
    for x in columns.clone() {
        let mut y = 2;
        while y < h && edges.at(x, y) < level {
            y += 1;
        }
        top += y;
    }
    let top = top / columns.len().max(1);

    debug!(left, top, "reference point");
    Ok((left as u32, top as u32))
}

/// Scan the reference area and record the scan origin.
pub fn search_start_position<T: Transport>(dev: &mut Device<T>) -> Result<StartOffset> {
    calibrating(dev, "search start position", |dev| {
        let params = ScanParams {
            xres: SEARCH_DPI,
            yres: SEARCH_DPI,
            startx: 0,
            starty: 0,
            pixels: SEARCH_PIXELS,
            lines: dev.model.search_lines,
            depth: 8,
            channels: 1,
            mode: ScanMode::Gray,
            flags: ScanFlags {
                disable_shading: true,
                disable_gamma: true,
                ignore_stagger_offset: true,
                ignore_color_offset: true,
                ..ScanFlags::default()
            },
            ..ScanParams::default()
        };
        let full_resolution = dev.sensor(SEARCH_DPI, 1)?.full_resolution;
        let image = capture(dev, &params, true)?;
        let (left, top) = find_reference_point(&image)?;

        let offset = StartOffset {
            x: crate::util::scale(left, full_resolution, SEARCH_DPI),
            y: top,
        };
        dev.start_offset = Some(offset);
        info!(x = offset.x, y = offset.y, "start position found");

        slow_back_home(dev, true)?;
        Ok(offset)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White target with a black left margin and a black top stripe over
    /// the right half.
    fn target(width: u32, height: u32, margin: u32, stripe: u32) -> RawImage {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let black = x < margin || (y < stripe && x >= width / 2);
                data.push(if black { 10 } else { 220 });
            }
        }
        RawImage::new(width, height, 1, 8, data).unwrap()
    }

    #[test]
    fn finds_margin_and_stripe() {
        let (left, top) = find_reference_point(&target(200, 60, 40, 25)).unwrap();
        assert!(left.abs_diff(40) <= 3, "left {left}");
        assert!(top.abs_diff(25) <= 3, "top {top}");
    }

    #[test]
    fn tiny_image_is_rejected() {
        let img = RawImage::new(10, 4, 1, 8, vec![0; 40]).unwrap();
        assert!(matches!(
            find_reference_point(&img),
            Err(ScanError::InvalidGeometry(_))
        ));
    }
}
