//! Raw image lines captured during calibration and search scans.

use crate::error::{Result, ScanError};

/// Pixel-interleaved raw image. 16-bit samples are little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub depth: u32,
    pub data: Vec<u8>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, channels: u32, depth: u32, data: Vec<u8>) -> Result<Self> {
        if !matches!(depth, 8 | 16) {
            return Err(ScanError::InvalidGeometry(format!(
                "cannot analyse {depth}-bit data"
            )));
        }
        let needed = width as usize * height as usize * channels as usize * (depth as usize / 8);
        if data.len() < needed {
            return Err(ScanError::InvalidGeometry(format!(
                "image needs {needed} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            depth,
            data,
        })
    }

    pub fn sample(&self, x: u32, y: u32, ch: u32) -> u16 {
        let idx = (y as usize * self.width as usize + x as usize) * self.channels as usize + ch as usize;
        if self.depth == 16 {
            u16::from_le_bytes([self.data[idx * 2], self.data[idx * 2 + 1]])
        } else {
            u16::from(self.data[idx])
        }
    }

    /// Mean of channel `ch` over line `y`.
    pub fn line_mean(&self, y: u32, ch: u32) -> f64 {
        if self.width == 0 {
            return 0.0;
        }
        let sum: u64 = (0..self.width).map(|x| u64::from(self.sample(x, y, ch))).sum();
        sum as f64 / f64::from(self.width)
    }

    /// Mean of channel `ch` over the first `black_pixels` columns,
    /// skipping line 0.
    pub fn dark_average(&self, ch: u32, black_pixels: u32) -> f64 {
        let cols = black_pixels.clamp(1, self.width.max(1));
        let mut sum = 0u64;
        let mut count = 0u64;
        for y in 1..self.height {
            for x in 0..cols.min(self.width) {
                sum += u64::from(self.sample(x, y, ch));
                count += 1;
            }
        }
        if count == 0 { 0.0 } else { sum as f64 / count as f64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_bit_samples_are_little_endian() {
        let img = RawImage::new(1, 1, 3, 16, vec![0x34, 0x12, 0, 1, 0xff, 0xff]).unwrap();
        assert_eq!(img.sample(0, 0, 0), 0x1234);
        assert_eq!(img.sample(0, 0, 1), 0x0100);
        assert_eq!(img.sample(0, 0, 2), 0xffff);
    }

    #[test]
    fn dark_average_skips_first_line() {
        // 2 px wide, 3 lines, gray; first line is bright
        let img = RawImage::new(2, 3, 1, 8, vec![200, 200, 10, 99, 20, 99]).unwrap();
        assert!((img.dark_average(0, 1) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(RawImage::new(4, 4, 3, 8, vec![0; 10]).is_err());
    }
}
