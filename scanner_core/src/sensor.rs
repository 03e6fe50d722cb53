//! Sensor descriptors and lookup.

use crate::error::{Result, ScanError};
use crate::register::RegisterSet;

/// Hardware dpi tiers the ASIC can sample at.
pub const HWDPI_TIERS: [u32; 4] = [600, 1200, 2400, 4800];

/// `multiplier / divisor` scaling between logical and physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub multiplier: u32,
    pub divisor: u32,
}

impl Ratio {
    pub const ONE: Ratio = Ratio {
        multiplier: 1,
        divisor: 1,
    };

    pub fn new(multiplier: u32, divisor: u32) -> Self {
        Self {
            multiplier,
            divisor: divisor.max(1),
        }
    }

    pub fn apply(self, value: u32) -> u32 {
        crate::util::scale(value, self.multiplier, self.divisor)
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Self::ONE
    }
}

/// Per-channel exposure in pixel-clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorExposure {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

impl SensorExposure {
    pub fn uniform(v: u16) -> Self {
        Self {
            red: v,
            green: v,
            blue: v,
        }
    }

    pub fn as_array(self) -> [u16; 3] {
        [self.red, self.green, self.blue]
    }

    pub fn from_array(v: [u16; 3]) -> Self {
        Self {
            red: v[0],
            green: v[1],
            blue: v[2],
        }
    }

    pub fn max(self) -> u16 {
        self.red.max(self.green).max(self.blue)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescriptor {
    /// Native optical resolution.
    pub full_resolution: u32,
    /// Requested x resolutions this entry serves; empty means all.
    pub resolutions: Vec<u32>,
    /// Channel counts this entry serves; empty means all.
    pub channels: Vec<u32>,
    /// CCD-size divisors the sensor supports, besides 1.
    pub ccd_size_divisors: Vec<u32>,
    pub sensor_pixels: u32,
    /// Pixels of optical black at the start of the line.
    pub black_pixels: u32,
    pub dummy_pixel: u32,
    pub pixel_count_ratio: Ratio,
    /// Target white level for gain calibration (8-bit scale).
    pub gain_white_ref: u32,
    pub exposure: SensorExposure,
    /// Fixed line period; `None` derives it from the motor and window.
    pub exposure_lperiod: Option<u32>,
    /// Lines between odd and even rows on staggered sensors, at full resolution.
    pub stagger_y: u32,
    /// Per-channel line distance at the motor base resolution.
    pub ld_shift: [u32; 3],
    pub gamma: [f32; 3],
    pub custom_regs: RegisterSet,
    pub custom_fe_regs: Vec<(u8, u16)>,
}

impl Default for SensorDescriptor {
    fn default() -> Self {
        Self {
            full_resolution: 1200,
            resolutions: Vec::new(),
            channels: Vec::new(),
            ccd_size_divisors: Vec::new(),
            sensor_pixels: 10_200,
            black_pixels: 48,
            dummy_pixel: 16,
            pixel_count_ratio: Ratio::ONE,
            gain_white_ref: 210,
            exposure: SensorExposure::uniform(0x2000),
            exposure_lperiod: None,
            stagger_y: 0,
            ld_shift: [0, 0, 0],
            gamma: [1.0, 1.0, 1.0],
            custom_regs: RegisterSet::new(),
            custom_fe_regs: Vec::new(),
        }
    }
}

impl SensorDescriptor {
    fn serves_resolution(&self, dpi: u32) -> bool {
        self.resolutions.is_empty() || self.resolutions.contains(&dpi)
    }

    fn serves_channels(&self, channels: u32) -> bool {
        self.channels.is_empty() || self.channels.contains(&channels)
    }

    /// Distance from `dpi` to the closest resolution this entry serves.
    fn resolution_distance(&self, dpi: u32) -> u32 {
        self.resolutions
            .iter()
            .map(|r| r.abs_diff(dpi))
            .min()
            .unwrap_or(0)
    }

    pub fn supports_ccd_divisor(&self, divisor: u32) -> bool {
        divisor == 1 || self.ccd_size_divisors.contains(&divisor)
    }

    /// Smallest hardware tier `>= xres`, limited to the optical maximum.
    pub fn hwdpi_for(&self, xres: u32) -> u32 {
        HWDPI_TIERS
            .iter()
            .copied()
            .filter(|&t| t <= self.full_resolution)
            .find(|&t| t >= xres)
            .unwrap_or(self.full_resolution)
    }

    /// Largest supported divisor `d` in {4, 2, 1} with `xres * d <= hwdpi`.
    pub fn ccd_size_divisor_for(&self, xres: u32) -> u32 {
        let hwdpi = self.hwdpi_for(xres);
        [4, 2]
            .into_iter()
            .find(|&d| self.supports_ccd_divisor(d) && xres.saturating_mul(d) <= hwdpi)
            .unwrap_or(1)
    }

    /// Black margin width in pixels at `dpi`.
    pub fn black_pixels_at(&self, dpi: u32) -> u32 {
        crate::util::scale(self.black_pixels, dpi, self.full_resolution)
    }
}

/// Pick the sensor entry for `dpi` and `channels`.
///
/// Exact matches win; otherwise the entry whose resolution list is closest
/// to `dpi`. Entries matching `channels` are preferred over the rest.
pub fn find_sensor(
    sensors: &[SensorDescriptor],
    dpi: u32,
    channels: u32,
) -> Result<&SensorDescriptor> {
    if sensors.is_empty() {
        return Err(ScanError::UnsupportedConfiguration(
            "model has no sensor table".into(),
        ));
    }
    if let Some(s) = sensors
        .iter()
        .find(|s| s.serves_resolution(dpi) && s.serves_channels(channels))
    {
        return Ok(s);
    }
    let with_channels: Vec<&SensorDescriptor> =
        sensors.iter().filter(|s| s.serves_channels(channels)).collect();
    let pool: Vec<&SensorDescriptor> = if with_channels.is_empty() {
        sensors.iter().collect()
    } else {
        with_channels
    };
    pool.into_iter()
        .min_by_key(|s| s.resolution_distance(dpi))
        .ok_or_else(|| {
            ScanError::UnsupportedConfiguration(format!("no sensor for {dpi} dpi"))
        })
}
