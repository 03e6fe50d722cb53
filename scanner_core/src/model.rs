//! Per-model description: sensors, motor, frontend and GPIO wiring.

use crate::afe::Frontend;
use crate::motor::MotorDescriptor;
use crate::register::RegisterSet;
use crate::sensor::SensorDescriptor;

const MM_PER_INCH: f32 = 25.4;

#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub name: String,
    pub sensors: Vec<SensorDescriptor>,
    pub motor: MotorDescriptor,
    /// Frontend values programmed at boot.
    pub frontend: Frontend,
    /// GPIO idle values, written in this order.
    pub gpio: RegisterSet,
    /// Overrides applied on top of the ASIC defaults at boot.
    pub custom_regs: RegisterSet,
    pub is_cis: bool,
    pub is_sheetfed: bool,
    pub disable_fast_feeding: bool,
    /// Distance scanned past the paper edge on sheet-fed models.
    pub post_scan_mm: f32,
    /// Lines captured when searching for the reference point.
    pub search_lines: u32,
}

impl ModelDescriptor {
    pub fn post_scan_lines(&self, yres: u32) -> u32 {
        (self.post_scan_mm * yres as f32 / MM_PER_INCH).max(0.0) as u32
    }
}
