//! Test and helper mocks for scanner_core

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use scanner_traits::{Clock, Transport, TransportResult};

use crate::afe::{Frontend, FrontendType};
use crate::model::ModelDescriptor;
use crate::motor::{MotorDescriptor, MotorProfile, MotorSlope, StepType};
use crate::register::RegisterSet;
use crate::sensor::{SensorDescriptor, SensorExposure};

/// Clock whose `sleep` advances virtual time instantly.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Virtual time slept so far.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn advance(&self, d: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += d;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

/// A transport whose every call fails; for error propagation tests.
#[derive(Debug, Default)]
pub struct FailingTransport;

fn unplugged<T>() -> TransportResult<T> {
    Err(Box::new(std::io::Error::other("transport unavailable")))
}

impl Transport for FailingTransport {
    fn read_register(&mut self, _address: u8) -> TransportResult<u8> {
        unplugged()
    }

    fn write_register(&mut self, _address: u8, _value: u8) -> TransportResult<()> {
        unplugged()
    }

    fn bulk_read(&mut self, _port: u8, _buf: &mut [u8]) -> TransportResult<()> {
        unplugged()
    }

    fn bulk_write(&mut self, _port: u8, _data: &[u8]) -> TransportResult<()> {
        unplugged()
    }
}

/// A 1200 dpi CCD flatbed with a Wolfson frontend, close enough to real
/// hardware to drive every engine path against the simulator.
pub fn demo_model() -> ModelDescriptor {
    let sensor = SensorDescriptor {
        full_resolution: 1200,
        sensor_pixels: 10_200,
        black_pixels: 48,
        dummy_pixel: 16,
        gain_white_ref: 210,
        exposure: SensorExposure::uniform(0x1000),
        gamma: [1.0, 1.0, 1.0],
        custom_fe_regs: vec![(0x04, 0x00)],
        ..SensorDescriptor::default()
    };
    let profile = |initial, max, steps, step_type, max_exposure| MotorProfile {
        slope: MotorSlope::create_from_steps(initial, max, steps),
        step_type,
        resolutions: Vec::new(),
        max_exposure,
    };
    ModelDescriptor {
        name: "demo-flatbed".into(),
        sensors: vec![sensor],
        motor: MotorDescriptor {
            base_ydpi: 1200,
            step_multiplier: 2,
            profiles: vec![
                profile(10_000, 1_500, 200, StepType::Half, 8_000),
                profile(12_000, 2_500, 200, StepType::Quarter, 0),
            ],
            fast_profiles: vec![profile(8_000, 500, 120, StepType::Full, 0)],
            power_mode_count: 1,
            ydpi_values: vec![75, 150, 300, 600, 1200],
        },
        frontend: Frontend {
            kind: FrontendType::Wolfson,
            regs: vec![(0x01, 0x03), (0x02, 0x20), (0x03, 0x2f)],
            offset: [0x70; 3],
            gain: [0x80; 3],
            sign: [0; 3],
        },
        gpio: RegisterSet::from_pairs(&[
            (0x6c, 0x00),
            (0x6d, 0x00),
            (0x6e, 0xff),
            (0x6f, 0x00),
            (0xa6, 0x00),
            (0xa7, 0x04),
            (0xa8, 0x00),
            (0xa9, 0x00),
        ]),
        custom_regs: RegisterSet::new(),
        is_cis: false,
        is_sheetfed: false,
        disable_fast_feeding: false,
        post_scan_mm: 0.0,
        search_lines: 100,
    }
}
