//! Chip-family entry points, as seen by the orchestration layer.
//!
//! Each method forwards to the free functions of the sequencer and
//! calibration modules; another ASIC family would supply its own impl.

use scanner_traits::Transport;

use crate::calibration::{self, CalibrationKind};
use crate::device::{Device, StartOffset};
use crate::error::Result;
use crate::search;
use crate::sensor::SensorExposure;
use crate::sequencer;
use crate::session::{ScanParams, SessionPlan};
use crate::shading;

pub trait CommandSet<T: Transport> {
    fn boot(&self, dev: &mut Device<T>, cold: bool) -> Result<()>;
    fn begin_scan(&self, dev: &mut Device<T>, start_motor: bool) -> Result<()>;
    fn end_scan(&self, dev: &mut Device<T>) -> Result<()>;
    fn build_scan_session(&self, dev: &Device<T>, params: &ScanParams) -> Result<SessionPlan>;
    fn build_calibration_session(
        &self,
        dev: &Device<T>,
        kind: CalibrationKind,
        dpi: u32,
    ) -> Result<SessionPlan>;
    fn feed(&self, dev: &mut Device<T>, steps: u32) -> Result<()>;
    fn slow_back_home(&self, dev: &mut Device<T>, wait: bool) -> Result<()>;
    fn search_start_position(&self, dev: &mut Device<T>) -> Result<StartOffset>;
    fn get_paper_sensor(&self, dev: &mut Device<T>) -> Result<bool>;
    fn detect_document_end(&self, dev: &mut Device<T>) -> Result<()>;
    fn led_calibration(&self, dev: &mut Device<T>) -> Result<SensorExposure>;
    fn offset_calibration(&self, dev: &mut Device<T>) -> Result<()>;
    fn gain_calibration(&self, dev: &mut Device<T>, dpi: u32) -> Result<()>;
    fn shading_calibration(&self, dev: &mut Device<T>, dpi: u32) -> Result<()>;
}

/// GL843 command set.
#[derive(Debug, Default, Clone, Copy)]
pub struct Gl843;

impl<T: Transport> CommandSet<T> for Gl843 {
    fn boot(&self, dev: &mut Device<T>, cold: bool) -> Result<()> {
        sequencer::boot(dev, cold)
    }

    fn begin_scan(&self, dev: &mut Device<T>, start_motor: bool) -> Result<()> {
        sequencer::begin_scan(dev, start_motor)
    }

    fn end_scan(&self, dev: &mut Device<T>) -> Result<()> {
        sequencer::end_scan(dev)
    }

    fn build_scan_session(&self, dev: &Device<T>, params: &ScanParams) -> Result<SessionPlan> {
        dev.build_scan_session(params, &dev.reg)
    }

    fn build_calibration_session(
        &self,
        dev: &Device<T>,
        kind: CalibrationKind,
        dpi: u32,
    ) -> Result<SessionPlan> {
        calibration::build_calibration_session(dev, kind, dpi)
    }

    fn feed(&self, dev: &mut Device<T>, steps: u32) -> Result<()> {
        sequencer::feed(dev, steps)
    }

    fn slow_back_home(&self, dev: &mut Device<T>, wait: bool) -> Result<()> {
        sequencer::slow_back_home(dev, wait)
    }

    fn search_start_position(&self, dev: &mut Device<T>) -> Result<StartOffset> {
        search::search_start_position(dev)
    }

    fn get_paper_sensor(&self, dev: &mut Device<T>) -> Result<bool> {
        sequencer::get_paper_sensor(dev)
    }

    fn detect_document_end(&self, dev: &mut Device<T>) -> Result<()> {
        sequencer::detect_document_end(dev)
    }

    fn led_calibration(&self, dev: &mut Device<T>) -> Result<SensorExposure> {
        calibration::led_calibration(dev)
    }

    fn offset_calibration(&self, dev: &mut Device<T>) -> Result<()> {
        calibration::offset_calibration(dev)
    }

    fn gain_calibration(&self, dev: &mut Device<T>, dpi: u32) -> Result<()> {
        calibration::gain_calibration(dev, dpi)
    }

    fn shading_calibration(&self, dev: &mut Device<T>, dpi: u32) -> Result<()> {
        shading::shading_calibration(dev, dpi)
    }
}
