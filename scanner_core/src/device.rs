//! Device context: the single owner of everything the engine knows about
//! an attached scanner.

use std::sync::Arc;

use scanner_traits::{Clock, MonotonicClock, Transport};
use tracing::debug;

use crate::afe::Frontend;
use crate::config::EngineCfg;
use crate::error::{Result, ScanError};
use crate::gl843::{self, PORT_SLOPE_GAMMA, REG_RAM_ADDR_HI, REG_RAM_ADDR_LO};
use crate::model::ModelDescriptor;
use crate::optical::{BufferSizes, OpticalLayout};
use crate::register::{RegisterSet, pack_le16};
use crate::sensor::{SensorDescriptor, SensorExposure, find_sensor};
use crate::session::{ScanParams, ScanSession, SessionPlan, build_scan_session};
use crate::slope::{SlopeSlot, SlopeTable};
use crate::status::{EngineStatus, ScannerStatus};
use crate::transport_error::TransportResultExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScannerState {
    #[default]
    PoweredOff,
    ColdBoot,
    Idle,
    Scanning,
    Calibrating,
}

/// Byte budgets of the running scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteCounters {
    /// Logical bytes delivered so far.
    pub total_bytes_read: u64,
    /// Logical bytes the consumer will receive in total.
    pub total_bytes_to_read: u64,
    /// Physical bytes still to fetch from the ASIC.
    pub read_bytes_left: u64,
}

/// Pipeline storage, sized per session.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuffers {
    pub read: Vec<u8>,
    pub lines: Vec<u8>,
    pub shrink: Vec<u8>,
    pub out: Vec<u8>,
}

impl PipelineBuffers {
    fn with_sizes(sizes: &BufferSizes) -> Self {
        let cap = |n: u64| Vec::with_capacity(usize::try_from(n).unwrap_or(0));
        Self {
            read: cap(sizes.read),
            lines: cap(sizes.lines),
            shrink: cap(sizes.shrink),
            out: cap(sizes.out),
        }
    }
}

/// Calibration results kept between scans.
#[derive(Debug, Clone, Default)]
pub struct CalibrationCache {
    pub exposure: Option<SensorExposure>,
    /// Encoded shading RAM image.
    pub shading: Option<Vec<u8>>,
    /// Geometry the shading data was captured with.
    pub layout: Option<OpticalLayout>,
}

/// Result of the reference-point search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOffset {
    /// Left edge of the scan area, in full-resolution pixels.
    pub x: u32,
    /// Top edge, in lines at the search resolution.
    pub y: u32,
}

pub struct Device<T: Transport> {
    pub transport: T,
    pub model: ModelDescriptor,
    /// Last known-good register values.
    pub reg: RegisterSet,
    pub frontend: Frontend,
    pub session: Option<ScanSession>,
    pub counters: ByteCounters,
    pub pipeline: PipelineBuffers,
    /// Carriage distance from home, in motor full steps.
    pub head_pos: u32,
    /// A sheet is loaded (sheet-fed models).
    pub document: bool,
    pub state: ScannerState,
    pub calibration: CalibrationCache,
    pub start_offset: Option<StartOffset>,
    pub cfg: EngineCfg,
    /// Largest single bulk transfer for the negotiated link speed.
    pub bulk_chunk: usize,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<T: Transport> std::fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("model", &self.model.name)
            .field("state", &self.state)
            .field("head_pos", &self.head_pos)
            .field("document", &self.document)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Device<T> {
    pub fn new(transport: T, model: ModelDescriptor, cfg: EngineCfg) -> Self {
        Self::with_clock(transport, model, cfg, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        transport: T,
        model: ModelDescriptor,
        cfg: EngineCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let frontend = model.frontend.clone();
        Self {
            transport,
            model,
            reg: RegisterSet::new(),
            frontend,
            session: None,
            counters: ByteCounters::default(),
            pipeline: PipelineBuffers::default(),
            head_pos: 0,
            document: false,
            state: ScannerState::PoweredOff,
            calibration: CalibrationCache::default(),
            start_offset: None,
            cfg,
            bulk_chunk: bulk_chunk_for(scanner_traits::LinkSpeed::High),
            clock,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    /// Fail unless boot has completed.
    pub fn ensure_ready(&self, op: &str) -> Result<()> {
        match self.state {
            ScannerState::Idle | ScannerState::Scanning | ScannerState::Calibrating => Ok(()),
            other => Err(ScanError::InvalidState(format!("{op} while {other:?}"))),
        }
    }

    pub fn read_register(&mut self, address: u8) -> Result<u8> {
        self.transport
            .read_register(address)
            .during("read register")
    }

    pub fn write_register(&mut self, address: u8, value: u8) -> Result<()> {
        self.transport
            .write_register(address, value)
            .during("write register")
    }

    pub fn write_register_pairs(&mut self, pairs: &[(u8, u8)]) -> Result<()> {
        self.transport
            .write_registers(pairs)
            .during("write registers")
    }

    pub fn write_registers(&mut self, regs: &RegisterSet) -> Result<()> {
        regs.write_to(&mut self.transport)
    }

    pub fn scanner_status(&mut self) -> Result<ScannerStatus> {
        Ok(ScannerStatus(self.read_register(gl843::REG41)?))
    }

    pub fn engine_status(&mut self) -> Result<EngineStatus> {
        Ok(EngineStatus(self.read_register(gl843::REG40)?))
    }

    /// Sensor entry for `dpi`/`channels` with calibrated exposure applied.
    pub fn sensor(&self, dpi: u32, channels: u32) -> Result<SensorDescriptor> {
        let mut sensor = find_sensor(&self.model.sensors, dpi, channels)?.clone();
        if let Some(exposure) = self.calibration.exposure {
            sensor.exposure = exposure;
        }
        Ok(sensor)
    }

    /// Resolution calibration scans run at.
    pub fn calibration_dpi(&self) -> u32 {
        let full = self
            .model
            .sensors
            .iter()
            .map(|s| s.full_resolution)
            .max()
            .unwrap_or(600);
        full.min(600)
    }

    /// Build a session on top of `base`.
    pub fn build_scan_session(&self, params: &ScanParams, base: &RegisterSet) -> Result<SessionPlan> {
        let sensor = self.sensor(params.xres, params.channels)?;
        build_scan_session(&self.model, &sensor, params, base, &self.cfg.motion)
    }

    /// Build `params` into `regs`, upload its slope tables and make it the
    /// current session. Registers are not written.
    pub fn setup_session(&mut self, regs: &mut RegisterSet, params: &ScanParams) -> Result<ScanSession> {
        let plan = self.build_scan_session(params, regs)?;
        regs.merge(&plan.registers);
        for (slot, table) in &plan.slopes {
            self.write_slope_table(*slot, table)?;
        }
        let session = plan.session;
        self.counters = ByteCounters {
            total_bytes_read: 0,
            total_bytes_to_read: session.layout.total_bytes_to_read,
            read_bytes_left: session.layout.read_bytes_total,
        };
        self.pipeline = PipelineBuffers::with_sizes(&session.layout.buffers);
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Write `data` to ASIC RAM at `address` through `port`.
    pub fn write_ram(&mut self, port: u8, address: u32, data: &[u8]) -> Result<()> {
        let hi = ((address >> 12) & 0xff) as u8;
        let lo = ((address >> 4) & 0xff) as u8;
        self.write_register_pairs(&[(REG_RAM_ADDR_HI, hi), (REG_RAM_ADDR_LO, lo)])?;
        self.transport.bulk_write(port, data).during("bulk write")
    }

    pub fn write_slope_table(&mut self, slot: SlopeSlot, table: &SlopeTable) -> Result<()> {
        let words = table.expanded(self.cfg.motion.max_slope_steps);
        debug!(slot = ?slot, steps = table.steps_count(), "uploading slope table");
        self.write_ram(PORT_SLOPE_GAMMA, slot.ram_address(), &pack_le16(&words))
    }

    /// Whether stored shading data was captured with this geometry.
    pub fn calibration_cache_matches(&self, session: &ScanSession) -> bool {
        self.calibration
            .layout
            .as_ref()
            .is_some_and(|l| l.same_window(&session.layout))
    }
}

/// Bulk chunk size for a link speed.
pub fn bulk_chunk_for(speed: scanner_traits::LinkSpeed) -> usize {
    match speed {
        scanner_traits::LinkSpeed::High => 0xeff0,
        scanner_traits::LinkSpeed::Full => 0x1000,
    }
}
