//! Scan sessions: one immutable description of a scan and the register
//! values and slope tables that implement it.

use tracing::debug;

use crate::config::MotionCfg;
use crate::error::{Result, ScanError};
use crate::gl843::{
    self, REG01, REG01_CISSET, REG01_DVDSET, REG01_SCAN, REG01_SHDAREA, REG01_STAGGER, REG02,
    REG02_ACDCDIS, REG02_AGOHOME, REG02_FASTFED, REG02_MTRPWR, REG02_MTRREV, REG03,
    REG03_LAMPPWR, REG04, REG04_BITSET, REG04_FILTER, REG04_LINEART, REG05, REG05_DPIHW,
    REG05_GMMENB, REG18, REG18_CKSEL, REG67, REG68, REG9D, REG9D_STEPTIM, REG_STEPSEL,
};
use crate::model::ModelDescriptor;
use crate::motor::{StepType, select_profile};
use crate::optical::{OpticalLayout, compute_layout};
use crate::register::RegisterSet;
use crate::sensor::SensorDescriptor;
use crate::slope::{
    SlopeSlot, SlopeTable, compute_z1_mod, compute_z2_mod, create_slope_table,
    create_slope_table_fastest,
};
use crate::util::clamp_u16;

/// Above this y resolution the motor phase registers stay zero.
const ZMOD_MAX_YRES: u32 = 600;
/// Added to the end pixel to get the shortest usable line period.
const LPERIOD_MARGIN: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    Lineart,
    Halftone,
    Gray,
    #[default]
    Color,
}

/// Channel captured by single-channel scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorFilter {
    Red,
    #[default]
    Green,
    Blue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanFlags {
    pub disable_shading: bool,
    pub disable_gamma: bool,
    pub disable_lamp: bool,
    pub ignore_stagger_offset: bool,
    pub ignore_color_offset: bool,
    pub single_line: bool,
    /// Motor move only; no image data and the lamp stays off.
    pub feeding: bool,
    pub reverse: bool,
    pub auto_go_home: bool,
    pub disable_buffer_full_move: bool,
    /// Lineart thresholded in software from an 8-bit gray pass.
    pub dynamic_lineart: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    pub xres: u32,
    pub yres: u32,
    /// Left edge in `xres` pixels.
    pub startx: u32,
    /// Distance to the first line, in motor full steps.
    pub starty: u32,
    pub pixels: u32,
    pub lines: u32,
    pub depth: u32,
    pub channels: u32,
    pub mode: ScanMode,
    pub color_filter: ColorFilter,
    pub flags: ScanFlags,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            xres: 300,
            yres: 300,
            startx: 0,
            starty: 0,
            pixels: 0,
            lines: 0,
            depth: 8,
            channels: 3,
            mode: ScanMode::Color,
            color_filter: ColorFilter::Green,
            flags: ScanFlags::default(),
        }
    }
}

impl ScanParams {
    /// Resolve implied settings: dynamic lineart scans 8-bit gray, and
    /// 16-bit data bypasses the hardware gamma table.
    pub fn normalized(&self) -> Result<ScanParams> {
        let mut p = *self;
        if p.mode == ScanMode::Lineart && p.flags.dynamic_lineart {
            p.depth = 8;
            p.channels = 1;
        }
        if p.depth == 16 {
            p.flags.disable_gamma = true;
        }
        if p.flags.single_line {
            p.lines = 1;
        }
        if !matches!(p.depth, 1 | 8 | 16) {
            return Err(ScanError::InvalidGeometry(format!("unsupported depth {}", p.depth)));
        }
        if !matches!(p.channels, 1 | 3) {
            return Err(ScanError::InvalidGeometry(format!(
                "unsupported channel count {}",
                p.channels
            )));
        }
        Ok(p)
    }
}

/// Motor side of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionPlan {
    pub step_type: StepType,
    pub fast_step_type: StepType,
    pub step_multiplier: u32,
    /// Scan ramp length in motor steps.
    pub scan_steps: u32,
    pub fast_steps: u32,
    pub use_fast_feed: bool,
    /// FEEDL, in microsteps.
    pub feed_steps: u32,
    pub z1: u32,
    pub z2: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSession {
    pub params: ScanParams,
    pub layout: OpticalLayout,
    /// Line period in pixel-clock ticks.
    pub exposure: u32,
    pub motion: MotionPlan,
}

/// A built session plus what must be sent to the device to run it.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub session: ScanSession,
    /// Register values to merge into the live snapshot.
    pub registers: RegisterSet,
    pub slopes: Vec<(SlopeSlot, SlopeTable)>,
}

/// Line period for a session. A sensor with a fixed period keeps it.
pub fn compute_exposure(
    model: &ModelDescriptor,
    sensor: &SensorDescriptor,
    layout: &OpticalLayout,
    yres: u32,
) -> u32 {
    if let Some(lperiod) = sensor.exposure_lperiod {
        return lperiod;
    }
    let mut exposure = layout.pixel_endx + LPERIOD_MARGIN;
    exposure = exposure.max(model.motor.min_exposure_for(yres));
    if model.is_cis {
        exposure = exposure.max(u32::from(sensor.exposure.max()));
    }
    exposure
}

/// Whether to reposition with the fast table, and the resulting FEEDL.
///
/// Fast feeding needs room for the fast ramp twice (accelerate and stop)
/// plus the slow ramp; shorter moves always go slow.
pub fn plan_feed(
    feed: u32,
    step_type: StepType,
    scan_table: &SlopeTable,
    fast_table: &SlopeTable,
    step_multiplier: u32,
    exposure_per_step: u64,
    fast_allowed: bool,
) -> (bool, u32) {
    let mult = step_multiplier.max(1);
    let slow_steps = scan_table.steps_count() as u32 / mult;
    let fast_steps = fast_table.steps_count() as u32 / mult;
    let slow_shifted = slow_steps >> step_type.shift();
    let fast_min = 2 * fast_steps + slow_shifted;

    let use_fast = if !fast_allowed || feed < fast_min {
        false
    } else {
        let fast_time = u64::from(fast_table.last()) * u64::from(feed - fast_min)
            + 2 * fast_table.pixeltime_sum
            + scan_table.pixeltime_sum;
        let slow_time = exposure_per_step * u64::from(feed - slow_shifted)
            + scan_table.pixeltime_sum;
        fast_time < slow_time
    };

    let consumed = slow_steps + if use_fast { 2 * fast_steps } else { 0 };
    let feedl = (feed << step_type.shift()).saturating_sub(consumed).max(1);
    (use_fast, feedl)
}

/// Build the session for `params` on `sensor`.
///
/// `base` is the live register snapshot; bit fields not owned by the
/// session keep their current values.
pub fn build_scan_session(
    model: &ModelDescriptor,
    sensor: &SensorDescriptor,
    params: &ScanParams,
    base: &RegisterSet,
    cfg: &MotionCfg,
) -> Result<SessionPlan> {
    let params = params.normalized()?;
    let motor = &model.motor;
    let layout = compute_layout(&params, sensor, motor.base_ydpi)?;
    let exposure = compute_exposure(model, sensor, &layout, params.yres);

    let profile = select_profile(&motor.profiles, exposure, params.yres)?;
    let fast_profiles = if motor.fast_profiles.is_empty() {
        &motor.profiles
    } else {
        &motor.fast_profiles
    };
    let fast_profile = select_profile(fast_profiles, 0, motor.lowest_ydpi())?;

    let mult = motor.step_multiplier.max(1);
    let scan_table = create_slope_table(
        &profile.slope,
        params.yres,
        exposure,
        motor.base_ydpi,
        profile.step_type,
        mult,
        cfg.max_slope_steps,
    );
    let fast_table = create_slope_table_fastest(
        &fast_profile.slope,
        fast_profile.step_type,
        mult,
        cfg.max_slope_steps,
    );

    let exposure_per_step =
        u64::from(exposure) * u64::from(params.yres) / u64::from(motor.base_ydpi.max(1));
    let fast_allowed = !cfg.disable_fast_feed && !model.disable_fast_feeding;
    let (use_fast_feed, feed_steps) = plan_feed(
        params.starty,
        profile.step_type,
        &scan_table,
        &fast_table,
        mult,
        exposure_per_step,
        fast_allowed,
    );

    let scan_steps = scan_table.steps_count() as u32 / mult;
    let fast_steps = fast_table.steps_count() as u32 / mult;
    let (z1, z2) = if params.yres > ZMOD_MAX_YRES {
        (0, 0)
    } else {
        let n = scan_table.steps_count();
        (
            compute_z1_mod(&scan_table, n, 1, exposure),
            compute_z2_mod(&scan_table, n, feed_steps, use_fast_feed, exposure),
        )
    };

    let motion = MotionPlan {
        step_type: profile.step_type,
        fast_step_type: fast_profile.step_type,
        step_multiplier: mult,
        scan_steps,
        fast_steps,
        use_fast_feed,
        feed_steps,
        z1,
        z2,
    };
    let session = ScanSession {
        params,
        layout,
        exposure,
        motion,
    };
    let registers = session_registers(model, sensor, &session, base)?;

    debug!(
        xres = params.xres,
        yres = params.yres,
        hwdpi = layout.hwdpi,
        optical_pixels = layout.optical_pixels,
        startx = layout.pixel_startx,
        endx = layout.pixel_endx,
        lines = layout.output_line_count,
        exposure,
        scan_steps,
        fast_steps,
        use_fast_feed,
        feedl = feed_steps,
        "built scan session"
    );

    Ok(SessionPlan {
        session,
        registers,
        slopes: vec![
            (SlopeSlot::Scan, scan_table.clone()),
            (SlopeSlot::Backtrack, scan_table),
            (SlopeSlot::Stop, fast_table.clone()),
            (SlopeSlot::Fast, fast_table.clone()),
            (SlopeSlot::Home, fast_table),
        ],
    })
}

fn session_registers(
    model: &ModelDescriptor,
    sensor: &SensorDescriptor,
    session: &ScanSession,
    base: &RegisterSet,
) -> Result<RegisterSet> {
    let p = &session.params;
    let l = &session.layout;
    let m = &session.motion;

    let mut regs = RegisterSet::new();
    regs.merge(&sensor.custom_regs);

    let mut r01 = base.get8(REG01)? & !(REG01_SCAN | REG01_DVDSET | REG01_SHDAREA | REG01_STAGGER);
    if !p.flags.disable_shading {
        r01 |= REG01_DVDSET | REG01_SHDAREA;
    }
    if l.staggered {
        r01 |= REG01_STAGGER;
    }
    if model.is_cis {
        r01 |= REG01_CISSET;
    }
    regs.init(REG01, r01);

    let mut r02 = base.get8(REG02)?
        & !(REG02_FASTFED | REG02_MTRREV | REG02_AGOHOME | REG02_ACDCDIS);
    r02 |= REG02_MTRPWR;
    if m.use_fast_feed {
        r02 |= REG02_FASTFED;
    }
    if p.flags.reverse {
        r02 |= REG02_MTRREV;
    }
    if p.flags.auto_go_home {
        r02 |= REG02_AGOHOME;
    }
    if p.flags.disable_buffer_full_move {
        r02 |= REG02_ACDCDIS;
    }
    regs.init(REG02, r02);

    let mut r03 = base.get8(REG03)?;
    if p.flags.disable_lamp || p.flags.feeding {
        r03 &= !REG03_LAMPPWR;
    } else {
        r03 |= REG03_LAMPPWR;
    }
    regs.init(REG03, r03);

    let mut r04 = base.get8(REG04)? & !(REG04_LINEART | REG04_BITSET | REG04_FILTER);
    if p.depth == 1 {
        r04 |= REG04_LINEART;
    } else if p.depth == 16 {
        r04 |= REG04_BITSET;
    }
    if p.channels == 1 {
        r04 |= match p.color_filter {
            ColorFilter::Red => 0x04,
            ColorFilter::Green => 0x08,
            ColorFilter::Blue => 0x0c,
        };
    }
    regs.init(REG04, r04);

    let mut r05 = (base.get8(REG05)? & !(REG05_DPIHW | REG05_GMMENB)) | gl843::dpihw_bits(l.hwdpi);
    if !p.flags.disable_gamma {
        r05 |= REG05_GMMENB;
    }
    regs.init(REG05, r05);

    let cksel = (l.ccd_size_divisor.saturating_sub(1) as u8) & REG18_CKSEL;
    regs.init(REG18, (base.get8(REG18)? & !REG18_CKSEL) | cksel);

    let exposure = sensor.exposure;
    put16(&mut regs, gl843::REG_EXPR, exposure.red);
    put16(&mut regs, gl843::REG_EXPG, exposure.green);
    put16(&mut regs, gl843::REG_EXPB, exposure.blue);

    let steps = |v: u32| u8::try_from(v).unwrap_or(u8::MAX);
    regs.init(gl843::REG_STEPNO, steps(m.scan_steps));
    regs.init(gl843::REG_FWDSTEP, steps(m.scan_steps));
    regs.init(gl843::REG_BWDSTEP, steps(m.scan_steps));
    regs.init(gl843::REG_FASTNO, steps(m.fast_steps));
    regs.init(gl843::REG_FSHDEC, steps(m.fast_steps));
    regs.init(gl843::REG_FMOVNO, steps(m.fast_steps));
    regs.init(gl843::REG_FMOVDEC, steps(m.fast_steps));

    put24(&mut regs, gl843::REG_LINCNT, l.output_line_count);
    put16(&mut regs, gl843::REG_DPISET, clamp_u16(l.dpiset));
    put16(&mut regs, gl843::REG_STRPIXEL, clamp_u16(l.pixel_startx));
    put16(&mut regs, gl843::REG_ENDPIXEL, clamp_u16(l.pixel_endx));
    regs.init(gl843::REG_DUMMY, u8::try_from(sensor.dummy_pixel).unwrap_or(u8::MAX));
    let maxwd = u32::try_from(l.output_line_bytes_raw >> 1).unwrap_or(0x00ff_ffff);
    put24(&mut regs, gl843::REG_MAXWD, maxwd.min(0x00ff_ffff));
    put16(&mut regs, gl843::REG_LPERIOD, clamp_u16(session.exposure));
    put24(&mut regs, gl843::REG_FEEDL, m.feed_steps.min(0x00ff_ffff));
    put24(&mut regs, gl843::REG_Z1MOD, m.z1);
    put24(&mut regs, gl843::REG_Z2MOD, m.z2);

    regs.init(REG67, (base.get8(REG67)? & !REG_STEPSEL) | m.step_type.register_bits());
    regs.init(REG68, (base.get8(REG68)? & !REG_STEPSEL) | m.fast_step_type.register_bits());
    regs.init(
        REG9D,
        (base.get8(REG9D)? & !REG9D_STEPTIM) | gl843::step_multiplier_bits(m.step_multiplier),
    );

    Ok(regs)
}

fn put16(regs: &mut RegisterSet, address: u8, value: u16) {
    let [hi, lo] = value.to_be_bytes();
    regs.init(address, hi);
    regs.init(address + 1, lo);
}

fn put24(regs: &mut RegisterSet, address: u8, value: u32) {
    let [_, hi, mid, lo] = value.to_be_bytes();
    regs.init(address, hi);
    regs.init(address + 1, mid);
    regs.init(address + 2, lo);
}
