//! Scan sequencing: boot, start/stop, carriage moves and sheet-feed
//! document tracking.

use scanner_traits::Transport;
use tracing::{debug, info, trace, warn};

use crate::afe::write_frontend;
use crate::device::{ByteCounters, Device, ScannerState, bulk_chunk_for};
use crate::error::Result;
use crate::gl843::{
    self, PORT_IMAGE, REG01, REG01_SCAN, REG0B, REG0B_ENBDRAM, REG0D, REG0D_CLRLNCNT,
    REG0D_CLRMCNT, REG0E, REG0F, REG6D, REG_RAM_ADDR, REG_SCANCNT, REG_SHADING_ADDR_HI,
    REG_SHADING_ADDR_LO,
};
use crate::poll::wait_until;
use crate::session::{ScanFlags, ScanMode, ScanParams, ScanSession};
use crate::transport_error::TransportResultExt;

/// Travel requested for a home move; the home sensor stops it first.
const HOME_DISTANCE_STEPS: u32 = 40_000;

/// Bring the ASIC from power-on to `Idle`.
///
/// A cold boot pulses the reset register first and finishes by feeding
/// the carriage a short distance to settle the motor. Any failure leaves
/// the device `PoweredOff`.
pub fn boot<T: Transport>(dev: &mut Device<T>, cold: bool) -> Result<()> {
    dev.state = ScannerState::ColdBoot;
    match boot_sequence(dev, cold) {
        Ok(()) => {
            info!(model = %dev.model.name, cold, "boot complete");
            Ok(())
        }
        Err(e) => {
            dev.state = ScannerState::PoweredOff;
            Err(e)
        }
    }
}

fn boot_sequence<T: Transport>(dev: &mut Device<T>, cold: bool) -> Result<()> {
    if cold {
        dev.write_register(REG0E, 0x01)?;
        dev.write_register(REG0E, 0x00)?;
    }

    let speed = dev.transport.link_speed().during("link speed")?;
    dev.bulk_chunk = bulk_chunk_for(speed);
    debug!(?speed, chunk = dev.bulk_chunk, "link speed");

    let mut regs = gl843::default_registers();
    regs.merge(&dev.model.custom_regs);
    // 0x0b is only ever written as an edge below
    let ram_ctrl = regs.remove(REG0B).map_or(0, |r| r.value);
    dev.write_registers(&regs)?;

    dev.write_register(REG0B, ram_ctrl & !REG0B_ENBDRAM)?;
    dev.write_register(REG0B, ram_ctrl | REG0B_ENBDRAM)?;

    dev.write_register_pairs(&[
        (REG_RAM_ADDR, 0),
        (REG_SHADING_ADDR_LO, 0),
        (REG_SHADING_ADDR_HI, 0),
    ])?;

    let gpio = dev.model.gpio.clone();
    dev.write_registers(&gpio)?;
    regs.merge(&gpio);
    dev.reg = regs;

    let frontend = dev.model.frontend.clone();
    let custom_fe = dev
        .model
        .sensors
        .first()
        .map(|s| s.custom_fe_regs.clone())
        .unwrap_or_default();
    write_frontend(dev, &frontend, &custom_fe)?;

    dev.state = ScannerState::Idle;

    if cold && !dev.model.is_sheetfed {
        let settle = dev.cfg.motion.boot_settle_steps;
        feed(dev, settle)?;
    }
    Ok(())
}

/// Build and program a session for an image scan.
///
/// Uploads gamma tables when the session uses them, and stored shading
/// data when it was captured with the same geometry.
pub fn init_regs_for_scan<T: Transport>(
    dev: &mut Device<T>,
    params: &ScanParams,
) -> Result<ScanSession> {
    dev.ensure_ready("scan setup")?;
    let mut regs = dev.reg.clone();
    let session = dev.setup_session(&mut regs, params)?;
    dev.write_registers(&regs)?;
    dev.reg = regs;

    if !session.params.flags.disable_gamma {
        let sensor = dev.sensor(session.params.xres, session.params.channels)?;
        crate::gamma::send_gamma_table(dev, &sensor)?;
    }
    let shading = if session.params.flags.disable_shading || !dev.calibration_cache_matches(&session) {
        None
    } else {
        dev.calibration.shading.clone()
    };
    if let Some(data) = shading {
        crate::shading::upload_shading(dev, &data)?;
    }
    Ok(session)
}

/// Clear counters and set the scan bit; optionally start the motor.
pub fn begin_scan<T: Transport>(dev: &mut Device<T>, start_motor: bool) -> Result<()> {
    dev.ensure_ready("begin scan")?;
    dev.write_register(REG0D, REG0D_CLRLNCNT | REG0D_CLRMCNT)?;
    let r01 = dev.read_register(REG01)? | REG01_SCAN;
    dev.write_register(REG01, r01)?;
    if start_motor {
        start_motor_or_restore(dev)?;
    } else {
        dev.write_register(REG0F, 0x00)?;
    }
    if dev.model.is_sheetfed {
        dev.document = get_paper_sensor(dev)?;
    }
    if dev.state == ScannerState::Idle {
        dev.state = ScannerState::Scanning;
    }
    Ok(())
}

pub fn end_scan<T: Transport>(dev: &mut Device<T>) -> Result<()> {
    if !dev.model.is_sheetfed {
        stop_action(dev)?;
    }
    if dev.state == ScannerState::Scanning {
        dev.state = ScannerState::Idle;
    }
    Ok(())
}

/// Stop data acquisition and motor motion.
///
/// A device that is neither moving nor producing data is left untouched,
/// so repeated calls write nothing.
pub fn stop_action<T: Transport>(dev: &mut Device<T>) -> Result<()> {
    let status = dev.engine_status()?;
    if status.is_idle() {
        trace!("stop: already idle");
        return Ok(());
    }

    dev.reg.clear_bits(REG01, REG01_SCAN)?;
    let r01 = dev.reg.get8(REG01)?;
    dev.write_register(REG01, r01)?;

    let clock = dev.clock();
    clock.sleep(dev.cfg.poll.interval);
    wait_until(clock.as_ref(), dev.cfg.poll.stop(), "scanner stop", || {
        let engine = dev.engine_status()?;
        let status = dev.scanner_status()?;
        Ok(engine.is_idle() && !status.is_motor_enabled())
    })
}

/// Write the motor start register. On failure, stop what can be stopped
/// and put the last known-good registers back, then report the original
/// error.
fn start_motor_or_restore<T: Transport>(dev: &mut Device<T>) -> Result<()> {
    let Err(e) = dev.write_register(REG0F, 0x01) else {
        return Ok(());
    };
    if let Err(stop_err) = stop_action(dev) {
        warn!(error = %stop_err, "stop after failed motor start");
    }
    let known_good = dev.reg.clone();
    if let Err(restore_err) = dev.write_registers(&known_good) {
        warn!(error = %restore_err, "restoring registers after failed motor start");
    }
    Err(e)
}

/// Motor-only session at the lowest y resolution.
fn motion_params<T: Transport>(dev: &Device<T>, steps: u32, reverse: bool) -> ScanParams {
    let dpi = dev.model.motor.lowest_ydpi();
    ScanParams {
        xres: dpi,
        yres: dpi,
        startx: 0,
        starty: steps,
        pixels: 100,
        lines: 3,
        depth: 8,
        channels: 1,
        mode: ScanMode::Gray,
        flags: ScanFlags {
            feeding: true,
            disable_shading: true,
            disable_gamma: true,
            ignore_stagger_offset: true,
            ignore_color_offset: true,
            reverse,
            auto_go_home: reverse,
            ..ScanFlags::default()
        },
        ..ScanParams::default()
    }
}

/// Drive the carriage back to the home sensor at low speed.
///
/// With `wait`, blocks until the home sensor triggers; on timeout the
/// motor is stopped and `Timeout` is returned.
pub fn slow_back_home<T: Transport>(dev: &mut Device<T>, wait: bool) -> Result<()> {
    dev.ensure_ready("slow back home")?;
    let clock = dev.clock();

    // the first status read after a move can be stale
    dev.scanner_status()?;
    clock.sleep(dev.cfg.poll.interval);
    if dev.scanner_status()?.is_at_home() {
        dev.head_pos = 0;
        debug!("already at home");
        return Ok(());
    }

    let mut local = dev.reg.clone();
    let params = motion_params(dev, HOME_DISTANCE_STEPS, true);
    dev.setup_session(&mut local, &params)?;
    local.clear_bits(REG01, REG01_SCAN)?;
    dev.write_registers(&local)?;
    start_motor_or_restore(dev)?;

    if !wait {
        return Ok(());
    }
    let waited = wait_until(clock.as_ref(), dev.cfg.poll.home(), "home sensor", || {
        Ok(dev.scanner_status()?.is_at_home())
    });
    if let Err(e) = waited {
        if e.is_timeout() {
            if let Err(stop_err) = stop_action(dev) {
                warn!(error = %stop_err, "stop after home timeout");
            }
        }
        return Err(e);
    }
    dev.head_pos = 0;
    info!("carriage at home");
    Ok(())
}

/// Move the carriage forward `steps` full steps without scanning.
pub fn feed<T: Transport>(dev: &mut Device<T>, steps: u32) -> Result<()> {
    dev.ensure_ready("feed")?;
    let mut local = dev.reg.clone();
    let params = motion_params(dev, steps, false);
    dev.setup_session(&mut local, &params)?;
    dev.write_register(REG0D, REG0D_CLRLNCNT | REG0D_CLRMCNT)?;
    local.clear_bits(REG01, REG01_SCAN)?;
    dev.write_registers(&local)?;
    start_motor_or_restore(dev)?;

    let clock = dev.clock();
    wait_until(clock.as_ref(), dev.cfg.poll.feed(), "feed", || {
        Ok(dev.scanner_status()?.is_feeding_finished())
    })?;
    clock.sleep(dev.cfg.poll.interval);
    dev.head_pos = dev.head_pos.saturating_add(steps);
    debug!(steps, head_pos = dev.head_pos, "feed done");
    Ok(())
}

/// Paper sensor of sheet-fed models; active low.
pub fn get_paper_sensor<T: Transport>(dev: &mut Device<T>) -> Result<bool> {
    Ok(dev.read_register(REG6D)? & 0x01 == 0)
}

/// Lines the ASIC has scanned since the counters were cleared.
pub fn read_scan_count<T: Transport>(dev: &mut Device<T>) -> Result<u32> {
    let hi = dev.read_register(REG_SCANCNT)?;
    let mid = dev.read_register(REG_SCANCNT + 1)?;
    let lo = dev.read_register(REG_SCANCNT + 2)?;
    Ok((u32::from(hi & 0x0f) << 16) | (u32::from(mid) << 8) | u32::from(lo))
}

/// Inputs to the end-of-document budget adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentEndInput {
    /// Lines the ASIC has scanned.
    pub scan_count: u32,
    /// Lines scanned past the trailing edge.
    pub post_scan_lines: u32,
    pub pixels: u32,
    pub channels: u32,
    pub depth: u32,
    /// Raw bytes per scanned line.
    pub line_bytes: u64,
    pub counters: ByteCounters,
}

fn bytes_to_lines(bytes: u64, pixels: u32, channels: u32, depth: u32) -> u64 {
    let per_line = u64::from(pixels) * u64::from(channels);
    if per_line == 0 {
        return 0;
    }
    if depth == 1 {
        bytes * 8 / per_line
    } else {
        bytes / u64::from((depth / 8).max(1)) / per_line
    }
}

/// Shrink both byte budgets to what the paper actually covered.
///
/// Lines still owed are the post-scan margin plus lines scanned but not
/// yet delivered. When fewer bytes are owed than remain to be read, the
/// excess lines are removed from the logical and physical budgets alike.
pub fn adjust_for_document_end(input: &DocumentEndInput) -> ByteCounters {
    let mut c = input.counters;
    let (pixels, channels, depth) = (input.pixels, input.channels, input.depth);

    let read_lines = bytes_to_lines(c.total_bytes_read, pixels, channels, depth);
    let lines = u64::from(input.post_scan_lines)
        + u64::from(input.scan_count).saturating_sub(read_lines);
    let bytes_to_flush = lines * input.line_bytes;
    if bytes_to_flush >= c.read_bytes_left {
        return c;
    }

    let remaining = c.total_bytes_to_read.saturating_sub(c.total_bytes_read);
    let flines = bytes_to_lines(remaining, pixels, channels, depth);
    if flines <= lines {
        return c;
    }
    let sub = flines - lines;
    let sub_bytes = if depth == 1 {
        (u64::from(pixels) * sub).div_ceil(8) * u64::from(channels)
    } else {
        u64::from(pixels) * sub * u64::from(channels) * u64::from(depth / 8)
    };
    c.total_bytes_to_read = c.total_bytes_to_read.saturating_sub(sub_bytes);
    if c.read_bytes_left > sub_bytes {
        c.read_bytes_left -= sub_bytes;
    } else {
        c.total_bytes_to_read = c.total_bytes_read;
        c.read_bytes_left = 0;
    }
    c
}

/// Handle the paper leaving the sensor on a sheet-fed scan.
pub fn detect_document_end<T: Transport>(dev: &mut Device<T>) -> Result<()> {
    let paper = get_paper_sensor(dev)?;
    if !dev.document || paper {
        return Ok(());
    }
    dev.document = false;
    let Some(session) = dev.session.clone() else {
        return Ok(());
    };
    debug!("paper left the sensor");

    let scan_count = match read_scan_count(dev) {
        Ok(n) if dev.model.is_cis && session.params.channels == 3 => n / 3,
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "scan counter unreadable, ending transfer");
            dev.counters.total_bytes_to_read = dev.counters.total_bytes_read;
            dev.counters.read_bytes_left = 0;
            return Ok(());
        }
    };

    let input = DocumentEndInput {
        scan_count,
        post_scan_lines: dev.model.post_scan_lines(session.params.yres),
        pixels: session.params.pixels,
        channels: session.params.channels,
        depth: session.params.depth,
        line_bytes: session.layout.output_line_bytes_raw,
        counters: dev.counters,
    };
    let adjusted = adjust_for_document_end(&input);
    debug!(
        scan_count,
        total_bytes_to_read = adjusted.total_bytes_to_read,
        read_bytes_left = adjusted.read_bytes_left,
        "document end budgets"
    );
    dev.counters = adjusted;
    Ok(())
}

/// Wait until the ASIC has image data buffered.
pub fn wait_for_data<T: Transport>(dev: &mut Device<T>) -> Result<()> {
    let clock = dev.clock();
    wait_until(clock.as_ref(), dev.cfg.poll.buffer(), "image data", || {
        Ok(!dev.scanner_status()?.is_buffer_empty())
    })
}

/// Fill `buf` with image data, in link-sized chunks.
pub fn read_data_from_scanner<T: Transport>(dev: &mut Device<T>, buf: &mut [u8]) -> Result<()> {
    wait_for_data(dev)?;
    let chunk = dev.bulk_chunk.max(1);
    for part in buf.chunks_mut(chunk) {
        dev.transport.bulk_read(PORT_IMAGE, part).during("bulk read")?;
    }
    dev.counters.read_bytes_left = dev.counters.read_bytes_left.saturating_sub(buf.len() as u64);
    trace!(len = buf.len(), left = dev.counters.read_bytes_left, "image data read");
    Ok(())
}
