//! Transports for the scanner engine.
//!
//! - [`SimulatedScanner`]: an in-memory model of a GL843 register file,
//!   motor and image FIFO. Used for tests and bring-up without hardware.
//! - `usb::UsbTransport` (feature `hardware`): the real device over libusb.

pub mod error;
pub mod wire;

#[cfg(feature = "hardware")]
pub mod usb;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use scanner_traits::{LinkSpeed, Transport, TransportResult};
use tracing::trace;

use crate::error::UsbError;

// Register bits the simulator reacts to. Kept local so this crate does not
// depend on the engine.
const REG_SCAN_CTRL: u8 = 0x01;
const SCAN_BIT: u8 = 0x01;
const REG_MOTOR_CTRL: u8 = 0x02;
const MTRREV_BIT: u8 = 0x04;
const REG_CLEAR: u8 = 0x0d;
const CLRLNCNT_BIT: u8 = 0x01;
const REG_MOTOR_START: u8 = 0x0f;
const REG_LINCNT: u8 = 0x25;
const REG_FE_DATA_HI: u8 = 0x3a;
const REG_FE_DATA_LO: u8 = 0x3b;
const REG_STATUS_ENGINE: u8 = 0x40;
const REG_STATUS: u8 = 0x41;
const REG_SCANCNT: u8 = 0x4d;
const REG_FE_ADDR: u8 = 0x51;
const REG_GAMMA_ADDR_HI: u8 = 0x5b;
const REG_GAMMA_ADDR_LO: u8 = 0x5c;
const REG_SHADING_ADDR_LO: u8 = 0x2a;
const REG_SHADING_ADDR_HI: u8 = 0x2b;
const REG_GPIO_PAPER: u8 = 0x6d;

const PORT_GAMMA: u8 = 0x28;
const PORT_SHADING: u8 = 0x3c;

/// One bulk write captured by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkWrite {
    pub port: u8,
    /// RAM address decoded from the address registers at transfer time.
    pub ram_address: u32,
    pub data: Vec<u8>,
}

/// Produces image bytes for a bulk read given the current device state.
pub type PixelSource = Box<dyn FnMut(&SimState, &mut [u8])>;

/// Observable state of the simulated ASIC.
#[derive(Debug)]
pub struct SimState {
    pub regs: [u8; 256],
    /// Analog front end registers written through 0x51/0x3a/0x3b.
    pub fe_regs: BTreeMap<u8, u16>,
    pub bulk_writes: Vec<BulkWrite>,
    /// Every register write in order, including those from batched writes.
    pub write_log: Vec<(u8, u8)>,
    pub bulk_bytes_read: usize,
    pub motor_moving: bool,
    pub data_enabled: bool,
    pub at_home: bool,
    pub feed_finished: bool,
    pub paper_present: bool,
    pub scan_count: u32,
    pub link_speed: LinkSpeed,
    /// Status reads a move takes before the motor reports idle.
    pub motion_polls: u32,
    /// Motor never stops on its own when set.
    pub motor_stuck: bool,
    pub fail_motor_start: bool,
    /// Fail every register write after this many have succeeded.
    pub fail_writes_after: Option<usize>,
    polls_left: u32,
    reverse: bool,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            regs: [0; 256],
            fe_regs: BTreeMap::new(),
            bulk_writes: Vec::new(),
            write_log: Vec::new(),
            bulk_bytes_read: 0,
            motor_moving: false,
            data_enabled: false,
            at_home: true,
            feed_finished: false,
            paper_present: false,
            scan_count: 0,
            link_speed: LinkSpeed::High,
            motion_polls: 2,
            motor_stuck: false,
            fail_motor_start: false,
            fail_writes_after: None,
            polls_left: 0,
            reverse: false,
        }
    }
}

impl SimState {
    pub fn reg(&self, address: u8) -> u8 {
        self.regs[address as usize]
    }

    /// 16-bit big-endian register field.
    pub fn reg16(&self, address: u8) -> u16 {
        u16::from_be_bytes([self.reg(address), self.reg(address.wrapping_add(1))])
    }

    /// 24-bit big-endian register field.
    pub fn reg24(&self, address: u8) -> u32 {
        (u32::from(self.reg(address)) << 16)
            | (u32::from(self.reg(address.wrapping_add(1))) << 8)
            | u32::from(self.reg(address.wrapping_add(2)))
    }

    pub fn fe_reg(&self, address: u8) -> u16 {
        self.fe_regs.get(&address).copied().unwrap_or(0)
    }

    /// Number of writes to `address` recorded so far.
    pub fn writes_to(&self, address: u8) -> usize {
        self.write_log.iter().filter(|(a, _)| *a == address).count()
    }

    fn start_motion(&mut self) {
        self.reverse = self.reg(REG_MOTOR_CTRL) & MTRREV_BIT != 0;
        self.motor_moving = true;
        self.feed_finished = false;
        self.polls_left = self.motion_polls;
        if !self.reverse {
            self.at_home = false;
        }
    }

    fn finish_motion(&mut self) {
        self.motor_moving = false;
        self.feed_finished = true;
        if self.reverse {
            self.at_home = true;
        }
    }

    fn tick(&mut self) {
        if !self.motor_moving || self.motor_stuck {
            return;
        }
        if self.polls_left > 0 {
            self.polls_left -= 1;
        }
        if self.polls_left == 0 {
            self.finish_motion();
        }
    }

    fn engine_status(&self) -> u8 {
        let mut v = 0u8;
        if self.data_enabled {
            v |= 0x01;
        }
        if self.motor_moving {
            v |= 0x02;
        }
        v
    }

    fn status(&self) -> u8 {
        let mut v = 0u8;
        if self.motor_moving {
            v |= 0x01;
        }
        if self.reg(0x03) & 0x10 != 0 {
            v |= 0x04;
        }
        if self.at_home {
            v |= 0x08;
        }
        if self.feed_finished {
            v |= 0x20;
        }
        if !self.data_enabled {
            v |= 0x40;
        }
        v
    }

    fn ram_address(&self, port: u8) -> u32 {
        match port {
            PORT_GAMMA => {
                (u32::from(self.reg(REG_GAMMA_ADDR_HI)) << 12)
                    | (u32::from(self.reg(REG_GAMMA_ADDR_LO)) << 4)
            }
            PORT_SHADING => {
                ((u32::from(self.reg(REG_SHADING_ADDR_HI)) << 8)
                    | u32::from(self.reg(REG_SHADING_ADDR_LO)))
                    << 4
            }
            _ => 0,
        }
    }
}

/// Simulated GL843 scanner.
///
/// Clones share state, so a test can keep a handle for inspection while
/// the engine owns the transport.
#[derive(Clone)]
pub struct SimulatedScanner {
    state: Rc<RefCell<SimState>>,
    source: Rc<RefCell<Option<PixelSource>>>,
}

impl Default for SimulatedScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedScanner {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState::default())),
            source: Rc::new(RefCell::new(None)),
        }
    }

    /// Install the generator used to fill bulk reads of image data.
    pub fn with_pixel_source(self, source: impl FnMut(&SimState, &mut [u8]) + 'static) -> Self {
        *self.source.borrow_mut() = Some(Box::new(source));
        self
    }

    /// Run `f` with mutable access to the simulated state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }

    pub fn reg(&self, address: u8) -> u8 {
        self.state.borrow().reg(address)
    }

    pub fn fe_reg(&self, address: u8) -> u16 {
        self.state.borrow().fe_reg(address)
    }

    pub fn bulk_writes(&self) -> Vec<BulkWrite> {
        self.state.borrow().bulk_writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.borrow().write_log.len()
    }

    pub fn set_paper_present(&self, present: bool) {
        self.state.borrow_mut().paper_present = present;
    }

    pub fn set_scan_count(&self, lines: u32) {
        self.state.borrow_mut().scan_count = lines;
    }
}

impl Transport for SimulatedScanner {
    fn read_register(&mut self, address: u8) -> TransportResult<u8> {
        let mut st = self.state.borrow_mut();
        let value = match address {
            REG_STATUS_ENGINE => {
                st.tick();
                st.engine_status()
            }
            REG_STATUS => {
                st.tick();
                st.status()
            }
            REG_SCANCNT => ((st.scan_count >> 16) & 0x0f) as u8,
            a if a == REG_SCANCNT + 1 => (st.scan_count >> 8) as u8,
            a if a == REG_SCANCNT + 2 => st.scan_count as u8,
            REG_GPIO_PAPER => {
                let base = st.reg(REG_GPIO_PAPER) & !0x01;
                if st.paper_present { base } else { base | 0x01 }
            }
            a => st.reg(a),
        };
        trace!(address, value, "sim read register");
        Ok(value)
    }

    fn write_register(&mut self, address: u8, value: u8) -> TransportResult<()> {
        let mut st = self.state.borrow_mut();
        if st.fail_writes_after.is_some_and(|limit| st.write_log.len() >= limit) {
            return Err(Box::new(UsbError::Injected(format!(
                "write to {address:#04x} rejected"
            ))));
        }
        if address == REG_MOTOR_START && value != 0 && st.fail_motor_start {
            return Err(Box::new(UsbError::Injected("motor start rejected".into())));
        }
        st.write_log.push((address, value));
        st.regs[address as usize] = value;

        match address {
            REG_SCAN_CTRL if value & SCAN_BIT == 0 => {
                st.data_enabled = false;
                if st.motor_moving && !st.motor_stuck {
                    st.finish_motion();
                }
            }
            REG_CLEAR if value & CLRLNCNT_BIT != 0 => st.scan_count = 0,
            REG_MOTOR_START => {
                if st.reg(REG_SCAN_CTRL) & SCAN_BIT != 0 {
                    st.data_enabled = true;
                    st.scan_count = st.reg24(REG_LINCNT);
                }
                if value != 0 {
                    st.start_motion();
                }
            }
            REG_FE_DATA_LO => {
                let fe_addr = st.reg(REG_FE_ADDR);
                let data = u16::from_be_bytes([st.reg(REG_FE_DATA_HI), value]);
                st.fe_regs.insert(fe_addr, data);
            }
            _ => {}
        }
        Ok(())
    }

    fn bulk_read(&mut self, _port: u8, buf: &mut [u8]) -> TransportResult<()> {
        let mut source = self.source.borrow_mut();
        let mut st = self.state.borrow_mut();
        match source.as_mut() {
            Some(gen_fn) => gen_fn(&*st, buf),
            None => buf.fill(0),
        }
        st.bulk_bytes_read += buf.len();
        Ok(())
    }

    fn bulk_write(&mut self, port: u8, data: &[u8]) -> TransportResult<()> {
        let mut st = self.state.borrow_mut();
        let ram_address = st.ram_address(port);
        st.bulk_writes.push(BulkWrite {
            port,
            ram_address,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn link_speed(&mut self) -> TransportResult<LinkSpeed> {
        Ok(self.state.borrow().link_speed)
    }
}
