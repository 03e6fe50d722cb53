//! Register model: ordered `(address, value)` pairs mirrored from the ASIC.
//!
//! Order is significant. GPIO and clock bits depend on the sequence in
//! which they are written, so a `RegisterSet` keeps entries in insertion
//! order and writes them out in exactly that order.

use scanner_traits::Transport;

use crate::error::{Result, ScanError};
use crate::transport_error::TransportResultExt;

/// Address 0 marks an unused slot and is never written.
pub const SENTINEL_ADDRESS: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub address: u8,
    pub value: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSet {
    regs: Vec<Register>,
}

impl RegisterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(u8, u8)]) -> Self {
        let mut set = Self::new();
        for &(address, value) in pairs {
            set.init(address, value);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.regs.iter()
    }

    pub fn has(&self, address: u8) -> bool {
        self.find(address).is_some()
    }

    pub fn find(&self, address: u8) -> Option<&Register> {
        self.regs.iter().find(|r| r.address == address)
    }

    fn find_mut(&mut self, address: u8) -> Result<&mut Register> {
        self.regs
            .iter_mut()
            .find(|r| r.address == address)
            .ok_or(ScanError::NotFound(address))
    }

    /// Insert `address` at the end, or update it in place if present.
    pub fn init(&mut self, address: u8, value: u8) {
        if let Some(r) = self.regs.iter_mut().find(|r| r.address == address) {
            r.value = value;
        } else {
            self.regs.push(Register { address, value });
        }
    }

    pub fn remove(&mut self, address: u8) -> Option<Register> {
        let idx = self.regs.iter().position(|r| r.address == address)?;
        Some(self.regs.remove(idx))
    }

    pub fn get8(&self, address: u8) -> Result<u8> {
        self.find(address)
            .map(|r| r.value)
            .ok_or(ScanError::NotFound(address))
    }

    pub fn set8(&mut self, address: u8, value: u8) -> Result<()> {
        self.find_mut(address)?.value = value;
        Ok(())
    }

    /// Replace the bits selected by `mask` with those of `value`.
    pub fn set8_mask(&mut self, address: u8, value: u8, mask: u8) -> Result<()> {
        let r = self.find_mut(address)?;
        r.value = (r.value & !mask) | (value & mask);
        Ok(())
    }

    pub fn set_bits(&mut self, address: u8, bits: u8) -> Result<()> {
        self.find_mut(address)?.value |= bits;
        Ok(())
    }

    pub fn clear_bits(&mut self, address: u8, bits: u8) -> Result<()> {
        self.find_mut(address)?.value &= !bits;
        Ok(())
    }

    /// Big-endian 16-bit field at `address`, `address + 1`.
    pub fn get16(&self, address: u8) -> Result<u16> {
        let hi = self.get8(address)?;
        let lo = self.get8(address.wrapping_add(1))?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    pub fn set16(&mut self, address: u8, value: u16) -> Result<()> {
        let [hi, lo] = value.to_be_bytes();
        self.set8(address, hi)?;
        self.set8(address.wrapping_add(1), lo)
    }

    /// Big-endian 24-bit field at `address .. address + 3`.
    pub fn get24(&self, address: u8) -> Result<u32> {
        let hi = self.get8(address)?;
        let mid = self.get8(address.wrapping_add(1))?;
        let lo = self.get8(address.wrapping_add(2))?;
        Ok(u32::from_be_bytes([0, hi, mid, lo]))
    }

    pub fn set24(&mut self, address: u8, value: u32) -> Result<()> {
        let [_, hi, mid, lo] = value.to_be_bytes();
        self.set8(address, hi)?;
        self.set8(address.wrapping_add(1), mid)?;
        self.set8(address.wrapping_add(2), lo)
    }

    /// Apply every entry of `other` (insert or update), in `other`'s order.
    pub fn merge(&mut self, other: &RegisterSet) {
        for r in &other.regs {
            self.init(r.address, r.value);
        }
    }

    /// Pairs to send, in order, without sentinel slots.
    pub fn to_pairs(&self) -> Vec<(u8, u8)> {
        self.regs
            .iter()
            .filter(|r| r.address != SENTINEL_ADDRESS)
            .map(|r| (r.address, r.value))
            .collect()
    }

    /// Write the whole set to the device, in order.
    ///
    /// Aborts on the first transport failure; entries written before the
    /// failure stay written.
    pub fn write_to<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<()> {
        let pairs = self.to_pairs();
        if pairs.is_empty() {
            return Ok(());
        }
        transport.write_registers(&pairs).during("write register set")
    }
}

impl<'a> IntoIterator for &'a RegisterSet {
    type Item = &'a Register;
    type IntoIter = std::slice::Iter<'a, Register>;

    fn into_iter(self) -> Self::IntoIter {
        self.regs.iter()
    }
}

/// Serialize 16-bit words little-endian, the layout of slope, gamma and
/// shading RAM.
pub fn pack_le16(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
