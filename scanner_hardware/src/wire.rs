//! GL843 USB wire format.
//!
//! Register access uses vendor control transfers on endpoint 0. Bulk
//! transfers are announced by an 8-byte header sent as a control transfer:
//!
//! ```text
//! [direction, target, addr_lo, addr_hi, len0, len1, len2, len3]
//! ```
//!
//! where `len` is little-endian and `target` selects RAM or register space.

pub const REQUEST_TYPE_IN: u8 = 0xc0;
pub const REQUEST_TYPE_OUT: u8 = 0x40;

pub const REQUEST_REGISTER: u8 = 0x0c;
pub const REQUEST_BUFFER: u8 = 0x04;

pub const VALUE_BUFFER: u16 = 0x82;
pub const VALUE_SET_REGISTER: u16 = 0x83;
pub const VALUE_READ_REGISTER: u16 = 0x84;
pub const VALUE_WRITE_REGISTER: u16 = 0x85;

pub const INDEX: u16 = 0x00;

/// Largest bulk chunk the ASIC accepts behind one header.
pub const MAX_BULK_CHUNK: usize = 0xeff0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BulkDirection {
    In = 0x00,
    Out = 0x01,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BulkTarget {
    Ram = 0x00,
    Register = 0x11,
}

/// Build the header that precedes every bulk transfer.
pub fn bulk_header(direction: BulkDirection, target: BulkTarget, address: u16, len: u32) -> [u8; 8] {
    let [a0, a1] = address.to_le_bytes();
    let [l0, l1, l2, l3] = len.to_le_bytes();
    [direction as u8, target as u8, a0, a1, l0, l1, l2, l3]
}

/// Flatten register pairs into the payload of a register-space bulk write.
pub fn register_payload(regs: &[(u8, u8)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(regs.len() * 2);
    for &(address, value) in regs {
        out.push(address);
        out.push(value);
    }
    out
}

/// Which device to open and how long a single transfer may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbOptions {
    pub vendor_id: u16,
    pub product_id: u16,
    pub transfer_timeout: std::time::Duration,
}

impl From<&scanner_config::UsbCfg> for UsbOptions {
    fn from(c: &scanner_config::UsbCfg) -> Self {
        Self {
            vendor_id: c.vendor_id,
            product_id: c.product_id,
            transfer_timeout: std::time::Duration::from_millis(c.transfer_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usb_options_follow_config_section() {
        let cfg = scanner_config::load_toml(
            "[usb]\nvendor_id = 0x04a9\nproduct_id = 0x221c\ntransfer_timeout_ms = 750\n",
        )
        .expect("parse");
        let opts = UsbOptions::from(&cfg.usb);
        assert_eq!(opts.vendor_id, 0x04a9);
        assert_eq!(opts.product_id, 0x221c);
        assert_eq!(opts.transfer_timeout, std::time::Duration::from_millis(750));
    }

    #[test]
    fn header_encodes_length_little_endian() {
        let h = bulk_header(BulkDirection::Out, BulkTarget::Ram, 0x0000, 0x0001_0203);
        assert_eq!(h, [0x01, 0x00, 0x00, 0x00, 0x03, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn header_carries_target_and_address() {
        let h = bulk_header(BulkDirection::In, BulkTarget::Register, 0x1234, 8);
        assert_eq!(h[0], 0x00);
        assert_eq!(h[1], 0x11);
        assert_eq!(&h[2..4], &[0x34, 0x12]);
    }

    #[test]
    fn register_payload_keeps_order() {
        let p = register_payload(&[(0x0b, 0x6a), (0x01, 0x20)]);
        assert_eq!(p, vec![0x0b, 0x6a, 0x01, 0x20]);
    }
}
