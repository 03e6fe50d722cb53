//! GL843 register map, bit masks and power-on defaults.

use crate::register::RegisterSet;

pub const REG01: u8 = 0x01;
pub const REG01_CISSET: u8 = 0x80;
pub const REG01_DOGENB: u8 = 0x40;
pub const REG01_DVDSET: u8 = 0x20;
pub const REG01_STAGGER: u8 = 0x10;
pub const REG01_COMPENB: u8 = 0x08;
pub const REG01_TRUEGRAY: u8 = 0x04;
pub const REG01_SHDAREA: u8 = 0x02;
pub const REG01_SCAN: u8 = 0x01;

pub const REG02: u8 = 0x02;
pub const REG02_NOTHOME: u8 = 0x80;
pub const REG02_ACDCDIS: u8 = 0x40;
pub const REG02_AGOHOME: u8 = 0x20;
pub const REG02_MTRPWR: u8 = 0x10;
pub const REG02_FASTFED: u8 = 0x08;
pub const REG02_MTRREV: u8 = 0x04;
pub const REG02_HOMENEG: u8 = 0x02;
pub const REG02_LONGCURV: u8 = 0x01;

pub const REG03: u8 = 0x03;
pub const REG03_LAMPDOG: u8 = 0x80;
pub const REG03_AVEENB: u8 = 0x40;
pub const REG03_XPASEL: u8 = 0x20;
pub const REG03_LAMPPWR: u8 = 0x10;
pub const REG03_LAMPTIM: u8 = 0x0f;

pub const REG04: u8 = 0x04;
pub const REG04_LINEART: u8 = 0x80;
pub const REG04_BITSET: u8 = 0x40;
pub const REG04_AFEMOD: u8 = 0x30;
pub const REG04_FILTER: u8 = 0x0c;
pub const REG04_FESET: u8 = 0x03;

pub const REG05: u8 = 0x05;
pub const REG05_DPIHW: u8 = 0xc0;
pub const REG05_DPIHW_600: u8 = 0x00;
pub const REG05_DPIHW_1200: u8 = 0x40;
pub const REG05_DPIHW_2400: u8 = 0x80;
pub const REG05_DPIHW_4800: u8 = 0xc0;
pub const REG05_GMMENB: u8 = 0x08;

pub const REG06: u8 = 0x06;
pub const REG0A: u8 = 0x0a;

pub const REG0B: u8 = 0x0b;
pub const REG0B_DRAMSEL: u8 = 0x07;
pub const REG0B_ENBDRAM: u8 = 0x08;
pub const REG0B_RFHDIS: u8 = 0x10;
pub const REG0B_CLKSET: u8 = 0xe0;

pub const REG0D: u8 = 0x0d;
pub const REG0D_CLRLNCNT: u8 = 0x01;
pub const REG0D_CLRDOCJM: u8 = 0x02;
pub const REG0D_CLRMCNT: u8 = 0x04;
pub const REG0D_SEND: u8 = 0x08;
pub const REG0D_FULLSTP: u8 = 0x10;

pub const REG0E: u8 = 0x0e;
pub const REG0F: u8 = 0x0f;

pub const REG_EXPR: u8 = 0x10;
pub const REG_EXPG: u8 = 0x12;
pub const REG_EXPB: u8 = 0x14;

pub const REG18: u8 = 0x18;
pub const REG18_CKSEL: u8 = 0x03;

pub const REG1E: u8 = 0x1e;
pub const REG1E_LINESEL: u8 = 0x0f;

pub const REG_STEPNO: u8 = 0x21;
pub const REG_FWDSTEP: u8 = 0x22;
pub const REG_BWDSTEP: u8 = 0x23;
pub const REG_FASTNO: u8 = 0x24;
pub const REG_LINCNT: u8 = 0x25;

pub const REG_RAM_ADDR: u8 = 0x29;
pub const REG_SHADING_ADDR_LO: u8 = 0x2a;
pub const REG_SHADING_ADDR_HI: u8 = 0x2b;

pub const REG_DPISET: u8 = 0x2c;
pub const REG_STRPIXEL: u8 = 0x30;
pub const REG_ENDPIXEL: u8 = 0x32;
pub const REG_DUMMY: u8 = 0x34;
pub const REG_MAXWD: u8 = 0x35;
pub const REG_LPERIOD: u8 = 0x38;

pub const REG_FE_DATA_HI: u8 = 0x3a;
pub const REG_FE_DATA_LO: u8 = 0x3b;
pub const REG_FEEDL: u8 = 0x3d;

pub const REG40: u8 = 0x40;
pub const REG40_DOCSNR: u8 = 0x80;
pub const REG40_ADFSNR: u8 = 0x40;
pub const REG40_COVERSNR: u8 = 0x20;
pub const REG40_CHKVER: u8 = 0x10;
pub const REG40_DOCJAM: u8 = 0x08;
pub const REG40_HISPDFLG: u8 = 0x04;
pub const REG40_MOTMFLG: u8 = 0x02;
pub const REG40_DATAENB: u8 = 0x01;

pub const REG41: u8 = 0x41;
pub const REG41_PWRBIT: u8 = 0x80;
pub const REG41_BUFEMPTY: u8 = 0x40;
pub const REG41_FEEDFSH: u8 = 0x20;
pub const REG41_SCANFSH: u8 = 0x10;
pub const REG41_HOMESNR: u8 = 0x08;
pub const REG41_LAMPSTS: u8 = 0x04;
pub const REG41_FEBUSY: u8 = 0x02;
pub const REG41_MOTORENB: u8 = 0x01;

pub const REG_SCANCNT: u8 = 0x4d;
pub const REG_FE_ADDR: u8 = 0x51;
pub const REG_RAM_ADDR_HI: u8 = 0x5b;
pub const REG_RAM_ADDR_LO: u8 = 0x5c;

pub const REG5E: u8 = 0x5e;
pub const REG5E_DECSEL: u8 = 0xe0;
pub const REG5E_STOPTIM: u8 = 0x1f;
pub const REG_FMOVDEC: u8 = 0x5f;
pub const REG_Z1MOD: u8 = 0x60;
pub const REG_Z2MOD: u8 = 0x63;

pub const REG67: u8 = 0x67;
pub const REG68: u8 = 0x68;
pub const REG_STEPSEL: u8 = 0xc0;
pub const REG_FSHDEC: u8 = 0x69;
pub const REG_FMOVNO: u8 = 0x6a;

pub const REG6C: u8 = 0x6c;
pub const REG6D: u8 = 0x6d;
pub const REG6E: u8 = 0x6e;
pub const REG6F: u8 = 0x6f;
pub const REG7E: u8 = 0x7e;

pub const REG9D: u8 = 0x9d;
pub const REG9D_STEPTIM: u8 = 0x0c;

pub const REGA6: u8 = 0xa6;
pub const REGA7: u8 = 0xa7;
pub const REGA8: u8 = 0xa8;
pub const REGA9: u8 = 0xa9;

/// Bulk port for image data.
pub const PORT_IMAGE: u8 = 0x45;
/// Bulk port for slope and gamma RAM.
pub const PORT_SLOPE_GAMMA: u8 = 0x28;
/// Bulk port for shading RAM.
pub const PORT_SHADING: u8 = 0x3c;

/// Base of the motor slope-table RAM; each slot is 0x8000 bytes apart.
pub const SLOPE_RAM_BASE: u32 = 0x40000;
pub const SLOPE_RAM_STRIDE: u32 = 0x8000;

/// AFE register addresses (type-0 frontends).
pub const AFE_OFFSET_BASE: u8 = 0x20;
pub const AFE_SIGN_BASE: u8 = 0x24;
pub const AFE_GAIN_BASE: u8 = 0x28;

/// DPIHW field for a hardware dpi tier.
pub fn dpihw_bits(hwdpi: u32) -> u8 {
    match hwdpi {
        0..=600 => REG05_DPIHW_600,
        601..=1200 => REG05_DPIHW_1200,
        1201..=2400 => REG05_DPIHW_2400,
        _ => REG05_DPIHW_4800,
    }
}

/// STEPTIM field of 0x9d for a motor step multiplier.
pub fn step_multiplier_bits(multiplier: u32) -> u8 {
    match multiplier {
        2 => 0x04,
        4 => 0x08,
        _ => 0x00,
    }
}

/// Inverse of [`step_multiplier_bits`].
pub fn step_multiplier_from_bits(reg9d: u8) -> u32 {
    match reg9d & REG9D_STEPTIM {
        0x04 => 2,
        0x08 => 4,
        _ => 1,
    }
}

/// Ordered power-on register table.
///
/// Every register the session builder programs is present, so later
/// `set8` calls never hit `NotFound`.
pub fn default_registers() -> RegisterSet {
    RegisterSet::from_pairs(&[
        (REG01, 0x00),
        (REG02, 0x78),
        (REG03, 0x1f),
        (REG04, 0x10),
        (REG05, 0x80),
        (REG06, 0xd8),
        (0x08, 0x00),
        (0x09, 0x00),
        (REG0A, 0x00),
        (REG0B, 0x6a),
        (0x10, 0x00),
        (0x11, 0x00),
        (0x12, 0x00),
        (0x13, 0x00),
        (0x14, 0x00),
        (0x15, 0x00),
        (0x16, 0x33),
        (0x17, 0x1c),
        (REG18, 0x10),
        (0x19, 0x2a),
        (0x1a, 0x04),
        (0x1b, 0x00),
        (0x1c, 0x20),
        (0x1d, 0x04),
        (REG1E, 0x10),
        (0x1f, 0x01),
        (0x20, 0x10),
        (REG_STEPNO, 0x04),
        (REG_FWDSTEP, 0x01),
        (REG_BWDSTEP, 0x01),
        (REG_FASTNO, 0x04),
        (0x25, 0x00),
        (0x26, 0x00),
        (0x27, 0x00),
        (REG_DPISET, 0x02),
        (0x2d, 0x58),
        (0x2e, 0x80),
        (0x2f, 0x80),
        (0x30, 0x00),
        (0x31, 0x14),
        (0x32, 0x27),
        (0x33, 0xec),
        (REG_DUMMY, 0x24),
        (0x35, 0x00),
        (0x36, 0xff),
        (0x37, 0xff),
        (REG_LPERIOD, 0x55),
        (0x39, 0xf0),
        (REG_FEEDL, 0x00),
        (0x3e, 0x00),
        (0x3f, 0x01),
        (0x52, 0x01),
        (0x53, 0x04),
        (0x54, 0x07),
        (0x55, 0x0a),
        (0x56, 0x0d),
        (0x57, 0x10),
        (0x58, 0x1b),
        (0x59, 0x00),
        (0x5a, 0x40),
        (REG5E, 0x23),
        (REG_FMOVDEC, 0x01),
        (0x60, 0x00),
        (0x61, 0x00),
        (0x62, 0x00),
        (0x63, 0x00),
        (0x64, 0x00),
        (0x65, 0x00),
        (REG67, 0x7f),
        (REG68, 0x7f),
        (REG_FSHDEC, 0x01),
        (REG_FMOVNO, 0x04),
        (0x6b, 0x30),
        (0x70, 0x01),
        (0x71, 0x03),
        (0x72, 0x04),
        (0x73, 0x05),
        (0x74, 0x00),
        (0x75, 0x00),
        (0x76, 0x00),
        (0x77, 0x00),
        (0x78, 0x00),
        (0x79, 0x00),
        (0x7a, 0x00),
        (0x7b, 0x00),
        (0x7c, 0x00),
        (0x7d, 0x00),
        (REG7E, 0x00),
        (0x7f, 0x00),
        (0x80, 0x00),
        (0x87, 0x00),
        (REG9D, 0x04),
        (0xa2, 0x1f),
        (0xab, 0x00),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_programmed_fields() {
        let regs = default_registers();
        for addr in [
            REG_EXPR, REG_EXPG, REG_EXPB, REG_LINCNT, REG_DPISET, REG_STRPIXEL, REG_ENDPIXEL,
            REG_MAXWD, REG_LPERIOD, REG_FEEDL, REG_Z1MOD, REG_Z2MOD,
        ] {
            assert!(regs.has(addr), "missing {addr:#04x}");
        }
        assert!(regs.get24(REG_MAXWD).is_ok());
        assert!(regs.get24(REG_Z2MOD).is_ok());
    }

    #[test]
    fn step_multiplier_bits_round_trip() {
        for m in [1, 2, 4] {
            assert_eq!(step_multiplier_from_bits(step_multiplier_bits(m)), m);
        }
    }

    #[test]
    fn dpihw_tiers() {
        assert_eq!(dpihw_bits(600), REG05_DPIHW_600);
        assert_eq!(dpihw_bits(1200), REG05_DPIHW_1200);
        assert_eq!(dpihw_bits(4800), REG05_DPIHW_4800);
    }
}
