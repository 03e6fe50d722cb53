//! Analog front end state, gain code conversion and register programming.

use scanner_traits::Transport;
use tracing::debug;

use crate::device::Device;
use crate::error::{Result, ScanError};
use crate::gl843::{
    AFE_GAIN_BASE, AFE_OFFSET_BASE, AFE_SIGN_BASE, REG04, REG04_FESET, REG_FE_ADDR,
    REG_FE_DATA_HI, REG_FE_DATA_LO,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontendType {
    #[default]
    Wolfson,
    AnalogDevices,
    Unknown,
}

/// Per-channel offset, gain and sign plus the frontend's setup registers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frontend {
    pub kind: FrontendType,
    /// Setup registers (addresses 1..=3 on type-0 parts; the full raw
    /// register list on type-2 parts).
    pub regs: Vec<(u8, u16)>,
    pub offset: [u16; 3],
    pub gain: [u16; 3],
    pub sign: [u16; 3],
}

/// Gain code that lifts `value` to `target` on a `kind` frontend.
pub fn gain_code(kind: FrontendType, target: f32, value: f32) -> Result<u16> {
    let ratio = target / value;
    match kind {
        FrontendType::Wolfson => {
            let code = 283.0 - 208.0 / ratio;
            Ok(code.clamp(0.0, 255.0) as u16)
        }
        FrontendType::AnalogDevices => {
            let code = 63.0 * (1.0 - (6.0 / ratio - 1.0) / 5.0);
            Ok(code.clamp(0.0, 63.0) as u16)
        }
        FrontendType::Unknown => Err(ScanError::UnsupportedConfiguration(
            "no gain conversion for this frontend".into(),
        )),
    }
}

fn write_fe<T: Transport>(dev: &mut Device<T>, address: u8, value: u16) -> Result<()> {
    let [hi, lo] = value.to_be_bytes();
    dev.write_register_pairs(&[(REG_FE_ADDR, address), (REG_FE_DATA_HI, hi), (REG_FE_DATA_LO, lo)])
}

/// Program `fe` into the analog front end.
///
/// The FESET field of 0x04 selects the register layout. The frontend
/// values become the device's current AFE state.
pub fn write_frontend<T: Transport>(dev: &mut Device<T>, fe: &Frontend, custom: &[(u8, u16)]) -> Result<()> {
    let fe_type = dev.read_register(REG04)? & REG04_FESET;
    match fe_type {
        2 => {
            for &(address, value) in &fe.regs {
                write_fe(dev, address, value)?;
            }
        }
        0 => {
            for &(address, value) in fe.regs.iter().filter(|(a, _)| (1..=3).contains(a)) {
                write_fe(dev, address, value)?;
            }
            for &(address, value) in custom {
                write_fe(dev, address, value)?;
            }
            for ch in 0..3u8 {
                write_fe(dev, AFE_OFFSET_BASE + ch, fe.offset[ch as usize])?;
            }
            for ch in 0..3u8 {
                write_fe(dev, AFE_SIGN_BASE + ch, fe.sign[ch as usize])?;
            }
            for ch in 0..3u8 {
                write_fe(dev, AFE_GAIN_BASE + ch, fe.gain[ch as usize])?;
            }
        }
        other => {
            return Err(ScanError::UnsupportedConfiguration(format!(
                "frontend type {other}"
            )));
        }
    }
    debug!(offset = ?fe.offset, gain = ?fe.gain, "frontend programmed");
    dev.frontend = fe.clone();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wolfson_unity_ratio() {
        assert_eq!(gain_code(FrontendType::Wolfson, 200.0, 200.0).unwrap(), 75);
    }

    #[test]
    fn wolfson_dark_input_saturates() {
        assert_eq!(gain_code(FrontendType::Wolfson, 200.0, 0.0).unwrap(), 255);
        assert_eq!(gain_code(FrontendType::Wolfson, 10.0, 250.0).unwrap(), 0);
    }

    #[test]
    fn analog_devices_range() {
        assert_eq!(gain_code(FrontendType::AnalogDevices, 200.0, 200.0).unwrap(), 0);
        assert_eq!(gain_code(FrontendType::AnalogDevices, 600.0, 100.0).unwrap(), 63);
    }

    #[test]
    fn unknown_frontend_is_unsupported() {
        assert!(matches!(
            gain_code(FrontendType::Unknown, 1.0, 1.0),
            Err(ScanError::UnsupportedConfiguration(_))
        ));
    }
}
