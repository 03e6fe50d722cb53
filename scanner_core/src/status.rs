//! Decoded views of the two status registers.

use crate::gl843::{
    REG40_ADFSNR, REG40_COVERSNR, REG40_DATAENB, REG40_DOCJAM, REG40_DOCSNR, REG40_MOTMFLG,
    REG41_BUFEMPTY, REG41_FEBUSY, REG41_FEEDFSH, REG41_HOMESNR, REG41_LAMPSTS, REG41_MOTORENB,
    REG41_PWRBIT, REG41_SCANFSH,
};

/// Register 0x41.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerStatus(pub u8);

impl ScannerStatus {
    pub fn is_replugged(self) -> bool {
        self.0 & REG41_PWRBIT == 0
    }
    pub fn is_buffer_empty(self) -> bool {
        self.0 & REG41_BUFEMPTY != 0
    }
    pub fn is_feeding_finished(self) -> bool {
        self.0 & REG41_FEEDFSH != 0
    }
    pub fn is_scanning_finished(self) -> bool {
        self.0 & REG41_SCANFSH != 0
    }
    pub fn is_at_home(self) -> bool {
        self.0 & REG41_HOMESNR != 0
    }
    pub fn is_lamp_on(self) -> bool {
        self.0 & REG41_LAMPSTS != 0
    }
    pub fn is_front_end_busy(self) -> bool {
        self.0 & REG41_FEBUSY != 0
    }
    pub fn is_motor_enabled(self) -> bool {
        self.0 & REG41_MOTORENB != 0
    }
}

/// Register 0x40.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus(pub u8);

impl EngineStatus {
    pub fn has_document(self) -> bool {
        self.0 & REG40_DOCSNR != 0
    }
    pub fn has_adf_document(self) -> bool {
        self.0 & REG40_ADFSNR != 0
    }
    pub fn is_cover_open(self) -> bool {
        self.0 & REG40_COVERSNR != 0
    }
    pub fn is_jammed(self) -> bool {
        self.0 & REG40_DOCJAM != 0
    }
    pub fn is_motor_moving(self) -> bool {
        self.0 & REG40_MOTMFLG != 0
    }
    pub fn is_data_enabled(self) -> bool {
        self.0 & REG40_DATAENB != 0
    }
    /// Neither image data nor motor motion is in progress.
    pub fn is_idle(self) -> bool {
        !self.is_data_enabled() && !self.is_motor_moving()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_status_bits() {
        let s = ScannerStatus(REG41_HOMESNR | REG41_BUFEMPTY);
        assert!(s.is_at_home());
        assert!(s.is_buffer_empty());
        assert!(!s.is_motor_enabled());

        let e = EngineStatus(REG40_MOTMFLG);
        assert!(e.is_motor_moving());
        assert!(!e.is_idle());
        assert!(EngineStatus(0).is_idle());
    }
}
