//! Hardware gamma tables.

use scanner_traits::Transport;
use tracing::debug;

use crate::device::Device;
use crate::error::Result;
use crate::gl843::PORT_SLOPE_GAMMA;
use crate::register::pack_le16;
use crate::sensor::SensorDescriptor;

pub const GAMMA_TABLE_SIZE: usize = 256;

/// `65535 * (i / 256)^(1 / gamma)` for each of the 256 inputs.
pub fn generate_gamma_table(gamma: f32) -> Vec<u16> {
    let gamma = if gamma > 0.0 { f64::from(gamma) } else { 1.0 };
    (0..GAMMA_TABLE_SIZE)
        .map(|i| {
            let x = i as f64 / GAMMA_TABLE_SIZE as f64;
            (f64::from(u16::MAX) * x.powf(1.0 / gamma)).round() as u16
        })
        .collect()
}

/// Upload the red, green and blue tables for `sensor` to gamma RAM.
pub fn send_gamma_table<T: Transport>(dev: &mut Device<T>, sensor: &SensorDescriptor) -> Result<()> {
    let mut words = Vec::with_capacity(3 * GAMMA_TABLE_SIZE);
    for g in sensor.gamma {
        words.extend(generate_gamma_table(g));
    }
    debug!(gamma = ?sensor.gamma, "uploading gamma tables");
    dev.write_ram(PORT_SLOPE_GAMMA, 0, &pack_le16(&words))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_gamma_is_identity_ramp() {
        let t = generate_gamma_table(1.0);
        assert_eq!(t.len(), 256);
        assert_eq!(t[0], 0);
        assert_eq!(t[128], 32768);
    }

    #[test]
    fn higher_gamma_brightens_midtones() {
        let t = generate_gamma_table(2.2);
        assert!(t[64] > generate_gamma_table(1.0)[64]);
        assert!(t.windows(2).all(|w| w[0] <= w[1]));
    }
}
