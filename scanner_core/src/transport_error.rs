//! Maps `Box<dyn Error>` from the transport boundary to typed `ScanError`.
//!
//! `scanner_traits::Transport` returns boxed errors so each transport can
//! carry its own error type; this module folds them into the engine's
//! taxonomy, with a feature-gated path for `scanner_hardware::UsbError`.

use crate::error::ScanError;

/// Map a transport failure during `op` to a `ScanError`.
///
/// USB transfer timeouts stay transport errors: `ScanError::Timeout` is
/// reserved for poll budgets the engine itself enforces.
pub fn map_transport_error(op: &str, e: &(dyn std::error::Error + 'static)) -> ScanError {
    #[cfg(feature = "hardware-errors")]
    {
        use scanner_hardware::error::UsbError;
        if let Some(usb) = e.downcast_ref::<UsbError>() {
            return match usb {
                UsbError::Disconnected => ScanError::Transport(format!("{op}: device disconnected")),
                other => ScanError::Transport(format!("{op}: {other}")),
            };
        }
    }

    ScanError::Transport(format!("{op}: {e}"))
}

/// Extension for `Result`s coming back from a `Transport` call.
pub(crate) trait TransportResultExt<T> {
    fn during(self, op: &str) -> crate::error::Result<T>;
}

impl<T> TransportResultExt<T> for scanner_traits::TransportResult<T> {
    fn during(self, op: &str) -> crate::error::Result<T> {
        self.map_err(|e| map_transport_error(op, e.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_errors_become_transport_errors() {
        let e = std::io::Error::other("pipe stalled");
        let mapped = map_transport_error("write 0x01", &e);
        assert_eq!(
            mapped,
            ScanError::Transport("write 0x01: pipe stalled".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn usb_disconnect_is_a_transport_error() {
        let e = scanner_hardware::error::UsbError::Disconnected;
        let mapped = map_transport_error("read 0x41", &e);
        assert_eq!(
            mapped,
            ScanError::Transport("read 0x41: device disconnected".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn usb_transfer_timeout_is_not_a_poll_timeout() {
        let e = scanner_hardware::error::UsbError::Timeout;
        let mapped = map_transport_error("bulk read", &e);
        assert!(!mapped.is_timeout());
    }
}
