use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsbError {
    #[error("usb: {0}")]
    Usb(String),
    #[error("usb transfer timeout")]
    Timeout,
    #[error("device disconnected")]
    Disconnected,
    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },
    #[error("injected fault: {0}")]
    Injected(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "hardware")]
impl From<rusb::Error> for UsbError {
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::Timeout => UsbError::Timeout,
            rusb::Error::NoDevice => UsbError::Disconnected,
            other => UsbError::Usb(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, UsbError>;
