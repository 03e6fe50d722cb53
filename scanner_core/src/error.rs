use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timeout waiting for {0}")]
    Timeout(&'static str),
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("register {0:#04x} not found")]
    NotFound(u8),
}

impl ScanError {
    /// Poll budget expired; the device is still reachable.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
