//! Hardware seams for the scanner engine.
//!
//! The core never talks to USB directly: every register access and every
//! bulk transfer goes through [`Transport`]. Errors cross this boundary as
//! boxed trait objects so transports can carry their own typed errors.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error used at the transport boundary.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for transport calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Negotiated USB link speed of the attached scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkSpeed {
    /// USB 1.1 full speed (12 Mbit/s).
    Full,
    /// USB 2.0 high speed (480 Mbit/s).
    #[default]
    High,
}

/// Register and memory access to the scanner ASIC.
///
/// Register addresses are one byte wide. Bulk `port` is the ASIC register
/// that selects the memory window for the transfer (e.g. 0x45 for image
/// data, 0x28 for slope/gamma RAM, 0x3c for shading RAM).
pub trait Transport {
    fn read_register(&mut self, address: u8) -> TransportResult<u8>;

    fn write_register(&mut self, address: u8, value: u8) -> TransportResult<()>;

    /// Write `(address, value)` pairs in the given order, stopping at the
    /// first failure. Transports with a batched wire form override this.
    fn write_registers(&mut self, regs: &[(u8, u8)]) -> TransportResult<()> {
        for &(address, value) in regs {
            self.write_register(address, value)?;
        }
        Ok(())
    }

    fn bulk_read(&mut self, port: u8, buf: &mut [u8]) -> TransportResult<()>;

    fn bulk_write(&mut self, port: u8, data: &[u8]) -> TransportResult<()>;

    fn link_speed(&mut self) -> TransportResult<LinkSpeed> {
        Ok(LinkSpeed::High)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_register(&mut self, address: u8) -> TransportResult<u8> {
        (**self).read_register(address)
    }

    fn write_register(&mut self, address: u8, value: u8) -> TransportResult<()> {
        (**self).write_register(address, value)
    }

    fn write_registers(&mut self, regs: &[(u8, u8)]) -> TransportResult<()> {
        (**self).write_registers(regs)
    }

    fn bulk_read(&mut self, port: u8, buf: &mut [u8]) -> TransportResult<()> {
        (**self).bulk_read(port, buf)
    }

    fn bulk_write(&mut self, port: u8, data: &[u8]) -> TransportResult<()> {
        (**self).bulk_write(port, data)
    }

    fn link_speed(&mut self) -> TransportResult<LinkSpeed> {
        (**self).link_speed()
    }
}
