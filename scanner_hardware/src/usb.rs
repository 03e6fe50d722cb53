use std::time::Duration;

use rusb::{DeviceHandle, Direction, GlobalContext, TransferType};
use scanner_traits::{LinkSpeed, Transport, TransportResult};
use tracing::{debug, trace};

use crate::error::{Result, UsbError};
use crate::wire::{
    BulkDirection, BulkTarget, INDEX, MAX_BULK_CHUNK, REQUEST_BUFFER, REQUEST_REGISTER,
    REQUEST_TYPE_IN, REQUEST_TYPE_OUT, VALUE_BUFFER, VALUE_READ_REGISTER, VALUE_SET_REGISTER,
    UsbOptions, bulk_header, register_payload,
};

/// GL843 scanner reached through libusb.
pub struct UsbTransport {
    handle: DeviceHandle<GlobalContext>,
    ep_in: u8,
    ep_out: u8,
    timeout: Duration,
}

impl UsbTransport {
    const INTERFACE: u8 = 0;
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Open the first device matching `vendor_id:product_id` and claim its
    /// scanner interface.
    pub fn open(vendor_id: u16, product_id: u16) -> Result<Self> {
        let mut handle =
            rusb::open_device_with_vid_pid(vendor_id, product_id).ok_or(UsbError::Disconnected)?;
        handle.claim_interface(Self::INTERFACE)?;

        let config = handle.device().active_config_descriptor()?;
        let mut ep_in = None;
        let mut ep_out = None;
        for interface in config.interfaces() {
            for desc in interface.descriptors() {
                for ep in desc.endpoint_descriptors() {
                    if ep.transfer_type() != TransferType::Bulk {
                        continue;
                    }
                    match ep.direction() {
                        Direction::In => ep_in = ep_in.or(Some(ep.address())),
                        Direction::Out => ep_out = ep_out.or(Some(ep.address())),
                    }
                }
            }
        }
        let (Some(ep_in), Some(ep_out)) = (ep_in, ep_out) else {
            return Err(UsbError::Usb("no bulk endpoints on scanner interface".into()));
        };
        debug!(vendor_id, product_id, ep_in, ep_out, "usb scanner opened");
        Ok(Self {
            handle,
            ep_in,
            ep_out,
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    /// Open the device named by `opts` with its transfer timeout applied.
    pub fn open_with(opts: &UsbOptions) -> Result<Self> {
        Ok(Self::open(opts.vendor_id, opts.product_id)?.with_timeout(opts.transfer_timeout))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn control_out(&self, request: u8, value: u16, buf: &[u8]) -> Result<()> {
        let n = self
            .handle
            .write_control(REQUEST_TYPE_OUT, request, value, INDEX, buf, self.timeout)?;
        if n != buf.len() {
            return Err(UsbError::ShortTransfer {
                expected: buf.len(),
                actual: n,
            });
        }
        Ok(())
    }

    fn control_in(&self, request: u8, value: u16, buf: &mut [u8]) -> Result<()> {
        let expected = buf.len();
        let n = self
            .handle
            .read_control(REQUEST_TYPE_IN, request, value, INDEX, buf, self.timeout)?;
        if n != expected {
            return Err(UsbError::ShortTransfer { expected, actual: n });
        }
        Ok(())
    }

    fn select_port(&self, port: u8) -> Result<()> {
        self.control_out(REQUEST_REGISTER, VALUE_SET_REGISTER, &[port])
    }

    fn read_reg(&self, address: u8) -> Result<u8> {
        self.select_port(address)?;
        let mut value = [0u8; 1];
        self.control_in(REQUEST_REGISTER, VALUE_READ_REGISTER, &mut value)?;
        trace!(address, value = value[0], "usb read register");
        Ok(value[0])
    }

    fn write_reg(&self, address: u8, value: u8) -> Result<()> {
        trace!(address, value, "usb write register");
        self.control_out(REQUEST_BUFFER, VALUE_SET_REGISTER, &[address, value])
    }

    fn send_header(&self, direction: BulkDirection, target: BulkTarget, len: usize) -> Result<()> {
        let header = bulk_header(direction, target, 0x0000, len as u32);
        self.control_out(REQUEST_BUFFER, VALUE_BUFFER, &header)
    }

    fn read_chunks(&self, port: u8, buf: &mut [u8]) -> Result<()> {
        self.select_port(port)?;
        for chunk in buf.chunks_mut(MAX_BULK_CHUNK) {
            self.send_header(BulkDirection::In, BulkTarget::Ram, chunk.len())?;
            let n = self.handle.read_bulk(self.ep_in, chunk, self.timeout)?;
            if n != chunk.len() {
                return Err(UsbError::ShortTransfer {
                    expected: chunk.len(),
                    actual: n,
                });
            }
        }
        Ok(())
    }

    fn write_chunks(&self, port: u8, data: &[u8], target: BulkTarget) -> Result<()> {
        self.select_port(port)?;
        for chunk in data.chunks(MAX_BULK_CHUNK) {
            self.send_header(BulkDirection::Out, target, chunk.len())?;
            let n = self.handle.write_bulk(self.ep_out, chunk, self.timeout)?;
            if n != chunk.len() {
                return Err(UsbError::ShortTransfer {
                    expected: chunk.len(),
                    actual: n,
                });
            }
        }
        Ok(())
    }
}

impl Transport for UsbTransport {
    fn read_register(&mut self, address: u8) -> TransportResult<u8> {
        Ok(self.read_reg(address)?)
    }

    fn write_register(&mut self, address: u8, value: u8) -> TransportResult<()> {
        Ok(self.write_reg(address, value)?)
    }

    fn write_registers(&mut self, regs: &[(u8, u8)]) -> TransportResult<()> {
        if regs.is_empty() {
            return Ok(());
        }
        let payload = register_payload(regs);
        self.handle
            .write_control(
                REQUEST_TYPE_OUT,
                REQUEST_BUFFER,
                VALUE_BUFFER,
                INDEX,
                &bulk_header(BulkDirection::Out, BulkTarget::Register, 0, payload.len() as u32),
                self.timeout,
            )
            .map_err(UsbError::from)?;
        let n = self
            .handle
            .write_bulk(self.ep_out, &payload, self.timeout)
            .map_err(UsbError::from)?;
        if n != payload.len() {
            return Err(Box::new(UsbError::ShortTransfer {
                expected: payload.len(),
                actual: n,
            }));
        }
        Ok(())
    }

    fn bulk_read(&mut self, port: u8, buf: &mut [u8]) -> TransportResult<()> {
        Ok(self.read_chunks(port, buf)?)
    }

    fn bulk_write(&mut self, port: u8, data: &[u8]) -> TransportResult<()> {
        Ok(self.write_chunks(port, data, BulkTarget::Ram)?)
    }

    fn link_speed(&mut self) -> TransportResult<LinkSpeed> {
        Ok(match self.handle.device().speed() {
            rusb::Speed::Low | rusb::Speed::Full => LinkSpeed::Full,
            _ => LinkSpeed::High,
        })
    }
}
