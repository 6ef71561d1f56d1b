//! Connection lifecycle and synchronous control transfers.

use log::{debug, trace};

use crate::backend::{
    DeviceHandle, DeviceInstance, SetupPacket, TransportHandle, UsbBackend,
};
use crate::consts::{CONTROL_TRANSFER_TIMEOUT, MAX_ENUMERATED_DEVICES};
use crate::device::{DeviceDescriptor, ListGuard};
use crate::error::{Error, Result};
use crate::resolver;

/// One live, exclusive channel to a device.
///
/// A `Connection` owns the pair of native resources acquired while connecting
/// (the OS device handle and the transport handle initialized over it) and
/// releases both together, exactly once, on [`Connection::disconnect`] or on
/// drop. When the connection is broken (the device is unplugged), the
/// instance stops functioning; there is no automatic reconnect.
///
/// Transfers are strictly synchronous and cannot be cancelled; each one runs
/// to completion, stall, timeout, or device disconnect. The executor defines
/// no behavior for transfers issued concurrently from multiple threads
/// against the same connection; the owner must serialize them.
#[derive(Debug)]
pub struct Connection<'a, B: UsbBackend> {
    backend: &'a B,
    transport: TransportHandle,
    device: DeviceHandle,
    instance: DeviceInstance,
    serial_number: String,
    released: bool,
}

impl<'a, B: UsbBackend> Connection<'a, B> {
    /// Connects to the device identified by `descriptor`.
    ///
    /// The descriptor's instance reference is re-resolved against a fresh
    /// enumeration snapshot, so a descriptor for a device unplugged since the
    /// caller's last enumeration fails with [`Error::DeviceNotFound`] instead
    /// of opening the wrong device. An exclusive-open conflict fails with
    /// [`Error::AccessDenied`]. On success the 350 ms control-transfer
    /// timeout policy is already applied.
    pub fn open(backend: &'a B, descriptor: &DeviceDescriptor) -> Result<Self> {
        match descriptor.interface_class {
            Some(class) => {
                let list = ListGuard::open(backend, class)?;
                let mut present = false;
                for index in 0..MAX_ENUMERATED_DEVICES {
                    match backend.list_entry(list.handle, index)? {
                        Some(instance) if instance == descriptor.instance => {
                            present = true;
                            break;
                        }
                        Some(_) => continue,
                        None => break,
                    }
                }
                if !present {
                    return Err(Error::DeviceNotFound(format!(
                        "none of the connected devices match {}",
                        descriptor.display_text
                    )));
                }
            }
            None => {
                let instances =
                    backend.instances_by_ids(descriptor.vendor_id, &[descriptor.product_id])?;
                if !instances.contains(&descriptor.instance) {
                    return Err(Error::DeviceNotFound(format!(
                        "none of the connected devices match {}",
                        descriptor.display_text
                    )));
                }
            }
        }

        let device = backend.open_device(descriptor.instance, descriptor.interface_class)?;

        // From here on, every failure must release whatever was already
        // acquired before propagating.
        let transport = match backend.init_transport(device) {
            Ok(transport) => transport,
            Err(e) => {
                backend.close_device(device);
                return Err(e);
            }
        };

        if let Err(e) = backend.set_transfer_timeout(transport, CONTROL_TRANSFER_TIMEOUT) {
            backend.free_transport(transport);
            backend.close_device(device);
            return Err(e);
        }

        debug!(
            "connected to {} (VID={:04X}, PID={:04X})",
            descriptor.display_text, descriptor.vendor_id, descriptor.product_id
        );

        Ok(Connection {
            backend,
            transport,
            device,
            instance: descriptor.instance,
            serial_number: descriptor.serial_number.clone(),
            released: false,
        })
    }

    /// The USB serial number string of the device, cached at connect time.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Reads the USB product id of the connected device.
    pub fn product_id(&self) -> Result<u16> {
        resolver::resolve_product_id(self.backend, self.instance)
    }

    /// Reads the USB vendor id of the connected device.
    pub fn vendor_id(&self) -> Result<u16> {
        resolver::resolve_vendor_id(self.backend, self.instance)
    }

    /// The instance reference this connection was opened against.
    pub fn device_instance(&self) -> DeviceInstance {
        self.instance
    }

    /// True if `descriptor` refers to the device this connection is open to.
    pub fn is_same_device_as(&self, descriptor: &DeviceDescriptor) -> bool {
        self.instance == descriptor.instance
    }

    /// Performs a control transfer with no data stage, blocking until it
    /// completes. A transport that reports moving data anyway is treated as
    /// an error ([`Error::UnexpectedDataStage`]).
    ///
    /// For the meaning of the four setup fields, see section 9.3 of the USB
    /// specification.
    pub fn control_transfer(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
    ) -> Result<()> {
        let setup = SetupPacket::new(request_type, request, value, index, 0);
        let transferred = self.control_transfer_raw(setup, None)?;
        if transferred != 0 {
            return Err(Error::UnexpectedDataStage { transferred });
        }
        Ok(())
    }

    /// Performs a control transfer whose data stage is exactly `buffer`.
    ///
    /// Whether the buffer is filled by the device or consumed by it is
    /// determined by the direction bit of `request_type`, not chosen
    /// separately. Returns the number of bytes actually moved in the data
    /// stage; callers expecting an exact count (e.g. reading a fixed-size
    /// struct) must compare it against the expected size themselves.
    pub fn control_transfer_data(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buffer: &mut [u8],
    ) -> Result<usize> {
        let length = u16::try_from(buffer.len()).map_err(|_| {
            Error::InvalidArgument(format!(
                "control transfer buffer of {} bytes exceeds the 16-bit length field",
                buffer.len()
            ))
        })?;
        let setup = SetupPacket::new(request_type, request, value, index, length);
        self.control_transfer_raw(setup, Some(buffer))
    }

    /// Performs a control transfer from an explicit setup packet.
    ///
    /// The buffer is validated against `setup.length` before any native call
    /// is made: a zero length admits no buffer, and a nonzero length requires
    /// a buffer of exactly that many bytes.
    pub fn control_transfer_raw(
        &self,
        setup: SetupPacket,
        buffer: Option<&mut [u8]>,
    ) -> Result<usize> {
        if setup.length == 0 {
            if buffer.is_some() {
                return Err(Error::InvalidArgument(
                    "the setup packet length field is zero, but a buffer was provided".to_string(),
                ));
            }
        } else {
            match &buffer {
                None => {
                    return Err(Error::InvalidArgument(format!(
                        "the setup packet length field is {}, but no buffer was provided",
                        setup.length
                    )));
                }
                Some(b) if b.len() != setup.length as usize => {
                    return Err(Error::InvalidArgument(format!(
                        "the setup packet length field is {}, but the buffer provided is {} bytes",
                        setup.length,
                        b.len()
                    )));
                }
                Some(_) => {}
            }
        }

        trace!(
            "control transfer: type=0x{:02X}, request=0x{:02X}, value=0x{:04X}, index=0x{:04X}, length={}",
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
            setup.length
        );
        self.backend.control_transfer(self.transport, setup, buffer)
    }

    /// Disconnects from the device, freeing all resources that were allocated
    /// when the connection was made. Dropping the connection does the same.
    pub fn disconnect(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            // Transport first, then the device handle it was built over.
            self.backend.free_transport(self.transport);
            self.backend.close_device(self.device);
            debug!("disconnected from #{}", self.serial_number);
        }
    }
}

impl<B: UsbBackend> Drop for Connection<'_, B> {
    fn drop(&mut self) {
        self.release();
    }
}
