//! A [`UsbBackend`] built on libusb via the `rusb` crate.
//!
//! libusb has no notion of device-interface classes or a device tree, so this
//! backend supports only the vendor/product fallback enumeration mode;
//! [`UsbBackend::list_open`] reports `NotSupported` and callers fall back to
//! [`crate::list_devices_by_ids`]. Instance ids are synthesized in the
//! canonical `USB\VID_xxxx&PID_xxxx\<serial>` form at enumeration time, from
//! the device descriptor and the serial-number string descriptor, so the
//! shared identity resolver works unchanged. The serial number can never
//! contain the composite-function marker here, so the parent walk is never
//! taken.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, trace};
use rusb::UsbContext;

use crate::backend::{
    DeviceHandle, DeviceInstance, InterfaceClass, ListHandle, NotificationHandle,
    NotificationTarget, SetupPacket, TransportHandle, UsbBackend,
};
use crate::consts::CONTROL_TRANSFER_TIMEOUT;
use crate::error::{Error, Result};

struct InstanceEntry {
    device: rusb::Device<rusb::Context>,
    instance_id: String,
}

struct TransportEntry {
    handle: Arc<rusb::DeviceHandle<rusb::Context>>,
    timeout: Duration,
}

/// USB backend for OSes served by libusb.
pub struct LibusbBackend {
    context: rusb::Context,
    next_token: AtomicU64,
    instances: Mutex<HashMap<u64, InstanceEntry>>,
    devices: Mutex<HashMap<u64, Arc<rusb::DeviceHandle<rusb::Context>>>>,
    transports: Mutex<HashMap<u64, TransportEntry>>,
}

impl LibusbBackend {
    /// Initializes a libusb context.
    pub fn new() -> Result<Self> {
        let context = rusb::Context::new().map_err(|e| classify("initializing libusb", e))?;
        Ok(LibusbBackend {
            context,
            next_token: AtomicU64::new(1),
            instances: Mutex::new(HashMap::new()),
            devices: Mutex::new(HashMap::new()),
            transports: Mutex::new(HashMap::new()),
        })
    }

    fn token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }
}

// A libusb device is identified within a session by its bus number and
// address; that pair is stable until the device is unplugged or reset.
fn instance_key(device: &rusb::Device<rusb::Context>) -> u64 {
    (u64::from(device.bus_number()) << 8) | u64::from(device.address())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn classify(operation: &'static str, e: rusb::Error) -> Error {
    match e {
        rusb::Error::Access | rusb::Error::Busy => Error::AccessDenied,
        rusb::Error::NoDevice | rusb::Error::NotFound => {
            Error::DeviceNotFound(format!("{operation}: {e}"))
        }
        rusb::Error::Timeout => Error::Timeout,
        rusb::Error::InvalidParam => Error::InvalidArgument(format!("{operation}: {e}")),
        _ => Error::TransferFailed {
            operation,
            detail: e.to_string(),
        },
    }
}

impl UsbBackend for LibusbBackend {
    fn list_open(&self, _class: InterfaceClass) -> Result<ListHandle> {
        Err(Error::NotSupported("enumeration by device interface class"))
    }

    fn list_entry(&self, _list: ListHandle, _index: u8) -> Result<Option<DeviceInstance>> {
        Err(Error::NotSupported("enumeration by device interface class"))
    }

    fn list_close(&self, _list: ListHandle) {}

    fn instances_by_ids(&self, vendor_id: u16, product_ids: &[u16]) -> Result<Vec<DeviceInstance>> {
        let devices = self
            .context
            .devices()
            .map_err(|e| classify("listing USB devices", e))?;

        let mut found = Vec::new();
        let mut table = lock(&self.instances);
        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            if descriptor.vendor_id() != vendor_id
                || !product_ids.contains(&descriptor.product_id())
            {
                continue;
            }

            // Open the device briefly to read the serial number string; the
            // enumeration snapshot needs it for the instance id.
            let handle = device
                .open()
                .map_err(|e| classify("opening a device to read its serial number", e))?;
            let serial = handle
                .read_serial_number_string_ascii(&descriptor)
                .map_err(|e| classify("reading the serial number string descriptor", e))?;

            let key = instance_key(&device);
            let instance_id = format!(
                "USB\\VID_{:04X}&PID_{:04X}\\{}",
                vendor_id,
                descriptor.product_id(),
                serial
            );
            trace!("found {instance_id} at bus {} address {}", device.bus_number(), device.address());
            table.insert(
                key,
                InstanceEntry {
                    device,
                    instance_id,
                },
            );
            found.push(DeviceInstance(key));
        }
        Ok(found)
    }

    fn instance_id(&self, instance: DeviceInstance) -> Result<String> {
        lock(&self.instances)
            .get(&instance.0)
            .map(|entry| entry.instance_id.clone())
            .ok_or_else(|| {
                Error::DeviceNotFound("the device instance is no longer present".to_string())
            })
    }

    fn parent_instance(&self, _instance: DeviceInstance) -> Result<DeviceInstance> {
        // Synthesized instance ids never carry the composite-function marker,
        // so the resolver never asks for a parent here.
        Err(Error::DeviceNotFound(
            "libusb exposes no parent device instances".to_string(),
        ))
    }

    fn open_device(
        &self,
        instance: DeviceInstance,
        _class: Option<InterfaceClass>,
    ) -> Result<DeviceHandle> {
        let device = lock(&self.instances)
            .get(&instance.0)
            .map(|entry| entry.device.clone())
            .ok_or_else(|| {
                Error::DeviceNotFound("the device instance is no longer present".to_string())
            })?;
        let handle = device
            .open()
            .map_err(|e| classify("opening the device", e))?;
        let token = self.token();
        lock(&self.devices).insert(token, Arc::new(handle));
        debug!("opened device at bus {} address {}", device.bus_number(), device.address());
        Ok(DeviceHandle(token))
    }

    fn close_device(&self, device: DeviceHandle) {
        lock(&self.devices).remove(&device.0);
    }

    fn init_transport(&self, device: DeviceHandle) -> Result<TransportHandle> {
        let handle = lock(&self.devices)
            .get(&device.0)
            .cloned()
            .ok_or_else(|| Error::InvalidArgument("unknown device handle".to_string()))?;
        let token = self.token();
        lock(&self.transports).insert(
            token,
            TransportEntry {
                handle,
                timeout: CONTROL_TRANSFER_TIMEOUT,
            },
        );
        Ok(TransportHandle(token))
    }

    fn set_transfer_timeout(&self, transport: TransportHandle, timeout: Duration) -> Result<()> {
        let mut transports = lock(&self.transports);
        let entry = transports
            .get_mut(&transport.0)
            .ok_or_else(|| Error::InvalidArgument("unknown transport handle".to_string()))?;
        entry.timeout = timeout;
        Ok(())
    }

    fn free_transport(&self, transport: TransportHandle) {
        lock(&self.transports).remove(&transport.0);
    }

    fn control_transfer(
        &self,
        transport: TransportHandle,
        setup: SetupPacket,
        buffer: Option<&mut [u8]>,
    ) -> Result<usize> {
        // Clone the handle out so the table lock is not held for the
        // duration of a blocking transfer.
        let (handle, timeout) = {
            let transports = lock(&self.transports);
            let entry = transports
                .get(&transport.0)
                .ok_or_else(|| Error::InvalidArgument("unknown transport handle".to_string()))?;
            (Arc::clone(&entry.handle), entry.timeout)
        };

        let result = if setup.is_device_to_host() {
            let buf: &mut [u8] = match buffer {
                Some(b) => b,
                None => &mut [],
            };
            handle.read_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                buf,
                timeout,
            )
        } else {
            let buf: &[u8] = match &buffer {
                Some(b) => b,
                None => &[],
            };
            handle.write_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                buf,
                timeout,
            )
        };
        result.map_err(|e| classify("control transfer", e))
    }

    fn supports_notifications(&self) -> bool {
        false
    }

    fn register_notifications(
        &self,
        _class: InterfaceClass,
        _target: NotificationTarget,
    ) -> Result<NotificationHandle> {
        Err(Error::NotSupported("device change notifications"))
    }

    fn unregister_notifications(&self, _handle: NotificationHandle) -> Result<()> {
        Err(Error::NotSupported("device change notifications"))
    }

    fn serial_port_names(&self, _instance_id_prefix: &str) -> Result<Vec<String>> {
        // No port registry to match the prefix against; report every USB CDC
        // ACM or USB-serial port instead, as /dev entries.
        let entries = match fs::read_dir("/dev") {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };
        let mut names = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("ttyACM") || name.starts_with("ttyUSB") {
                names.push(format!("/dev/{name}"));
            }
        }
        names.sort();
        Ok(names)
    }
}
