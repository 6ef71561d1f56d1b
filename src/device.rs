//! Device descriptors and enumeration.

use log::{debug, trace};

use crate::backend::{DeviceInstance, InterfaceClass, ListHandle, UsbBackend};
use crate::consts::MAX_ENUMERATED_DEVICES;
use crate::error::Result;
use crate::resolver;

/// One physical device currently visible to the OS, as produced by
/// [`list_devices`] or [`list_devices_by_ids`].
///
/// The descriptor is a snapshot: it does not track subsequent attach/detach
/// (that is the notification registrar's job), and its `instance` reference
/// is only valid for the current session. Two descriptors refer to the same
/// physical device iff [`DeviceDescriptor::is_same_device_as`] returns true;
/// serial numbers are not guaranteed unique, although in practice they are.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    /// The device-interface class this device was found under, or `None` for
    /// descriptors produced by the vendor/product fallback mode.
    pub interface_class: Option<InterfaceClass>,
    /// Opaque reference to the device's position in the OS device tree.
    /// This is the identity key for the descriptor.
    pub instance: DeviceInstance,
    /// USB serial number string, resolved from the device instance id.
    /// An 8-digit decimal number on PIC18-based devices, a 24-digit hex
    /// number on STM32-based ones.
    pub serial_number: String,
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id. Distinct for every product, including bootloaders.
    pub product_id: u16,
    /// Human-facing label, `"#" + serial_number` by default. Applications may
    /// overwrite it (for example to add a model name) without affecting
    /// identity.
    pub display_text: String,
}

impl DeviceDescriptor {
    fn new(
        interface_class: Option<InterfaceClass>,
        instance: DeviceInstance,
        serial_number: String,
        vendor_id: u16,
        product_id: u16,
    ) -> Self {
        let display_text = format!("#{serial_number}");
        DeviceDescriptor {
            interface_class,
            instance,
            serial_number,
            vendor_id,
            product_id,
            display_text,
        }
    }

    /// True if the two descriptors refer to the same physical device.
    pub fn is_same_device_as(&self, other: &DeviceDescriptor) -> bool {
        self.instance == other.instance
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_text)
    }
}

/// Closes the enumeration snapshot on every exit path, success or failure.
pub(crate) struct ListGuard<'a, B: UsbBackend> {
    backend: &'a B,
    pub(crate) handle: ListHandle,
}

impl<'a, B: UsbBackend> ListGuard<'a, B> {
    pub(crate) fn open(backend: &'a B, class: InterfaceClass) -> Result<Self> {
        let handle = backend.list_open(class)?;
        Ok(ListGuard { backend, handle })
    }
}

impl<B: UsbBackend> Drop for ListGuard<'_, B> {
    fn drop(&mut self) {
        self.backend.list_close(self.handle);
    }
}

/// Lists the currently attached devices implementing `class`.
///
/// Returns one [`DeviceDescriptor`] per present device, with the serial
/// number already resolved (walking to the composite parent where needed).
/// Iteration stops at the OS's "no more items" signal, and in any case after
/// [`MAX_ENUMERATED_DEVICES`] entries.
///
/// Backends that cannot enumerate by interface class fail with
/// [`crate::Error::NotSupported`]; catch that and call
/// [`list_devices_by_ids`] instead.
pub fn list_devices<B: UsbBackend>(
    backend: &B,
    class: InterfaceClass,
) -> Result<Vec<DeviceDescriptor>> {
    let list = ListGuard::open(backend, class)?;

    let mut devices = Vec::new();
    for index in 0..MAX_ENUMERATED_DEVICES {
        let instance = match backend.list_entry(list.handle, index)? {
            Some(instance) => instance,
            None => break,
        };
        devices.push(describe(backend, Some(class), instance)?);
    }
    debug!("enumerated {} device(s) for class {class}", devices.len());
    Ok(devices)
}

/// Lists the currently attached devices matching `vendor_id` and any of
/// `product_ids`. This is the fallback for backends that cannot enumerate by
/// interface class; it produces descriptors of exactly the same shape as
/// [`list_devices`], minus the interface class.
pub fn list_devices_by_ids<B: UsbBackend>(
    backend: &B,
    vendor_id: u16,
    product_ids: &[u16],
) -> Result<Vec<DeviceDescriptor>> {
    let instances = backend.instances_by_ids(vendor_id, product_ids)?;

    let mut devices = Vec::new();
    for instance in instances.into_iter().take(MAX_ENUMERATED_DEVICES as usize) {
        devices.push(describe(backend, None, instance)?);
    }
    debug!(
        "enumerated {} device(s) for vendor {vendor_id:04X}",
        devices.len()
    );
    Ok(devices)
}

/// Names of the serial ports (e.g. `COM3`, `/dev/ttyACM0`) belonging to
/// present devices whose instance id begins with `instance_id_prefix`. Useful
/// for finding the virtual serial port side of a dual-interface device, e.g.
/// with a prefix of `USB\VID_1FFB&PID_0089`.
pub fn port_names<B: UsbBackend>(backend: &B, instance_id_prefix: &str) -> Result<Vec<String>> {
    backend.serial_port_names(instance_id_prefix)
}

// Resolve everything from one instance-id read where possible; the serial
// number may additionally need the parent's id.
fn describe<B: UsbBackend>(
    backend: &B,
    class: Option<InterfaceClass>,
    instance: DeviceInstance,
) -> Result<DeviceDescriptor> {
    let serial_number = resolver::resolve_serial_number(backend, instance)?;
    let vendor_id = resolver::resolve_vendor_id(backend, instance)?;
    let product_id = resolver::resolve_product_id(backend, instance)?;
    trace!(
        "found device: VID={vendor_id:04X}, PID={product_id:04X}, serial={serial_number}, {instance:?}"
    );
    Ok(DeviceDescriptor::new(
        class,
        instance,
        serial_number,
        vendor_id,
        product_id,
    ))
}
