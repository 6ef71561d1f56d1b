//! The seam between the portable transport layer and the OS USB stack.
//!
//! Everything above this module (enumeration, identity resolution, connection
//! lifecycle, control transfers, hotplug notifications) is written against the
//! [`UsbBackend`] trait, so any OS's native USB driver interface can carry the
//! same contract. The crate ships one concrete implementation,
//! [`crate::libusb::LibusbBackend`]; test suites provide scripted ones.

use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Identifier of an OS device-interface class (the device interface GUID from
/// the driver package on Windows). Used as the primary enumeration filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceClass(pub [u8; 16]);

impl InterfaceClass {
    /// Builds an interface class identifier from its raw 16 bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        InterfaceClass(bytes)
    }
}

impl fmt::Display for InterfaceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{{{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}}}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10],
            b[11], b[12], b[13], b[14], b[15]
        )
    }
}

/// Opaque, session-scoped reference to a device's position in the live OS
/// device tree (a DEVINST on Windows, a bus/address pair on libusb).
///
/// Valid only until the device is unplugged or re-enumerated; never persist
/// one across process runs. Two values are the same physical device iff they
/// compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceInstance(pub u64);

/// Handle to an open OS enumeration snapshot. Must be returned to
/// [`UsbBackend::list_close`] on every path once opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListHandle(pub u64);

/// Native handle to the OS-level file-like device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle(pub u64);

/// Native handle to the transport layer initialized over a device handle;
/// the handle actual transfers are issued against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHandle(pub u64);

/// Opaque handle representing a registered device-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationHandle(pub u64);

/// The event sink that receives device-change notifications: a raw window or
/// callback handle, interpreted only by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationTarget(pub isize);

/// The fixed 8-byte SETUP stage of a USB control transfer (USB 2.0 §9.3).
///
/// The field layout is bit-exact per the USB specification; downstream
/// protocol layers depend on it. The direction of the data stage is carried
/// by the top bit of `request_type`, not chosen separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    /// bmRequestType: direction, recipient, and transfer type.
    pub request_type: u8,
    /// bRequest: the request code.
    pub request: u8,
    /// wValue.
    pub value: u16,
    /// wIndex.
    pub index: u16,
    /// wLength: exact length of the data stage, zero for none.
    pub length: u16,
}

impl SetupPacket {
    /// Builds a setup packet.
    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        SetupPacket {
            request_type,
            request,
            value,
            index,
            length,
        }
    }

    /// True if the data stage flows from the device to the host (the
    /// direction bit of bmRequestType is set).
    pub fn is_device_to_host(&self) -> bool {
        self.request_type & 0x80 != 0
    }
}

/// Synchronous OS USB primitives consumed by the transport layer.
///
/// Every method blocks the calling thread for its full duration. Handle
/// values are opaque tokens scoped to the backend that minted them;
/// implementations are responsible for mapping them to real OS resources.
/// Exclusive-open conflicts must surface as [`crate::Error::AccessDenied`]
/// and vanished devices as [`crate::Error::DeviceNotFound`] so the layers
/// above can classify failures uniformly.
pub trait UsbBackend {
    /// Opens an enumeration snapshot of the currently present devices that
    /// implement `class`. Backends that cannot enumerate by interface class
    /// return [`crate::Error::NotSupported`]; callers then fall back to
    /// [`UsbBackend::instances_by_ids`].
    fn list_open(&self, class: InterfaceClass) -> Result<ListHandle>;

    /// Returns the device at `index` in the snapshot, or `Ok(None)` once the
    /// OS reports no more items (which is not an error).
    fn list_entry(&self, list: ListHandle, index: u8) -> Result<Option<DeviceInstance>>;

    /// Releases an enumeration snapshot. Infallible by contract; the OS call
    /// it wraps only frees memory.
    fn list_close(&self, list: ListHandle);

    /// Fallback enumeration mode: all present devices matching `vendor_id`
    /// and any of `product_ids`. Backends that require class-based
    /// enumeration return [`crate::Error::NotSupported`].
    fn instances_by_ids(&self, vendor_id: u16, product_ids: &[u16]) -> Result<Vec<DeviceInstance>>;

    /// Reads the device instance id string for `instance`, e.g.
    /// `USB\VID_1FFB&PID_0089\00012345`.
    fn instance_id(&self, instance: DeviceInstance) -> Result<String>;

    /// Returns the parent of `instance` in the device tree. Used to resolve
    /// the serial number of a composite function child.
    fn parent_instance(&self, instance: DeviceInstance) -> Result<DeviceInstance>;

    /// Opens an exclusive device handle for `instance`. `class` is the
    /// interface class the instance was enumerated under, when known.
    fn open_device(&self, instance: DeviceInstance, class: Option<InterfaceClass>)
        -> Result<DeviceHandle>;

    /// Closes a device handle, allowing other programs (or this one, later)
    /// to open the device again.
    fn close_device(&self, device: DeviceHandle);

    /// Initializes the transfer transport over an open device handle.
    fn init_transport(&self, device: DeviceHandle) -> Result<TransportHandle>;

    /// Sets the timeout policy applied to subsequent control transfers on
    /// `transport`.
    fn set_transfer_timeout(&self, transport: TransportHandle, timeout: Duration) -> Result<()>;

    /// Frees a transport handle. Must be called before the device handle it
    /// was initialized over is closed.
    fn free_transport(&self, transport: TransportHandle);

    /// Issues one synchronous control transfer and returns the number of
    /// bytes moved in the data stage. `buffer`, when present, is exactly
    /// `setup.length` bytes long; the caller has already validated this.
    /// Blocks until completion, stall, timeout, or device disconnect.
    fn control_transfer(
        &self,
        transport: TransportHandle,
        setup: SetupPacket,
        buffer: Option<&mut [u8]>,
    ) -> Result<usize>;

    /// True if this backend can deliver attach/detach notifications.
    fn supports_notifications(&self) -> bool;

    /// Registers `target` to receive device-change events for `class`.
    fn register_notifications(
        &self,
        class: InterfaceClass,
        target: NotificationTarget,
    ) -> Result<NotificationHandle>;

    /// Stops delivering device-change events for a registration.
    fn unregister_notifications(&self, handle: NotificationHandle) -> Result<()>;

    /// Names of the serial ports (e.g. `COM3`, `/dev/ttyACM0`) belonging to
    /// present devices whose instance id starts with `instance_id_prefix`.
    /// Backends without a port registry may ignore the prefix.
    fn serial_port_names(&self, instance_id_prefix: &str) -> Result<Vec<String>>;
}
