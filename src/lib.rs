//! # pololu-usb
//!
//! USB device discovery and synchronous control-transfer transport for the
//! Pololu family of USB motor and servo controllers (Maestro, Jrk, Simple
//! Motor Controller, USB AVR programmer).
//!
//! Device-specific protocol layers, settings file parsers, and command-line
//! front-ends sit above this crate; all of them consume the same small
//! surface: enumerate devices, open a connection, issue control transfers,
//! disconnect, and optionally get told when to re-enumerate.
//!
//! ## Features
//!
//! *   Device discovery by device-interface class ([`list_devices`]) or by
//!     vendor/product id ([`list_devices_by_ids`]) for backends without a
//!     class registry.
//! *   Serial-number resolution that handles USB composite devices (the
//!     serial number of a composite function child lives on its parent).
//! *   Exclusive connections ([`Connection::open`]) with symmetric teardown:
//!     the transport and device handles are always released together, even
//!     when connecting fails partway through.
//! *   Synchronous control transfers with a fixed 350 ms timeout policy, in
//!     no-data-stage and data-stage forms.
//! *   Attach/detach notification registration ([`subscribe`]) on backends
//!     that support it.
//! *   An OS seam ([`UsbBackend`]) small enough to implement over any native
//!     USB driver interface; a libusb implementation ([`LibusbBackend`]) is
//!     included.
//!
//! ## Basic usage
//!
//! ```no_run
//! use pololu_usb::{list_devices_by_ids, Connection, LibusbBackend, POLOLU_VID};
//!
//! fn main() -> pololu_usb::Result<()> {
//!     let backend = LibusbBackend::new()?;
//!
//!     // The libusb backend cannot enumerate by interface class, so go
//!     // straight to the vendor/product fallback. 0x0089 is the Micro
//!     // Maestro's native USB interface.
//!     let devices = list_devices_by_ids(&backend, POLOLU_VID, &[0x0089])?;
//!     let descriptor = devices.first().expect("no device connected");
//!     println!("connecting to {}", descriptor.display_text);
//!
//!     let connection = Connection::open(&backend, descriptor)?;
//!
//!     // Vendor request 0x81 = get a configuration parameter; the protocol
//!     // layer above this crate defines the codes.
//!     let mut value = [0u8; 2];
//!     let transferred =
//!         connection.control_transfer_data(0xC0, 0x81, 0, 0, &mut value)?;
//!     assert_eq!(transferred, value.len());
//!
//!     connection.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! Backends with class-based enumeration (e.g. one built over the Windows
//! SetupDi/WinUSB APIs) serve [`list_devices`] directly; callers that want to
//! run on both kinds catch [`Error::NotSupported`] and fall back:
//!
//! ```no_run
//! # use pololu_usb::*;
//! # fn demo<B: UsbBackend>(backend: &B, class: InterfaceClass) -> Result<()> {
//! let devices = match list_devices(backend, class) {
//!     Err(Error::NotSupported(_)) => {
//!         list_devices_by_ids(backend, POLOLU_VID, &[0x0089, 0x008A])?
//!     }
//!     other => other?,
//! };
//! # Ok(()) }
//! ```
//!
//! ## Concurrency
//!
//! Everything here is strictly synchronous and blocking. A [`Connection`] has
//! one owner; issuing transfers concurrently from several threads against the
//! same connection is not defined and is not guarded against internally.
//! Transfers cannot be cancelled, but the timeout policy bounds their
//! worst-case latency.

mod backend;
mod connection;
mod consts;
mod device;
mod error;
mod libusb;
mod notify;
mod resolver;

pub use backend::{
    DeviceHandle, DeviceInstance, InterfaceClass, ListHandle, NotificationHandle,
    NotificationTarget, SetupPacket, TransportHandle, UsbBackend,
};
pub use connection::Connection;
pub use consts::{
    COMPOSITE_FUNCTION_MARKER, CONTROL_TRANSFER_TIMEOUT, DEVICE_CHANGE_EVENT,
    MAX_ENUMERATED_DEVICES, POLOLU_VID,
};
pub use device::{list_devices, list_devices_by_ids, port_names, DeviceDescriptor};
pub use error::{Error, Result};
pub use libusb::LibusbBackend;
pub use notify::{subscribe, supports_notifications, NotificationSubscription};
pub use resolver::{
    product_id_from_instance_id, resolve_product_id, resolve_serial_number, resolve_vendor_id,
    serial_from_instance_id, vendor_id_from_instance_id,
};
