//! Hotplug attach/detach notification registration.
//!
//! The registrar only plumbs the OS's native device-change delivery to a
//! caller-supplied target (e.g. a window handle); it does not parse which
//! device changed. A caller that receives [`crate::DEVICE_CHANGE_EVENT`] in
//! its event loop should re-run enumeration to discover what changed.

use log::warn;

use crate::backend::{InterfaceClass, NotificationHandle, NotificationTarget, UsbBackend};
use crate::error::Result;

/// True if the backend can deliver attach/detach notifications at all.
/// Callers on backends without support typically poll by re-enumerating.
pub fn supports_notifications<B: UsbBackend>(backend: &B) -> bool {
    backend.supports_notifications()
}

/// Registers `target` to receive device-change events for devices of the
/// given interface class.
///
/// The subscription must be released with
/// [`NotificationSubscription::unsubscribe`] before the target is destroyed.
/// Dropping it unregisters on a best-effort basis; an unreleased registration
/// is an OS-level resource leak, not a crash.
pub fn subscribe<B: UsbBackend>(
    backend: &B,
    class: InterfaceClass,
    target: NotificationTarget,
) -> Result<NotificationSubscription<'_, B>> {
    let handle = backend.register_notifications(class, target)?;
    Ok(NotificationSubscription {
        backend,
        handle,
        class,
        released: false,
    })
}

/// An active device-change notification registration.
#[derive(Debug)]
pub struct NotificationSubscription<'a, B: UsbBackend> {
    backend: &'a B,
    handle: NotificationHandle,
    class: InterfaceClass,
    released: bool,
}

impl<B: UsbBackend> NotificationSubscription<'_, B> {
    /// The interface class this subscription filters on.
    pub fn interface_class(&self) -> InterfaceClass {
        self.class
    }

    /// Stops delivery of device-change events to the target.
    pub fn unsubscribe(mut self) -> Result<()> {
        self.released = true;
        self.backend.unregister_notifications(self.handle)
    }
}

impl<B: UsbBackend> Drop for NotificationSubscription<'_, B> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.backend.unregister_notifications(self.handle) {
                warn!("failed to unregister device notifications for {}: {e}", self.class);
            }
        }
    }
}
