//! A scripted [`UsbBackend`] for exercising the transport layer without
//! hardware. Every native acquire and release is counted so tests can assert
//! that resources balance on every path.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use pololu_usb::{
    product_id_from_instance_id, vendor_id_from_instance_id, DeviceHandle, DeviceInstance, Error,
    InterfaceClass, ListHandle,
    NotificationHandle, NotificationTarget, Result, SetupPacket, TransportHandle, UsbBackend,
};

/// An interface class for tests; the value itself is arbitrary.
pub const TEST_CLASS: InterfaceClass = InterfaceClass::from_bytes([
    0xe0, 0xfb, 0xe3, 0x9f, 0x76, 0x70, 0x4d, 0xb6, 0x9b, 0x1a, 0x1d, 0xfb, 0x14, 0x10, 0x14,
    0xa7,
]);

/// What one scripted control transfer should do.
pub enum TransferOutcome {
    /// Complete, reporting this many bytes moved.
    Bytes(usize),
    /// Elapse the timeout policy.
    Timeout,
    /// Fail like a stall.
    Stall,
}

#[derive(Default)]
pub struct Counters {
    pub lists_opened: usize,
    pub lists_closed: usize,
    pub devices_opened: usize,
    pub devices_closed: usize,
    pub transports_inited: usize,
    pub transports_freed: usize,
    pub transfers: usize,
    pub registrations: usize,
    pub unregistrations: usize,
}

struct FakeDevice {
    instance: DeviceInstance,
    instance_id: String,
}

pub struct FakeBackend {
    devices: Vec<FakeDevice>,
    /// child instance -> (parent instance, parent instance id)
    parents: HashMap<u64, (DeviceInstance, String)>,
    /// When false, `list_open` reports `NotSupported` (a libusb-like backend).
    pub class_mode: bool,
    /// When false, `instances_by_ids` reports `NotSupported` (a WinUSB-like
    /// backend).
    pub fallback_mode: bool,
    /// Misbehave: never return the "no more items" signal from `list_entry`.
    pub never_terminate: bool,
    /// Fail the next `open_device` with `AccessDenied`.
    pub open_denied: Cell<bool>,
    /// Fail the next `init_transport`.
    pub init_fails: Cell<bool>,
    /// Scripted outcomes for control transfers; when exhausted, transfers
    /// complete with the full requested length.
    pub transfer_script: RefCell<VecDeque<TransferOutcome>>,
    pub counters: RefCell<Counters>,
    /// Timeout values passed to `set_transfer_timeout`, in order.
    pub timeouts_set: RefCell<Vec<Duration>>,
    /// Names of native calls, in order, for teardown-ordering assertions.
    pub events: RefCell<Vec<&'static str>>,
    pub port_name_table: Vec<(String, String)>,
    next_token: Cell<u64>,
}

impl FakeBackend {
    pub fn new() -> Self {
        FakeBackend {
            devices: Vec::new(),
            parents: HashMap::new(),
            class_mode: true,
            fallback_mode: true,
            never_terminate: false,
            open_denied: Cell::new(false),
            init_fails: Cell::new(false),
            transfer_script: RefCell::new(VecDeque::new()),
            counters: RefCell::new(Counters::default()),
            timeouts_set: RefCell::new(Vec::new()),
            events: RefCell::new(Vec::new()),
            port_name_table: Vec::new(),
            next_token: Cell::new(1),
        }
    }

    /// A backend with one top-level device per instance id string, assigned
    /// instances 1, 2, 3, ...
    pub fn with_devices(instance_ids: &[&str]) -> Self {
        let mut backend = Self::new();
        for id in instance_ids {
            backend.add_device(id);
        }
        backend
    }

    pub fn add_device(&mut self, instance_id: &str) -> DeviceInstance {
        let instance = DeviceInstance(self.devices.len() as u64 + 1);
        self.devices.push(FakeDevice {
            instance,
            instance_id: instance_id.to_string(),
        });
        instance
    }

    /// Adds a composite function child whose serial number lives on a parent
    /// that is not itself enumerated under the interface class.
    pub fn add_composite_child(&mut self, child_id: &str, parent_id: &str) -> DeviceInstance {
        let child = self.add_device(child_id);
        let parent = DeviceInstance(0x8000 + child.0);
        self.parents
            .insert(child.0, (parent, parent_id.to_string()));
        child
    }

    /// Simulates the device being unplugged between enumeration passes.
    pub fn remove_device(&mut self, instance: DeviceInstance) {
        self.devices.retain(|d| d.instance != instance);
    }

    fn token(&self) -> u64 {
        let t = self.next_token.get();
        self.next_token.set(t + 1);
        t
    }

    fn event(&self, name: &'static str) {
        self.events.borrow_mut().push(name);
    }

    fn lookup(&self, instance: DeviceInstance) -> Result<&FakeDevice> {
        self.devices
            .iter()
            .find(|d| d.instance == instance)
            .ok_or_else(|| Error::DeviceNotFound("the device instance vanished".to_string()))
    }
}

impl UsbBackend for FakeBackend {
    fn list_open(&self, _class: InterfaceClass) -> Result<ListHandle> {
        if !self.class_mode {
            return Err(Error::NotSupported("enumeration by device interface class"));
        }
        self.counters.borrow_mut().lists_opened += 1;
        self.event("list_open");
        Ok(ListHandle(self.token()))
    }

    fn list_entry(&self, _list: ListHandle, index: u8) -> Result<Option<DeviceInstance>> {
        if self.never_terminate {
            // A broken enumeration API that keeps inventing entries.
            return Ok(Some(DeviceInstance(0x4000 + u64::from(index))));
        }
        Ok(self.devices.get(index as usize).map(|d| d.instance))
    }

    fn list_close(&self, _list: ListHandle) {
        self.counters.borrow_mut().lists_closed += 1;
        self.event("list_close");
    }

    fn instances_by_ids(&self, vendor_id: u16, product_ids: &[u16]) -> Result<Vec<DeviceInstance>> {
        if !self.fallback_mode {
            return Err(Error::NotSupported("enumeration by vendor and product id"));
        }
        let mut found = Vec::new();
        for device in &self.devices {
            let vid = vendor_id_from_instance_id(&device.instance_id)?;
            let pid = product_id_from_instance_id(&device.instance_id)?;
            if vid == vendor_id && product_ids.contains(&pid) {
                found.push(device.instance);
            }
        }
        Ok(found)
    }

    fn instance_id(&self, instance: DeviceInstance) -> Result<String> {
        if self.never_terminate && instance.0 >= 0x4000 {
            let n = instance.0 - 0x4000;
            return Ok(format!("USB\\VID_1FFB&PID_0089\\FAKE{n:04}"));
        }
        if let Some((_, parent_id)) = self.parents.values().find(|(parent, _)| *parent == instance)
        {
            return Ok(parent_id.clone());
        }
        Ok(self.lookup(instance)?.instance_id.clone())
    }

    fn parent_instance(&self, instance: DeviceInstance) -> Result<DeviceInstance> {
        self.parents
            .get(&instance.0)
            .map(|(parent, _)| *parent)
            .ok_or_else(|| Error::DeviceNotFound("the device has no parent".to_string()))
    }

    fn open_device(
        &self,
        instance: DeviceInstance,
        _class: Option<InterfaceClass>,
    ) -> Result<DeviceHandle> {
        self.lookup(instance)?;
        if self.open_denied.get() {
            return Err(Error::AccessDenied);
        }
        self.counters.borrow_mut().devices_opened += 1;
        self.event("open_device");
        Ok(DeviceHandle(self.token()))
    }

    fn close_device(&self, _device: DeviceHandle) {
        self.counters.borrow_mut().devices_closed += 1;
        self.event("close_device");
    }

    fn init_transport(&self, _device: DeviceHandle) -> Result<TransportHandle> {
        if self.init_fails.get() {
            return Err(Error::TransferFailed {
                operation: "initializing the transport",
                detail: "scripted failure".to_string(),
            });
        }
        self.counters.borrow_mut().transports_inited += 1;
        self.event("init_transport");
        Ok(TransportHandle(self.token()))
    }

    fn set_transfer_timeout(&self, _transport: TransportHandle, timeout: Duration) -> Result<()> {
        self.timeouts_set.borrow_mut().push(timeout);
        self.event("set_transfer_timeout");
        Ok(())
    }

    fn free_transport(&self, _transport: TransportHandle) {
        self.counters.borrow_mut().transports_freed += 1;
        self.event("free_transport");
    }

    fn control_transfer(
        &self,
        _transport: TransportHandle,
        setup: SetupPacket,
        buffer: Option<&mut [u8]>,
    ) -> Result<usize> {
        self.counters.borrow_mut().transfers += 1;
        self.event("control_transfer");
        let outcome = self
            .transfer_script
            .borrow_mut()
            .pop_front()
            .unwrap_or(TransferOutcome::Bytes(setup.length as usize));
        match outcome {
            TransferOutcome::Bytes(n) => {
                if setup.is_device_to_host() {
                    if let Some(buf) = buffer {
                        for (i, b) in buf.iter_mut().take(n).enumerate() {
                            *b = i as u8;
                        }
                    }
                }
                Ok(n)
            }
            TransferOutcome::Timeout => Err(Error::Timeout),
            TransferOutcome::Stall => Err(Error::TransferFailed {
                operation: "control transfer",
                detail: "endpoint stalled".to_string(),
            }),
        }
    }

    fn supports_notifications(&self) -> bool {
        true
    }

    fn register_notifications(
        &self,
        _class: InterfaceClass,
        _target: NotificationTarget,
    ) -> Result<NotificationHandle> {
        self.counters.borrow_mut().registrations += 1;
        self.event("register_notifications");
        Ok(NotificationHandle(self.token()))
    }

    fn unregister_notifications(&self, _handle: NotificationHandle) -> Result<()> {
        self.counters.borrow_mut().unregistrations += 1;
        self.event("unregister_notifications");
        Ok(())
    }

    fn serial_port_names(&self, instance_id_prefix: &str) -> Result<Vec<String>> {
        let prefix = instance_id_prefix.to_uppercase();
        Ok(self
            .port_name_table
            .iter()
            .filter(|(id, _)| id.to_uppercase().starts_with(&prefix))
            .map(|(_, port)| port.clone())
            .collect())
    }
}
