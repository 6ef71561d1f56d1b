//! Named constants shared across the transport layer.

use std::time::Duration;

/// Pololu Corporation vendor ID.
pub const POLOLU_VID: u16 = 0x1FFB;

/// Upper bound on the number of devices visited during one enumeration pass.
///
/// The USB specification only allows 127 simultaneously addressed devices per
/// bus, so a well-behaved OS can never report anywhere near this many entries.
/// The bound exists so that a misbehaving enumeration API cannot keep us in
/// the iteration loop forever.
pub const MAX_ENUMERATED_DEVICES: u8 = 255;

/// Timeout policy applied to every control transfer on an open connection.
///
/// 350 ms is long enough to cover the slowest control request any of the
/// supported devices performs (erasing the entire script flash on the Mini
/// Maestros, ~26 ms worst case) with a wide margin, while still keeping the
/// worst-case latency of a transfer against a malfunctioning or unplugged
/// device bounded.
pub const CONTROL_TRANSFER_TIMEOUT: Duration = Duration::from_millis(350);

/// Marker segment that appears in the device instance id of a USB composite
/// function child (e.g. `USB\VID_1FFB&PID_0081&MI_04\6&304568CB&0&0004`).
/// A real serial number never contains this sequence.
pub const COMPOSITE_FUNCTION_MARKER: &str = "&MI_";

/// Byte offset of the 4-hex-digit vendor id field in a device instance id
/// of the form `USB\VID_xxxx&PID_xxxx\<serial>`.
pub const INSTANCE_ID_VID_OFFSET: usize = 8;

/// Byte offset of the 4-hex-digit product id field in a device instance id.
pub const INSTANCE_ID_PID_OFFSET: usize = 17;

/// Length of the fixed `USB\VID_xxxx&PID_xxxx\` prefix; everything after it
/// is the serial number.
pub const INSTANCE_ID_SERIAL_OFFSET: usize = 22;

/// Event code delivered to a notification target when a device is attached or
/// removed (`WM_DEVICECHANGE` on Windows). Callers match this constant in
/// their own event loop and re-enumerate; the payload is not interpreted by
/// this crate.
pub const DEVICE_CHANGE_EVENT: u32 = 0x219;
