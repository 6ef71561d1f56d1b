//! Serial-number and vendor/product-id resolution from device instance ids.
//!
//! The OS reports a hierarchical instance id for every device, shaped like
//! `USB\VID_1FFB&PID_0089\00012345` for a top-level device. For one function
//! of a composite device the id instead looks like
//! `USB\VID_1FFB&PID_0081&MI_04\6&304568CB&0&0004`: the trailing segment is an
//! OS-generated location string, not the serial number, which lives on the
//! parent. The resolver walks exactly one hop up in that case; the supported
//! devices never nest composite functions deeper than that.

use log::trace;

use crate::backend::{DeviceInstance, UsbBackend};
use crate::consts::{
    COMPOSITE_FUNCTION_MARKER, INSTANCE_ID_PID_OFFSET, INSTANCE_ID_SERIAL_OFFSET,
    INSTANCE_ID_VID_OFFSET,
};
use crate::error::{Error, Result};

/// Gets the serial number of a device. Works for composite and non-composite
/// devices.
pub fn resolve_serial_number<B: UsbBackend>(
    backend: &B,
    instance: DeviceInstance,
) -> Result<String> {
    let mut id = backend.instance_id(instance)?;

    if id.contains(COMPOSITE_FUNCTION_MARKER) {
        // This instance is a composite function child; the serial number is
        // on the parent's instance id.
        let parent = backend.parent_instance(instance)?;
        id = backend.instance_id(parent)?;
        trace!("composite child {instance:?}: resolving serial via parent {parent:?}");
    }

    serial_from_instance_id(&id)
}

/// Gets the product id of a device by reading its instance id. Never requires
/// parent resolution.
pub fn resolve_product_id<B: UsbBackend>(backend: &B, instance: DeviceInstance) -> Result<u16> {
    product_id_from_instance_id(&backend.instance_id(instance)?)
}

/// Gets the vendor id of a device by reading its instance id. Never requires
/// parent resolution.
pub fn resolve_vendor_id<B: UsbBackend>(backend: &B, instance: DeviceInstance) -> Result<u16> {
    vendor_id_from_instance_id(&backend.instance_id(instance)?)
}

/// Extracts the serial number: everything after the fixed-length
/// `USB\VID_xxxx&PID_xxxx\` prefix.
pub fn serial_from_instance_id(id: &str) -> Result<String> {
    id.get(INSTANCE_ID_SERIAL_OFFSET..)
        .map(str::to_string)
        .ok_or_else(|| malformed(id))
}

/// Extracts the product id from its fixed offset in the instance id.
pub fn product_id_from_instance_id(id: &str) -> Result<u16> {
    hex_field(id, INSTANCE_ID_PID_OFFSET)
}

/// Extracts the vendor id from its fixed offset in the instance id.
pub fn vendor_id_from_instance_id(id: &str) -> Result<u16> {
    hex_field(id, INSTANCE_ID_VID_OFFSET)
}

fn hex_field(id: &str, offset: usize) -> Result<u16> {
    let digits = id
        .get(offset..offset + 4)
        .ok_or_else(|| malformed(id))?;
    u16::from_str_radix(digits, 16).map_err(|_| malformed(id))
}

fn malformed(id: &str) -> Error {
    Error::MalformedInstanceId { id: id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_is_everything_after_the_prefix() {
        assert_eq!(
            serial_from_instance_id(r"USB\VID_1FFB&PID_0089\00012345").unwrap(),
            "00012345"
        );
        // STM32-based devices carry 24-digit hex serials.
        assert_eq!(
            serial_from_instance_id(r"USB\VID_1FFB&PID_00B0\3A6E0A8B4E51324635202020").unwrap(),
            "3A6E0A8B4E51324635202020"
        );
        // A bare prefix yields an empty serial rather than an error.
        assert_eq!(serial_from_instance_id(r"USB\VID_1FFB&PID_0089\").unwrap(), "");
    }

    #[test]
    fn vendor_and_product_ids_parse_from_fixed_offsets() {
        let cases = [
            (r"USB\VID_1FFB&PID_0089\00012345", 0x1FFB, 0x0089),
            (r"USB\VID_04D8&PID_DA01\5552", 0x04D8, 0xDA01),
            (r"usb\vid_1ffb&pid_00a4\0", 0x1FFB, 0x00A4),
            (r"USB\VID_abCD&PID_Ef01\x", 0xABCD, 0xEF01),
        ];
        for (id, vid, pid) in cases {
            assert_eq!(vendor_id_from_instance_id(id).unwrap(), vid, "vid of {id}");
            assert_eq!(product_id_from_instance_id(id).unwrap(), pid, "pid of {id}");
        }
    }

    #[test]
    fn short_or_garbled_ids_are_rejected() {
        for id in ["", "USB\\VID_1FFB", r"USB\VID_ZZZZ&PID_0089\1234"] {
            assert!(matches!(
                vendor_id_from_instance_id(id),
                Err(Error::MalformedInstanceId { .. })
            ));
        }
        assert!(matches!(
            serial_from_instance_id("USB\\VID_1FFB&PID_0089"),
            Err(Error::MalformedInstanceId { .. })
        ));
    }
}
