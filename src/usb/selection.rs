// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Recognizes Bulk-Only mass-storage devices from their descriptors.

use crate::usb::descriptors::{
    DeviceDescriptor, EndpointDescriptor, EndpointDirection, EndpointType,
    InterfaceDescriptor, UsbClass,
};

/// SCSI transparent command set.
pub const SUBCLASS_SCSI_TRANSPARENT: u8 = 0x06;
/// Bulk-Only Transport.
pub const PROTOCOL_BULK_ONLY: u8 = 0x50;
/// The configuration that carries the mass-storage interface.
pub const DEFAULT_CONFIGURATION_ID: u8 = 1;

/// Everything the engine needs to talk to a selected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MassStorageDeviceInfo {
    pub configuration: u8,
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub bulk_in: EndpointDescriptor,
    pub bulk_out: EndpointDescriptor,
}

/// Pick the first BOT interface of configuration 1 and its first bulk-in and
/// bulk-out endpoints.
///
/// BOT § 4.1: the device class must be "defined at interface level" with
/// zero sub-class and protocol.
pub fn parse_mass_storage_device(device: &DeviceDescriptor) -> Option<MassStorageDeviceInfo> {
    if device.class != UsbClass::Unspecified || device.sub_class != 0 || device.protocol != 0 {
        return None;
    }

    let configuration = device
        .configurations
        .iter()
        .find(|c| c.id == DEFAULT_CONFIGURATION_ID)?;

    let interface = configuration
        .interfaces
        .iter()
        .find(|i| is_supported_interface(i))?;

    let bulk_in = find_bulk_endpoint(interface, EndpointDirection::In)?;
    let bulk_out = find_bulk_endpoint(interface, EndpointDirection::Out)?;

    Some(MassStorageDeviceInfo {
        configuration: configuration.id,
        interface_number: interface.number,
        alternate_setting: interface.alternate_setting,
        bulk_in,
        bulk_out,
    })
}

#[inline]
pub fn is_supported_device(device: &DeviceDescriptor) -> bool {
    parse_mass_storage_device(device).is_some()
}

pub fn is_supported_interface(interface: &InterfaceDescriptor) -> bool {
    interface.class == UsbClass::MassStorage
        && interface.sub_class == SUBCLASS_SCSI_TRANSPARENT
        && interface.protocol == PROTOCOL_BULK_ONLY
}

fn find_bulk_endpoint(
    interface: &InterfaceDescriptor,
    direction: EndpointDirection,
) -> Option<EndpointDescriptor> {
    interface
        .endpoints
        .iter()
        .find(|e| e.transfer_type() == EndpointType::Bulk && e.direction() == direction)
        .copied()
}
