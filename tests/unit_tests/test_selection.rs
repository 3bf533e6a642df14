// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use usb_msc_rs::{
    loopback::{LOOPBACK_BULK_IN, LOOPBACK_BULK_OUT, mass_storage_descriptor},
    usb::{
        descriptors::{
            DeviceDescriptor, EndpointDescriptor, EndpointDirection, InterfaceDescriptor,
            UsbClass,
        },
        selection::{is_supported_device, is_supported_interface, parse_mass_storage_device},
    },
};

fn interface_mut(desc: &mut DeviceDescriptor) -> &mut InterfaceDescriptor {
    &mut desc.configurations[0].interfaces[0]
}

#[test]
fn test_selects_bulk_only_interface() {
    let desc = mass_storage_descriptor("SEL0");
    let info = parse_mass_storage_device(&desc).expect("loopback descriptor is supported");

    assert_eq!(info.configuration, 1);
    assert_eq!(info.interface_number, 0);
    assert_eq!(info.alternate_setting, 0);
    assert_eq!(info.bulk_in.address, LOOPBACK_BULK_IN);
    assert_eq!(info.bulk_in.direction(), EndpointDirection::In);
    assert_eq!(info.bulk_out.address, LOOPBACK_BULK_OUT);
    assert_eq!(info.bulk_out.direction(), EndpointDirection::Out);
    assert!(is_supported_device(&desc));
}

#[test]
fn test_skips_foreign_interfaces() {
    let mut desc = mass_storage_descriptor("SEL1");
    let hid = InterfaceDescriptor {
        number: 3,
        alternate_setting: 0,
        class: UsbClass::Hid,
        sub_class: 0,
        protocol: 0,
        name: "keyboard".into(),
        endpoints: vec![EndpointDescriptor {
            address: 0x83,
            attributes: 0x03,
            max_packet_size: 8,
            interval: 10,
        }],
    };
    assert!(!is_supported_interface(&hid));
    desc.configurations[0].interfaces.insert(0, hid);

    let info = parse_mass_storage_device(&desc).expect("second interface is mass storage");
    assert_eq!(info.interface_number, 0);
}

#[test]
fn test_rejects_wrong_interface_codes() {
    let mut wrong_class = mass_storage_descriptor("SEL2");
    interface_mut(&mut wrong_class).class = UsbClass::Printer;
    assert!(parse_mass_storage_device(&wrong_class).is_none());

    // UFI floppies (0x04) and CBI transport (0x00) are not handled.
    let mut wrong_subclass = mass_storage_descriptor("SEL3");
    interface_mut(&mut wrong_subclass).sub_class = 0x04;
    assert!(parse_mass_storage_device(&wrong_subclass).is_none());

    let mut wrong_protocol = mass_storage_descriptor("SEL4");
    interface_mut(&mut wrong_protocol).protocol = 0x00;
    assert!(parse_mass_storage_device(&wrong_protocol).is_none());
}

#[test]
fn test_rejects_missing_bulk_endpoint() {
    let mut no_out = mass_storage_descriptor("SEL5");
    interface_mut(&mut no_out)
        .endpoints
        .retain(|e| e.direction() == EndpointDirection::In);
    assert!(parse_mass_storage_device(&no_out).is_none());

    let mut interrupt_in = mass_storage_descriptor("SEL6");
    interface_mut(&mut interrupt_in).endpoints[0].attributes = 0x03;
    assert!(parse_mass_storage_device(&interrupt_in).is_none());
}

#[test]
fn test_rejects_other_configuration_or_device_class() {
    let mut second_config = mass_storage_descriptor("SEL7");
    second_config.configurations[0].id = 2;
    assert!(parse_mass_storage_device(&second_config).is_none());

    let mut vendor_class = mass_storage_descriptor("SEL8");
    vendor_class.class = UsbClass::VendorSpecific;
    assert!(!is_supported_device(&vendor_class));

    let mut device_protocol = mass_storage_descriptor("SEL9");
    device_protocol.protocol = 1;
    assert!(!is_supported_device(&device_protocol));
}
