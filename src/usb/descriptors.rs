// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// USB class codes (device and interface descriptors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsbClass {
    /// Defined at interface level.
    Unspecified,
    Audio,
    Communications,
    Hid,
    Physical,
    Image,
    Printer,
    MassStorage,
    Hub,
    CdcData,
    SmartCard,
    ContentSecurity,
    Video,
    PersonalHealthcare,
    AudioVideo,
    Billboard,
    TypeCBridge,
    DiagnosticDevice,
    Wireless,
    Miscellaneous,
    Application,
    VendorSpecific,
    Other(u8),
}

impl From<u8> for UsbClass {
    fn from(code: u8) -> Self {
        use UsbClass::*;
        match code {
            0x00 => Unspecified,
            0x01 => Audio,
            0x02 => Communications,
            0x03 => Hid,
            0x05 => Physical,
            0x06 => Image,
            0x07 => Printer,
            0x08 => MassStorage,
            0x09 => Hub,
            0x0A => CdcData,
            0x0B => SmartCard,
            0x0D => ContentSecurity,
            0x0E => Video,
            0x0F => PersonalHealthcare,
            0x10 => AudioVideo,
            0x11 => Billboard,
            0x12 => TypeCBridge,
            0xDC => DiagnosticDevice,
            0xE0 => Wireless,
            0xEF => Miscellaneous,
            0xFE => Application,
            0xFF => VendorSpecific,
            other => Other(other),
        }
    }
}

impl From<UsbClass> for u8 {
    fn from(class: UsbClass) -> Self {
        use UsbClass::*;
        match class {
            Unspecified => 0x00,
            Audio => 0x01,
            Communications => 0x02,
            Hid => 0x03,
            Physical => 0x05,
            Image => 0x06,
            Printer => 0x07,
            MassStorage => 0x08,
            Hub => 0x09,
            CdcData => 0x0A,
            SmartCard => 0x0B,
            ContentSecurity => 0x0D,
            Video => 0x0E,
            PersonalHealthcare => 0x0F,
            AudioVideo => 0x10,
            Billboard => 0x11,
            TypeCBridge => 0x12,
            DiagnosticDevice => 0xDC,
            Wireless => 0xE0,
            Miscellaneous => 0xEF,
            Application => 0xFE,
            VendorSpecific => 0xFF,
            Other(code) => code,
        }
    }
}

/// Bit 7 of `bEndpointAddress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDirection {
    /// Device to host.
    In,
    /// Host to device.
    Out,
}

/// Bits 1..0 of `bmAttributes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointDescriptor {
    /// A bulk endpoint; `address` carries the direction bit.
    pub fn bulk(address: u8, max_packet_size: u16) -> Self {
        Self {
            address,
            attributes: 0x02,
            max_packet_size,
            interval: 0,
        }
    }

    #[inline]
    pub fn direction(&self) -> EndpointDirection {
        if self.address & 0x80 != 0 {
            EndpointDirection::In
        } else {
            EndpointDirection::Out
        }
    }

    #[inline]
    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }

    #[inline]
    pub fn transfer_type(&self) -> EndpointType {
        match self.attributes & 0x03 {
            0x00 => EndpointType::Control,
            0x01 => EndpointType::Isochronous,
            0x02 => EndpointType::Bulk,
            _ => EndpointType::Interrupt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub alternate_setting: u8,
    pub class: UsbClass,
    pub sub_class: u8,
    pub protocol: u8,
    pub name: String,
    pub endpoints: Vec<EndpointDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationDescriptor {
    pub id: u8,
    pub max_power: u8,
    pub name: String,
    pub remote_wakeup: bool,
    pub self_powered: bool,
    pub interfaces: Vec<InterfaceDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub class: UsbClass,
    pub sub_class: u8,
    pub protocol: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: String,
    pub product_name: String,
    pub serial_number: String,
    pub configurations: Vec<ConfigurationDescriptor>,
}

impl DeviceDescriptor {
    /// `vvvv:pppp` as printed by lsusb.
    pub fn id_string(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}
