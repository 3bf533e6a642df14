// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! INQUIRY (6), standard page only.
//!
//! CDB layout (SPC):
//!   [0] = 0x12 (INQUIRY)
//!   [1] = EVPD (bit 0), always 0 here
//!   [2] = Page Code (0 when EVPD=0)
//!   [3..4] = Allocation Length (u16, big-endian)
//!   [5] = Control

use zerocopy::{
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout,
    byteorder::{BigEndian, U16},
};

use crate::{assert_wire_len, control_block::common::CommandBlock, models::common::WireFormat};

pub const INQUIRY_OPCODE: u8 = 0x12;
/// Length of the standard INQUIRY data this crate asks for.
pub const STANDARD_INQUIRY_LEN: usize = 36;

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug, Clone, PartialEq, Eq)]
pub struct InquiryCdb {
    pub opcode: u8,
    pub evpd: u8,
    pub page_code: u8,
    pub allocation_length: U16<BigEndian>,
    pub control: u8,
}

assert_wire_len!(InquiryCdb, 6);

impl WireFormat for InquiryCdb {
    const NAME: &'static str = "INQUIRY";
    const WIRE_LEN: usize = 6;
}

/// Build a **Standard INQUIRY (EVPD=0)** CDB.
#[inline]
pub fn build_inquiry_standard(allocation_len: u16, control: u8) -> CommandBlock {
    CommandBlock::from_wire(&InquiryCdb {
        opcode: INQUIRY_OPCODE,
        evpd: 0,
        page_code: 0,
        allocation_length: U16::new(allocation_len),
        control,
    })
}

/// First 36 bytes of standard INQUIRY data.
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug, Clone, PartialEq, Eq)]
pub struct StandardInquiryData {
    pub peripheral: u8,        // 0: qualifier[7:5] | device type[4:0]
    pub rmb: u8,               // 1: bit7
    pub version: u8,           // 2
    pub response_format: u8,   // 3
    pub additional_length: u8, // 4
    pub flags: [u8; 3],        // 5..8
    pub vendor_id: [u8; 8],    // 8..16
    pub product_id: [u8; 16],  // 16..32
    pub product_rev: [u8; 4],  // 32..36
}

assert_wire_len!(StandardInquiryData, STANDARD_INQUIRY_LEN);

impl WireFormat for StandardInquiryData {
    const NAME: &'static str = "standard INQUIRY data";
    const WIRE_LEN: usize = STANDARD_INQUIRY_LEN;
}

impl StandardInquiryData {
    /// Direct-access, removable, SPC-4 data with space-padded identity strings.
    pub fn new(vendor: &str, product: &str, revision: &str) -> Self {
        let mut data = Self::new_zeroed();
        data.rmb = 0x80;
        data.version = 0x06;
        data.response_format = 0x02;
        data.additional_length = (STANDARD_INQUIRY_LEN - 5) as u8;
        pad_ascii(&mut data.vendor_id, vendor);
        pad_ascii(&mut data.product_id, product);
        pad_ascii(&mut data.product_rev, revision);
        data
    }

    #[inline]
    pub fn device_type(&self) -> u8 {
        self.peripheral & 0x1F
    }

    #[inline]
    pub fn removable(&self) -> bool {
        self.rmb & 0x80 != 0
    }

    pub fn vendor(&self) -> String {
        trim_ascii(&self.vendor_id)
    }

    pub fn product(&self) -> String {
        trim_ascii(&self.product_id)
    }

    pub fn revision(&self) -> String {
        trim_ascii(&self.product_rev)
    }
}

fn pad_ascii(dst: &mut [u8], src: &str) {
    dst.fill(b' ');
    for (d, s) in dst.iter_mut().zip(src.bytes()) {
        *d = if s.is_ascii() { s } else { b'?' };
    }
}

fn trim_ascii(bytes: &[u8]) -> String {
    let s: String = bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();
    s.trim().to_string()
}
