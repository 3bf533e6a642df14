// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! REQUEST SENSE — 6-byte CDB.
//!
//! CDB layout (SPC):
//!   [0] = 0x03 (REQUEST SENSE)
//!   [1] = DESC (bit 0), other bits reserved=0
//!   [2]..[3] = reserved (0)
//!   [4] = ALLOCATION LENGTH (number of bytes to return)
//!   [5] = CONTROL
//!
//! Notes:
//! - `desc=false` requests Fixed sense format; `desc=true` requests Descriptor
//!   format. The target may still choose format per its mode settings.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{assert_wire_len, control_block::common::CommandBlock, models::common::WireFormat};

pub const REQUEST_SENSE_OPCODE: u8 = 0x03;

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug, Clone, PartialEq, Eq)]
pub struct RequestSenseCdb {
    pub opcode: u8,
    pub desc: u8,
    reserved: [u8; 2],
    pub allocation_length: u8,
    pub control: u8,
}

assert_wire_len!(RequestSenseCdb, 6);

impl WireFormat for RequestSenseCdb {
    const NAME: &'static str = "REQUEST SENSE";
    const WIRE_LEN: usize = 6;
}

/// Build a REQUEST SENSE (6) CDB.
#[inline]
pub fn build_request_sense(desc: bool, allocation_len: u8, control: u8) -> CommandBlock {
    CommandBlock::from_wire(&RequestSenseCdb {
        opcode: REQUEST_SENSE_OPCODE,
        desc: (desc as u8) & 0x01,
        reserved: [0; 2],
        allocation_length: allocation_len,
        control,
    })
}

/// Convenience: DESC=0 (fixed format), CONTROL=0.
#[inline]
pub fn build_request_sense_simple(allocation_len: u8) -> CommandBlock {
    build_request_sense(false, allocation_len, 0x00)
}
