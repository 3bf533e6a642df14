// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{assert_wire_len, control_block::common::CommandBlock, models::common::WireFormat};

pub const TEST_UNIT_READY_OPCODE: u8 = 0x00;

#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug, Clone, PartialEq, Eq)]
pub struct TestUnitReadyCdb {
    pub opcode: u8,
    reserved: [u8; 4],
    pub control: u8,
}

assert_wire_len!(TestUnitReadyCdb, 6);

impl WireFormat for TestUnitReadyCdb {
    const NAME: &'static str = "TEST UNIT READY";
    const WIRE_LEN: usize = 6;
}

/// Build a standard TEST UNIT READY(6) CDB.
#[inline]
pub fn build_test_unit_ready(control: u8) -> CommandBlock {
    CommandBlock::from_wire(&TestUnitReadyCdb {
        opcode: TEST_UNIT_READY_OPCODE,
        reserved: [0; 4],
        control,
    })
}
