// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::byteorder::{U16, U32, U64};

use crate::control_block::common::{CommandBlock, Rw10Cdb, Rw16Cdb};

pub const WRITE10_OPCODE: u8 = 0x2A;
pub const WRITE16_OPCODE: u8 = 0x8A;

/// Build a SCSI WRITE(10) CDB.
///
/// * `lba`     – 32-bit Logical-Block Address
/// * `blocks`  – number of blocks (u16)
/// * `flags`   – WRPROTECT/DPO/FUA (bits 7:5, 4, 3)
/// * `control` – control byte
#[inline]
pub fn build_write10(lba: u32, blocks: u16, flags: u8, control: u8) -> CommandBlock {
    CommandBlock::from_wire(&Rw10Cdb {
        opcode: WRITE10_OPCODE,
        flags: flags & 0b1111_1000,
        lba: U32::new(lba),
        group_number: 0,
        transfer_length: U16::new(blocks),
        control,
    })
}

/// Build a SCSI WRITE(16) CDB; 64-bit LBA, 32-bit block count.
#[inline]
pub fn build_write16(lba: u64, blocks: u32, flags: u8, control: u8) -> CommandBlock {
    CommandBlock::from_wire(&Rw16Cdb {
        opcode: WRITE16_OPCODE,
        flags: flags & 0b1111_1000,
        lba: U64::new(lba),
        transfer_length: U32::new(blocks),
        group_number: 0,
        control,
    })
}
