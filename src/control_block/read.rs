// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::byteorder::{U16, U32, U64};

use crate::control_block::common::{CommandBlock, Rw10Cdb, Rw16Cdb};

pub const READ10_OPCODE: u8 = 0x28;
pub const READ16_OPCODE: u8 = 0x88;

/// Build a **SCSI READ(10)** CDB.
///
/// Parameters:
/// - `lba`     : 32-bit Logical Block Address to start reading from
/// - `blocks`  : number of logical blocks to transfer (big-endian, 16-bit)
/// - `flags`   : RDPROTECT[7:5] | DPO[4] | FUA[3] (other bits must be zero)
/// - `control` : CONTROL byte
///
/// Layout (SBC):
/// - byte 0      : OPERATION CODE = 0x28
/// - byte 1      : flags (masked to RDPROTECT/DPO/FUA)
/// - bytes 2..5  : LBA (big-endian, 32-bit)
/// - byte 6      : GROUP NUMBER
/// - bytes 7..8  : TRANSFER LENGTH (big-endian, 16-bit)
/// - byte 9      : CONTROL
#[inline]
pub fn build_read10(lba: u32, blocks: u16, flags: u8, control: u8) -> CommandBlock {
    CommandBlock::from_wire(&Rw10Cdb {
        opcode: READ10_OPCODE,
        flags: flags & 0b1111_1000,
        lba: U32::new(lba),
        group_number: 0,
        transfer_length: U16::new(blocks),
        control,
    })
}

/// Build a **SCSI READ(16)** CDB.
///
/// Layout (SBC):
/// - byte  0      : OPERATION CODE = 0x88
/// - byte  1      : flags (masked to RDPROTECT/DPO/FUA)
/// - bytes 2..9   : LBA (big-endian, 64-bit)
/// - bytes 10..13 : TRANSFER LENGTH (big-endian, 32-bit)
/// - byte  14     : GROUP NUMBER
/// - byte  15     : CONTROL
#[inline]
pub fn build_read16(lba: u64, blocks: u32, flags: u8, control: u8) -> CommandBlock {
    CommandBlock::from_wire(&Rw16Cdb {
        opcode: READ16_OPCODE,
        flags: flags & 0b1111_1000,
        lba: U64::new(lba),
        transfer_length: U32::new(blocks),
        group_number: 0,
        control,
    })
}
