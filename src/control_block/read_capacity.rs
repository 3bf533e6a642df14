// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout,
    byteorder::{BigEndian, U32, U64},
};

use crate::{
    assert_wire_len,
    control_block::common::CommandBlock,
    models::common::WireFormat,
};

pub const READ_CAPACITY10_OPCODE: u8 = 0x25;
/// SERVICE ACTION IN(16)
pub const SERVICE_ACTION_IN16_OPCODE: u8 = 0x9E;
pub const READ_CAPACITY16_SERVICE_ACTION: u8 = 0x10;

pub const READ_CAPACITY10_DATA_LEN: usize = 8;
pub const READ_CAPACITY16_DATA_LEN: usize = 32;

/// READ CAPACITY(10) CDB (opcode 0x25).
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug, Clone, PartialEq, Eq)]
pub struct ReadCapacity10Cdb {
    pub opcode: u8,          // 0
    reserved1: u8,           // 1
    pub lba: U32<BigEndian>, // 2..6, only used if PMI=1
    reserved2: [u8; 2],      // 6..8
    pub pmi: u8,             // 8: PMI bit (bit 0)
    pub control: u8,         // 9
}

/// READ CAPACITY(16) CDB via SERVICE ACTION IN(16) (opcode 0x9E, SA=0x10).
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug, Clone, PartialEq, Eq)]
pub struct ReadCapacity16Cdb {
    pub opcode: u8,                        // 0
    pub service_action: u8,                // 1
    pub lba: U64<BigEndian>,               // 2..10
    pub allocation_length: U32<BigEndian>, // 10..14
    pub pmi: u8,                           // 14
    pub control: u8,                       // 15
}

assert_wire_len!(ReadCapacity10Cdb, 10);
assert_wire_len!(ReadCapacity16Cdb, 16);

impl WireFormat for ReadCapacity10Cdb {
    const NAME: &'static str = "READ CAPACITY(10)";
    const WIRE_LEN: usize = 10;
}

impl WireFormat for ReadCapacity16Cdb {
    const NAME: &'static str = "READ CAPACITY(16)";
    const WIRE_LEN: usize = 16;
}

/// Build a **SCSI READ CAPACITY(10)** CDB.
///
/// - `lba`     : LBA hint (meaningful only when `pmi` = true; else 0)
/// - `pmi`     : Partial Medium Indicator
/// - `control` : CONTROL byte
///
/// With `pmi = false` the target returns the last LBA and the logical block
/// length (8-byte response).
#[inline]
pub fn build_read_capacity10(lba: u32, pmi: bool, control: u8) -> CommandBlock {
    CommandBlock::from_wire(&ReadCapacity10Cdb {
        opcode: READ_CAPACITY10_OPCODE,
        reserved1: 0,
        lba: U32::new(lba),
        reserved2: [0; 2],
        pmi: pmi as u8,
        control,
    })
}

/// Build a **SCSI READ CAPACITY(16)** CDB.
///
/// For the full device capacity use `lba = 0`, `pmi = false`,
/// `alloc_len = 32`.
#[inline]
pub fn build_read_capacity16(lba: u64, pmi: bool, alloc_len: u32, control: u8) -> CommandBlock {
    CommandBlock::from_wire(&ReadCapacity16Cdb {
        opcode: SERVICE_ACTION_IN16_OPCODE,
        service_action: READ_CAPACITY16_SERVICE_ACTION,
        lba: U64::new(lba),
        allocation_length: U32::new(alloc_len),
        pmi: pmi as u8,
        control,
    })
}

/// 8-byte parameter data returned by READ CAPACITY(10), big-endian.
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug, Clone, PartialEq, Eq)]
pub struct ReadCapacity10Data {
    /// Last valid LBA (bytes 0-3)
    pub last_lba: U32<BigEndian>,
    /// Block length in bytes (bytes 4-7)
    pub block_len: U32<BigEndian>,
}

bitflags::bitflags! {
    /// Byte 12 of READ CAPACITY(16) parameter data.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ProtectionFlags: u8 {
        const PROT_EN = 1;
        const RTO_EN  = 1 << 1;
    }
}

/// 32-byte parameter data returned by READ CAPACITY(16), big-endian.
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug, Clone, PartialEq, Eq)]
pub struct ReadCapacity16Data {
    /// Last valid LBA (bytes 0-7)
    pub last_lba: U64<BigEndian>,
    /// Block length in bytes (bytes 8-11)
    pub block_len: U32<BigEndian>,
    pub flags: u8,
    reserved: [u8; 19],
}

assert_wire_len!(ReadCapacity10Data, READ_CAPACITY10_DATA_LEN);
assert_wire_len!(ReadCapacity16Data, READ_CAPACITY16_DATA_LEN);

impl WireFormat for ReadCapacity10Data {
    const NAME: &'static str = "READ CAPACITY(10) data";
    const WIRE_LEN: usize = READ_CAPACITY10_DATA_LEN;
}

impl WireFormat for ReadCapacity16Data {
    const NAME: &'static str = "READ CAPACITY(16) data";
    const WIRE_LEN: usize = READ_CAPACITY16_DATA_LEN;
}

impl ReadCapacity10Data {
    pub fn new(last_lba: u32, block_len: u32) -> Self {
        Self {
            last_lba: U32::new(last_lba),
            block_len: U32::new(block_len),
        }
    }

    /// If true, the device wants READ CAPACITY(16) instead.
    #[inline]
    pub fn needs_read_capacity16(&self) -> bool {
        self.block_len.get() == u32::MAX
    }
}

impl ReadCapacity16Data {
    pub fn new(last_lba: u64, block_len: u32, flags: ProtectionFlags) -> Self {
        Self {
            last_lba: U64::new(last_lba),
            block_len: U32::new(block_len),
            flags: flags.bits(),
            reserved: [0; 19],
        }
    }

    #[inline]
    pub fn protection(&self) -> ProtectionFlags {
        ProtectionFlags::from_bits_truncate(self.flags)
    }
}

/// Medium geometry as reported by either READ CAPACITY variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityData {
    pub last_lba: u64,
    pub block_size: u32,
}

impl CapacityData {
    #[inline]
    pub fn number_of_blocks(&self) -> u64 {
        self.last_lba.saturating_add(1)
    }

    #[inline]
    pub fn total_bytes(&self) -> u128 {
        self.number_of_blocks() as u128 * self.block_size as u128
    }
}

impl From<&ReadCapacity10Data> for CapacityData {
    fn from(raw: &ReadCapacity10Data) -> Self {
        Self {
            last_lba: raw.last_lba.get() as u64,
            block_size: raw.block_len.get(),
        }
    }
}

impl From<&ReadCapacity16Data> for CapacityData {
    fn from(raw: &ReadCapacity16Data) -> Self {
        Self {
            last_lba: raw.last_lba.get(),
            block_size: raw.block_len.get(),
        }
    }
}
