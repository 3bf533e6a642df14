// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout,
    byteorder::{BigEndian, U16, U32, U64},
};

use crate::{
    assert_wire_len,
    control_block::{read, write},
    models::common::{WireError, WireFormat},
};

/// Size of the CDB slot inside a CBW.
pub const MAX_CDB_LEN: usize = 16;

/// A CDB together with its true length.
///
/// The BOT envelope always carries a 16-byte slot; `len` says how much of it
/// the device must look at.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommandBlock {
    bytes: [u8; MAX_CDB_LEN],
    len: u8,
}

impl CommandBlock {
    /// Copy a raw CDB (1..=16 bytes) into a zero-padded slot.
    pub fn from_slice(cdb: &[u8]) -> Result<Self, WireError> {
        if cdb.is_empty() || cdb.len() > MAX_CDB_LEN {
            return Err(WireError::InvalidCommandLength(cdb.len()));
        }
        let mut bytes = [0u8; MAX_CDB_LEN];
        bytes[..cdb.len()].copy_from_slice(cdb);
        Ok(Self {
            bytes,
            len: cdb.len() as u8,
        })
    }

    /// Place a typed CDB into a slot.
    pub fn from_wire<T: WireFormat>(cdb: &T) -> Self {
        let raw = cdb.to_bytes();
        let len = raw.len().min(MAX_CDB_LEN);
        let mut bytes = [0u8; MAX_CDB_LEN];
        bytes[..len].copy_from_slice(&raw[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    /// Meaningful bytes only.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    /// Whole zero-padded slot.
    #[inline]
    pub fn slot(&self) -> &[u8; MAX_CDB_LEN] {
        &self.bytes
    }

    /// Reinterpret the meaningful bytes as a typed CDB.
    pub fn decode<T: WireFormat>(&self) -> Result<T, WireError> {
        T::decode(self.as_slice())
    }
}

impl fmt::Debug for CommandBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandBlock({})", hex::encode(self.as_slice()))
    }
}

/// Common 10-byte layout of READ(10) and WRITE(10) (SBC-3 § 5.11 / § 5.32).
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug, Clone, PartialEq, Eq)]
pub struct Rw10Cdb {
    pub opcode: u8,                       // 0
    pub flags: u8,                        // 1: RDPROTECT/WRPROTECT | DPO | FUA
    pub lba: U32<BigEndian>,              // 2..6
    pub group_number: u8,                 // 6
    pub transfer_length: U16<BigEndian>,  // 7..9
    pub control: u8,                      // 9
}

/// Common 16-byte layout of READ(16) and WRITE(16).
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug, Clone, PartialEq, Eq)]
pub struct Rw16Cdb {
    pub opcode: u8,                       // 0
    pub flags: u8,                        // 1
    pub lba: U64<BigEndian>,              // 2..10
    pub transfer_length: U32<BigEndian>,  // 10..14
    pub group_number: u8,                 // 14
    pub control: u8,                      // 15
}

assert_wire_len!(Rw10Cdb, 10);
assert_wire_len!(Rw16Cdb, 16);

impl WireFormat for Rw10Cdb {
    const NAME: &'static str = "READ/WRITE(10)";
    const WIRE_LEN: usize = 10;
}

impl WireFormat for Rw16Cdb {
    const NAME: &'static str = "READ/WRITE(16)";
    const WIRE_LEN: usize = 16;
}

/// Direction of a block transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Read,
    Write,
}

/// Which CDB family carries a block transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdbWidth {
    Ten,
    Sixteen,
}

impl CdbWidth {
    /// 16-byte CDBs are used only when the address or the count does not fit
    /// the 10-byte form.
    #[inline]
    pub fn select(lba: u64, blocks: u32) -> Self {
        if lba > u32::MAX as u64 || blocks > u16::MAX as u32 {
            CdbWidth::Sixteen
        } else {
            CdbWidth::Ten
        }
    }
}

impl TransferKind {
    /// Build the narrowest READ/WRITE CDB that can address `lba`/`blocks`.
    pub fn build(self, lba: u64, blocks: u32) -> CommandBlock {
        match (self, CdbWidth::select(lba, blocks)) {
            (TransferKind::Read, CdbWidth::Ten) => {
                read::build_read10(lba as u32, blocks as u16, 0, 0)
            },
            (TransferKind::Read, CdbWidth::Sixteen) => read::build_read16(lba, blocks, 0, 0),
            (TransferKind::Write, CdbWidth::Ten) => {
                write::build_write10(lba as u32, blocks as u16, 0, 0)
            },
            (TransferKind::Write, CdbWidth::Sixteen) => write::build_write16(lba, blocks, 0, 0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransferKind::Read => "read",
            TransferKind::Write => "write",
        }
    }
}

/// A decoded READ/WRITE of either width, as seen by a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTransferCdb {
    pub kind: TransferKind,
    pub lba: u64,
    pub blocks: u32,
}

impl BlockTransferCdb {
    /// Decode a READ/WRITE(10/16); `None` for any other opcode.
    pub fn parse(block: &CommandBlock) -> Option<Result<Self, WireError>> {
        let kind = match block.opcode() {
            read::READ10_OPCODE | read::READ16_OPCODE => TransferKind::Read,
            write::WRITE10_OPCODE | write::WRITE16_OPCODE => TransferKind::Write,
            _ => return None,
        };
        let decoded = match block.opcode() {
            read::READ10_OPCODE | write::WRITE10_OPCODE => {
                block.decode::<Rw10Cdb>().map(|cdb| Self {
                    kind,
                    lba: cdb.lba.get() as u64,
                    blocks: cdb.transfer_length.get() as u32,
                })
            },
            _ => block.decode::<Rw16Cdb>().map(|cdb| Self {
                kind,
                lba: cdb.lba.get(),
                blocks: cdb.transfer_length.get(),
            }),
        };
        Some(decoded)
    }
}
