// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Command Block Wrapper, USB Mass Storage Class Bulk-Only Transport § 5.1.

use core::fmt;

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout,
    byteorder::{LittleEndian, U32},
};

use crate::{
    assert_wire_len,
    control_block::common::{CommandBlock, MAX_CDB_LEN},
    models::common::{WireError, WireFormat},
};

/// `dCBWSignature`, "USBC" read as a little-endian integer.
pub const CBW_SIGNATURE: u32 = 0x4342_5355;
/// A CBW is always exactly 31 bytes.
pub const CBW_LEN: usize = 31;
/// Highest LUN addressable through `bCBWLUN`.
pub const MAX_LUN: u8 = 15;

bitflags::bitflags! {
    /// `bmCBWFlags`
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct CbwFlags: u8 {
        /// Direction bit: set = Data-In (device to host).
        const DATA_IN = 0b1000_0000;
    }
}

/// Direction of the data stage that follows a CBW.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    /// Device to host (bulk-in).
    In,
    /// Host to device (bulk-out).
    Out,
    /// `dCBWDataTransferLength` is zero; the device ignores the direction bit.
    None,
}

impl From<DataDirection> for CbwFlags {
    fn from(direction: DataDirection) -> Self {
        match direction {
            DataDirection::In => CbwFlags::DATA_IN,
            DataDirection::Out | DataDirection::None => CbwFlags::empty(),
        }
    }
}

/// Wire image of the CBW (little-endian).
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Clone, PartialEq, Eq)]
pub struct CommandBlockWrapper {
    signature: U32<LittleEndian>,                   // 0..4
    pub tag: U32<LittleEndian>,                     // 4..8
    pub data_transfer_length: U32<LittleEndian>,    // 8..12
    pub flags: u8,                                  // 12
    pub lun: u8,                                    // 13
    pub command_block_length: u8,                   // 14
    pub command_block: [u8; MAX_CDB_LEN],           // 15..31
}

assert_wire_len!(CommandBlockWrapper, CBW_LEN);

impl WireFormat for CommandBlockWrapper {
    const NAME: &'static str = "CBW";
    const WIRE_LEN: usize = CBW_LEN;
}

impl CommandBlockWrapper {
    /// Wrap `block` for LUN `lun`.
    pub fn new(
        tag: u32,
        data_transfer_length: u32,
        direction: DataDirection,
        lun: u8,
        block: &CommandBlock,
    ) -> Result<Self, WireError> {
        if lun > MAX_LUN {
            return Err(WireError::InvalidLun(lun));
        }
        Ok(Self {
            signature: U32::new(CBW_SIGNATURE),
            tag: U32::new(tag),
            data_transfer_length: U32::new(data_transfer_length),
            flags: CbwFlags::from(direction).bits(),
            lun,
            command_block_length: block.len() as u8,
            command_block: *block.slot(),
        })
    }

    #[inline]
    pub fn signature(&self) -> u32 {
        self.signature.get()
    }

    #[inline]
    pub fn tag(&self) -> u32 {
        self.tag.get()
    }

    #[inline]
    pub fn data_transfer_length(&self) -> u32 {
        self.data_transfer_length.get()
    }

    /// Data stage direction as carried by the flags and length fields.
    pub fn direction(&self) -> DataDirection {
        if self.data_transfer_length.get() == 0 {
            DataDirection::None
        } else if CbwFlags::from_bits_truncate(self.flags).contains(CbwFlags::DATA_IN) {
            DataDirection::In
        } else {
            DataDirection::Out
        }
    }

    pub fn has_valid_signature(&self) -> bool {
        self.signature.get() == CBW_SIGNATURE
    }

    /// The embedded CDB, trimmed to `bCBWCBLength`.
    pub fn command_block(&self) -> Result<CommandBlock, WireError> {
        let len = self.command_block_length as usize;
        CommandBlock::from_slice(self.command_block.get(..len).unwrap_or(&[]))
            .map_err(|_| WireError::InvalidCommandLength(len))
    }
}

impl fmt::Debug for CommandBlockWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = (self.command_block_length as usize).min(MAX_CDB_LEN);
        f.debug_struct("CommandBlockWrapper")
            .field("signature", &format_args!("{:#010x}", self.signature.get()))
            .field("tag", &self.tag.get())
            .field("data_transfer_length", &self.data_transfer_length.get())
            .field("flags", &CbwFlags::from_bits_truncate(self.flags))
            .field("lun", &self.lun)
            .field("command_block", &hex::encode(&self.command_block[..len]))
            .finish()
    }
}
