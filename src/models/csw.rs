// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Command Status Wrapper, USB Mass Storage Class Bulk-Only Transport § 5.2.

use core::fmt;

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout,
    byteorder::{LittleEndian, U32},
};

use crate::{
    assert_wire_len,
    models::{cbw::CommandBlockWrapper, common::WireFormat},
};

/// `dCSWSignature`, "USBS" read as a little-endian integer.
pub const CSW_SIGNATURE: u32 = 0x5342_5355;
/// A CSW is always exactly 13 bytes.
pub const CSW_LEN: usize = 13;

/// `bCSWStatus`
///
/// | Value | Description                    |
/// | ----- | ------------------------------ |
/// | 0x00  | Command Passed ("good status") |
/// | 0x01  | Command Failed                 |
/// | 0x02  | Phase Error                    |
/// | _     | Reserved                       |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Passed,
    Failed,
    PhaseError,
    Reserved(u8),
}

impl From<u8> for CommandStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => CommandStatus::Passed,
            0x01 => CommandStatus::Failed,
            0x02 => CommandStatus::PhaseError,
            other => CommandStatus::Reserved(other),
        }
    }
}

impl From<CommandStatus> for u8 {
    fn from(value: CommandStatus) -> Self {
        match value {
            CommandStatus::Passed => 0x00,
            CommandStatus::Failed => 0x01,
            CommandStatus::PhaseError => 0x02,
            CommandStatus::Reserved(v) => v,
        }
    }
}

/// Wire image of the CSW (little-endian).
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Clone, PartialEq, Eq)]
pub struct CommandStatusWrapper {
    signature: U32<LittleEndian>,         // 0..4
    pub tag: U32<LittleEndian>,           // 4..8
    pub data_residue: U32<LittleEndian>,  // 8..12
    pub status: u8,                       // 12
}

assert_wire_len!(CommandStatusWrapper, CSW_LEN);

impl WireFormat for CommandStatusWrapper {
    const NAME: &'static str = "CSW";
    const WIRE_LEN: usize = CSW_LEN;
}

impl CommandStatusWrapper {
    pub fn new(tag: u32, data_residue: u32, status: CommandStatus) -> Self {
        Self {
            signature: U32::new(CSW_SIGNATURE),
            tag: U32::new(tag),
            data_residue: U32::new(data_residue),
            status: status.into(),
        }
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
    pub fn data_residue(&self) -> u32 {
        self.data_residue.get()
    }

    #[inline]
    pub fn status(&self) -> CommandStatus {
        CommandStatus::from(self.status)
    }

    /// BOT § 6.3.1: signature is "USBS" and the tag echoes the CBW.
    pub fn is_valid(&self, expected_tag: u32) -> bool {
        self.signature.get() == CSW_SIGNATURE && self.tag.get() == expected_tag
    }

    /// BOT § 6.3.2: Passed/Failed residues may not exceed the requested
    /// length; a phase error is always meaningful, reserved codes never.
    pub fn is_meaningful(&self, cbw: &CommandBlockWrapper) -> bool {
        match self.status() {
            CommandStatus::Passed | CommandStatus::Failed => {
                self.data_residue.get() <= cbw.data_transfer_length()
            },
            CommandStatus::PhaseError => true,
            CommandStatus::Reserved(_) => false,
        }
    }
}

impl fmt::Debug for CommandStatusWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandStatusWrapper")
            .field("signature", &format_args!("{:#010x}", self.signature.get()))
            .field("tag", &self.tag.get())
            .field("data_residue", &self.data_residue.get())
            .field("status", &self.status())
            .finish()
    }
}
