// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, fmt};

use once_cell::sync::Lazy;
use zerocopy::{BigEndian, FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, U32};

use crate::{
    assert_wire_len,
    models::common::{WireError, WireFormat},
};

/// Sense data must be ≥ 18 bytes for fixed format.
pub const FIXED_MIN_LEN: usize = 18;
/// Full fixed-format sense buffer requested from the device.
pub const FIXED_SENSE_LEN: usize = 252;
/// Current error, fixed format.
pub const RESPONSE_CODE_CURRENT: u8 = 0x70;

bitflags::bitflags! {
    /// High nibble of byte 2 of fixed sense data.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct SenseFlags: u8 {
        const SDAT_OVFL = 1 << 4;
        const ILI       = 1 << 5;
        const EOM       = 1 << 6;
        const FILEMARK  = 1 << 7;
    }
}

/// SPC-4 Table 43 — Fixed format sense-data byte layout
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Clone, PartialEq, Eq)]
pub struct FixedSenseData {
    pub response_code: u8,                    // 0: VALID | RESPONSE CODE
    obsolete: u8,                             // 1
    pub flags: u8,                            // 2: FILEMARK/EOM/ILI/SDAT_OVFL | SENSE KEY
    pub information: U32<BigEndian>,          // 3..7
    pub additional_sense_length: u8,          // 7
    pub command_specific: U32<BigEndian>,     // 8..12
    pub asc: u8,                              // 12
    pub ascq: u8,                             // 13
    pub fru_code: u8,                         // 14
    pub sense_key_specific: [u8; 3],          // 15..18
    pub additional_sense_bytes: [u8; 234],    // 18..252
}

assert_wire_len!(FixedSenseData, FIXED_SENSE_LEN);

impl WireFormat for FixedSenseData {
    const NAME: &'static str = "fixed sense data";
    const WIRE_LEN: usize = FIXED_SENSE_LEN;
}

impl FixedSenseData {
    /// Current-error sense carrying `key`/`asc`/`ascq` and no extra bytes.
    pub fn new(key: u8, asc: u8, ascq: u8) -> Self {
        let mut sense = Self::new_zeroed();
        sense.response_code = RESPONSE_CODE_CURRENT;
        sense.flags = key & 0x0F;
        sense.additional_sense_length = (FIXED_MIN_LEN - 8) as u8;
        sense.asc = asc;
        sense.ascq = ascq;
        sense
    }

    #[inline]
    pub fn sense_key(&self) -> u8 {
        self.flags & 0x0F
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.response_code & 0x80 != 0
    }

    /// Additional bytes beyond the 18-byte header, as announced by the
    /// ADDITIONAL SENSE LENGTH field.
    pub fn additional_bytes(&self) -> &[u8] {
        let announced = (self.additional_sense_length as usize).saturating_sub(10);
        &self.additional_sense_bytes[..announced.min(self.additional_sense_bytes.len())]
    }
}

/// Decoded view of fixed-format sense data.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct SenseData {
    pub valid: bool,        // bit7 of byte0
    pub response_code: u8,  // low-7 bits of byte0
    pub sense_key: u8,      // low-4 bits of byte2
    pub flags: SenseFlags,  // high-4 bits of byte2
    pub information: u32,   // bytes 3-6
    pub additional_len: u8, // byte7
    pub cmd_specific: u32,  // bytes 8-11
    pub asc: u8,            // Additional Sense Code
    pub ascq: u8,           // Additional Sense Code Qualifier
    pub fru_code: u8,       // byte14
}

impl SenseData {
    /// Parse *fixed-format* sense-data (SPC-4 § 4.5.3).
    ///
    /// The buffer must be at least 18 bytes long; devices may return less
    /// than the 252 bytes that were asked for.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < FIXED_MIN_LEN {
            return Err(WireError::Truncated {
                what: "sense data",
                need: FIXED_MIN_LEN,
                got: buf.len(),
            });
        }

        let be32 = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        Ok(Self {
            valid: buf[0] & 0x80 != 0,
            response_code: buf[0] & 0x7F,
            sense_key: buf[2] & 0x0F,
            flags: SenseFlags::from_bits_truncate(buf[2] & 0xF0),
            information: be32(3),
            additional_len: buf[7],
            cmd_specific: be32(8),
            asc: buf[12],
            ascq: buf[13],
            fru_code: buf[14],
        })
    }
}

impl From<&FixedSenseData> for SenseData {
    fn from(raw: &FixedSenseData) -> Self {
        Self {
            valid: raw.valid(),
            response_code: raw.response_code & 0x7F,
            sense_key: raw.sense_key(),
            flags: SenseFlags::from_bits_truncate(raw.flags & 0xF0),
            information: raw.information.get(),
            additional_len: raw.additional_sense_length,
            cmd_specific: raw.command_specific.get(),
            asc: raw.asc,
            ascq: raw.ascq,
            fru_code: raw.fru_code,
        }
    }
}

impl fmt::Debug for SenseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenseData")
            .field("valid", &self.valid)
            .field(
                "response_code",
                &format_args!("{:#04x}", self.response_code),
            )
            .field("sense_key", &format_args!("{:#x}", self.sense_key))
            .field("key_name", &sense_key_to_str(self.sense_key))
            .field("flags", &self.flags)
            .field("information", &self.information)
            .field("additional_len", &self.additional_len)
            .field("cmd_specific", &self.cmd_specific)
            .field("asc", &format_args!("{:#04x}", self.asc))
            .field("ascq", &format_args!("{:#04x}", self.ascq))
            .field("description", &asc_ascq_to_str(self.asc, self.ascq))
            .finish()
    }
}

impl fmt::Debug for FixedSenseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&SenseData::from(self), f)
    }
}

/// SPC-4 Table 44 — sense key names.
pub fn sense_key_to_str(key: u8) -> &'static str {
    match key & 0x0F {
        0x0 => "NO SENSE",
        0x1 => "RECOVERED ERROR",
        0x2 => "NOT READY",
        0x3 => "MEDIUM ERROR",
        0x4 => "HARDWARE ERROR",
        0x5 => "ILLEGAL REQUEST",
        0x6 => "UNIT ATTENTION",
        0x7 => "DATA PROTECT",
        0x8 => "BLANK CHECK",
        0x9 => "VENDOR SPECIFIC",
        0xA => "COPY ABORTED",
        0xB => "ABORTED COMMAND",
        0xD => "VOLUME OVERFLOW",
        0xE => "MISCOMPARE",
        _ => "RESERVED",
    }
}

/// Return the SPC-4 description for a given ASC/ASCQ pair.
///
/// * If the pair is not present in the table, returns `"UNSPECIFIED / vendor
///   specific"`.
#[inline]
pub fn asc_ascq_to_str(asc: u8, ascq: u8) -> &'static str {
    let key = ((asc as u16) << 8) | ascq as u16;
    ASC_ASCQ_MAP
        .get(&key)
        .copied()
        .unwrap_or("UNSPECIFIED / vendor specific")
}

const ASC_ASCQ: &[(u8, u8, &str)] = &[
    (0x00, 0x00, "No additional sense information"),
    (0x04, 0x00, "Logical unit not ready, cause not reportable"),
    (0x04, 0x01, "Logical unit is in process of becoming ready"),
    (0x04, 0x02, "Logical unit not ready, initializing command required"),
    (0x04, 0x03, "Logical unit not ready, manual intervention required"),
    (0x04, 0x04, "Logical unit not ready, format in progress"),
    (0x08, 0x00, "Logical unit communication failure"),
    (0x0C, 0x00, "Write error"),
    (0x11, 0x00, "Unrecovered read error"),
    (0x14, 0x01, "Record not found"),
    (0x1A, 0x00, "Parameter list length error"),
    (0x20, 0x00, "Invalid command operation code"),
    (0x21, 0x00, "Logical block address out of range"),
    (0x24, 0x00, "Invalid field in CDB"),
    (0x25, 0x00, "Logical unit not supported"),
    (0x27, 0x00, "Write protected"),
    (0x28, 0x00, "Not ready to ready change, medium may have changed"),
    (0x29, 0x00, "Power on, reset, or bus device reset occurred"),
    (0x3A, 0x00, "Medium not present"),
    (0x44, 0x00, "Internal target failure"),
    (0x47, 0x00, "SCSI parity error"),
    (0x4B, 0x00, "Data phase error"),
];

static ASC_ASCQ_MAP: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    ASC_ASCQ
        .iter()
        .map(|&(asc, ascq, desc)| (((asc as u16) << 8) | ascq as u16, desc))
        .collect()
});
