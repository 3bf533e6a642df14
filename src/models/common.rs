// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Errors raised while encoding or decoding fixed-layout wire structures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WireError {
    #[error("{what}: need {need} bytes, got {got}")]
    Truncated {
        what: &'static str,
        need: usize,
        got: usize,
    },
    #[error("LUN {0} out of range (0..=15)")]
    InvalidLun(u8),
    #[error("command block length {0} out of range (1..=16)")]
    InvalidCommandLength(usize),
    #[error("hex decode error: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Common functionality for every fixed-size structure that travels on the
/// wire (BOT envelopes, CDBs and their parameter data).
///
/// Every implementor is a `#[repr(C)]` struct made only of bytes and
/// byte-order-aware integers, so its in-memory image *is* its wire image.
pub trait WireFormat: FromBytes + IntoBytes + Immutable + KnownLayout + Sized {
    /// Exact encoded size in bytes.
    const WIRE_LEN: usize;
    /// Name used in diagnostics.
    const NAME: &'static str;

    /// Borrow the encoded bytes.
    fn to_bytes(&self) -> &[u8] {
        self.as_bytes()
    }

    /// Decode from the head of `buf`; trailing bytes are ignored.
    fn decode(buf: &[u8]) -> Result<Self, WireError> {
        Self::read_from_prefix(buf)
            .map(|(value, _rest)| value)
            .map_err(|_| WireError::Truncated {
                what: Self::NAME,
                need: Self::WIRE_LEN,
                got: buf.len(),
            })
    }

    /// Encode into a continuous hex string (no spaces).
    fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decode a hex string, ignoring any whitespace.
    fn from_hex(hex_str: &str) -> Result<Self, WireError> {
        let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = hex::decode(&cleaned)?;
        Self::decode(&bytes)
    }
}

/// Asserts at compile time that a wire structure has the documented size.
#[macro_export]
macro_rules! assert_wire_len {
    ($ty:ty, $len:expr) => {
        const _: () = assert!(
            ::core::mem::size_of::<$ty>() == $len,
            concat!(stringify!($ty), " has the wrong wire size")
        );
    };
}
