// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, io};

use thiserror::Error;

use crate::{
    models::{
        common::WireError,
        sense_data::{SenseData, asc_ascq_to_str, sense_key_to_str},
    },
    usb::UsbError,
};

/// Sense key ABORTED COMMAND.
const SENSE_KEY_ABORTED_COMMAND: u8 = 0x0B;
/// ASC "logical unit not ready".
const ASC_NOT_READY: u8 = 0x04;

/// Stage of a transaction in which a USB transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPhase {
    /// CBW on bulk-out.
    Command,
    /// Data stage on either bulk endpoint.
    Data,
    /// Class-specific request on endpoint zero.
    Control,
}

impl fmt::Display for TransportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportPhase::Command => "command",
            TransportPhase::Data => "data",
            TransportPhase::Control => "control",
        })
    }
}

/// Why a CSW could not be used.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("could not read CSW: {0}")]
    Unreadable(#[source] UsbError),
    #[error("short CSW: got {got} of 13 bytes")]
    Truncated { got: usize },
    #[error("bad CSW signature {0:#010x}")]
    BadSignature(u32),
    #[error("CSW tag mismatch: expected {expected:#010x}, got {got:#010x}")]
    TagMismatch { expected: u32, got: u32 },
    #[error("CSW status {0:#04x} is not meaningful")]
    NotMeaningful(u8),
}

/// CHECK CONDITION reported through REQUEST SENSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScsiError {
    pub sense_key: u8,
    pub additional_code: u8,
    pub qualifier: u8,
}

impl fmt::Display for ScsiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SCSI sense {:02X} {:02X} {:02X} ({}: {})",
            self.sense_key,
            self.additional_code,
            self.qualifier,
            sense_key_to_str(self.sense_key),
            asc_ascq_to_str(self.additional_code, self.qualifier)
        )
    }
}

impl std::error::Error for ScsiError {}

impl ScsiError {
    pub fn new(sense_key: u8, additional_code: u8, qualifier: u8) -> Self {
        Self {
            sense_key,
            additional_code,
            qualifier,
        }
    }

    /// The condition read/write transactions are retried on.
    #[inline]
    pub fn is_transient_not_ready(&self) -> bool {
        self.sense_key == SENSE_KEY_ABORTED_COMMAND && self.additional_code == ASC_NOT_READY
    }
}

impl From<&SenseData> for ScsiError {
    fn from(sense: &SenseData) -> Self {
        Self::new(sense.sense_key, sense.asc, sense.ascq)
    }
}

/// Device setup step that the connection refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("device is not a supported Bulk-Only mass-storage device")]
    UnsupportedDevice,
    #[error("could not open device: {0}")]
    Open(#[source] UsbError),
    #[error("can't set device configuration {0}")]
    SetConfiguration(u8),
    #[error("can't claim interface {0}")]
    ClaimInterface(u8),
    #[error("can't select alternate setting {alternate_setting} of interface {interface}")]
    SetInterface { interface: u8, alternate_setting: u8 },
}

#[derive(Debug, Error)]
pub enum MassStorageError {
    #[error("{phase} transfer failed: {source}")]
    Transport {
        phase: TransportPhase,
        #[source]
        source: UsbError,
    },
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error("device reported a phase error")]
    PhaseError,
    #[error(transparent)]
    Scsi(#[from] ScsiError),
    #[error("command failed, {}", describe_cause(.cause))]
    CommandFailed {
        #[source]
        cause: Option<Box<MassStorageError>>,
    },
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("buffer too small: need {need} bytes, got {got}")]
    BufferTooSmall { need: usize, got: usize },
    #[error("device is read-only")]
    ReadOnly,
    #[error("{what}: short response, need {need} bytes, got {got}")]
    ShortResponse {
        what: &'static str,
        need: usize,
        got: usize,
    },
    #[error("bulk transfer cap of {cap} bytes cannot hold one {block_size}-byte block")]
    InvalidTransferCap { cap: usize, block_size: u32 },
    #[error("transfer of {0} bytes does not fit one CBW")]
    TransferTooLarge(usize),
    #[error("device reported a block size of {0} bytes")]
    InvalidBlockSize(u32),
    #[error(transparent)]
    Wire(#[from] WireError),
}

fn describe_cause(cause: &Option<Box<MassStorageError>>) -> String {
    match cause {
        Some(e) => format!("sense retrieval failed: {e}"),
        None => "no sense requested".to_string(),
    }
}

impl MassStorageError {
    /// Errors after which the device state is unknown and the host must
    /// perform Bulk-Only reset-recovery.
    pub fn requires_reset_recovery(&self) -> bool {
        match self {
            MassStorageError::Transport { phase, .. } => *phase != TransportPhase::Control,
            MassStorageError::Status(_) | MassStorageError::PhaseError => true,
            _ => false,
        }
    }

    pub fn scsi(&self) -> Option<&ScsiError> {
        match self {
            MassStorageError::Scsi(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MassStorageError> for io::Error {
    fn from(e: MassStorageError) -> Self {
        let kind = match &e {
            MassStorageError::Transport {
                source: UsbError::Timeout,
                ..
            } => io::ErrorKind::TimedOut,
            MassStorageError::BufferTooSmall { .. } => io::ErrorKind::InvalidInput,
            MassStorageError::ReadOnly => io::ErrorKind::PermissionDenied,
            MassStorageError::Setup(_) => io::ErrorKind::NotConnected,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}
