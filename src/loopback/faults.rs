// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! One-shot misbehaviours the loopback target can be told to exhibit.

use std::collections::VecDeque;

use crate::usb::UsbError;

/// Stage of a Bulk-Only transaction a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Command,
    Data,
    Status,
}

/// A misbehaviour, consumed the first time it applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Stall the data stage; the CSW then reports the whole length as residue.
    StallData,
    /// Stall the next CSW read. Queue it twice to stall the retry as well.
    StallStatus,
    /// Fail the transfer of `Stage` with `UsbError`.
    Usb(Stage, UsbError),
    /// Accept only this many bytes of the CBW.
    ShortCommand(usize),
    /// Send only this many bytes of the CSW.
    ShortStatus(usize),
    /// Move at most this many bytes in the data stage.
    ShortData(usize),
    /// Reply with a CSW whose tag is off by one.
    BadTag,
    /// Reply with a corrupted CSW signature.
    BadSignature,
    /// Reply with `bCSWStatus` = 2.
    PhaseError,
    /// Reply with a raw, reserved `bCSWStatus`.
    RawStatus(u8),
    /// Report this residue whatever was moved.
    Residue(u32),
    /// Complete with CHECK CONDITION and latch this sense.
    CheckCondition { key: u8, asc: u8, ascq: u8 },
}

impl Fault {
    pub fn check_condition(key: u8, asc: u8, ascq: u8) -> Self {
        Fault::CheckCondition { key, asc, ascq }
    }

    /// NOT READY / LOGICAL UNIT NOT READY, CAUSE NOT REPORTABLE.
    pub fn not_ready() -> Self {
        Fault::check_condition(0x02, 0x04, 0x00)
    }

    fn point(&self) -> Point {
        match self {
            Fault::ShortCommand(_) => Point::Command,
            Fault::CheckCondition { .. } => Point::Execute,
            Fault::StallData | Fault::ShortData(_) => Point::Data,
            Fault::StallStatus
            | Fault::ShortStatus(_)
            | Fault::BadTag
            | Fault::BadSignature
            | Fault::PhaseError
            | Fault::RawStatus(_)
            | Fault::Residue(_) => Point::Status,
            Fault::Usb(Stage::Command, _) => Point::Command,
            Fault::Usb(Stage::Data, _) => Point::Data,
            Fault::Usb(Stage::Status, _) => Point::Status,
        }
    }
}

/// Where in a transaction the target looks for pending faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Point {
    Command,
    Execute,
    Data,
    Status,
}

/// A fault plus the commands it may hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRule {
    pub opcode: Option<u8>,
    pub lba: Option<u64>,
    pub fault: Fault,
}

impl FaultRule {
    /// Applies to whichever command reaches the fault's stage first.
    pub fn any(fault: Fault) -> Self {
        Self {
            opcode: None,
            lba: None,
            fault,
        }
    }

    pub fn on_opcode(opcode: u8, fault: Fault) -> Self {
        Self {
            opcode: Some(opcode),
            lba: None,
            fault,
        }
    }

    /// Narrow to READ/WRITE commands starting at `lba`.
    pub fn at_lba(mut self, lba: u64) -> Self {
        self.lba = Some(lba);
        self
    }

    fn matches(&self, opcode: u8, lba: Option<u64>, point: Point) -> bool {
        self.fault.point() == point
            && self.opcode.is_none_or(|op| op == opcode)
            && self.lba.is_none_or(|want| lba == Some(want))
    }
}

/// FIFO of pending rules.
#[derive(Debug, Default)]
pub struct FaultQueue {
    rules: VecDeque<FaultRule>,
}

impl FaultQueue {
    pub fn push(&mut self, rule: FaultRule) {
        self.rules.push_back(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Remove and return the oldest rule matching the command at `point`.
    pub(super) fn take(&mut self, opcode: u8, lba: Option<u64>, point: Point) -> Option<Fault> {
        let at = self
            .rules
            .iter()
            .position(|r| r.matches(opcode, lba, point))?;
        self.rules.remove(at).map(|r| r.fault)
    }
}
