// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! One Bulk-Only transaction: CBW out, optional data stage, CSW in.
//!
//! Stalls in the data stage and on the first CSW read are recovered here by
//! clearing the endpoint halt. Every other failure ends the machine with an
//! error; reset-recovery is left to the caller.

use std::{ops::Range, time::Duration};

use tracing::{debug, trace, warn};

use crate::{
    client::error::{MassStorageError, StatusError, TransportPhase},
    models::{
        cbw::{CBW_LEN, CommandBlockWrapper, DataDirection},
        common::WireFormat,
        csw::{CSW_LEN, CSW_SIGNATURE, CommandStatus, CommandStatusWrapper},
    },
    state_machine::common::{StateMachine, Transition},
    usb::{UsbConnection, UsbError},
};

/// Data stage of a transaction, borrowed from the caller.
#[derive(Debug)]
pub enum DataPhase<'a> {
    None,
    /// Device to host.
    In(&'a mut [u8]),
    /// Host to device.
    Out(&'a [u8]),
}

impl DataPhase<'_> {
    pub fn len(&self) -> usize {
        match self {
            DataPhase::None => 0,
            DataPhase::In(buf) => buf.len(),
            DataPhase::Out(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn direction(&self) -> DataDirection {
        match self {
            _ if self.is_empty() => DataDirection::None,
            DataPhase::In(_) => DataDirection::In,
            DataPhase::Out(_) | DataPhase::None => DataDirection::Out,
        }
    }

    /// Short-lived copy of the same borrow.
    pub fn reborrow(&mut self) -> DataPhase<'_> {
        match self {
            DataPhase::None => DataPhase::None,
            DataPhase::In(buf) => DataPhase::In(buf),
            DataPhase::Out(buf) => DataPhase::Out(buf),
        }
    }

    /// Narrow to `range` of the underlying buffer.
    pub fn slice(&mut self, range: Range<usize>) -> DataPhase<'_> {
        match self {
            DataPhase::None => DataPhase::None,
            DataPhase::In(buf) => DataPhase::In(&mut buf[range]),
            DataPhase::Out(buf) => DataPhase::Out(&buf[range]),
        }
    }
}

pub struct BotCtx<'a, C: UsbConnection> {
    pub conn: &'a mut C,
    pub bulk_in: u8,
    pub bulk_out: u8,
    pub timeout: Duration,
    pub cbw: CommandBlockWrapper,
    pub data: DataPhase<'a>,
    pub csw: &'a mut [u8; CSW_LEN],
}

impl<'a, C: UsbConnection> BotCtx<'a, C> {
    pub fn new(
        conn: &'a mut C,
        endpoints: (u8, u8),
        timeout: Duration,
        cbw: CommandBlockWrapper,
        data: DataPhase<'a>,
        csw: &'a mut [u8; CSW_LEN],
    ) -> Self {
        Self {
            conn,
            bulk_in: endpoints.0,
            bulk_out: endpoints.1,
            timeout,
            cbw,
            data,
            csw,
        }
    }
}

/* ===== States & transitions ===== */

pub struct SendCommand;

pub struct TransferData;

pub struct ReadStatus {
    transferred: usize,
    stall_cleared: bool,
}

impl ReadStatus {
    fn after(transferred: usize) -> Self {
        Self {
            transferred,
            stall_cleared: false,
        }
    }
}

pub enum BotStates {
    Command(SendCommand),
    Data(TransferData),
    Status(ReadStatus),
}

impl BotStates {
    pub fn start() -> Self {
        BotStates::Command(SendCommand)
    }
}

/// Intermediate results carry the number of data bytes moved so far.
type BotStepOut = Transition<BotStates, Result<usize, MassStorageError>>;

impl<C: UsbConnection> StateMachine<BotCtx<'_, C>, BotStepOut> for SendCommand {
    fn step(&mut self, ctx: &mut BotCtx<'_, C>) -> BotStepOut {
        debug!(
            tag = ctx.cbw.tag(),
            length = ctx.cbw.data_transfer_length(),
            cbw = %ctx.cbw.to_hex(),
            "CBW"
        );
        match ctx
            .conn
            .bulk_out(ctx.bulk_out, ctx.cbw.to_bytes(), ctx.timeout)
        {
            Ok(CBW_LEN) => {},
            Ok(sent) => {
                return Transition::Done(Err(MassStorageError::Transport {
                    phase: TransportPhase::Command,
                    source: UsbError::Transport(format!(
                        "partial CBW write: {sent} of {CBW_LEN} bytes"
                    )),
                }));
            },
            Err(source) => {
                return Transition::Done(Err(MassStorageError::Transport {
                    phase: TransportPhase::Command,
                    source,
                }));
            },
        }

        let next = if ctx.data.is_empty() {
            BotStates::Status(ReadStatus::after(0))
        } else {
            BotStates::Data(TransferData)
        };
        Transition::Next(next, Ok(0))
    }
}

impl<C: UsbConnection> StateMachine<BotCtx<'_, C>, BotStepOut> for TransferData {
    fn step(&mut self, ctx: &mut BotCtx<'_, C>) -> BotStepOut {
        let (endpoint, result) = match &mut ctx.data {
            DataPhase::In(buf) => (
                ctx.bulk_in,
                ctx.conn.bulk_in(ctx.bulk_in, &mut buf[..], ctx.timeout),
            ),
            DataPhase::Out(buf) => (
                ctx.bulk_out,
                ctx.conn.bulk_out(ctx.bulk_out, &buf[..], ctx.timeout),
            ),
            DataPhase::None => return Transition::Next(BotStates::Status(ReadStatus::after(0)), Ok(0)),
        };

        match result {
            Ok(moved) => {
                trace!(endpoint, moved, "data stage");
                Transition::Next(BotStates::Status(ReadStatus::after(moved)), Ok(moved))
            },
            Err(UsbError::Stall) => {
                warn!(endpoint, "data stage stalled, clearing halt");
                if !ctx.conn.clear_stall(endpoint) {
                    warn!(endpoint, "clear halt failed");
                }
                Transition::Next(BotStates::Status(ReadStatus::after(0)), Ok(0))
            },
            Err(source) => Transition::Done(Err(MassStorageError::Transport {
                phase: TransportPhase::Data,
                source,
            })),
        }
    }
}

impl<C: UsbConnection> StateMachine<BotCtx<'_, C>, BotStepOut> for ReadStatus {
    fn step(&mut self, ctx: &mut BotCtx<'_, C>) -> BotStepOut {
        ctx.csw.fill(0);
        match ctx.conn.bulk_in(ctx.bulk_in, &mut ctx.csw[..], ctx.timeout) {
            Ok(CSW_LEN) => {},
            Ok(got) => {
                return Transition::Done(Err(StatusError::Truncated { got }.into()));
            },
            Err(UsbError::Stall) if !self.stall_cleared => {
                warn!(endpoint = ctx.bulk_in, "CSW read stalled, clearing halt and retrying");
                if !ctx.conn.clear_stall(ctx.bulk_in) {
                    warn!(endpoint = ctx.bulk_in, "clear halt failed");
                }
                self.stall_cleared = true;
                return Transition::Stay(Ok(self.transferred));
            },
            Err(e) => {
                return Transition::Done(Err(StatusError::Unreadable(e).into()));
            },
        }

        let csw = match CommandStatusWrapper::decode(&ctx.csw[..]) {
            Ok(csw) => csw,
            Err(e) => return Transition::Done(Err(e.into())),
        };
        debug!(?csw, "CSW");

        let expected = ctx.cbw.tag();
        if !csw.is_valid(expected) {
            let error = if csw.signature() != CSW_SIGNATURE {
                StatusError::BadSignature(csw.signature())
            } else {
                StatusError::TagMismatch {
                    expected,
                    got: csw.tag(),
                }
            };
            return Transition::Done(Err(error.into()));
        }

        if !csw.is_meaningful(&ctx.cbw) {
            warn!(
                residue = csw.data_residue(),
                requested = ctx.cbw.data_transfer_length(),
                status = ?csw.status(),
                "CSW is not meaningful"
            );
        }

        match csw.status() {
            CommandStatus::Passed => {
                let requested = ctx.cbw.data_transfer_length() as usize;
                let residue = (csw.data_residue() as usize).min(requested);
                Transition::Done(Ok(self.transferred.min(requested - residue)))
            },
            CommandStatus::Failed => {
                Transition::Done(Err(MassStorageError::CommandFailed { cause: None }))
            },
            CommandStatus::PhaseError => Transition::Done(Err(MassStorageError::PhaseError)),
            CommandStatus::Reserved(code) => {
                Transition::Done(Err(StatusError::NotMeaningful(code).into()))
            },
        }
    }
}

/// Drive a transaction to completion; returns the data bytes transferred.
pub fn run_bot<C: UsbConnection>(
    mut state: BotStates,
    ctx: &mut BotCtx<'_, C>,
) -> Result<usize, MassStorageError> {
    loop {
        let tr = match &mut state {
            BotStates::Command(s) => s.step(ctx),
            BotStates::Data(s) => s.step(ctx),
            BotStates::Status(s) => s.step(ctx),
        };

        match tr {
            Transition::Next(next, _r) => {
                state = next;
            },
            Transition::Stay(Ok(_)) => { /* retry the same state */ },
            Transition::Stay(Err(e)) => return Err(e),
            Transition::Done(result) => return result,
        }
    }
}
