// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{mem, time::Duration};

use tracing::{debug, warn};

use crate::{
    client::error::{MassStorageError, ScsiError, TransportPhase},
    control_block::{common::CommandBlock, request_sense::build_request_sense_simple},
    models::{
        cbw::CommandBlockWrapper,
        common::WireFormat,
        csw::CSW_LEN,
        sense_data::{FIXED_SENSE_LEN, FixedSenseData, SenseData},
    },
    state_machine::bot_states::{BotCtx, BotStates, DataPhase, run_bot},
    usb::{ControlSetup, UsbConnection, UsbError, selection::MassStorageDeviceInfo},
    utils::TagGenerator,
};

/// Class-specific, interface recipient, host to device.
pub const BULK_ONLY_RESET_REQUEST_TYPE: u8 = 0b0010_0001;
pub const BULK_ONLY_RESET_REQUEST: u8 = 0xFF;
/// Class-specific, interface recipient, device to host.
pub const GET_MAX_LUN_REQUEST_TYPE: u8 = 0b1010_0001;
pub const GET_MAX_LUN_REQUEST: u8 = 0xFE;

/// Bulk-Only Transport over one claimed interface.
///
/// Owns the connection together with the CSW and sense scratch buffers, so
/// only one transaction can be in flight.
pub struct BulkOnlyTransport<C: UsbConnection> {
    conn: C,
    info: MassStorageDeviceInfo,
    lun: u8,
    timeout: Duration,
    tags: TagGenerator,
    csw: [u8; CSW_LEN],
    sense: Vec<u8>,
}

impl<C: UsbConnection> BulkOnlyTransport<C> {
    pub fn new(conn: C, info: MassStorageDeviceInfo, lun: u8, timeout: Duration) -> Self {
        Self {
            conn,
            info,
            lun,
            timeout,
            tags: TagGenerator::new(),
            csw: [0; CSW_LEN],
            sense: vec![0; FIXED_SENSE_LEN],
        }
    }

    pub fn info(&self) -> &MassStorageDeviceInfo {
        &self.info
    }

    pub fn lun(&self) -> u8 {
        self.lun
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn bulk_transfer_cap(&self) -> usize {
        self.conn.bulk_transfer_cap()
    }

    /// Run one transaction and, on CHECK CONDITION, fetch the sense data
    /// when `request_sense` is set.
    ///
    /// Returns the number of data bytes transferred.
    pub fn command(
        &mut self,
        block: &CommandBlock,
        data: DataPhase<'_>,
        request_sense: bool,
    ) -> Result<usize, MassStorageError> {
        match self.execute(block, data) {
            Err(MassStorageError::CommandFailed { cause: None }) if request_sense => {
                Err(match self.request_sense() {
                    Ok(sense) => {
                        debug!(?sense, opcode = block.opcode(), "CHECK CONDITION");
                        MassStorageError::Scsi(ScsiError::from(&sense))
                    },
                    Err(e) => MassStorageError::CommandFailed {
                        cause: Some(Box::new(e)),
                    },
                })
            },
            other => other,
        }
    }

    /// Run one CBW / data / CSW exchange. Errors that leave the device in an
    /// unknown state are followed by reset-recovery before being returned.
    pub fn execute(
        &mut self,
        block: &CommandBlock,
        data: DataPhase<'_>,
    ) -> Result<usize, MassStorageError> {
        let length = u32::try_from(data.len())
            .map_err(|_| MassStorageError::TransferTooLarge(data.len()))?;
        let tag = self.tags.next_tag();
        let cbw = CommandBlockWrapper::new(tag, length, data.direction(), self.lun, block)?;

        let result = {
            let mut ctx = BotCtx::new(
                &mut self.conn,
                (self.info.bulk_in.address, self.info.bulk_out.address),
                self.timeout,
                cbw,
                data,
                &mut self.csw,
            );
            run_bot(BotStates::start(), &mut ctx)
        };

        if let Err(e) = &result
            && e.requires_reset_recovery()
        {
            warn!(tag, error = %e, "transaction failed, performing reset-recovery");
            self.reset_recovery();
        }
        result
    }

    /// Bulk-Only Mass Storage Reset followed by clearing both bulk halts.
    /// Failures are logged only.
    pub fn reset_recovery(&mut self) {
        let setup = ControlSetup {
            request_type: BULK_ONLY_RESET_REQUEST_TYPE,
            request: BULK_ONLY_RESET_REQUEST,
            value: 0,
            index: self.info.interface_number as u16,
        };
        if let Err(e) = self.conn.control_out(setup, &[], self.timeout) {
            warn!(error = %e, "Bulk-Only Mass Storage Reset failed");
        }
        for endpoint in [self.info.bulk_in.address, self.info.bulk_out.address] {
            if !self.conn.clear_stall(endpoint) {
                warn!(endpoint, "clear halt failed during reset-recovery");
            }
        }
    }

    /// GET MAX LUN. Devices that stall the request have a single LUN.
    pub fn get_max_lun(&mut self) -> Result<u8, MassStorageError> {
        let setup = ControlSetup {
            request_type: GET_MAX_LUN_REQUEST_TYPE,
            request: GET_MAX_LUN_REQUEST,
            value: 0,
            index: self.info.interface_number as u16,
        };
        let mut reply = [0u8; 1];
        match self.conn.control_in(setup, &mut reply, self.timeout) {
            Ok(1) => Ok(reply[0]),
            Ok(got) => Err(MassStorageError::ShortResponse {
                what: "GET MAX LUN",
                need: 1,
                got,
            }),
            Err(UsbError::Stall) => {
                debug!("GET MAX LUN stalled, assuming a single LUN");
                Ok(0)
            },
            Err(source) => Err(MassStorageError::Transport {
                phase: TransportPhase::Control,
                source,
            }),
        }
    }

    /// REQUEST SENSE into the owned 252-byte buffer. Never requests sense
    /// for itself.
    fn request_sense(&mut self) -> Result<SenseData, MassStorageError> {
        let cdb = build_request_sense_simple(FIXED_SENSE_LEN as u8);
        let mut buf = mem::take(&mut self.sense);
        buf.fill(0);
        let result = self.command(&cdb, DataPhase::In(&mut buf), false);
        let sense = result
            .and_then(|_| FixedSenseData::decode(&buf).map_err(MassStorageError::from))
            .map(|raw| SenseData::from(&raw));
        self.sense = buf;
        sense
    }
}
