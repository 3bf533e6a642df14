// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Device side of Bulk-Only Transport: CBW intake, data stages, CSW
//! delivery and a small SCSI block command set.

use std::{collections::VecDeque, mem};

use tracing::{debug, trace, warn};

use crate::{
    control_block::{
        common::{BlockTransferCdb, CommandBlock, TransferKind},
        inquiry::{INQUIRY_OPCODE, InquiryCdb, StandardInquiryData},
        read_capacity::{
            ProtectionFlags, READ_CAPACITY10_OPCODE, READ_CAPACITY16_SERVICE_ACTION,
            ReadCapacity10Data, ReadCapacity16Cdb, ReadCapacity16Data, SERVICE_ACTION_IN16_OPCODE,
        },
        request_sense::{REQUEST_SENSE_OPCODE, RequestSenseCdb},
        test_unit_ready::TEST_UNIT_READY_OPCODE,
    },
    loopback::{
        disk::BackingStore,
        faults::{Fault, FaultQueue, Point},
    },
    models::{
        cbw::{CBW_LEN, CommandBlockWrapper, DataDirection},
        common::WireFormat,
        csw::{CSW_LEN, CommandStatus, CommandStatusWrapper},
        sense_data::{FIXED_SENSE_LEN, FixedSenseData},
    },
    usb::UsbError,
};

const NO_SENSE: u8 = 0x00;
const MEDIUM_ERROR: u8 = 0x03;
const ILLEGAL_REQUEST: u8 = 0x05;
const DATA_PROTECT: u8 = 0x07;

/// Command log length unless configured otherwise.
pub const DEFAULT_COMMAND_LOG_LIMIT: usize = 4096;

/// Sense triple reported through CHECK CONDITION.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sense {
    key: u8,
    asc: u8,
    ascq: u8,
}

impl Sense {
    const fn new(key: u8, asc: u8, ascq: u8) -> Self {
        Self { key, asc, ascq }
    }
}

const INVALID_OPCODE: Sense = Sense::new(ILLEGAL_REQUEST, 0x20, 0x00);
const LBA_OUT_OF_RANGE: Sense = Sense::new(ILLEGAL_REQUEST, 0x21, 0x00);
const INVALID_FIELD_IN_CDB: Sense = Sense::new(ILLEGAL_REQUEST, 0x24, 0x00);
const LUN_NOT_SUPPORTED: Sense = Sense::new(ILLEGAL_REQUEST, 0x25, 0x00);
const WRITE_PROTECTED: Sense = Sense::new(DATA_PROTECT, 0x27, 0x00);
const UNRECOVERED_READ_ERROR: Sense = Sense::new(MEDIUM_ERROR, 0x11, 0x00);
const WRITE_ERROR: Sense = Sense::new(MEDIUM_ERROR, 0x0C, 0x00);

/// Static properties of an emulated logical unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub vendor: String,
    pub product: String,
    pub revision: String,
    pub block_size: u32,
    pub write_protected: bool,
    /// `None` makes GET MAX LUN stall.
    pub max_lun: Option<u8>,
    /// Largest bulk transfer the connection accepts; 0 means unbounded.
    pub bulk_transfer_cap: usize,
    /// Answer READ CAPACITY(10) with the "use READ CAPACITY(16)" sentinel.
    pub capacity_sentinel: bool,
    /// Refuse to let the host claim the interface.
    pub refuse_claim: bool,
    /// Newest CBWs kept in the command log; 0 disables it.
    pub command_log_limit: usize,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            vendor: "USBMSC".into(),
            product: "Loopback Disk".into(),
            revision: "0100".into(),
            block_size: 512,
            write_protected: false,
            max_lun: Some(0),
            bulk_transfer_cap: 0,
            capacity_sentinel: false,
            refuse_claim: false,
            command_log_limit: DEFAULT_COMMAND_LOG_LIMIT,
        }
    }
}

/// One CBW as the target received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub tag: u32,
    pub lun: u8,
    pub opcode: u8,
    pub data_transfer_length: u32,
    pub direction: DataDirection,
    /// Set for READ/WRITE(10/16).
    pub transfer: Option<BlockTransferCdb>,
}

/// Transaction bookkeeping carried from the CBW to the CSW.
#[derive(Debug)]
struct Pending {
    tag: u32,
    lun: u8,
    block: CommandBlock,
    requested: u32,
    moved: u32,
    status: CommandStatus,
}

impl Pending {
    fn lba(&self) -> Option<u64> {
        BlockTransferCdb::parse(&self.block)
            .and_then(Result::ok)
            .map(|t| t.lba)
    }
}

#[derive(Default)]
enum Phase {
    #[default]
    Idle,
    DataIn(Pending, Vec<u8>),
    DataOut(Pending),
    Status(Pending),
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::DataIn(..) => "data-in",
            Phase::DataOut(_) => "data-out",
            Phase::Status(_) => "status",
        }
    }
}

/// Counters exposed for inspection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TargetStats {
    pub resets: usize,
    pub max_lun_requests: usize,
    pub cleared_stalls: Vec<u8>,
    pub configuration: Option<u8>,
    pub claimed: bool,
}

/// Mutable state of the emulated device, shared between connection handles.
pub struct TargetState {
    pub(super) config: TargetConfig,
    store: Box<dyn BackingStore>,
    phase: Phase,
    sense: FixedSenseData,
    pub(super) faults: FaultQueue,
    pub(super) log: VecDeque<CommandRecord>,
    pub(super) stats: TargetStats,
    halted_in: bool,
    halted_out: bool,
}

impl TargetState {
    pub(super) fn new(store: Box<dyn BackingStore>, config: TargetConfig) -> Self {
        Self {
            config,
            store,
            phase: Phase::Idle,
            sense: FixedSenseData::new(NO_SENSE, 0, 0),
            faults: FaultQueue::default(),
            log: VecDeque::new(),
            stats: TargetStats::default(),
            halted_in: false,
            halted_out: false,
        }
    }

    pub(super) fn store_mut(&mut self) -> &mut dyn BackingStore {
        self.store.as_mut()
    }

    fn number_of_blocks(&self) -> u64 {
        match self.config.block_size {
            0 => 0,
            bs => self.store.len() / bs as u64,
        }
    }

    /// Host to device on the bulk-out endpoint.
    pub(super) fn bulk_out(&mut self, buf: &[u8]) -> Result<usize, UsbError> {
        if self.halted_out {
            return Err(UsbError::Stall);
        }
        match mem::take(&mut self.phase) {
            Phase::DataOut(pending) => self.receive_data(pending, buf),
            Phase::Idle => self.receive_command(buf),
            other => {
                warn!(phase = other.name(), "CBW received mid-transaction, restarting");
                self.receive_command(buf)
            },
        }
    }

    /// Device to host on the bulk-in endpoint.
    pub(super) fn bulk_in(&mut self, buf: &mut [u8]) -> Result<usize, UsbError> {
        if self.halted_in {
            return Err(UsbError::Stall);
        }
        match mem::take(&mut self.phase) {
            Phase::DataIn(pending, data) => self.send_data(pending, data, buf),
            Phase::Status(pending) => self.send_status(pending, buf),
            other => {
                // Nothing queued for the host: the endpoint NAKs until the timeout.
                self.phase = other;
                Err(UsbError::Timeout)
            },
        }
    }

    /// Bulk-Only Mass Storage Reset. Halts stay set until cleared.
    pub(super) fn reset(&mut self) {
        self.stats.resets += 1;
        self.phase = Phase::Idle;
        debug!(resets = self.stats.resets, "Bulk-Only Mass Storage Reset");
    }

    pub(super) fn clear_halt(&mut self, endpoint: u8, is_in: bool) {
        self.stats.cleared_stalls.push(endpoint);
        if is_in {
            self.halted_in = false;
        } else {
            self.halted_out = false;
        }
    }

    pub(super) fn max_lun(&mut self) -> Option<u8> {
        self.stats.max_lun_requests += 1;
        self.config.max_lun
    }

    fn receive_command(&mut self, buf: &[u8]) -> Result<usize, UsbError> {
        let decoded = (buf.len() == CBW_LEN)
            .then(|| CommandBlockWrapper::decode(buf).ok())
            .flatten()
            .filter(CommandBlockWrapper::has_valid_signature)
            .and_then(|cbw| cbw.command_block().ok().map(|block| (cbw, block)));
        let Some((cbw, block)) = decoded else {
            warn!(len = buf.len(), "invalid CBW, halting both bulk endpoints");
            self.halted_in = true;
            self.halted_out = true;
            return Ok(buf.len());
        };

        let transfer = BlockTransferCdb::parse(&block).and_then(Result::ok);
        let lba = transfer.map(|t| t.lba);
        match self.faults.take(block.opcode(), lba, Point::Command) {
            Some(Fault::ShortCommand(n)) => return Ok(n.min(buf.len())),
            Some(Fault::Usb(_, e)) => return Err(e),
            _ => {},
        }

        trace!(cbw = %cbw.to_hex(), "CBW received");
        self.record(CommandRecord {
            tag: cbw.tag(),
            lun: cbw.lun,
            opcode: block.opcode(),
            data_transfer_length: cbw.data_transfer_length(),
            direction: cbw.direction(),
            transfer,
        });

        let mut pending = Pending {
            tag: cbw.tag(),
            lun: cbw.lun,
            block,
            requested: cbw.data_transfer_length(),
            moved: 0,
            status: CommandStatus::Passed,
        };

        if cbw.direction() == DataDirection::Out {
            self.phase = Phase::DataOut(pending);
            return Ok(CBW_LEN);
        }

        match self.execute(&pending) {
            Ok(mut data) => {
                data.truncate(pending.requested as usize);
                self.phase = if cbw.direction() == DataDirection::In {
                    Phase::DataIn(pending, data)
                } else {
                    Phase::Status(pending)
                };
            },
            Err(sense) => {
                self.latch(sense);
                pending.status = CommandStatus::Failed;
                self.phase = if cbw.direction() == DataDirection::In {
                    Phase::DataIn(pending, Vec::new())
                } else {
                    Phase::Status(pending)
                };
            },
        }
        Ok(CBW_LEN)
    }

    fn receive_data(&mut self, mut pending: Pending, buf: &[u8]) -> Result<usize, UsbError> {
        let mut limit = buf.len();
        match self.faults.take(pending.block.opcode(), pending.lba(), Point::Data) {
            Some(Fault::StallData) => {
                self.halted_out = true;
                self.phase = Phase::Status(pending);
                return Err(UsbError::Stall);
            },
            Some(Fault::Usb(_, e)) => {
                self.phase = Phase::Status(pending);
                return Err(e);
            },
            Some(Fault::ShortData(n)) => limit = n,
            _ => {},
        }

        let accepted = buf.len().min(limit).min(pending.requested as usize);
        match self.execute_write(&pending, &buf[..accepted]) {
            Ok(written) => pending.moved = written as u32,
            Err(sense) => {
                self.latch(sense);
                pending.moved = accepted as u32;
                pending.status = CommandStatus::Failed;
            },
        }
        self.phase = Phase::Status(pending);
        Ok(accepted)
    }

    fn send_data(
        &mut self,
        mut pending: Pending,
        data: Vec<u8>,
        buf: &mut [u8],
    ) -> Result<usize, UsbError> {
        if pending.status != CommandStatus::Passed {
            self.halted_in = true;
            self.phase = Phase::Status(pending);
            return Err(UsbError::Stall);
        }

        let mut limit = buf.len();
        match self.faults.take(pending.block.opcode(), pending.lba(), Point::Data) {
            Some(Fault::StallData) => {
                self.halted_in = true;
                self.phase = Phase::Status(pending);
                return Err(UsbError::Stall);
            },
            Some(Fault::Usb(_, e)) => {
                self.phase = Phase::Status(pending);
                return Err(e);
            },
            Some(Fault::ShortData(n)) => limit = n,
            _ => {},
        }

        let n = data.len().min(buf.len()).min(limit);
        buf[..n].copy_from_slice(&data[..n]);
        pending.moved = n as u32;
        self.phase = Phase::Status(pending);
        Ok(n)
    }

    fn send_status(&mut self, pending: Pending, buf: &mut [u8]) -> Result<usize, UsbError> {
        let residue = pending.requested.saturating_sub(pending.moved);
        let mut csw = CommandStatusWrapper::new(pending.tag, residue, pending.status);
        let mut len = CSW_LEN;
        let mut corrupt_signature = false;

        match self.faults.take(pending.block.opcode(), pending.lba(), Point::Status) {
            Some(Fault::StallStatus) => {
                self.halted_in = true;
                self.phase = Phase::Status(pending);
                return Err(UsbError::Stall);
            },
            Some(Fault::Usb(_, e)) => {
                self.phase = Phase::Status(pending);
                return Err(e);
            },
            Some(Fault::ShortStatus(n)) => len = n.min(CSW_LEN),
            Some(Fault::BadTag) => csw.tag.set(pending.tag.wrapping_add(1)),
            Some(Fault::BadSignature) => corrupt_signature = true,
            Some(Fault::PhaseError) => csw.status = CommandStatus::PhaseError.into(),
            Some(Fault::RawStatus(code)) => csw.status = code,
            Some(Fault::Residue(r)) => csw.data_residue.set(r),
            _ => {},
        }

        let mut bytes = [0u8; CSW_LEN];
        bytes.copy_from_slice(csw.to_bytes());
        if corrupt_signature {
            bytes[0] ^= 0xFF;
        }
        let n = len.min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        debug!(tag = pending.tag, residue, status = ?pending.status, "CSW sent");
        Ok(n)
    }

    fn record(&mut self, entry: CommandRecord) {
        let limit = self.config.command_log_limit;
        if limit == 0 {
            return;
        }
        while self.log.len() >= limit {
            self.log.pop_front();
        }
        self.log.push_back(entry);
    }

    fn latch(&mut self, sense: Sense) {
        debug!(key = sense.key, asc = sense.asc, ascq = sense.ascq, "CHECK CONDITION");
        self.sense = FixedSenseData::new(sense.key, sense.asc, sense.ascq);
    }

    /// Run a command that has no data-out stage; returns its data-in payload.
    fn execute(&mut self, pending: &Pending) -> Result<Vec<u8>, Sense> {
        let block = &pending.block;
        let opcode = block.opcode();
        if opcode == REQUEST_SENSE_OPCODE {
            let cdb = block
                .decode::<RequestSenseCdb>()
                .map_err(|_| INVALID_FIELD_IN_CDB)?;
            let sense = mem::replace(&mut self.sense, FixedSenseData::new(NO_SENSE, 0, 0));
            let len = (cdb.allocation_length as usize).min(FIXED_SENSE_LEN);
            return Ok(sense.to_bytes()[..len].to_vec());
        }

        self.sense = FixedSenseData::new(NO_SENSE, 0, 0);
        self.precheck(pending)?;

        match opcode {
            TEST_UNIT_READY_OPCODE => Ok(Vec::new()),
            INQUIRY_OPCODE => {
                let cdb = block.decode::<InquiryCdb>().map_err(|_| INVALID_FIELD_IN_CDB)?;
                if cdb.evpd & 0x01 != 0 {
                    return Err(INVALID_FIELD_IN_CDB);
                }
                let data = StandardInquiryData::new(
                    &self.config.vendor,
                    &self.config.product,
                    &self.config.revision,
                );
                let len = (cdb.allocation_length.get() as usize).min(data.to_bytes().len());
                Ok(data.to_bytes()[..len].to_vec())
            },
            READ_CAPACITY10_OPCODE => {
                let last_lba = self.number_of_blocks().saturating_sub(1);
                let data = match u32::try_from(last_lba) {
                    Ok(last) if !self.config.capacity_sentinel => {
                        ReadCapacity10Data::new(last, self.config.block_size)
                    },
                    _ => ReadCapacity10Data::new(u32::MAX, u32::MAX),
                };
                Ok(data.to_bytes().to_vec())
            },
            SERVICE_ACTION_IN16_OPCODE => {
                let cdb = block
                    .decode::<ReadCapacity16Cdb>()
                    .map_err(|_| INVALID_FIELD_IN_CDB)?;
                if cdb.service_action & 0x1F != READ_CAPACITY16_SERVICE_ACTION {
                    return Err(INVALID_FIELD_IN_CDB);
                }
                let data = ReadCapacity16Data::new(
                    self.number_of_blocks().saturating_sub(1),
                    self.config.block_size,
                    ProtectionFlags::empty(),
                );
                let len = (cdb.allocation_length.get() as usize).min(data.to_bytes().len());
                Ok(data.to_bytes()[..len].to_vec())
            },
            _ => match BlockTransferCdb::parse(block) {
                Some(Ok(t)) if t.kind == TransferKind::Read => self.read(t),
                Some(Ok(_)) | Some(Err(_)) => Err(INVALID_FIELD_IN_CDB),
                None => Err(INVALID_OPCODE),
            },
        }
    }

    /// Run a command that received `data` in its data-out stage; returns the
    /// number of bytes consumed.
    fn execute_write(&mut self, pending: &Pending, data: &[u8]) -> Result<usize, Sense> {
        self.sense = FixedSenseData::new(NO_SENSE, 0, 0);
        self.precheck(pending)?;

        let t = match BlockTransferCdb::parse(&pending.block) {
            Some(Ok(t)) if t.kind == TransferKind::Write => t,
            Some(_) => return Err(INVALID_FIELD_IN_CDB),
            None => return Err(INVALID_OPCODE),
        };
        if self.config.write_protected {
            return Err(WRITE_PROTECTED);
        }
        self.check_range(&t)?;

        let bs = self.config.block_size as usize;
        let blocks = (data.len() / bs).min(t.blocks as usize);
        let bytes = blocks * bs;
        self.store
            .write_at(t.lba * bs as u64, &data[..bytes])
            .map_err(|e| {
                warn!(lba = t.lba, error = %e, "backing store write failed");
                WRITE_ERROR
            })?;
        trace!(lba = t.lba, blocks, "WRITE");
        Ok(bytes)
    }

    fn read(&mut self, t: BlockTransferCdb) -> Result<Vec<u8>, Sense> {
        self.check_range(&t)?;
        let bs = self.config.block_size as u64;
        let mut data = vec![0u8; (t.blocks as u64 * bs) as usize];
        self.store.read_at(t.lba * bs, &mut data).map_err(|e| {
            warn!(lba = t.lba, error = %e, "backing store read failed");
            UNRECOVERED_READ_ERROR
        })?;
        trace!(lba = t.lba, blocks = t.blocks, "READ");
        Ok(data)
    }

    fn check_range(&self, t: &BlockTransferCdb) -> Result<(), Sense> {
        match t.lba.checked_add(t.blocks as u64) {
            Some(end) if end <= self.number_of_blocks() => Ok(()),
            _ => Err(LBA_OUT_OF_RANGE),
        }
    }

    /// LUN addressing and injected CHECK CONDITIONs.
    fn precheck(&mut self, pending: &Pending) -> Result<(), Sense> {
        if pending.lun > self.config.max_lun.unwrap_or(0) {
            return Err(LUN_NOT_SUPPORTED);
        }
        match self
            .faults
            .take(pending.block.opcode(), pending.lba(), Point::Execute)
        {
            Some(Fault::CheckCondition { key, asc, ascq }) => Err(Sense::new(key, asc, ascq)),
            _ => Ok(()),
        }
    }
}
