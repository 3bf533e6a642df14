// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    client::{
        error::{MassStorageError, SetupError},
        transport::BulkOnlyTransport,
    },
    control_block::{
        common::TransferKind,
        inquiry::{STANDARD_INQUIRY_LEN, StandardInquiryData, build_inquiry_standard},
        read_capacity::{
            CapacityData, READ_CAPACITY10_DATA_LEN, READ_CAPACITY16_DATA_LEN,
            ReadCapacity10Data, ReadCapacity16Data, build_read_capacity10,
            build_read_capacity16,
        },
        test_unit_ready::build_test_unit_ready,
    },
    models::{
        cbw::MAX_LUN,
        common::{WireError, WireFormat},
    },
    state_machine::bot_states::DataPhase,
    usb::{UsbConnection, selection::MassStorageDeviceInfo},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_READ_WRITE_ATTEMPTS: u32 = 5;

/// Block-granular storage.
///
/// Capacity queries take `&mut self` because implementations may probe the
/// medium lazily on first use.
pub trait BlockDevice {
    /// Read `count` blocks starting at `lba` into the head of `destination`.
    /// Returns the number of blocks actually read.
    fn read_blocks(
        &mut self,
        lba: u64,
        destination: &mut [u8],
        count: u32,
    ) -> Result<u32, MassStorageError>;

    /// Write `count` blocks from the head of `source` starting at `lba`.
    /// Returns the number of blocks actually written.
    fn write_blocks(&mut self, lba: u64, source: &[u8], count: u32) -> Result<u32, MassStorageError>;

    fn number_of_blocks(&mut self) -> Result<u64, MassStorageError>;

    fn block_size(&mut self) -> Result<u32, MassStorageError>;

    fn read_only(&self) -> bool;
}

/// Per-session settings of a [`MassStorageDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOptions {
    pub writable: bool,
    pub lun: u8,
    pub timeout: Duration,
    /// Total attempts for a read/write that fails with a transient
    /// not-ready condition.
    pub read_write_attempts: u32,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            writable: false,
            lun: 0,
            timeout: DEFAULT_TIMEOUT,
            read_write_attempts: DEFAULT_READ_WRITE_ATTEMPTS,
        }
    }
}

/// Identity reported by standard INQUIRY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor: String,
    pub product: String,
    pub revision: String,
    pub removable: bool,
}

/// SCSI block device reached through Bulk-Only Transport.
///
/// Capacity and max LUN are probed on first use and cached for the session.
/// The interface is released on [`close`](Self::close) or drop.
pub struct MassStorageDevice<C: UsbConnection> {
    transport: BulkOnlyTransport<C>,
    options: DeviceOptions,
    capacity: Option<CapacityData>,
    max_lun: Option<u8>,
    released: bool,
}

impl<C: UsbConnection> MassStorageDevice<C> {
    /// Select the configuration, claim the interface and select its
    /// alternate setting. The connection is dropped if any step fails.
    pub fn open(
        mut conn: C,
        info: MassStorageDeviceInfo,
        options: DeviceOptions,
    ) -> Result<Self, MassStorageError> {
        if options.lun > MAX_LUN {
            return Err(WireError::InvalidLun(options.lun).into());
        }
        if !conn.set_configuration(info.configuration) {
            return Err(SetupError::SetConfiguration(info.configuration).into());
        }
        if !conn.claim_interface(info.interface_number, true) {
            return Err(SetupError::ClaimInterface(info.interface_number).into());
        }
        if !conn.set_interface(info.interface_number, info.alternate_setting) {
            return Err(SetupError::SetInterface {
                interface: info.interface_number,
                alternate_setting: info.alternate_setting,
            }
            .into());
        }

        info!(
            interface = info.interface_number,
            bulk_in = info.bulk_in.address,
            bulk_out = info.bulk_out.address,
            lun = options.lun,
            writable = options.writable,
            "mass-storage session opened"
        );

        Ok(Self {
            transport: BulkOnlyTransport::new(conn, info, options.lun, options.timeout),
            options,
            capacity: None,
            max_lun: None,
            released: false,
        })
    }

    pub fn options(&self) -> &DeviceOptions {
        &self.options
    }

    pub fn transport(&self) -> &BulkOnlyTransport<C> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut BulkOnlyTransport<C> {
        &mut self.transport
    }

    /// Highest LUN the device exposes.
    pub fn max_lun(&mut self) -> Result<u8, MassStorageError> {
        if let Some(lun) = self.max_lun {
            return Ok(lun);
        }
        let lun = self.transport.get_max_lun()?;
        debug!(max_lun = lun, "GET MAX LUN");
        self.max_lun = Some(lun);
        Ok(lun)
    }

    pub fn capacity(&mut self) -> Result<CapacityData, MassStorageError> {
        if let Some(capacity) = self.capacity {
            return Ok(capacity);
        }
        let capacity = self.probe_capacity()?;
        if capacity.block_size == 0 {
            return Err(MassStorageError::InvalidBlockSize(0));
        }
        info!(
            last_lba = capacity.last_lba,
            block_size = capacity.block_size,
            "capacity discovered"
        );
        self.capacity = Some(capacity);
        Ok(capacity)
    }

    /// TEST UNIT READY.
    pub fn test_unit_ready(&mut self) -> Result<(), MassStorageError> {
        self.transport
            .command(&build_test_unit_ready(0), DataPhase::None, true)
            .map(|_| ())
    }

    /// Standard INQUIRY.
    pub fn inquiry(&mut self) -> Result<DeviceIdentity, MassStorageError> {
        let mut buf = [0u8; STANDARD_INQUIRY_LEN];
        let cdb = build_inquiry_standard(STANDARD_INQUIRY_LEN as u16, 0);
        let got = self.transport.command(&cdb, DataPhase::In(&mut buf), true)?;
        if got < STANDARD_INQUIRY_LEN {
            return Err(MassStorageError::ShortResponse {
                what: "INQUIRY",
                need: STANDARD_INQUIRY_LEN,
                got,
            });
        }
        let data = StandardInquiryData::decode(&buf)?;
        Ok(DeviceIdentity {
            vendor: data.vendor(),
            product: data.product(),
            revision: data.revision(),
            removable: data.removable(),
        })
    }

    /// Release the interface. Further use of the connection is up to the
    /// caller; dropping the device does the same.
    pub fn close(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if self.released {
            return true;
        }
        self.released = true;
        let interface = self.transport.info().interface_number;
        let released = self.transport.connection_mut().release_interface(interface);
        if released {
            info!(interface, "mass-storage session closed");
        } else {
            warn!(interface, "release interface failed");
        }
        released
    }

    fn probe_capacity(&mut self) -> Result<CapacityData, MassStorageError> {
        let mut rc10 = [0u8; READ_CAPACITY10_DATA_LEN];
        let got = self.transport.command(
            &build_read_capacity10(0, false, 0),
            DataPhase::In(&mut rc10),
            true,
        )?;
        if got < READ_CAPACITY10_DATA_LEN {
            return Err(MassStorageError::ShortResponse {
                what: "READ CAPACITY(10)",
                need: READ_CAPACITY10_DATA_LEN,
                got,
            });
        }
        let rc10 = ReadCapacity10Data::decode(&rc10)?;
        if !rc10.needs_read_capacity16() {
            return Ok(CapacityData::from(&rc10));
        }

        debug!("READ CAPACITY(10) returned the sentinel, using READ CAPACITY(16)");
        let mut rc16 = [0u8; READ_CAPACITY16_DATA_LEN];
        let got = self.transport.command(
            &build_read_capacity16(0, false, READ_CAPACITY16_DATA_LEN as u32, 0),
            DataPhase::In(&mut rc16),
            true,
        )?;
        if got < READ_CAPACITY16_DATA_LEN {
            return Err(MassStorageError::ShortResponse {
                what: "READ CAPACITY(16)",
                need: READ_CAPACITY16_DATA_LEN,
                got,
            });
        }
        let rc16 = ReadCapacity16Data::decode(&rc16)?;
        Ok(CapacityData::from(&rc16))
    }

    fn transfer_blocks(
        &mut self,
        kind: TransferKind,
        mut lba: u64,
        mut buf: DataPhase<'_>,
        count: u32,
    ) -> Result<u32, MassStorageError> {
        if count == 0 {
            return Ok(0);
        }
        if kind == TransferKind::Write && self.read_only() {
            return Err(MassStorageError::ReadOnly);
        }

        let block_size = self.capacity()?.block_size;
        let bs = block_size as usize;
        let total = count as usize * bs;
        if buf.len() < total {
            return Err(MassStorageError::BufferTooSmall {
                need: total,
                got: buf.len(),
            });
        }

        let cap = match self.transport.bulk_transfer_cap() {
            0 => u32::MAX as usize,
            cap => cap.min(u32::MAX as usize),
        };
        let blocks_per_chunk = (cap / bs).min(count as usize) as u32;
        if blocks_per_chunk == 0 {
            return Err(MassStorageError::InvalidTransferCap { cap, block_size });
        }

        // The first transfer always goes out; later ones stop at the last block.
        let end = self.capacity()?.number_of_blocks();
        let mut remaining = count;
        let mut done: u32 = 0;
        while remaining > 0 && (done == 0 || lba < end) {
            let blocks = remaining.min(blocks_per_chunk);
            let offset = done as usize * bs;
            let chunk = buf.slice(offset..offset + blocks as usize * bs);
            match self.transfer_with_retry(kind, lba, chunk, blocks) {
                Ok(moved) => {
                    done += moved;
                    remaining -= moved;
                    lba += moved as u64;
                    if moved < blocks {
                        debug!(lba, moved, blocks, "short chunk, stopping");
                        break;
                    }
                },
                Err(e) if done == 0 => return Err(e),
                Err(e) => {
                    warn!(lba, done, error = %e, "chunk failed after partial progress");
                    break;
                },
            }
        }
        Ok(done)
    }

    fn transfer_with_retry(
        &mut self,
        kind: TransferKind,
        lba: u64,
        mut buf: DataPhase<'_>,
        blocks: u32,
    ) -> Result<u32, MassStorageError> {
        let cdb = kind.build(lba, blocks);
        let block_size = self.capacity()?.block_size as usize;
        let attempts = self.options.read_write_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.transport.command(&cdb, buf.reborrow(), true) {
                Ok(bytes) => return Ok((bytes / block_size) as u32),
                Err(MassStorageError::Scsi(e))
                    if e.is_transient_not_ready() && attempt < attempts =>
                {
                    warn!(op = kind.name(), lba, attempt, error = %e, "transient failure, retrying");
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

impl<C: UsbConnection> BlockDevice for MassStorageDevice<C> {
    fn read_blocks(
        &mut self,
        lba: u64,
        destination: &mut [u8],
        count: u32,
    ) -> Result<u32, MassStorageError> {
        self.transfer_blocks(TransferKind::Read, lba, DataPhase::In(destination), count)
    }

    fn write_blocks(&mut self, lba: u64, source: &[u8], count: u32) -> Result<u32, MassStorageError> {
        self.transfer_blocks(TransferKind::Write, lba, DataPhase::Out(source), count)
    }

    fn number_of_blocks(&mut self) -> Result<u64, MassStorageError> {
        Ok(self.capacity()?.number_of_blocks())
    }

    fn block_size(&mut self) -> Result<u32, MassStorageError> {
        Ok(self.capacity()?.block_size)
    }

    fn read_only(&self) -> bool {
        !self.options.writable
    }
}

impl<C: UsbConnection> Drop for MassStorageDevice<C> {
    fn drop(&mut self) {
        self.release();
    }
}
