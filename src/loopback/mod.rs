// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! In-process USB mass-storage device.
//!
//! A [`LoopbackTarget`] emulates a Bulk-Only SCSI disk over a
//! [`BackingStore`]; [`LoopbackConnection`] and [`LoopbackManager`] plug it
//! into the engine through the [`UsbConnection`] / [`UsbManager`] traits.
//! Faults queued with [`LoopbackTarget::push_fault`] make the device
//! misbehave in controlled ways.

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tracing::debug;

use crate::{
    client::transport::{
        BULK_ONLY_RESET_REQUEST, BULK_ONLY_RESET_REQUEST_TYPE, GET_MAX_LUN_REQUEST,
        GET_MAX_LUN_REQUEST_TYPE,
    },
    loopback::{
        disk::{BackingStore, MemoryDisk},
        faults::FaultRule,
        target::{CommandRecord, TargetConfig, TargetState, TargetStats},
    },
    usb::{
        ControlSetup, UsbConnection, UsbError, UsbManager,
        descriptors::{
            ConfigurationDescriptor, DeviceDescriptor, EndpointDescriptor, InterfaceDescriptor,
            UsbClass,
        },
        selection::{DEFAULT_CONFIGURATION_ID, PROTOCOL_BULK_ONLY, SUBCLASS_SCSI_TRANSPARENT},
    },
};

/// Memory and file backing stores.
pub mod disk;
/// Injectable misbehaviours.
pub mod faults;
/// Bulk-Only and SCSI command handling.
pub mod target;

pub const LOOPBACK_BULK_IN: u8 = 0x81;
pub const LOOPBACK_BULK_OUT: u8 = 0x02;
pub const LOOPBACK_INTERFACE: u8 = 0;
pub const LOOPBACK_VENDOR_ID: u16 = 0x1d6b;
pub const LOOPBACK_PRODUCT_ID: u16 = 0x0104;

/// Descriptor tree of a single-interface Bulk-Only disk.
pub fn mass_storage_descriptor(serial_number: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        class: UsbClass::Unspecified,
        sub_class: 0,
        protocol: 0,
        vendor_id: LOOPBACK_VENDOR_ID,
        product_id: LOOPBACK_PRODUCT_ID,
        manufacturer: "usb-msc-rs".into(),
        product_name: "Loopback Mass Storage".into(),
        serial_number: serial_number.into(),
        configurations: vec![ConfigurationDescriptor {
            id: DEFAULT_CONFIGURATION_ID,
            max_power: 50,
            name: String::new(),
            remote_wakeup: false,
            self_powered: true,
            interfaces: vec![InterfaceDescriptor {
                number: LOOPBACK_INTERFACE,
                alternate_setting: 0,
                class: UsbClass::MassStorage,
                sub_class: SUBCLASS_SCSI_TRANSPARENT,
                protocol: PROTOCOL_BULK_ONLY,
                name: "Bulk-Only".into(),
                endpoints: vec![
                    EndpointDescriptor::bulk(LOOPBACK_BULK_IN, 512),
                    EndpointDescriptor::bulk(LOOPBACK_BULK_OUT, 512),
                ],
            }],
        }],
    }
}

/// Shared handle to an emulated device. Clones refer to the same device.
#[derive(Clone)]
pub struct LoopbackTarget {
    state: Arc<Mutex<TargetState>>,
}

impl LoopbackTarget {
    pub fn new(store: impl BackingStore + 'static, config: TargetConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(TargetState::new(Box::new(store), config))),
        }
    }

    /// RAM disk of `blocks` blocks of `config.block_size` bytes.
    pub fn memory(blocks: u64, config: TargetConfig) -> Self {
        let size = blocks.saturating_mul(config.block_size as u64) as usize;
        Self::new(MemoryDisk::new(size), config)
    }

    fn lock(&self) -> MutexGuard<'_, TargetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connect(&self) -> LoopbackConnection {
        LoopbackConnection {
            target: self.clone(),
        }
    }

    pub fn config(&self) -> TargetConfig {
        self.lock().config.clone()
    }

    /// Change device properties in place (capacity sentinel, caps, ...).
    pub fn configure(&self, f: impl FnOnce(&mut TargetConfig)) {
        f(&mut self.lock().config);
    }

    pub fn push_fault(&self, rule: FaultRule) {
        debug!(?rule, "fault queued");
        self.lock().faults.push(rule);
    }

    pub fn pending_faults(&self) -> usize {
        self.lock().faults.len()
    }

    /// The CBWs still held in the command log, oldest first.
    pub fn commands(&self) -> Vec<CommandRecord> {
        self.lock().log.iter().cloned().collect()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    pub fn stats(&self) -> TargetStats {
        self.lock().stats.clone()
    }

    /// Medium contents, bypassing the USB path.
    pub fn read_back(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.lock().store_mut().read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Overwrite medium contents, bypassing the USB path.
    pub fn fill(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.lock().store_mut().write_at(offset, data)
    }
}

/// Host side of a [`LoopbackTarget`].
pub struct LoopbackConnection {
    target: LoopbackTarget,
}

impl LoopbackConnection {
    pub fn target(&self) -> &LoopbackTarget {
        &self.target
    }

    fn check_cap(&self, len: usize) -> Result<(), UsbError> {
        let cap = self.bulk_transfer_cap();
        if cap != 0 && len > cap {
            return Err(UsbError::Transport(format!(
                "bulk transfer of {len} bytes exceeds the {cap} byte limit"
            )));
        }
        Ok(())
    }
}

impl UsbConnection for LoopbackConnection {
    fn set_configuration(&mut self, configuration: u8) -> bool {
        let ok = configuration == DEFAULT_CONFIGURATION_ID;
        if ok {
            self.target.lock().stats.configuration = Some(configuration);
        }
        ok
    }

    fn claim_interface(&mut self, interface: u8, _force: bool) -> bool {
        let mut state = self.target.lock();
        if interface != LOOPBACK_INTERFACE || state.config.refuse_claim {
            return false;
        }
        state.stats.claimed = true;
        true
    }

    fn release_interface(&mut self, interface: u8) -> bool {
        let mut state = self.target.lock();
        let was_claimed = interface == LOOPBACK_INTERFACE && state.stats.claimed;
        state.stats.claimed = false;
        was_claimed
    }

    fn set_interface(&mut self, interface: u8, alternate_setting: u8) -> bool {
        interface == LOOPBACK_INTERFACE && alternate_setting == 0
    }

    fn clear_stall(&mut self, endpoint: u8) -> bool {
        match endpoint {
            LOOPBACK_BULK_IN | LOOPBACK_BULK_OUT => {
                self.target
                    .lock()
                    .clear_halt(endpoint, endpoint == LOOPBACK_BULK_IN);
                true
            },
            _ => false,
        }
    }

    fn bulk_transfer_cap(&self) -> usize {
        self.target.lock().config.bulk_transfer_cap
    }

    fn bulk_in(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        if endpoint != LOOPBACK_BULK_IN {
            return Err(UsbError::Transport(format!("no IN endpoint {endpoint:#04x}")));
        }
        self.check_cap(buf.len())?;
        self.target.lock().bulk_in(buf)
    }

    fn bulk_out(&mut self, endpoint: u8, buf: &[u8], _timeout: Duration) -> Result<usize, UsbError> {
        if endpoint != LOOPBACK_BULK_OUT {
            return Err(UsbError::Transport(format!("no OUT endpoint {endpoint:#04x}")));
        }
        self.check_cap(buf.len())?;
        self.target.lock().bulk_out(buf)
    }

    fn control_in(
        &mut self,
        setup: ControlSetup,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        match (setup.request_type, setup.request) {
            (GET_MAX_LUN_REQUEST_TYPE, GET_MAX_LUN_REQUEST) => {
                match self.target.lock().max_lun() {
                    Some(lun) if !buf.is_empty() => {
                        buf[0] = lun;
                        Ok(1)
                    },
                    _ => Err(UsbError::Stall),
                }
            },
            _ => Err(UsbError::Stall),
        }
    }

    fn control_out(
        &mut self,
        setup: ControlSetup,
        _buf: &[u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        match (setup.request_type, setup.request) {
            (BULK_ONLY_RESET_REQUEST_TYPE, BULK_ONLY_RESET_REQUEST) => {
                self.target.lock().reset();
                Ok(0)
            },
            _ => Err(UsbError::Stall),
        }
    }
}

/// A bus of loopback devices.
#[derive(Default, Clone)]
pub struct LoopbackManager {
    devices: Vec<(DeviceDescriptor, LoopbackTarget)>,
}

impl LoopbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug `target` in under `descriptor`.
    pub fn attach(&mut self, descriptor: DeviceDescriptor, target: LoopbackTarget) {
        self.devices.push((descriptor, target));
    }

    pub fn with_device(mut self, descriptor: DeviceDescriptor, target: LoopbackTarget) -> Self {
        self.attach(descriptor, target);
        self
    }
}

impl UsbManager for LoopbackManager {
    type Connection = LoopbackConnection;

    fn devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.iter().map(|(d, _)| d.clone()).collect()
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<Self::Connection, UsbError> {
        self.devices
            .iter()
            .find(|(d, _)| d == device)
            .map(|(_, target)| target.connect())
            .ok_or_else(|| {
                UsbError::Transport(format!("device {} is not attached", device.id_string()))
            })
    }
}
