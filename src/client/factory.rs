// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::debug;

use crate::{
    client::{
        device::{DeviceOptions, MassStorageDevice},
        error::{MassStorageError, SetupError},
    },
    usb::{
        UsbManager,
        descriptors::DeviceDescriptor,
        selection::{is_supported_device, parse_mass_storage_device},
    },
};

/// Opens mass-storage sessions on devices enumerated by a [`UsbManager`].
pub struct MassStorageFactory<M: UsbManager> {
    manager: M,
}

impl<M: UsbManager> MassStorageFactory<M> {
    pub fn new(manager: M) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Devices that expose a Bulk-Only SCSI interface.
    pub fn supported_devices(&self) -> Vec<DeviceDescriptor> {
        let devices: Vec<_> = self
            .manager
            .devices()
            .into_iter()
            .filter(is_supported_device)
            .collect();
        debug!(count = devices.len(), "supported mass-storage devices");
        devices
    }

    /// Open `device` and start a session on its mass-storage interface.
    pub fn create(
        &self,
        device: &DeviceDescriptor,
        options: DeviceOptions,
    ) -> Result<MassStorageDevice<M::Connection>, MassStorageError> {
        let info = parse_mass_storage_device(device).ok_or(SetupError::UnsupportedDevice)?;
        let conn = self.manager.open(device).map_err(SetupError::Open)?;
        MassStorageDevice::open(conn, info, options)
    }
}
