// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The USB surface the mass-storage engine consumes.
//!
//! The raw transport (enumeration, transfer execution, claiming) lives behind
//! [`UsbConnection`] and [`UsbManager`]; the in-process loopback target in
//! [`crate::loopback`] is one implementation.

use std::time::Duration;

use thiserror::Error;

use crate::usb::descriptors::DeviceDescriptor;

/// USB descriptors and class codes.
pub mod descriptors;
/// Mass-storage interface and endpoint selection.
pub mod selection;

/// Failure of a single USB transfer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsbError {
    #[error("endpoint stalled")]
    Stall,
    #[error("transfer timed out")]
    Timeout,
    #[error("USB transport error: {0}")]
    Transport(String),
}

/// Setup packet of a control transfer on endpoint zero; `wLength` is the
/// length of the buffer handed along with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

/// An open connection to one USB device.
///
/// Endpoints are addressed by `bEndpointAddress` (direction bit included).
/// Every transfer is blocking and bounded by `timeout`.
pub trait UsbConnection: Send {
    fn set_configuration(&mut self, configuration: u8) -> bool;
    fn claim_interface(&mut self, interface: u8, force: bool) -> bool;
    fn release_interface(&mut self, interface: u8) -> bool;
    fn set_interface(&mut self, interface: u8, alternate_setting: u8) -> bool;
    fn clear_stall(&mut self, endpoint: u8) -> bool;

    /// Largest buffer a single bulk transfer accepts; 0 means unbounded.
    fn bulk_transfer_cap(&self) -> usize;

    /// Receive into `buf`; returns the number of bytes received.
    fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration)
    -> Result<usize, UsbError>;

    /// Send `buf`; returns the number of bytes sent.
    fn bulk_out(&mut self, endpoint: u8, buf: &[u8], timeout: Duration) -> Result<usize, UsbError>;

    fn control_in(
        &mut self,
        setup: ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;

    fn control_out(
        &mut self,
        setup: ControlSetup,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;
}

/// Enumerates devices and opens connections to them.
pub trait UsbManager {
    type Connection: UsbConnection;

    fn devices(&self) -> Vec<DeviceDescriptor>;
    fn open(&self, device: &DeviceDescriptor) -> Result<Self::Connection, UsbError>;
}
