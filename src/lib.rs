//! This crate provides a host-side USB Mass Storage (Bulk-Only Transport)
//! SCSI initiator.
// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Handles configuration, command-line parsing, and logging.
pub mod cfg;
/// The mass-storage engine: transport, block device, stream and factory.
pub mod client;
/// Implements the SCSI commands (control blocks) the engine issues.
pub mod control_block;
/// In-process Bulk-Only target used by the CLI and the test-suite.
pub mod loopback;
/// Defines the BOT envelopes and sense data.
pub mod models;
/// Contains the state machine driving one Bulk-Only transaction.
pub mod state_machine;
/// USB connection traits, descriptors and device selection.
pub mod usb;
/// Provides utility functions used throughout the crate.
pub mod utils;
