//! This module implements the mass-storage engine on top of a USB connection.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Block device over Bulk-Only Transport: capacity, chunking and retries.
pub mod device;
/// Error types surfaced by the engine.
pub mod error;
/// Device discovery and session creation.
pub mod factory;
/// Byte-stream adapter over a block device.
pub mod stream;
/// Transaction execution, reset-recovery and class requests.
pub mod transport;
