//! This module defines the Bulk-Only Transport envelopes and SCSI sense data.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Defines the Command Block Wrapper sent before every command.
pub mod cbw;
/// Defines common error types and the wire-format trait.
pub mod common;
/// Defines the Command Status Wrapper that closes every command.
pub mod csw;
/// Defines fixed-format sense data and the ASC/ASCQ description table.
pub mod sense_data;
