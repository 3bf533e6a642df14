//! This module contains the Bulk-Only transaction state machine.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// States and driver of a single CBW / data / CSW exchange.
pub mod bot_states;
/// Common structures and traits for state machines.
pub mod common;
