// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod common;
pub mod inquiry;
pub mod read;
pub mod read_capacity;
pub mod request_sense;
pub mod test_unit_ready;
pub mod write;
