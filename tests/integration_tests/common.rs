// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use tracing_appender::non_blocking::WorkerGuard;
use usb_msc_rs::{
    cfg::logger::init_logger,
    client::device::{DeviceOptions, MassStorageDevice},
    loopback::{LoopbackConnection, LoopbackTarget, mass_storage_descriptor, target::TargetConfig},
    usb::selection::parse_mass_storage_device,
};

pub const BLOCK: usize = 512;

static LOGGER: Lazy<Option<WorkerGuard>> =
    Lazy::new(|| init_logger("tests/config_logger.yaml").ok());

/// Install the shared test logger once per test binary.
pub fn init_test_logger() {
    Lazy::force(&LOGGER);
}

/// RAM-backed target of `blocks` blocks.
pub fn target(blocks: u64, config: TargetConfig) -> LoopbackTarget {
    init_test_logger();
    LoopbackTarget::memory(blocks, config)
}

pub fn writable() -> DeviceOptions {
    DeviceOptions {
        writable: true,
        ..DeviceOptions::default()
    }
}

/// Open a session the way the factory would, without a manager.
pub fn open(
    target: &LoopbackTarget,
    options: DeviceOptions,
) -> Result<MassStorageDevice<LoopbackConnection>> {
    let info = parse_mass_storage_device(&mass_storage_descriptor("TEST"))
        .context("loopback descriptor not recognised")?;
    Ok(MassStorageDevice::open(target.connect(), info, options)?)
}

/// Bytes that differ per block and per offset, so misplaced blocks show.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i / BLOCK) as u8 ^ (i as u8).wrapping_mul(31) ^ seed)
        .collect()
}

/// Opcodes of every CBW the target has seen.
pub fn opcodes(target: &LoopbackTarget) -> Vec<u8> {
    target.commands().iter().map(|c| c.opcode).collect()
}

/// Block counts of every READ/WRITE the target has seen.
pub fn transfer_blocks(target: &LoopbackTarget) -> Vec<(u64, u32)> {
    target
        .commands()
        .iter()
        .filter_map(|c| c.transfer)
        .map(|t| (t.lba, t.blocks))
        .collect()
}
