// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::YesNo,
    client::device::{DEFAULT_READ_WRITE_ATTEMPTS, DeviceOptions},
    models::cbw::MAX_LUN,
};

const MIN_BLOCK_SIZE: u32 = 512;
const MAX_BLOCK_SIZE: u32 = 4096;
const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Session settings handed to the mass-storage engine.
    pub device: DeviceConfig,
    /// Settings of the loopback target and the CLI that drives it.
    pub runtime: RuntimeConfig,
}

/// Per-session engine settings.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DeviceConfig {
    #[serde(rename = "Writable")]
    /// Whether writes are allowed at all.
    pub writable: YesNo,

    #[serde(default, rename = "Lun")]
    /// Logical unit addressed by every CBW (0..=15).
    pub lun: u8,

    #[serde(rename = "TimeoutMs", with = "serde_millis")]
    /// Timeout of every control and bulk transfer.
    pub timeout: Duration,

    #[serde(default = "default_attempts", rename = "ReadWriteAttempts")]
    /// Total attempts for a read/write hitting a transient not-ready
    /// condition.
    pub read_write_attempts: u32,
}

fn default_attempts() -> u32 {
    DEFAULT_READ_WRITE_ATTEMPTS
}

#[derive(Deserialize, Serialize, Debug, Clone)]
/// Runtime-only settings of the loopback target and CLI.
pub struct RuntimeConfig {
    #[serde(rename = "Image")]
    /// Backing file of the loopback disk.
    pub image: PathBuf,

    #[serde(rename = "BlockSize")]
    /// Logical block length the loopback disk reports.
    pub block_size: u32,

    #[serde(default, rename = "BulkTransferCap")]
    /// Largest single bulk transfer in bytes; 0 is unbounded.
    pub bulk_transfer_cap: usize,

    #[serde(default = "default_chunk_size", rename = "ChunkSize")]
    /// Copy granularity of `dump` and `write`.
    pub chunk_size: u64,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(self.device.lun <= MAX_LUN, "Lun must be in 0..={MAX_LUN}");
        ensure!(!self.device.timeout.is_zero(), "TimeoutMs must be > 0");
        ensure!(
            self.device.read_write_attempts >= 1,
            "ReadWriteAttempts must be >= 1"
        );

        let bs = self.runtime.block_size;
        ensure!(
            bs.is_power_of_two() && (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&bs),
            "BlockSize must be a power of two in {MIN_BLOCK_SIZE}..={MAX_BLOCK_SIZE}"
        );
        ensure!(
            self.runtime.bulk_transfer_cap == 0 || self.runtime.bulk_transfer_cap >= bs as usize,
            "BulkTransferCap must be 0 or hold at least one block"
        );
        ensure!(
            !self.runtime.image.as_os_str().is_empty(),
            "Image must not be empty"
        );

        // Copy chunks are whole blocks.
        let bs = bs as u64;
        self.runtime.chunk_size = self.runtime.chunk_size.max(1).div_ceil(bs) * bs;

        Ok(())
    }
}

impl From<&DeviceConfig> for DeviceOptions {
    fn from(cfg: &DeviceConfig) -> Self {
        DeviceOptions {
            writable: cfg.writable.as_bool(),
            lun: cfg.lun,
            timeout: cfg.timeout,
            read_write_attempts: cfg.read_write_attempts,
        }
    }
}

mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where D: Deserializer<'de> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
