// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}

/// Parse a byte count with an optional binary suffix (`K`, `M`, `G`).
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let (digits, shift) = match s.char_indices().last() {
        Some((at, 'k' | 'K')) => (&s[..at], 10),
        Some((at, 'm' | 'M')) => (&s[..at], 20),
        Some((at, 'g' | 'G')) => (&s[..at], 30),
        _ => (s, 0),
    };
    let value: u64 = match digits.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse(),
    }
    .with_context(|| format!("invalid size {s:?}"))?;
    match value.checked_mul(1 << shift) {
        Some(bytes) => Ok(bytes),
        None => bail!("size {s:?} overflows 64 bits"),
    }
}

/// Drive a loopback USB mass-storage disk through the Bulk-Only engine.
#[derive(Parser, Debug)]
#[command(name = "usb-msc", version, about)]
pub struct Cli {
    /// Engine and loopback settings.
    #[arg(short, long, default_value = "tests/config.yaml")]
    pub config: String,

    /// Logger settings (`logger` section).
    #[arg(short, long, default_value = "tests/config_logger.yaml")]
    pub logger: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create (or truncate) the configured image as a zero-filled medium.
    Create {
        /// Medium size in bytes; rounded down to whole blocks.
        #[arg(value_parser = parse_size_arg)]
        size: u64,
    },
    /// Print capacity, block size, max LUN and INQUIRY identity.
    Info,
    /// Copy the medium, or a byte range of it, into a file.
    Dump {
        /// Destination file.
        output: PathBuf,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Hex dump a byte range.
    Read {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Copy a file onto the medium.
    Write {
        /// Source file.
        input: PathBuf,
        /// Byte offset on the medium.
        #[arg(short, long, default_value = "0", value_parser = parse_size_arg)]
        offset: u64,
    },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct RangeArgs {
    /// First byte.
    #[arg(short, long, default_value = "0", value_parser = parse_size_arg)]
    pub offset: u64,
    /// Number of bytes; defaults to the rest of the medium.
    #[arg(short = 'n', long, value_parser = parse_size_arg)]
    pub length: Option<u64>,
}

impl RangeArgs {
    /// Exclusive end of the range on a medium of `len` bytes.
    pub fn end(&self, len: u64) -> u64 {
        match self.length {
            Some(n) => self.offset.saturating_add(n).min(len),
            None => len,
        }
    }
}

fn parse_size_arg(s: &str) -> Result<u64, String> {
    parse_size(s).map_err(|e| format!("{e:#}"))
}
