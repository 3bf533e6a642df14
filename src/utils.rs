// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt::Write;

/// Produces `dCBWTag` values: distinct per transaction, wrapping at
/// `u32::MAX`, starting from a random seed so tags differ across sessions.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    next: u32,
}

impl TagGenerator {
    pub fn new() -> Self {
        Self::starting_at(rand::random::<u32>())
    }

    pub fn starting_at(seed: u32) -> Self {
        Self { next: seed }
    }

    pub fn next_tag(&mut self) -> u32 {
        let tag = self.next;
        self.next = self.next.wrapping_add(1);
        tag
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Render `data` as a classic 16-bytes-per-line hex dump starting at `base`.
pub fn hex_dump(base: u64, data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4);
    for (i, line) in data.chunks(16).enumerate() {
        let ascii: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let hex = line
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "{:012x}  {:<47}  |{}|", base + (i * 16) as u64, hex, ascii);
    }
    out
}
