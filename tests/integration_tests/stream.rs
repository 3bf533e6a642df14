// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use anyhow::Result;
use usb_msc_rs::{
    client::{device::DeviceOptions, stream::MassStorageStream},
    control_block::{read::READ10_OPCODE, write::WRITE10_OPCODE},
    loopback::{
        faults::{Fault, FaultRule, Stage},
        target::TargetConfig,
    },
    usb::UsbError,
};

use crate::integration_tests::common::{BLOCK, open, pattern, target, writable};

const MEDIUM: usize = 10 * BLOCK;

#[test]
fn unaligned_write_touches_only_covering_blocks() -> Result<()> {
    let target = target(10, TargetConfig::default());
    let original = pattern(MEDIUM, 0x11);
    target.fill(0, &original)?;
    let mut stream = MassStorageStream::new(open(&target, writable())?);
    assert_eq!(stream.len()?, MEDIUM as u64);
    assert!(stream.can_write());
    target.clear_log();

    let payload = pattern(1000, 0x5A);
    stream.seek(SeekFrom::Start(100))?;
    stream.write_all(&payload)?;
    assert_eq!(stream.position(), 1100);

    let mut expected = original.clone();
    expected[100..1100].copy_from_slice(&payload);
    assert_eq!(target.read_back(0, MEDIUM)?, expected);

    // Edge blocks are read-modify-write, the middle one is written whole.
    let seen: Vec<_> = target
        .commands()
        .iter()
        .filter_map(|c| c.transfer.map(|t| (c.opcode, t.lba, t.blocks)))
        .collect();
    assert_eq!(seen, vec![
        (READ10_OPCODE, 0, 1),
        (WRITE10_OPCODE, 0, 1),
        (WRITE10_OPCODE, 1, 1),
        (READ10_OPCODE, 2, 1),
        (WRITE10_OPCODE, 2, 1),
    ]);

    let mut back = vec![0u8; 1000];
    stream.seek(SeekFrom::Current(-1000))?;
    stream.read_exact(&mut back)?;
    assert_eq!(back, payload);
    Ok(())
}

#[test]
fn reads_are_clamped_to_the_medium() -> Result<()> {
    let target = target(10, TargetConfig::default());
    let original = pattern(MEDIUM, 0x22);
    target.fill(0, &original)?;
    let mut stream = MassStorageStream::new(open(&target, writable())?);

    let mut buf = vec![0u8; 1000];
    assert_eq!(stream.seek(SeekFrom::End(-100))?, MEDIUM as u64 - 100);
    assert_eq!(stream.read(&mut buf)?, 100);
    assert_eq!(&buf[..100], &original[MEDIUM - 100..]);

    assert_eq!(stream.position(), MEDIUM as u64);
    assert_eq!(stream.read(&mut buf)?, 0);

    stream.set_position(MEDIUM as u64 + 4096);
    assert_eq!(stream.read(&mut buf)?, 0);
    assert_eq!(stream.write(&buf)?, 0);

    let mut all = Vec::new();
    stream.rewind()?;
    stream.read_to_end(&mut all)?;
    assert_eq!(all, original);
    Ok(())
}

#[test]
fn invalid_seeks_are_rejected() -> Result<()> {
    let target = target(10, TargetConfig::default());
    let mut stream = MassStorageStream::new(open(&target, writable())?);

    let err = stream.seek(SeekFrom::Current(-1)).expect_err("negative position");
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(stream.position(), 0);

    assert_eq!(stream.seek(SeekFrom::End(0))?, MEDIUM as u64);
    assert_eq!(stream.seek(SeekFrom::Current(-(BLOCK as i64)))?, (MEDIUM - BLOCK) as u64);
    assert!(stream.seek(SeekFrom::End(-(MEDIUM as i64) - 1)).is_err());

    let err = stream.set_len(0).expect_err("resized a block device");
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    Ok(())
}

#[test]
fn read_only_stream_refuses_writes() -> Result<()> {
    let target = target(10, TargetConfig::default());
    let mut stream = MassStorageStream::new(open(&target, DeviceOptions::default())?);
    assert!(!stream.can_write());

    let err = stream.write(&[1, 2, 3]).expect_err("read-only stream wrote");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(target.commands().is_empty());
    Ok(())
}

#[test]
fn first_block_error_is_returned() -> Result<()> {
    let target = target(10, TargetConfig::default());
    let mut stream = MassStorageStream::new(open(&target, writable())?);
    stream.block_size()?;
    target.push_fault(FaultRule::on_opcode(
        READ10_OPCODE,
        Fault::Usb(Stage::Command, UsbError::Timeout),
    ));

    let mut buf = vec![0u8; 64];
    let err = stream.read(&mut buf).expect_err("timeout swallowed");
    assert_eq!(err.kind(), ErrorKind::TimedOut);
    assert_eq!(stream.position(), 0);
    Ok(())
}

#[test]
fn later_block_error_shortens_the_read() -> Result<()> {
    let target = target(10, TargetConfig::default());
    let original = pattern(MEDIUM, 0x33);
    target.fill(0, &original)?;
    target.push_fault(
        FaultRule::on_opcode(READ10_OPCODE, Fault::check_condition(0x03, 0x11, 0x00)).at_lba(1),
    );
    let mut stream = MassStorageStream::new(open(&target, writable())?);

    let mut buf = vec![0u8; 3 * BLOCK];
    assert_eq!(stream.read(&mut buf)?, BLOCK);
    assert_eq!(&buf[..BLOCK], &original[..BLOCK]);
    assert_eq!(stream.position(), BLOCK as u64);

    // The fault was one-shot; the rest reads fine.
    assert_eq!(stream.read(&mut buf)?, 3 * BLOCK);
    assert_eq!(buf, original[BLOCK..4 * BLOCK]);
    Ok(())
}

#[test]
fn into_inner_returns_the_device() -> Result<()> {
    let target = target(10, TargetConfig::default());
    let mut stream = MassStorageStream::new(open(&target, writable())?);
    stream.seek(SeekFrom::Start(BLOCK as u64))?;
    assert_eq!(stream.block_size()?, BLOCK as u32);
    assert!(!stream.is_empty()?);

    let dev = stream.into_inner();
    assert!(target.stats().claimed);
    assert!(dev.close());
    assert!(!target.stats().claimed);
    Ok(())
}
