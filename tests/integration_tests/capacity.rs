// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use usb_msc_rs::{
    client::{
        device::BlockDevice,
        error::{MassStorageError, ScsiError},
    },
    control_block::{
        inquiry::INQUIRY_OPCODE,
        read_capacity::{READ_CAPACITY10_OPCODE, SERVICE_ACTION_IN16_OPCODE},
        test_unit_ready::TEST_UNIT_READY_OPCODE,
    },
    loopback::{
        faults::{Fault, FaultRule},
        target::TargetConfig,
    },
};

use crate::integration_tests::common::{open, opcodes, target, writable};

#[test]
fn read_capacity10_is_enough_for_small_media() -> Result<()> {
    let target = target(100, TargetConfig::default());
    let mut dev = open(&target, writable())?;

    let capacity = dev.capacity()?;
    assert_eq!(capacity.last_lba, 99);
    assert_eq!(capacity.block_size, 512);
    assert_eq!(dev.number_of_blocks()?, 100);
    assert_eq!(dev.block_size()?, 512);
    assert_eq!(capacity.total_bytes(), 100 * 512);

    // Probed once, then cached.
    assert_eq!(opcodes(&target), vec![READ_CAPACITY10_OPCODE]);
    Ok(())
}

#[test]
fn sentinel_falls_back_to_read_capacity16() -> Result<()> {
    let target = target(64, TargetConfig {
        block_size: 4096,
        capacity_sentinel: true,
        ..TargetConfig::default()
    });
    let mut dev = open(&target, writable())?;

    let capacity = dev.capacity()?;
    assert_eq!(capacity.last_lba, 63);
    assert_eq!(capacity.block_size, 4096);
    assert_eq!(opcodes(&target), vec![
        READ_CAPACITY10_OPCODE,
        SERVICE_ACTION_IN16_OPCODE
    ]);
    Ok(())
}

#[test]
fn zero_block_size_is_rejected() -> Result<()> {
    let target = target(16, TargetConfig {
        block_size: 0,
        ..TargetConfig::default()
    });
    let mut dev = open(&target, writable())?;

    let err = dev.capacity().expect_err("block size 0 accepted");
    assert!(matches!(err, MassStorageError::InvalidBlockSize(0)), "{err}");
    // Nothing is cached, the next call probes again.
    assert!(dev.capacity().is_err());
    assert_eq!(opcodes(&target).len(), 2);
    Ok(())
}

#[test]
fn inquiry_reports_identity() -> Result<()> {
    let target = target(8, TargetConfig {
        vendor: "ACME".into(),
        product: "Pocket Drive".into(),
        revision: "2.10".into(),
        ..TargetConfig::default()
    });
    let mut dev = open(&target, writable())?;

    let identity = dev.inquiry()?;
    assert_eq!(identity.vendor, "ACME");
    assert_eq!(identity.product, "Pocket Drive");
    assert_eq!(identity.revision, "2.10");
    assert!(identity.removable);
    assert_eq!(opcodes(&target), vec![INQUIRY_OPCODE]);
    Ok(())
}

#[test]
fn test_unit_ready_reports_sense() -> Result<()> {
    let target = target(8, TargetConfig::default());
    let mut dev = open(&target, writable())?;

    dev.test_unit_ready()?;

    target.push_fault(FaultRule::on_opcode(TEST_UNIT_READY_OPCODE, Fault::not_ready()));
    let err = dev.test_unit_ready().expect_err("NOT READY ignored");
    assert_eq!(err.scsi(), Some(&ScsiError::new(0x02, 0x04, 0x00)));

    // The sense was consumed by REQUEST SENSE.
    dev.test_unit_ready()?;
    assert_eq!(target.stats().resets, 0);
    Ok(())
}

#[test]
fn command_log_keeps_only_the_newest_commands() -> Result<()> {
    let bounded = target(8, TargetConfig {
        command_log_limit: 3,
        ..TargetConfig::default()
    });
    let mut dev = open(&bounded, writable())?;
    dev.capacity()?;
    for _ in 0..4 {
        dev.test_unit_ready()?;
    }
    assert_eq!(opcodes(&bounded), vec![TEST_UNIT_READY_OPCODE; 3]);

    let silent = target(8, TargetConfig {
        command_log_limit: 0,
        ..TargetConfig::default()
    });
    let mut dev = open(&silent, writable())?;
    dev.test_unit_ready()?;
    assert!(silent.commands().is_empty());
    Ok(())
}
