// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use usb_msc_rs::{
    client::{
        device::{BlockDevice, DeviceOptions},
        error::ScsiError,
    },
    control_block::{read::READ10_OPCODE, write::WRITE10_OPCODE},
    loopback::{
        faults::{Fault, FaultRule},
        target::TargetConfig,
    },
};

use crate::integration_tests::common::{BLOCK, open, pattern, target, transfer_blocks, writable};

fn becoming_ready(opcode: u8) -> FaultRule {
    FaultRule::on_opcode(opcode, Fault::check_condition(0x0B, 0x04, 0x01))
}

#[test]
fn transient_not_ready_is_retried() -> Result<()> {
    let target = target(16, TargetConfig::default());
    let data = pattern(2 * BLOCK, 9);
    target.fill(4 * BLOCK as u64, &data)?;
    for _ in 0..4 {
        target.push_fault(becoming_ready(READ10_OPCODE));
    }
    let mut dev = open(&target, writable())?;

    let mut buf = vec![0u8; 2 * BLOCK];
    assert_eq!(dev.read_blocks(4, &mut buf, 2)?, 2);
    assert_eq!(buf, data);
    assert_eq!(transfer_blocks(&target), vec![(4, 2); 5]);
    assert_eq!(target.pending_faults(), 0);
    Ok(())
}

#[test]
fn retries_give_up_after_five_attempts() -> Result<()> {
    let target = target(16, TargetConfig::default());
    for _ in 0..5 {
        target.push_fault(becoming_ready(READ10_OPCODE));
    }
    let mut dev = open(&target, writable())?;

    let mut buf = vec![0u8; BLOCK];
    let err = dev.read_blocks(0, &mut buf, 1).expect_err("retries never end");
    assert_eq!(err.scsi(), Some(&ScsiError::new(0x0B, 0x04, 0x01)));
    assert_eq!(transfer_blocks(&target).len(), 5);
    Ok(())
}

#[test]
fn not_ready_sense_key_is_not_retried() -> Result<()> {
    let target = target(16, TargetConfig::default());
    target.push_fault(FaultRule::on_opcode(
        READ10_OPCODE,
        Fault::check_condition(0x02, 0x04, 0x01),
    ));
    let mut dev = open(&target, writable())?;

    let mut buf = vec![0u8; BLOCK];
    let err = dev.read_blocks(0, &mut buf, 1).expect_err("NOT READY ignored");
    assert_eq!(err.scsi(), Some(&ScsiError::new(0x02, 0x04, 0x01)));
    assert_eq!(transfer_blocks(&target).len(), 1);
    Ok(())
}

#[test]
fn attempt_count_follows_the_options() -> Result<()> {
    let target = target(16, TargetConfig::default());
    for _ in 0..3 {
        target.push_fault(becoming_ready(WRITE10_OPCODE));
    }
    let mut dev = open(&target, DeviceOptions {
        read_write_attempts: 2,
        ..writable()
    })?;

    let err = dev
        .write_blocks(0, &[0xEE; BLOCK], 1)
        .expect_err("third attempt should not happen");
    assert!(err.scsi().is_some_and(ScsiError::is_transient_not_ready));
    assert_eq!(transfer_blocks(&target).len(), 2);
    assert_eq!(target.pending_faults(), 1);

    assert_eq!(dev.write_blocks(0, &[0xEE; BLOCK], 1)?, 1);
    assert_eq!(target.read_back(0, BLOCK)?, vec![0xEE; BLOCK]);
    Ok(())
}
