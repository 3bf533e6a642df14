// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use usb_msc_rs::{
    client::{device::DeviceOptions, error::ScsiError},
    loopback::target::TargetConfig,
};

use crate::integration_tests::common::{open, target, writable};

#[test]
fn stalled_get_max_lun_means_single_lun() -> Result<()> {
    let target = target(8, TargetConfig {
        max_lun: None,
        ..TargetConfig::default()
    });
    let mut dev = open(&target, writable())?;

    assert_eq!(dev.max_lun()?, 0);
    let stats = target.stats();
    assert_eq!(stats.max_lun_requests, 1);
    assert_eq!(stats.resets, 0);
    assert!(stats.cleared_stalls.is_empty());
    Ok(())
}

#[test]
fn max_lun_is_cached() -> Result<()> {
    let target = target(8, TargetConfig {
        max_lun: Some(3),
        ..TargetConfig::default()
    });
    let mut dev = open(&target, writable())?;

    assert_eq!(dev.max_lun()?, 3);
    assert_eq!(dev.max_lun()?, 3);
    assert_eq!(target.stats().max_lun_requests, 1);
    assert!(target.commands().is_empty());
    Ok(())
}

#[test]
fn commands_carry_the_configured_lun() -> Result<()> {
    let target = target(8, TargetConfig {
        max_lun: Some(1),
        ..TargetConfig::default()
    });
    let mut dev = open(&target, DeviceOptions {
        lun: 1,
        ..writable()
    })?;

    dev.test_unit_ready()?;
    assert!(target.commands().iter().all(|c| c.lun == 1));
    Ok(())
}

#[test]
fn unsupported_lun_fails_with_sense() -> Result<()> {
    let target = target(8, TargetConfig::default());
    let mut dev = open(&target, DeviceOptions {
        lun: 1,
        ..writable()
    })?;

    let err = dev.capacity().expect_err("LUN 1 does not exist");
    assert_eq!(err.scsi(), Some(&ScsiError::new(0x05, 0x25, 0x00)));
    Ok(())
}

#[test]
fn lun_above_fifteen_is_refused_before_claiming() {
    let target = target(8, TargetConfig::default());
    assert!(
        open(&target, DeviceOptions {
            lun: 16,
            ..writable()
        })
        .is_err()
    );
    assert!(!target.stats().claimed);
}
