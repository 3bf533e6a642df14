// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fs;

use anyhow::Result;
use hex::FromHex;
use usb_msc_rs::{
    client::error::ScsiError,
    models::{
        common::{WireError, WireFormat},
        sense_data::{
            FIXED_MIN_LEN, FIXED_SENSE_LEN, FixedSenseData, RESPONSE_CODE_CURRENT, SenseData,
            SenseFlags, asc_ascq_to_str, sense_key_to_str,
        },
    },
};

fn load_fixture(path: &str) -> Result<Vec<u8>> {
    let s = fs::read_to_string(path)?;
    let cleaned = s.trim().replace(|c: char| c.is_whitespace(), "");
    Ok(Vec::from_hex(&cleaned)?)
}

#[test]
fn test_sense_fixture_parse() -> Result<()> {
    let raw = load_fixture("tests/unit_tests/fixtures/sense_becoming_ready.hex")?;
    assert_eq!(raw.len(), FIXED_MIN_LEN);

    let sense = SenseData::parse(&raw)?;
    assert_eq!(sense.response_code, RESPONSE_CODE_CURRENT);
    assert_eq!(sense.sense_key, 0x02);
    assert_eq!(sense.asc, 0x04);
    assert_eq!(sense.ascq, 0x01);
    assert_eq!(sense.flags, SenseFlags::empty());
    assert_eq!(
        asc_ascq_to_str(sense.asc, sense.ascq),
        "Logical unit is in process of becoming ready"
    );
    Ok(())
}

#[test]
fn test_sense_short_buffer_rejected() {
    let err = SenseData::parse(&[0x70; 17]).expect_err("17 bytes is not fixed sense");
    assert_eq!(err, WireError::Truncated {
        what: "sense data",
        need: FIXED_MIN_LEN,
        got: 17,
    });
}

#[test]
fn test_fixed_sense_builder() -> Result<()> {
    let built = FixedSenseData::new(0x07, 0x27, 0x00);
    let raw = built.to_bytes();
    assert_eq!(raw.len(), FIXED_SENSE_LEN);
    assert_eq!(raw[0], 0x70);
    assert_eq!(raw[2], 0x07);
    assert_eq!(raw[7], 10);
    assert_eq!((raw[12], raw[13]), (0x27, 0x00));
    assert!(built.additional_bytes().is_empty());

    let parsed = SenseData::parse(&raw[..FIXED_MIN_LEN])?;
    assert_eq!(parsed, SenseData::from(&built));
    assert!(!parsed.valid);
    Ok(())
}

#[test]
fn test_sense_descriptions() {
    assert_eq!(sense_key_to_str(0x05), "ILLEGAL REQUEST");
    assert_eq!(sense_key_to_str(0x0B), "ABORTED COMMAND");
    assert_eq!(sense_key_to_str(0x0C), "RESERVED");
    assert_eq!(asc_ascq_to_str(0x21, 0x00), "Logical block address out of range");
    assert_eq!(asc_ascq_to_str(0x80, 0x42), "UNSPECIFIED / vendor specific");
}

#[test]
fn test_scsi_error_display_and_retry_predicate() {
    let err = ScsiError::new(0x07, 0x27, 0x00);
    assert_eq!(
        err.to_string(),
        "SCSI sense 07 27 00 (DATA PROTECT: Write protected)"
    );
    assert!(!err.is_transient_not_ready());

    assert!(ScsiError::new(0x0B, 0x04, 0x01).is_transient_not_ready());
    assert!(ScsiError::new(0x0B, 0x04, 0x7F).is_transient_not_ready());
    // NOT READY itself is a different sense key.
    assert!(!ScsiError::new(0x02, 0x04, 0x01).is_transient_not_ready());
    assert!(!ScsiError::new(0x0B, 0x47, 0x00).is_transient_not_ready());
}

#[test]
fn test_scsi_error_from_sense() -> Result<()> {
    let sense = SenseData::parse(FixedSenseData::new(0x03, 0x11, 0x00).to_bytes())?;
    assert_eq!(ScsiError::from(&sense), ScsiError::new(0x03, 0x11, 0x00));
    Ok(())
}
