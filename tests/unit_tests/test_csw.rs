// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fs;

use anyhow::Result;
use hex::FromHex;
use hex_literal::hex;
use usb_msc_rs::{
    control_block::test_unit_ready::build_test_unit_ready,
    models::{
        cbw::{CommandBlockWrapper, DataDirection},
        common::{WireError, WireFormat},
        csw::{CSW_LEN, CSW_SIGNATURE, CommandStatus, CommandStatusWrapper},
    },
};

fn load_fixture(path: &str) -> Result<Vec<u8>> {
    let s = fs::read_to_string(path)?;
    let cleaned = s.trim().replace(|c: char| c.is_whitespace(), "");
    Ok(Vec::from_hex(&cleaned)?)
}

fn cbw(tag: u32, length: u32) -> CommandBlockWrapper {
    CommandBlockWrapper::new(tag, length, DataDirection::In, 0, &build_test_unit_ready(0))
        .expect("valid CBW")
}

#[test]
fn test_csw_passed_matches_fixture() -> Result<()> {
    let expected = load_fixture("tests/unit_tests/fixtures/csw_passed.hex")?;
    let csw = CommandStatusWrapper::new(0x1234_5678, 0, CommandStatus::Passed);
    assert_eq!(csw.to_bytes(), &expected[..]);
    assert_eq!(csw.to_bytes().len(), CSW_LEN);

    let decoded = CommandStatusWrapper::decode(&expected)?;
    assert_eq!(decoded.signature(), CSW_SIGNATURE);
    assert_eq!(decoded.status(), CommandStatus::Passed);
    assert!(decoded.is_valid(0x1234_5678));
    assert!(!decoded.is_valid(0x1234_5679));
    Ok(())
}

#[test]
fn test_csw_status_codes() -> Result<()> {
    let failed = CommandStatusWrapper::decode(&hex!("55534253 01000000 00020000 01"))?;
    assert_eq!(failed.status(), CommandStatus::Failed);
    assert_eq!(failed.data_residue(), 512);

    let phase = CommandStatusWrapper::decode(&hex!("55534253 01000000 00000000 02"))?;
    assert_eq!(phase.status(), CommandStatus::PhaseError);

    let reserved = CommandStatusWrapper::decode(&hex!("55534253 01000000 00000000 07"))?;
    assert_eq!(reserved.status(), CommandStatus::Reserved(7));
    Ok(())
}

#[test]
fn test_csw_bad_signature_is_invalid() -> Result<()> {
    let csw = CommandStatusWrapper::decode(&hex!("55534243 01000000 00000000 00"))?;
    assert!(!csw.is_valid(1));
    Ok(())
}

#[test]
fn test_csw_meaningful_rules() -> Result<()> {
    let request = cbw(9, 512);

    assert!(CommandStatusWrapper::new(9, 512, CommandStatus::Passed).is_meaningful(&request));
    assert!(CommandStatusWrapper::new(9, 0, CommandStatus::Failed).is_meaningful(&request));
    assert!(!CommandStatusWrapper::new(9, 513, CommandStatus::Passed).is_meaningful(&request));
    assert!(!CommandStatusWrapper::new(9, 1024, CommandStatus::Failed).is_meaningful(&request));
    assert!(
        CommandStatusWrapper::new(9, 4096, CommandStatus::PhaseError).is_meaningful(&request)
    );
    assert!(
        !CommandStatusWrapper::new(9, 0, CommandStatus::Reserved(3)).is_meaningful(&request)
    );
    Ok(())
}

#[test]
fn test_csw_truncated_decode_fails() {
    let err = CommandStatusWrapper::decode(&hex!("55534253 01000000 00000000")).unwrap_err();
    assert_eq!(err, WireError::Truncated {
        what: "CSW",
        need: CSW_LEN,
        got: 12,
    });
}
