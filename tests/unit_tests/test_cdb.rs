// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use hex_literal::hex;
use usb_msc_rs::{
    control_block::{
        common::{BlockTransferCdb, CdbWidth, TransferKind},
        inquiry::build_inquiry_standard,
        read::{build_read10, build_read16},
        read_capacity::{
            CapacityData, ProtectionFlags, ReadCapacity10Data, ReadCapacity16Data,
            build_read_capacity10, build_read_capacity16,
        },
        request_sense::build_request_sense_simple,
        test_unit_ready::build_test_unit_ready,
        write::{build_write10, build_write16},
    },
    models::common::WireFormat,
};

#[test]
fn test_read10_write10_layout() {
    let read = build_read10(0x0102_0304, 0x0506, 0, 0);
    assert_eq!(read.as_slice(), &hex!("28 00 01020304 00 0506 00"));

    let write = build_write10(0x0102_0304, 0x0506, 0, 0);
    assert_eq!(write.as_slice(), &hex!("2A 00 01020304 00 0506 00"));
}

#[test]
fn test_read16_write16_layout() {
    let read = build_read16(0x0102_0304_0506_0708, 0x0A0B_0C0D, 0, 0);
    assert_eq!(
        read.as_slice(),
        &hex!("88 00 0102030405060708 0A0B0C0D 00 00")
    );

    let write = build_write16(0x0102_0304_0506_0708, 0x0A0B_0C0D, 0, 0);
    assert_eq!(
        write.as_slice(),
        &hex!("8A 00 0102030405060708 0A0B0C0D 00 00")
    );
}

#[test]
fn test_reserved_flag_bits_are_masked() {
    let read = build_read10(0, 1, 0xFF, 0);
    assert_eq!(read.as_slice()[1], 0xF8);
}

#[test]
fn test_cdb_width_selection() {
    assert_eq!(CdbWidth::select(0, 1), CdbWidth::Ten);
    assert_eq!(CdbWidth::select(u32::MAX as u64, u16::MAX as u32), CdbWidth::Ten);
    assert_eq!(CdbWidth::select(u32::MAX as u64 + 1, 1), CdbWidth::Sixteen);
    assert_eq!(CdbWidth::select(0, u16::MAX as u32 + 1), CdbWidth::Sixteen);

    assert_eq!(TransferKind::Read.build(10, 8).opcode(), 0x28);
    assert_eq!(TransferKind::Read.build(1 << 33, 8).opcode(), 0x88);
    assert_eq!(TransferKind::Write.build(10, 8).opcode(), 0x2A);
    assert_eq!(TransferKind::Write.build(10, 70_000).opcode(), 0x8A);
}

#[test]
fn test_block_transfer_decode() -> Result<()> {
    let parsed = BlockTransferCdb::parse(&build_write16(1 << 40, 3, 0, 0))
        .expect("WRITE(16) is a block transfer")?;
    assert_eq!(parsed, BlockTransferCdb {
        kind: TransferKind::Write,
        lba: 1 << 40,
        blocks: 3,
    });

    let parsed = BlockTransferCdb::parse(&build_read10(77, 9, 0, 0))
        .expect("READ(10) is a block transfer")?;
    assert_eq!(parsed.kind, TransferKind::Read);
    assert_eq!((parsed.lba, parsed.blocks), (77, 9));

    assert!(BlockTransferCdb::parse(&build_test_unit_ready(0)).is_none());
    Ok(())
}

#[test]
fn test_capacity_cdbs_layout() {
    assert_eq!(
        build_read_capacity10(0, false, 0).as_slice(),
        &hex!("25 00 00000000 0000 00 00")
    );
    assert_eq!(
        build_read_capacity16(0, false, 32, 0).as_slice(),
        &hex!("9E 10 0000000000000000 00000020 00 00")
    );
}

#[test]
fn test_capacity_data_decode() -> Result<()> {
    let rc10 = ReadCapacity10Data::decode(&hex!("0000FFFF 00000200"))?;
    assert!(!rc10.needs_read_capacity16());
    let cap = CapacityData::from(&rc10);
    assert_eq!(cap.last_lba, 0xFFFF);
    assert_eq!(cap.number_of_blocks(), 0x1_0000);
    assert_eq!(cap.total_bytes(), 0x1_0000 * 512);

    let sentinel = ReadCapacity10Data::new(u32::MAX, u32::MAX);
    assert!(sentinel.needs_read_capacity16());

    let rc16 = ReadCapacity16Data::new(0x1_0000_0000, 4096, ProtectionFlags::PROT_EN);
    let raw = rc16.to_bytes();
    assert_eq!(raw.len(), 32);
    assert_eq!(&raw[..12], &hex!("0000000100000000 00001000"));
    assert_eq!(raw[12], 0x01);
    let decoded = ReadCapacity16Data::decode(raw)?;
    assert_eq!(decoded.protection(), ProtectionFlags::PROT_EN);
    assert_eq!(CapacityData::from(&decoded).number_of_blocks(), 0x1_0000_0001);
    Ok(())
}

#[test]
fn test_six_byte_cdbs_layout() {
    assert_eq!(build_test_unit_ready(0).as_slice(), &hex!("00 00 00 00 00 00"));
    assert_eq!(build_request_sense_simple(252).as_slice(), &hex!("03 00 00 00 FC 00"));
    assert_eq!(build_inquiry_standard(36, 0).as_slice(), &hex!("12 00 00 0024 00"));
}
