// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::PathBuf, time::Duration};

use anyhow::Result;
use usb_msc_rs::{
    cfg::{cli::resolve_config_path, config::Config, enums::YesNo, logger::init_logger},
    client::device::DeviceOptions,
};

const MINIMAL: &str = r#"
device:
  Writable: No
  TimeoutMs: 250
runtime:
  Image: disk.img
  BlockSize: 4096
"#;

fn parse(yaml: &str) -> Result<Config> {
    let mut cfg: Config = serde_yaml::from_str(yaml)?;
    cfg.validate_and_normalize()?;
    Ok(cfg)
}

fn temp_file(name: &str, contents: &str) -> Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("usb-msc-{}-{name}", std::process::id()));
    fs::write(&path, contents)?;
    Ok(path)
}

#[test]
fn test_load_shipped_config() -> Result<()> {
    let cfg = Config::load_from_file(resolve_config_path("tests/config.yaml")?)?;

    assert_eq!(cfg.device.writable, YesNo::Yes);
    assert_eq!(cfg.device.lun, 0);
    assert_eq!(cfg.device.timeout, Duration::from_millis(1000));
    assert_eq!(cfg.device.read_write_attempts, 5);
    assert_eq!(cfg.runtime.block_size, 512);
    assert_eq!(cfg.runtime.bulk_transfer_cap, 65536);
    // 1_000_000 rounded up to whole 512-byte blocks.
    assert_eq!(cfg.runtime.chunk_size, 1_000_448);
    Ok(())
}

#[test]
fn test_defaults_and_device_options() -> Result<()> {
    let cfg = parse(MINIMAL)?;
    assert_eq!(cfg.runtime.bulk_transfer_cap, 0);
    assert_eq!(cfg.runtime.chunk_size, 1024 * 1024);

    let options = DeviceOptions::from(&cfg.device);
    assert_eq!(options, DeviceOptions {
        writable: false,
        lun: 0,
        timeout: Duration::from_millis(250),
        read_write_attempts: 5,
    });
    Ok(())
}

#[test]
fn test_yes_no_spellings() -> Result<()> {
    for spelling in ["Yes", "yes", "\"true\"", "\"1\""] {
        let cfg = parse(&MINIMAL.replace("Writable: No", &format!("Writable: {spelling}")))?;
        assert!(bool::from(cfg.device.writable), "{spelling} should enable writes");
    }
    assert!(parse(&MINIMAL.replace("Writable: No", "Writable: Maybe")).is_err());
    Ok(())
}

#[test]
fn test_validation_failures() {
    let cases = [
        ("Lun", MINIMAL.replace("TimeoutMs: 250", "TimeoutMs: 250\n  Lun: 16")),
        ("TimeoutMs", MINIMAL.replace("TimeoutMs: 250", "TimeoutMs: 0")),
        (
            "ReadWriteAttempts",
            MINIMAL.replace("TimeoutMs: 250", "TimeoutMs: 250\n  ReadWriteAttempts: 0"),
        ),
        ("BlockSize", MINIMAL.replace("BlockSize: 4096", "BlockSize: 1000")),
        ("BlockSize", MINIMAL.replace("BlockSize: 4096", "BlockSize: 8192")),
        (
            "BulkTransferCap",
            MINIMAL.replace("BlockSize: 4096", "BlockSize: 4096\n  BulkTransferCap: 512"),
        ),
        ("Image", MINIMAL.replace("Image: disk.img", "Image: \"\"")),
    ];

    for (field, yaml) in cases {
        let err = parse(&yaml).expect_err("invalid config accepted");
        assert!(
            err.to_string().contains(field),
            "error {err:#} does not name {field}"
        );
    }
}

#[test]
fn test_logger_rejects_unknown_output() -> Result<()> {
    let path = temp_file(
        "logger.yaml",
        r#"
logger:
  level: "debug"
  output: "syslog"
  is_show_line: false
  is_show_module_path: false
  is_show_target: false
"#,
    )?;
    let err = init_logger(&path.to_string_lossy())
        .err()
        .expect("syslog is not an output");
    assert!(err.to_string().contains("syslog"));
    fs::remove_file(path)?;
    Ok(())
}

#[test]
fn test_logger_file_output_needs_path() -> Result<()> {
    let path = temp_file(
        "logger-file.yaml",
        r#"
logger:
  level: "debug"
  output: "file"
  format: "json"
  is_show_line: false
  is_show_module_path: false
  is_show_target: false
"#,
    )?;
    assert!(init_logger(&path.to_string_lossy()).is_err());
    fs::remove_file(path)?;
    Ok(())
}
