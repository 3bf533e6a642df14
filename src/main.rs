// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::{fs, io::AsyncWriteExt, sync::mpsc, task};
use tracing::info;
use usb_msc_rs::{
    cfg::{
        cli::{Cli, Command, RangeArgs, resolve_config_path},
        config::Config,
        logger::init_logger,
    },
    client::{
        device::{DeviceOptions, MassStorageDevice},
        factory::MassStorageFactory,
        stream::MassStorageStream,
    },
    loopback::{
        LoopbackConnection, LoopbackManager, LoopbackTarget, disk::FileDisk,
        mass_storage_descriptor, target::TargetConfig,
    },
    utils::hex_dump,
};

/// Bytes shown by `read` when no length is given.
const DEFAULT_READ_LEN: u64 = 512;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _init_logger = init_logger(&cli.logger)?;

    let config = resolve_config_path(&cli.config)
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    match cli.command {
        Command::Create { size } => run_create(config, size),
        Command::Info => run_info(config).await,
        Command::Dump { output, range } => run_dump(config, output, range).await,
        Command::Read { range } => run_read(config, range).await,
        Command::Write { input, offset } => run_write(config, input, offset).await,
    }
}

/// Attach the configured image as a loopback disk and open a session on it.
fn open_session(config: &Config) -> Result<MassStorageDevice<LoopbackConnection>> {
    let options = DeviceOptions::from(&config.device);
    let disk = FileDisk::open(&config.runtime.image, options.writable)?;
    let target = LoopbackTarget::new(disk, TargetConfig {
        block_size: config.runtime.block_size,
        bulk_transfer_cap: config.runtime.bulk_transfer_cap,
        write_protected: !options.writable,
        command_log_limit: 0,
        ..TargetConfig::default()
    });
    let manager = LoopbackManager::new().with_device(mass_storage_descriptor("0001"), target);

    let factory = MassStorageFactory::new(manager);
    let device = factory
        .supported_devices()
        .into_iter()
        .next()
        .context("no mass-storage device attached")?;
    info!(id = %device.id_string(), image = ?config.runtime.image, "opening device");
    Ok(factory.create(&device, options)?)
}

fn run_create(config: Config, size: u64) -> Result<()> {
    let bs = config.runtime.block_size as u64;
    let len = size / bs * bs;
    if len == 0 {
        bail!("{size} bytes do not hold a single {bs}-byte block");
    }
    if let Some(dir) = config.runtime.image.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {dir:?}"))?;
    }
    FileDisk::create(&config.runtime.image, len)?;
    info!(image = ?config.runtime.image, len, "image created");
    println!("{} blocks of {bs} bytes at {}", len / bs, config.runtime.image.display());
    Ok(())
}

async fn run_info(config: Config) -> Result<()> {
    let (capacity, max_lun, identity, writable) = task::spawn_blocking(move || -> Result<_> {
        let mut dev = open_session(&config)?;
        let identity = dev.inquiry().context("INQUIRY failed")?;
        let capacity = dev.capacity().context("READ CAPACITY failed")?;
        let max_lun = dev.max_lun().context("GET MAX LUN failed")?;
        Ok((capacity, max_lun, identity, dev.options().writable))
    })
    .await
    .context("info task panicked")??;

    println!("vendor:      {}", identity.vendor);
    println!("product:     {}", identity.product);
    println!("revision:    {}", identity.revision);
    println!("removable:   {}", identity.removable);
    println!("blocks:      {}", capacity.number_of_blocks());
    println!("block size:  {}", capacity.block_size);
    println!("capacity:    {} bytes", capacity.total_bytes());
    println!("max LUN:     {max_lun}");
    println!("read-only:   {}", !writable);
    Ok(())
}

async fn run_dump(config: Config, output: PathBuf, range: RangeArgs) -> Result<()> {
    let chunk = config.runtime.chunk_size;
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(4);

    let producer = task::spawn_blocking(move || -> Result<u64> {
        let mut stream = MassStorageStream::new(open_session(&config)?);
        let end = range.end(stream.len()?);
        stream.seek(SeekFrom::Start(range.offset))?;

        let mut left = end.saturating_sub(range.offset);
        let mut copied = 0u64;
        while left > 0 {
            let mut buf = vec![0u8; left.min(chunk) as usize];
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            buf.truncate(n);
            if tx.blocking_send(buf).is_err() {
                bail!("output writer stopped");
            }
            left -= n as u64;
            copied += n as u64;
        }
        Ok(copied)
    });

    let mut file = fs::File::create(&output)
        .await
        .with_context(|| format!("failed to create {output:?}"))?;
    while let Some(buf) = rx.recv().await {
        file.write_all(&buf)
            .await
            .with_context(|| format!("failed to write {output:?}"))?;
    }
    file.flush().await?;

    let copied = producer.await.context("dump task panicked")??;
    info!(copied, ?output, "dump finished");
    println!("{copied} bytes written to {}", output.display());
    Ok(())
}

async fn run_read(config: Config, range: RangeArgs) -> Result<()> {
    let offset = range.offset;
    let data = task::spawn_blocking(move || -> Result<Vec<u8>> {
        let mut stream = MassStorageStream::new(open_session(&config)?);
        let len = stream.len()?;
        let end = RangeArgs {
            length: range.length.or(Some(DEFAULT_READ_LEN)),
            ..range
        }
        .end(len);

        let mut data = vec![0u8; end.saturating_sub(offset) as usize];
        stream.seek(SeekFrom::Start(offset))?;
        let mut done = 0;
        while done < data.len() {
            match stream.read(&mut data[done..])? {
                0 => break,
                n => done += n,
            }
        }
        data.truncate(done);
        Ok(data)
    })
    .await
    .context("read task panicked")??;

    print!("{}", hex_dump(offset, &data));
    Ok(())
}

async fn run_write(config: Config, input: PathBuf, offset: u64) -> Result<()> {
    let payload = fs::read(&input)
        .await
        .with_context(|| format!("failed to read {input:?}"))?;
    let chunk = config.runtime.chunk_size as usize;

    let written = task::spawn_blocking(move || -> Result<usize> {
        let mut stream = MassStorageStream::new(open_session(&config)?);
        if !stream.can_write() {
            bail!("device is read-only, set Writable: Yes in the config");
        }
        let len = stream.len()?;
        if offset.saturating_add(payload.len() as u64) > len {
            bail!(
                "{} bytes at offset {offset} do not fit a medium of {len} bytes",
                payload.len()
            );
        }
        stream.seek(SeekFrom::Start(offset))?;
        for piece in payload.chunks(chunk) {
            stream
                .write_all(piece)
                .with_context(|| format!("write failed at {}", stream.position()))?;
        }
        stream.flush()?;
        Ok(payload.len())
    })
    .await
    .context("write task panicked")??;

    info!(written, offset, "write finished");
    println!("{written} bytes written at offset {offset}");
    Ok(())
}
