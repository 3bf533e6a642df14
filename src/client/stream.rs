// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::warn;

use crate::client::{device::BlockDevice, error::MassStorageError};

/// Byte-addressed, seekable view of a [`BlockDevice`].
///
/// Partial blocks at either end of a transfer go through a one-block scratch
/// buffer (read-modify-write for writes); whole blocks in between go straight
/// to and from the caller's buffer.
pub struct MassStorageStream<D: BlockDevice> {
    device: D,
    position: u64,
    scratch: Vec<u8>,
}

impl<D: BlockDevice> MassStorageStream<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            position: 0,
            scratch: Vec::new(),
        }
    }

    /// Medium size in bytes.
    pub fn len(&mut self) -> io::Result<u64> {
        Ok(self.len_bytes()?)
    }

    pub fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    /// Block devices have a fixed size.
    pub fn set_len(&mut self, _len: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "mass-storage stream cannot be resized",
        ))
    }

    pub fn can_write(&self) -> bool {
        !self.device.read_only()
    }

    pub fn block_size(&mut self) -> io::Result<u32> {
        Ok(self.device.block_size()?)
    }

    pub fn get_ref(&self) -> &D {
        &self.device
    }

    pub fn get_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Give the device back; dropping it closes the session.
    pub fn into_inner(self) -> D {
        self.device
    }

    fn len_bytes(&mut self) -> Result<u64, MassStorageError> {
        let blocks = self.device.number_of_blocks()?;
        let block_size = self.device.block_size()? as u64;
        Ok(blocks.saturating_mul(block_size))
    }

    /// Transfer `[position, position + buf.len())`, clamped to the medium.
    /// Errors after some bytes were moved end the call with the short count.
    fn transfer(&mut self, buf: Buffer<'_>) -> Result<usize, MassStorageError> {
        let len = self.len_bytes()?;
        if self.position >= len || buf.len() == 0 {
            return Ok(0);
        }

        let count = (buf.len() as u64).min(len - self.position) as usize;
        let bs = self.device.block_size()? as u64;
        let start_lba = self.position / bs;
        let end_lba = (self.position + count as u64 - 1) / bs;
        self.scratch.resize(bs as usize, 0);

        let mut span = Span { buf, done: 0 };

        let head_offset = (self.position % bs) as usize;
        let head_len = (bs as usize - head_offset).min(count);
        if !self.edge_block(&mut span, start_lba, head_offset, head_len)? {
            return Ok(0);
        }

        if end_lba > start_lba {
            let middle_blocks = end_lba - start_lba - 1;
            let mut lba = start_lba + 1;
            let mut left = middle_blocks;
            while left > 0 {
                let blocks = left.min(u32::MAX as u64) as u32;
                let bytes = blocks as usize * bs as usize;
                let moved = match span.whole_blocks(&mut self.device, lba, bytes, blocks) {
                    Ok(moved) => moved,
                    Err(e) => {
                        warn!(lba, error = %e, "stream transfer cut short");
                        return Ok(span.done);
                    },
                };
                span.done += moved as usize * bs as usize;
                if moved < blocks {
                    return Ok(span.done);
                }
                lba += moved as u64;
                left -= moved as u64;
            }

            let tail_len = count - span.done;
            if let Err(e) = self.edge_block(&mut span, end_lba, 0, tail_len) {
                warn!(lba = end_lba, error = %e, "stream transfer cut short");
            }
        }

        Ok(span.done)
    }

    /// Move `len` bytes at `offset` inside block `lba` through the scratch
    /// buffer. Returns `false` if the block could not be transferred.
    fn edge_block(
        &mut self,
        span: &mut Span<'_>,
        lba: u64,
        offset: usize,
        len: usize,
    ) -> Result<bool, MassStorageError> {
        if self.device.read_blocks(lba, &mut self.scratch, 1)? != 1 {
            return Ok(false);
        }
        match &mut span.buf {
            Buffer::Read(dst) => {
                dst[span.done..span.done + len].copy_from_slice(&self.scratch[offset..offset + len]);
            },
            Buffer::Write(src) => {
                self.scratch[offset..offset + len].copy_from_slice(&src[span.done..span.done + len]);
                if self.device.write_blocks(lba, &self.scratch, 1)? != 1 {
                    return Ok(false);
                }
            },
        }
        span.done += len;
        Ok(true)
    }
}

enum Buffer<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl Buffer<'_> {
    fn len(&self) -> usize {
        match self {
            Buffer::Read(b) => b.len(),
            Buffer::Write(b) => b.len(),
        }
    }
}

/// Caller buffer plus the number of bytes already moved.
struct Span<'a> {
    buf: Buffer<'a>,
    done: usize,
}

impl Span<'_> {
    fn whole_blocks<D: BlockDevice>(
        &mut self,
        device: &mut D,
        lba: u64,
        bytes: usize,
        blocks: u32,
    ) -> Result<u32, MassStorageError> {
        let range = self.done..self.done + bytes;
        match &mut self.buf {
            Buffer::Read(dst) => device.read_blocks(lba, &mut dst[range], blocks),
            Buffer::Write(src) => device.write_blocks(lba, &src[range], blocks),
        }
    }
}

impl<D: BlockDevice> Read for MassStorageStream<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.transfer(Buffer::Read(buf))?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<D: BlockDevice> Write for MassStorageStream<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.can_write() {
            return Err(MassStorageError::ReadOnly.into());
        }
        let written = self.transfer(Buffer::Write(buf))?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<D: BlockDevice> Seek for MassStorageStream<D> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len_bytes()?.checked_add_signed(delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            },
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
