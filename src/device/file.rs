//! Concrete `ByteSource` implementations: a flat OS file and an in-memory
//! buffer for resources held fully in RAM.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::device::{ByteSource, DeviceFlags, EofGuard};
use crate::error::{DeviceError, Result};

/// A `ByteSource` backed directly by a flat `std::fs::File`.
#[derive(Debug)]
pub struct FlatFile {
    file: File,
    size: u32,
    pos: u32,
    eof: EofGuard,
}

impl FlatFile {
    /// Opens `path` for reading, grounding the size in a single `metadata`
    /// call up front rather than re-querying on every read.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let file =
            File::open(path).map_err(|e| DeviceError::Io(io_context(e, path)))?;
        let size = file
            .metadata()
            .map_err(|e| DeviceError::Io(io_context(e, path)))?
            .len();
        if size > u32::MAX as u64 {
            return Err(DeviceError::InvalidArgument(format!(
                "file too large: {}",
                path.display()
            )));
        }
        Ok(Self {
            file,
            size: size as u32,
            pos: 0,
            eof: EofGuard::default(),
        })
    }
}

fn io_context(e: std::io::Error, path: &std::path::Path) -> std::io::Error {
    std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
}

impl ByteSource for FlatFile {
    fn read(&mut self, buf: &mut [u8], partial: bool) -> Result<usize> {
        let remaining = (self.size - self.pos) as usize;
        let want = self.eof.clamp(buf.len(), remaining, partial)?;
        if want == 0 {
            return Ok(0);
        }
        self.file
            .seek(SeekFrom::Start(self.pos as u64))
            .map_err(DeviceError::Io)?;
        self.file
            .read_exact(&mut buf[..want])
            .map_err(DeviceError::Io)?;
        self.pos += want as u32;
        Ok(want)
    }

    fn fpos(&self) -> u32 {
        self.pos
    }

    fn set_fpos(&mut self, pos: u32) -> Result<()> {
        if pos > self.size {
            return Err(DeviceError::InvalidArgument(format!(
                "set_fpos {pos} beyond size {}",
                self.size
            )));
        }
        self.pos = pos;
        self.eof.clear();
        Ok(())
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn flags(&self) -> DeviceFlags {
        DeviceFlags::READABLE | DeviceFlags::SEEKABLE
    }
}

/// A `ByteSource` backed by an owned in-memory buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
    pos: u32,
    eof: EofGuard,
}

impl MemorySource {
    /// Wraps `data` as a readable, seekable source.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            eof: EofGuard::default(),
        }
    }
}

impl ByteSource for MemorySource {
    fn read(&mut self, buf: &mut [u8], partial: bool) -> Result<usize> {
        let remaining = self.data.len() - self.pos as usize;
        let want = self.eof.clamp(buf.len(), remaining, partial)?;
        if want == 0 {
            return Ok(0);
        }
        let start = self.pos as usize;
        buf[..want].copy_from_slice(&self.data[start..start + want]);
        self.pos += want as u32;
        Ok(want)
    }

    fn fpos(&self) -> u32 {
        self.pos
    }

    fn set_fpos(&mut self, pos: u32) -> Result<()> {
        if pos as usize > self.data.len() {
            return Err(DeviceError::InvalidArgument(format!(
                "set_fpos {pos} beyond size {}",
                self.data.len()
            )));
        }
        self.pos = pos;
        self.eof.clear();
        Ok(())
    }

    fn size(&self) -> u32 {
        self.data.len() as u32
    }

    fn flags(&self) -> DeviceFlags {
        DeviceFlags::READABLE | DeviceFlags::SEEKABLE
    }
}
