//! Device hierarchy: the `ByteSource` abstraction and capability flags
//! shared by every concrete device and decoder in the crate.

/// Interface-only block device (LBA-addressed sector I/O).
pub mod block_device;
/// Concrete `ByteSource` implementations (flat file, in-memory).
pub mod file;
/// Filesystem and directory traits.
pub mod filesystem;

use bitflags::bitflags;

use crate::error::Result;

bitflags! {
    /// Capability bits a device reports about itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceFlags: u8 {
        /// Supports `read`.
        const READABLE = 0x01;
        /// Supports `write`.
        const WRITABLE = 0x02;
        /// Writes may overwrite existing data in place (as opposed to
        /// append/erase-before-write media).
        const OVERWRITABLE = 0x04;
        /// Supports `set_fpos` to an arbitrary position.
        const SEEKABLE = 0x08;
    }
}

/// A seekable, possibly-sequential byte stream.
///
/// Implementors track their own read position (`fpos`) and report a total
/// `size`. A `read` may be asked to return fewer bytes than requested
/// (`partial = true`) instead of failing when the source is exhausted; a
/// non-partial read that cannot be fully satisfied fails with
/// [`crate::error::DeviceError::EndOfFile`].
///
/// Implementations that only ever deliver zero bytes on a partial read
/// once (rather than every subsequent call) must arm a sticky
/// "eof-pending" flag: a second read that would again deliver zero bytes
/// fails with `EndOfFile` even though `partial` was requested. The flag is
/// cleared by `set_fpos`.
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes, returning the number of bytes
    /// actually placed into `buf`. See the trait docs for `partial`
    /// semantics.
    fn read(&mut self, buf: &mut [u8], partial: bool) -> Result<usize>;

    /// Current read position.
    fn fpos(&self) -> u32;

    /// Repositions the read cursor.
    fn set_fpos(&mut self, pos: u32) -> Result<()>;

    /// Total size of the source in bytes.
    fn size(&self) -> u32;

    /// Capability flags for this device.
    fn flags(&self) -> DeviceFlags;
}

impl std::fmt::Debug for dyn ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource")
            .field("fpos", &self.fpos())
            .field("size", &self.size())
            .field("flags", &self.flags())
            .finish()
    }
}

/// Tracks the sticky "eof-pending" bit described on [`ByteSource::read`].
///
/// Concrete sources embed this and call [`EofGuard::clamp`] once they know
/// how many bytes actually remain, rather than re-implementing the
/// end-of-file bookkeeping by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct EofGuard {
    pending: bool,
}

impl EofGuard {
    /// Given a request for `want` bytes with `remaining` bytes actually
    /// available, returns the number of bytes to serve this call, or an
    /// `EndOfFile` error per the sticky-flag rule.
    pub fn clamp(&mut self, want: usize, remaining: usize, partial: bool) -> Result<usize> {
        if want <= remaining {
            self.pending = false;
            return Ok(want);
        }
        if !partial {
            return Err(crate::error::DeviceError::EndOfFile);
        }
        if self.pending {
            return Err(crate::error::DeviceError::EndOfFile);
        }
        if remaining == 0 {
            self.pending = true;
        }
        Ok(remaining)
    }

    /// Clears the pending flag, e.g. after a seek.
    pub fn clear(&mut self) {
        self.pending = false;
    }
}
