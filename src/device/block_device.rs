//! Interface-only block device: LBA-addressed sector I/O.
//!
//! No concrete implementation lives in this crate (SD/QSPI/FAT media are
//! out of scope); this trait is the shape `FileSystem` implementations
//! would sit on top of.

use crate::device::DeviceFlags;
use crate::error::{DeviceError, Result};

/// A logical block address.
pub type Lba = u32;

/// A fixed-size-sector, LBA-addressed storage device.
///
/// The default method bodies return `NotReadable`/`NotWritable` for
/// whichever direction a concrete device does not support, so implementors
/// only override the directions they actually provide.
pub trait BlockDevice {
    /// Number of addressable sectors.
    fn sector_count(&self) -> Lba;

    /// `log2` of the sector size used for reads/writes.
    fn sector_shift(&self) -> u8;

    /// `log2` of the erase block size, or 0 if the device is directly
    /// overwritable and needs no erase step.
    fn erase_block_shift(&self) -> u8;

    /// Capability flags.
    fn flags(&self) -> DeviceFlags;

    /// Reads `count` whole sectors starting at `lba` into `data`.
    fn read_sectors(&mut self, _lba: Lba, _data: &mut [u8], _count: u32) -> Result<()> {
        Err(DeviceError::NotReadable)
    }

    /// Writes `count` whole sectors starting at `lba` from `data`.
    fn write_sectors(&mut self, _lba: Lba, _data: &[u8], _count: u32) -> Result<()> {
        Err(DeviceError::NotWritable)
    }

    /// Sector size in bytes.
    fn sector_size(&self) -> u32 {
        1 << self.sector_shift()
    }

    /// Erase block size in bytes.
    fn erase_block_size(&self) -> u32 {
        1 << self.erase_block_shift()
    }

    /// Total device size in bytes.
    fn total_size(&self) -> u64 {
        self.sector_count() as u64 * self.sector_size() as u64
    }

    /// Whether the device supports `read_sectors`.
    fn is_readable(&self) -> bool {
        self.flags().contains(DeviceFlags::READABLE)
    }

    /// Whether the device supports `write_sectors`.
    fn is_writable(&self) -> bool {
        self.flags().contains(DeviceFlags::WRITABLE)
    }

    /// Whether writes may overwrite existing data without a separate erase.
    fn is_overwritable(&self) -> bool {
        self.flags().contains(DeviceFlags::OVERWRITABLE)
    }
}
