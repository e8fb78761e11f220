//! Per-register RLE + backref ring used to decode one `.ymm` register
//! channel's bitstream into a sequence of raw register values.

use crate::bit_reader::BitReader;
use crate::error::{DeviceError, Result};

#[derive(Debug, Clone, Copy, Default)]
struct RleCell {
    value: u8,
    count: u8,
}

/// Decodes one register's RLE/backref-coded value stream.
///
/// Each call to [`YmBackrefRing::next_value`] yields the next raw register
/// value: either a repeat of the currently-held literal run, a fresh
/// literal run (RLE code), or a backreference copying a run of cells from
/// earlier in this ring's own history (LZ code).
#[derive(Debug)]
pub struct YmBackrefRing {
    cells: Box<[RleCell]>,
    mask: u16,
    bits: u8,
    aybits: u8,
    index: u16,
    regvalue: u8,
    regcount: u8,
    backrefoffset: u16,
    backrefcount: u16,
}

impl YmBackrefRing {
    /// `bits` is the log2 ring size (0 for a dead/unused register ring);
    /// `aybits` is the raw register's value width in bits.
    pub fn new(bits: u8, aybits: u8) -> Self {
        let size = 1usize << bits;
        Self {
            cells: vec![RleCell::default(); size].into_boxed_slice(),
            mask: (size - 1) as u16,
            bits,
            aybits,
            index: 0,
            regvalue: 0,
            regcount: 0,
            backrefoffset: 0,
            backrefcount: 0,
        }
    }

    /// Ring size in cells (`2^bits`).
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Decodes and returns the next raw register value.
    pub fn next_value(&mut self, bits: &mut BitReader) -> Result<u8> {
        if self.regcount > 0 {
            self.regcount -= 1;
            return Ok(self.regvalue);
        }

        if self.backrefcount == 0 {
            let is_backref = bits.read_bits(1)? != 0;
            let width = if is_backref { self.bits as u32 } else { self.aybits as u32 };
            let value = bits.read_bits(width)?;
            let count = bits.read_number()?;

            if is_backref {
                if value == 0 || value >= (1u32 << self.bits) {
                    return Err(DeviceError::Corrupted(format!(
                        "backref offset {value} out of range for ring of {} bits",
                        self.bits
                    )));
                }
                if count == 0 || count > 0xFFFF {
                    return Err(DeviceError::Corrupted(format!(
                        "backref count {count} out of range"
                    )));
                }
                self.backrefoffset = value as u16;
                self.backrefcount = count as u16;
            } else {
                if count == 0 || count > 0xFF {
                    return Err(DeviceError::Corrupted(format!(
                        "RLE count {count} out of range"
                    )));
                }
                let value = value as u8;
                let count = count as u8;
                self.cells[(self.index & self.mask) as usize] = RleCell { value, count };
                self.index = self.index.wrapping_add(1);
                self.regvalue = value;
                self.regcount = count - 1;
                return Ok(value);
            }
        }

        self.backrefcount -= 1;
        let cell = self.cells[(self.index.wrapping_sub(self.backrefoffset) & self.mask) as usize];
        self.cells[(self.index & self.mask) as usize] = cell;
        self.index = self.index.wrapping_add(1);
        self.regvalue = cell.value;
        self.regcount = cell.count - 1;
        Ok(cell.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::file::MemorySource;
    use crate::device::ByteSource;

    fn reader_over(bits: &[bool]) -> BitReader {
        let mut bytes = Vec::new();
        let mut padded = bits.to_vec();
        while padded.len() % 8 != 0 {
            padded.push(false);
        }
        for chunk in padded.chunks(8) {
            let mut byte = 0u8;
            for (i, &b) in chunk.iter().enumerate() {
                if b {
                    byte |= 1 << (7 - i);
                }
            }
            bytes.push(byte);
        }
        let source: Box<dyn ByteSource> = Box::new(MemorySource::new(bytes));
        BitReader::new(source)
    }

    fn bits_for_number(n: u32) -> Vec<bool> {
        // Minimal unary-prefixed encoding matching BitReader::read_number.
        let width = 32 - n.leading_zeros();
        let mut out = vec![false; (width - 1) as usize];
        out.push(true);
        for i in (0..width - 1).rev() {
            out.push((n >> i) & 1 != 0);
        }
        out
    }

    #[test]
    fn rle_literal_then_repeat() {
        // RLE code: tag bit 0, value (aybits=4) = 0b0101, count = 3.
        let mut bits = vec![false];
        bits.extend([false, true, false, true]); // value 5, 4 bits
        bits.extend(bits_for_number(3));
        let mut reader = reader_over(&bits);

        let mut ring = YmBackrefRing::new(4, 4);
        assert_eq!(ring.next_value(&mut reader).unwrap(), 5);
        assert_eq!(ring.next_value(&mut reader).unwrap(), 5);
        assert_eq!(ring.next_value(&mut reader).unwrap(), 5);
    }

    #[test]
    fn backref_copies_earlier_cell() {
        // First: RLE code value=7 count=1 (aybits=4).
        let mut bits = vec![false];
        bits.extend([false, true, true, true]); // value 7
        bits.extend(bits_for_number(1));
        // Second: RLE code value=2 count=1.
        bits.push(false);
        bits.extend([false, false, true, false]); // value 2
        bits.extend(bits_for_number(1));
        // Third: backref, tag bit 1, offset (bits=4) = 2 (go back to the
        // first cell), count = 1.
        bits.push(true);
        bits.extend([false, false, true, false]); // offset 2
        bits.extend(bits_for_number(1));

        let mut reader = reader_over(&bits);
        let mut ring = YmBackrefRing::new(4, 4);
        assert_eq!(ring.next_value(&mut reader).unwrap(), 7);
        assert_eq!(ring.next_value(&mut reader).unwrap(), 2);
        assert_eq!(ring.next_value(&mut reader).unwrap(), 7);
    }

    #[test]
    fn dead_ring_has_single_cell() {
        let ring = YmBackrefRing::new(0, 8);
        assert_eq!(ring.capacity(), 1);
    }
}
