//! `.ymm` header parsing and per-frame register stream decoding.

use crate::bit_reader::BitReader;
use crate::device::ByteSource;
use crate::error::{DeviceError, Result};
use crate::ymm::backref_ring::YmBackrefRing;

const MAGIC: [u8; 4] = *b"ymm!";
const VARIANT: u8 = 2;
const REGISTERS_PER_FRAME: usize = 16;

/// Parsed `.ymm` header fields, as read once at open time.
#[derive(Debug, Clone)]
pub struct YmmHeader {
    /// `log2` of the total ring-pool size shared across all 16 registers.
    pub buffer_bits: u8,
    /// Playback rate in frames per second (25..=100).
    pub frame_rate: i8,
    /// Total number of frames in the stream.
    pub num_frames: u32,
    /// Frame index to restart at when looping.
    pub loop_frame: u32,
    /// Sound-chip clock in Hz.
    pub ay_clock: u32,
    /// Free-text title metadata.
    pub title: String,
    /// Free-text author metadata.
    pub author: String,
    /// Free-text comment metadata.
    pub comment: String,
}

/// Decodes one `.ymm` stream into a sequence of 16-register frames.
pub struct YmFrameDecoder {
    header: YmmHeader,
    rings: [YmBackrefRing; REGISTERS_PER_FRAME],
    reader: BitReader,
    bitstream_start: u32,
}

impl std::fmt::Debug for YmFrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YmFrameDecoder")
            .field("header", &self.header)
            .field("bitstream_start", &self.bitstream_start)
            .finish()
    }
}

impl YmFrameDecoder {
    /// Parses the header from `source` (positioned at the start of a
    /// `.ymm` stream) and builds the per-register decoding rings.
    pub fn open(mut source: Box<dyn ByteSource>) -> Result<Self> {
        let header = parse_header(&mut *source)?;
        let rbusz = read_u32_le(&mut *source)?;
        let bitstream_start = source.fpos();
        let rings = build_rings(header.buffer_bits, rbusz)?;
        Ok(Self {
            header,
            rings,
            reader: BitReader::new(source),
            bitstream_start,
        })
    }

    /// The parsed header this decoder was opened with.
    pub fn header(&self) -> &YmmHeader {
        &self.header
    }

    /// Decodes the next 16-register frame.
    pub fn read_frame(&mut self) -> Result<[u8; REGISTERS_PER_FRAME]> {
        let mut regs = [0u8; REGISTERS_PER_FRAME];
        for (r, ring) in self.rings.iter_mut().enumerate() {
            regs[r] = ring.next_value(&mut self.reader).map_err(|e| match e {
                DeviceError::EndOfFile => {
                    DeviceError::Corrupted("unexpected end of file mid-frame".into())
                }
                other => other,
            })?;
        }
        Ok(regs)
    }

    /// Restarts the bitstream and replays frames up to `loop_frame`,
    /// discarding their output, so playback can continue from the loop
    /// point without re-threading ring state by hand.
    pub fn restart_at_loop(&mut self) -> Result<()> {
        self.reader.source_mut().set_fpos(self.bitstream_start)?;
        self.reader.reset();
        for _ in 0..self.header.loop_frame {
            self.read_frame()?;
        }
        Ok(())
    }
}

fn read_u32_le(source: &mut dyn ByteSource) -> Result<u32> {
    let mut buf = [0u8; 4];
    source.read(&mut buf, false)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u8(source: &mut dyn ByteSource) -> Result<u8> {
    let mut buf = [0u8; 1];
    source.read(&mut buf, false)?;
    Ok(buf[0])
}

/// Reads a null-terminated string, used for the `.ymm` title/author/comment
/// metadata fields.
fn read_nt_string(source: &mut dyn ByteSource) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = read_u8(source)?;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn parse_header(source: &mut dyn ByteSource) -> Result<YmmHeader> {
    let mut magic = [0u8; 4];
    source.read(&mut magic, false)?;
    if magic != MAGIC {
        return Err(DeviceError::Corrupted("not a .ymm music file".into()));
    }
    let variant = read_u8(source)?;
    if variant != VARIANT {
        return Err(DeviceError::Corrupted("unknown .ymm variant".into()));
    }
    let buffer_bits = read_u8(source)?;
    if !(8..=14).contains(&buffer_bits) {
        return Err(DeviceError::Corrupted("illegal window bits".into()));
    }
    let frame_rate = read_u8(source)? as i8;
    if !(25..=100).contains(&frame_rate) {
        return Err(DeviceError::Corrupted("illegal frame rate".into()));
    }
    let registers_per_frame = read_u8(source)?;
    if registers_per_frame as usize != REGISTERS_PER_FRAME {
        return Err(DeviceError::Corrupted("illegal registers per frame".into()));
    }
    let num_frames = read_u32_le(source)?;
    let loop_frame = read_u32_le(source)?;
    if num_frames <= loop_frame {
        return Err(DeviceError::Corrupted("illegal num_frames".into()));
    }
    let ay_clock = read_u32_le(source)?;
    if !(990_000..=4_100_000).contains(&ay_clock) {
        return Err(DeviceError::Corrupted("illegal ay_clock".into()));
    }
    let title = read_nt_string(source)?;
    let author = read_nt_string(source)?;
    let comment = read_nt_string(source)?;

    Ok(YmmHeader {
        buffer_bits,
        frame_rate,
        num_frames,
        loop_frame,
        ay_clock,
        title,
        author,
        comment,
    })
}

fn build_rings(buffer_bits: u8, rbusz: u32) -> Result<[YmBackrefRing; REGISTERS_PER_FRAME]> {
    let mut rings: Vec<YmBackrefRing> = Vec::with_capacity(REGISTERS_PER_FRAME);
    let mut allocated: usize = 0;
    for r in 0..REGISTERS_PER_FRAME {
        let code = ((rbusz >> (2 * r)) & 0x03) as u8;
        if code != 0 {
            let sz = code + buffer_bits - 6;
            allocated += 1usize << sz;
            rings.push(YmBackrefRing::new(sz, crate::chip::AY_REGISTER_BITS[r]));
        } else {
            rings.push(YmBackrefRing::new(0, crate::chip::AY_REGISTER_BITS[r]));
        }
    }
    if allocated != 1usize << buffer_bits {
        return Err(DeviceError::Corrupted(
            "illegal ring buffer size assignment".into(),
        ));
    }
    rings
        .try_into()
        .map_err(|_| DeviceError::Corrupted("ring count mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::file::MemorySource;
    use std::io::Write;

    fn build_stream(
        buffer_bits: u8,
        frame_rate: u8,
        num_frames: u32,
        loop_frame: u32,
        ay_clock: u32,
        rbusz: u32,
        payload_bits: &[bool],
    ) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.push(VARIANT);
        out.push(buffer_bits);
        out.push(frame_rate);
        out.push(REGISTERS_PER_FRAME as u8);
        out.extend_from_slice(&num_frames.to_le_bytes());
        out.extend_from_slice(&loop_frame.to_le_bytes());
        out.extend_from_slice(&ay_clock.to_le_bytes());
        out.write_all(b"title\0author\0comment\0").unwrap();
        out.extend_from_slice(&rbusz.to_le_bytes());

        let mut padded = payload_bits.to_vec();
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
            out.push(byte);
        }
        out
    }

    fn bits_for_number(n: u32) -> Vec<bool> {
        let width = 32 - n.leading_zeros();
        let mut out = vec![false; (width - 1) as usize];
        out.push(true);
        for i in (0..width - 1).rev() {
            out.push((n >> i) & 1 != 0);
        }
        out
    }

    fn rle_code(value: u8, aybits: u8, count: u32) -> Vec<bool> {
        let mut out = vec![false];
        for i in (0..aybits).rev() {
            out.push((value >> i) & 1 != 0);
        }
        out.extend(bits_for_number(count));
        out
    }

    #[test]
    fn rejects_bad_magic() {
        let mut stream = build_stream(8, 50, 2, 0, 2_000_000, 0, &[]);
        stream[0] = b'x';
        let source: Box<dyn ByteSource> = Box::new(MemorySource::new(stream));
        assert!(YmFrameDecoder::open(source).is_err());
    }

    #[test]
    fn rejects_out_of_range_buffer_bits() {
        let stream = build_stream(20, 50, 2, 0, 2_000_000, 0, &[]);
        let source: Box<dyn ByteSource> = Box::new(MemorySource::new(stream));
        assert!(YmFrameDecoder::open(source).is_err());
    }

    #[test]
    fn rejects_loop_frame_past_num_frames() {
        let stream = build_stream(8, 50, 2, 5, 2_000_000, 0, &[]);
        let source: Box<dyn ByteSource> = Box::new(MemorySource::new(stream));
        assert!(YmFrameDecoder::open(source).is_err());
    }

    #[test]
    fn decodes_single_frame_with_evenly_sized_rings() {
        // buffer_bits = 8 -> pool of 256 cells total. Code 2 on every
        // register gives sz = 2 + 8 - 6 = 4 -> 16 cells each, 16 * 16 = 256.
        let mut rbusz: u32 = 0;
        for r in 0..16u32 {
            rbusz |= 2 << (2 * r);
        }

        // One frame: register 0 gets RLE value=1,count=1 (aybits=8);
        // every other register also gets RLE value=0,count=1 to keep the
        // bitstream well-formed and short.
        let mut bits = rle_code(1, 8, 1);
        for r in 1..16u8 {
            bits.extend(rle_code(r, crate::chip::AY_REGISTER_BITS[r as usize], 1));
        }

        let stream = build_stream(8, 50, 2, 0, 2_000_000, rbusz, &bits);
        let source: Box<dyn ByteSource> = Box::new(MemorySource::new(stream));
        let mut decoder = YmFrameDecoder::open(source).unwrap();
        let frame = decoder.read_frame().unwrap();
        assert_eq!(frame[0], 1);
        for r in 1..16usize {
            assert_eq!(frame[r], r as u8);
        }
    }
}
