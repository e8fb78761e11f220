//! HeatShrink: a resumable LZSS stream decoder wrapped as a [`ByteSource`].
//!
//! A bit-accurate state machine (tag bit, literal, backref index/count,
//! backref yield) with the suspend-on-exhausted-input "no bits" sentinel
//! modeled as an `Option` rather than a magic `u16::MAX`.

use crate::device::{ByteSource, DeviceFlags, EofGuard};
use crate::error::{DeviceError, Result};

/// Magic marking a HeatShrink-compressed stream, little-endian on the wire.
pub const MAGIC: u32 = 0x5f76d7e1;

const MIN_WINDOW_BITS: u8 = 4;
const MAX_WINDOW_BITS: u8 = 14;
const MIN_LOOKAHEAD_BITS: u8 = 3;

/// Size of the internal compressed-byte staging buffer.
const INPUT_BUFFER_SIZE: usize = 100;

const NO_BITS: Option<u16> = None;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    TagBit,
    YieldLiteral,
    BackrefIndexMsb,
    BackrefIndexLsb,
    BackrefCountMsb,
    BackrefCountLsb,
    YieldBackref,
}

/// A resumable decoder for a HeatShrink-compressed byte stream, itself
/// usable as a [`ByteSource`] over the decompressed bytes.
pub struct HeatShrinkDecoder {
    source: Box<dyn ByteSource>,
    cdata: u32,
    csize: u32,
    cpos: u32,
    uncompressed_size: u32,
    upos: u32,

    window_bits: u8,
    lookahead_bits: u8,

    state: State,
    window: Vec<u8>,
    input_buf: [u8; INPUT_BUFFER_SIZE],
    input_size: usize,
    input_index: usize,
    bit_index: u8,
    current_byte: u8,
    output_count: u16,
    output_index: u16,
    head_index: u16,

    eof: EofGuard,
}

impl std::fmt::Debug for HeatShrinkDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeatShrinkDecoder")
            .field("uncompressed_size", &self.uncompressed_size)
            .field("upos", &self.upos)
            .field("window_bits", &self.window_bits)
            .field("lookahead_bits", &self.lookahead_bits)
            .field("state", &self.state)
            .finish()
    }
}

impl HeatShrinkDecoder {
    /// Parses the 12-byte HeatShrink header (magic, uncompressed size,
    /// packed window/lookahead/compressed-size word) from the current
    /// position of `source` and constructs a decoder over the remainder.
    pub fn from_header(mut source: Box<dyn ByteSource>) -> Result<Self> {
        let magic = read_u32_le(&mut *source)?;
        if magic != MAGIC {
            return Err(DeviceError::Corrupted(
                "not a HeatShrink encoded stream".into(),
            ));
        }
        let uncompressed_size = read_u32_le(&mut *source)?;
        let csize_word = read_u32_le(&mut *source)?;
        Self::with_params(source, uncompressed_size, csize_word)
    }

    /// Constructs a decoder directly from already-known parameters, with
    /// `source` positioned at the first compressed byte. `csize_word`
    /// packs `window_bits << 28 | lookahead_bits << 24 | compressed_size`.
    pub fn with_params(
        source: Box<dyn ByteSource>,
        uncompressed_size: u32,
        csize_word: u32,
    ) -> Result<Self> {
        let window_bits = (csize_word >> 28) as u8;
        let lookahead_bits = ((csize_word >> 24) & 0x0f) as u8;
        let csize = csize_word & 0x00ff_ffff;

        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&window_bits)
            || !(MIN_LOOKAHEAD_BITS..window_bits).contains(&lookahead_bits)
        {
            return Err(DeviceError::InvalidArgument(format!(
                "illegal HeatShrink parameters: window_bits={window_bits} lookahead_bits={lookahead_bits}"
            )));
        }

        let cdata = source.fpos();
        let mut decoder = Self {
            source,
            cdata,
            csize,
            cpos: 0,
            uncompressed_size,
            upos: 0,
            window_bits,
            lookahead_bits,
            state: State::TagBit,
            window: vec![0u8; 1usize << window_bits],
            input_buf: [0u8; INPUT_BUFFER_SIZE],
            input_size: 0,
            input_index: 0,
            bit_index: 0,
            current_byte: 0,
            output_count: 0,
            output_index: 0,
            head_index: 0,
            eof: EofGuard::default(),
        };
        decoder.decoder_reset();
        Ok(decoder)
    }

    fn decoder_reset(&mut self) {
        self.window.iter_mut().for_each(|b| *b = 0);
        self.input_buf = [0u8; INPUT_BUFFER_SIZE];
        self.state = State::TagBit;
        self.input_size = 0;
        self.input_index = 0;
        self.bit_index = 0;
        self.current_byte = 0;
        self.output_count = 0;
        self.output_index = 0;
        self.head_index = 0;
    }

    fn sink(&mut self, data: &[u8]) -> usize {
        let rem = INPUT_BUFFER_SIZE - self.input_size;
        if rem == 0 {
            return 0;
        }
        let n = rem.min(data.len());
        self.input_buf[self.input_size..self.input_size + n].copy_from_slice(&data[..n]);
        self.input_size += n;
        n
    }

    fn poll(&mut self, out_buf: &mut [u8]) -> usize {
        let mut written = 0usize;
        loop {
            let in_state = self.state;
            self.state = match in_state {
                State::TagBit => self.st_tag_bit(),
                State::YieldLiteral => self.st_yield_literal(out_buf, &mut written),
                State::BackrefIndexMsb => self.st_backref_index_msb(),
                State::BackrefIndexLsb => self.st_backref_index_lsb(),
                State::BackrefCountMsb => self.st_backref_count_msb(),
                State::BackrefCountLsb => self.st_backref_count_lsb(),
                State::YieldBackref => self.st_yield_backref(out_buf, &mut written),
            };
            if self.state == in_state {
                return written;
            }
        }
    }

    fn st_tag_bit(&mut self) -> State {
        match self.get_bits(1) {
            NO_BITS => State::TagBit,
            Some(1) => State::YieldLiteral,
            Some(_) => {
                if self.window_bits > 8 {
                    State::BackrefIndexMsb
                } else {
                    self.output_index = 0;
                    State::BackrefIndexLsb
                }
            }
        }
    }

    fn st_yield_literal(&mut self, out_buf: &mut [u8], written: &mut usize) -> State {
        if *written >= out_buf.len() {
            return State::YieldLiteral;
        }
        match self.get_bits(8) {
            NO_BITS => State::YieldLiteral,
            Some(byte) => {
                let mask = (1u16 << self.window_bits) - 1;
                let c = byte as u8;
                self.window[(self.head_index & mask) as usize] = c;
                self.head_index = self.head_index.wrapping_add(1);
                out_buf[*written] = c;
                *written += 1;
                State::TagBit
            }
        }
    }

    fn st_backref_index_msb(&mut self) -> State {
        let bit_ct = self.window_bits;
        match self.get_bits(bit_ct - 8) {
            NO_BITS => State::BackrefIndexMsb,
            Some(bits) => {
                self.output_index = bits << 8;
                State::BackrefIndexLsb
            }
        }
    }

    fn st_backref_index_lsb(&mut self) -> State {
        let bit_ct = self.window_bits;
        let want = if bit_ct < 8 { bit_ct } else { 8 };
        match self.get_bits(want) {
            NO_BITS => State::BackrefIndexLsb,
            Some(bits) => {
                self.output_index |= bits;
                self.output_index += 1;
                self.output_count = 0;
                if self.lookahead_bits > 8 {
                    State::BackrefCountMsb
                } else {
                    State::BackrefCountLsb
                }
            }
        }
    }

    fn st_backref_count_msb(&mut self) -> State {
        let br_bit_ct = self.lookahead_bits;
        match self.get_bits(br_bit_ct - 8) {
            NO_BITS => State::BackrefCountMsb,
            Some(bits) => {
                self.output_count = bits << 8;
                State::BackrefCountLsb
            }
        }
    }

    fn st_backref_count_lsb(&mut self) -> State {
        let br_bit_ct = self.lookahead_bits;
        let want = if br_bit_ct < 8 { br_bit_ct } else { 8 };
        match self.get_bits(want) {
            NO_BITS => State::BackrefCountLsb,
            Some(bits) => {
                self.output_count |= bits;
                self.output_count += 1;
                State::YieldBackref
            }
        }
    }

    fn st_yield_backref(&mut self, out_buf: &mut [u8], written: &mut usize) -> State {
        let mut count = out_buf.len() - *written;
        if count > 0 {
            if (self.output_count as usize) < count {
                count = self.output_count as usize;
            }
            let mask = (1u16 << self.window_bits) - 1;
            let neg_offset = self.output_index;
            for _ in 0..count {
                let src = self.head_index.wrapping_sub(neg_offset) & mask;
                let c = self.window[src as usize];
                out_buf[*written] = c;
                *written += 1;
                self.window[(self.head_index & mask) as usize] = c;
                self.head_index = self.head_index.wrapping_add(1);
            }
            self.output_count -= count as u16;
            if self.output_count == 0 {
                return State::TagBit;
            }
        }
        State::YieldBackref
    }

    /// Pulls `count` (<=15) bits from the staged input buffer, returning
    /// `None` if input is exhausted before `count` bits could be collected.
    fn get_bits(&mut self, count: u8) -> Option<u16> {
        if count > 15 {
            return None;
        }
        if self.input_size == 0 && (self.bit_index as u16) < (1u16 << (count - 1)) {
            return None;
        }
        let mut accumulator: u16 = 0;
        for _ in 0..count {
            if self.bit_index == 0 {
                if self.input_size == 0 {
                    return None;
                }
                self.current_byte = self.input_buf[self.input_index];
                self.input_index += 1;
                if self.input_index == self.input_size {
                    self.input_index = 0;
                    self.input_size = 0;
                }
                self.bit_index = 0x80;
            }
            accumulator <<= 1;
            if self.current_byte & self.bit_index != 0 {
                accumulator |= 1;
            }
            self.bit_index >>= 1;
        }
        Some(accumulator)
    }
}

impl ByteSource for HeatShrinkDecoder {
    fn read(&mut self, buf: &mut [u8], partial: bool) -> Result<usize> {
        let remaining = (self.uncompressed_size - self.upos) as usize;
        let size = self.eof.clamp(buf.len(), remaining, partial)?;
        if size == 0 {
            return Ok(0);
        }
        let mut produced = 0usize;
        loop {
            let cnt = self.poll(&mut buf[produced..size]);
            produced += cnt;
            self.upos += cnt as u32;
            if produced == size {
                return Ok(size);
            }
            let mut chunk = [0u8; INPUT_BUFFER_SIZE];
            let want = (self.csize - self.cpos).min(INPUT_BUFFER_SIZE as u32) as usize;
            let avail = self.source.read(&mut chunk[..want], true)?;
            if avail == 0 {
                return Err(DeviceError::Corrupted("data corrupted".into()));
            }
            let sunk = self.sink(&chunk[..avail]);
            debug_assert_eq!(sunk, avail);
            self.cpos += avail as u32;
        }
    }

    fn fpos(&self) -> u32 {
        self.upos
    }

    fn set_fpos(&mut self, new_upos: u32) -> Result<()> {
        self.eof.clear();
        if new_upos >= self.uncompressed_size {
            self.upos = self.uncompressed_size;
            return Ok(());
        }
        if new_upos < self.upos {
            self.decoder_reset();
            self.source.set_fpos(self.cdata)?;
            self.upos = 0;
            self.cpos = 0;
        }
        let mut discard = [0u8; INPUT_BUFFER_SIZE];
        while self.upos < new_upos {
            let want = (new_upos - self.upos).min(INPUT_BUFFER_SIZE as u32) as usize;
            self.read(&mut discard[..want], false)?;
        }
        Ok(())
    }

    fn size(&self) -> u32 {
        self.uncompressed_size
    }

    fn flags(&self) -> DeviceFlags {
        DeviceFlags::READABLE | DeviceFlags::SEEKABLE
    }
}

fn read_u32_le(source: &mut dyn ByteSource) -> Result<u32> {
    let mut buf = [0u8; 4];
    source.read(&mut buf, false)?;
    Ok(u32::from_le_bytes(buf))
}

/// Peeks at `source` to decide whether it begins with a HeatShrink header,
/// restoring its read position afterward regardless of outcome.
pub fn is_heatshrink_stream(source: &mut dyn ByteSource) -> Result<bool> {
    let saved = source.fpos();
    if source.size().saturating_sub(saved) < 12 {
        return Ok(false);
    }
    let magic = read_u32_le(source)?;
    let _uncompressed_size = read_u32_le(source)?;
    let csize_word = read_u32_le(source)?;
    source.set_fpos(saved)?;

    if magic != MAGIC {
        return Ok(false);
    }
    let csize = csize_word & 0x00ff_ffff;
    if saved as u64 + 12 + csize as u64 > source.size() as u64 {
        return Ok(false);
    }
    Ok(true)
}
