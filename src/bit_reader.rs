//! MSB-first bit reader over a [`ByteSource`], with the Elias-gamma-style
//! variable-length integer decode (`read_number`) used by the `.ymm`
//! bitstream format.

use crate::device::ByteSource;
use crate::error::Result;

/// Reads individual bits and variable-length numbers out of a byte stream.
///
/// `accu` holds up to 32 bits pulled from the source, left-justified such
/// that the `bits` most significant bits (of the low `bits` bits, really —
/// see `read_bits`) are valid; `read_number` additionally requires `bits <
/// 8` and the high bits of `accu` above position `bits` to be zero between
/// calls, which `read_bits` maintains as an invariant.
#[derive(Debug)]
pub struct BitReader {
    source: Box<dyn ByteSource>,
    accu: u32,
    bits: u32,
}

impl BitReader {
    /// Wraps `source`, starting with an empty bit accumulator.
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self {
            source,
            accu: 0,
            bits: 0,
        }
    }

    /// Reads `n` bits (`1..=24`) MSB-first, pulling whole bytes from the
    /// source as needed.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        debug_assert!((1..=24).contains(&n));
        while self.bits < n {
            let mut byte = [0u8; 1];
            self.source.read(&mut byte, false)?;
            self.accu = (self.accu << 8) | byte[0] as u32;
            self.bits += 8;
        }
        self.bits -= n;
        let rval = self.accu >> self.bits;
        self.accu -= rval << self.bits;
        Ok(rval)
    }

    /// Decodes a variable-length integer: a unary run of `n-1` zero bits
    /// terminated by a `1` bit indicates an `n`-bit payload follows (the
    /// leading `1` counted as the payload's top bit). Smaller values cost
    /// fewer bits.
    pub fn read_number(&mut self) -> Result<u32> {
        debug_assert!(self.bits < 8);
        while self.accu == 0 {
            let mut byte = [0u8; 1];
            self.source.read(&mut byte, false)?;
            self.accu = byte[0] as u32;
            self.bits += 8;
        }
        let mut msbit = self.bits - 1;
        while (self.accu >> msbit) == 0 {
            msbit -= 1;
        }
        let n = self.bits - msbit;
        self.bits = msbit + 1;
        self.read_bits(n)
    }

    /// Discards any buffered bits, forcing the next read to start on a
    /// fresh byte boundary. Used after a seek on the underlying source.
    pub fn reset(&mut self) {
        self.accu = 0;
        self.bits = 0;
    }

    /// Mutable access to the wrapped source, e.g. to call `set_fpos`.
    pub fn source_mut(&mut self) -> &mut dyn ByteSource {
        &mut *self.source
    }

    /// Unwraps the reader, discarding any buffered bits.
    pub fn into_source(self) -> Box<dyn ByteSource> {
        self.source
    }
}
