//! `.ymm` music register stream: per-register backref/RLE rings feeding a
//! 16-register-per-frame decoder.

/// Per-register RLE/backref decoding ring.
pub mod backref_ring;
/// `.ymm` header parsing and per-frame decoding.
pub mod frame_decoder;

pub use backref_ring::YmBackrefRing;
pub use frame_decoder::{YmFrameDecoder, YmmHeader};
