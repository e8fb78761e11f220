//! Device hierarchy and streaming decoders for an embedded chiptune
//! playback substrate.
//!
//! Three layers, each independently feature-gated:
//! - `devices`: [`ByteSource`](device::ByteSource), [`BlockDevice`](device::block_device::BlockDevice)
//!   and [`FileSystem`](device::filesystem::FileSystem)/[`Directory`](device::filesystem::Directory),
//!   a minimal seekable-stream/storage abstraction with no concrete FAT or
//!   SD implementation.
//! - `heatshrink`: a resumable LZSS stream decoder ([`HeatShrinkDecoder`](heatshrink::HeatShrinkDecoder))
//!   usable as a `ByteSource` over compressed files.
//! - `ymm`: the `.ymm` register-stream format ([`YmFrameDecoder`](ymm::YmFrameDecoder)),
//!   a lock-free [`FrameQueue`] and a [`PlayerScheduler`] that turns
//!   filesystem paths into decoded register frames for an external
//!   sound-chip emulator.
//!
//! This crate does not emulate a sound chip itself; [`chip::RegisterSink`]
//! is the seam an external emulator implements to receive decoded register
//! writes.
//!
//! # Quick start
//! ## Decode a `.ymm` file directly
//! ```no_run
//! # #[cfg(all(feature = "devices", feature = "ymm"))]
//! # {
//! use ymm_devices::device::file::FlatFile;
//! use ymm_devices::ymm::YmFrameDecoder;
//!
//! let source = Box::new(FlatFile::open("song.ymm").unwrap());
//! let mut decoder = YmFrameDecoder::open(source).unwrap();
//! let frame = decoder.read_frame().unwrap();
//! println!("{frame:?}");
//! # }
//! ```
//!
//! ## Drive a scheduler against a host filesystem
//! ```ignore
//! use ymm_devices::config::PlayerConfig;
//! use ymm_devices::scheduler::PlayerScheduler;
//!
//! let fs: Box<dyn ymm_devices::device::filesystem::FileSystem> = todo!();
//! let mut scheduler = PlayerScheduler::new(fs, PlayerConfig::default()).unwrap();
//! scheduler.play("/songs/intro.ymm", false);
//! loop {
//!     let wait_us = scheduler.tick();
//!     std::thread::sleep(std::time::Duration::from_micros(wait_us as u64));
//! }
//! ```

#![warn(missing_docs)]

/// Crate-wide error type and `Result` alias.
pub mod error;

#[cfg(feature = "devices")]
pub mod device; // ByteSource/BlockDevice/FileSystem hierarchy

#[cfg(feature = "heatshrink")]
pub mod heatshrink; // Resumable LZSS stream decoder

#[cfg(feature = "ymm")]
pub mod bit_reader; // MSB-first bit reader shared by the .ymm decoder
#[cfg(feature = "ymm")]
pub mod chip; // RegisterSink collaborator interface and AY/YM register map
#[cfg(feature = "ymm")]
pub mod config; // PlayerConfig (JSON-serializable scheduler tunables)
#[cfg(feature = "ymm")]
pub mod queue; // Lock-free SPSC frame queue
#[cfg(feature = "ymm")]
pub mod scheduler; // PlayerScheduler state machine
#[cfg(feature = "ymm")]
pub mod ymm; // .ymm header parsing and per-frame register decoding

pub use error::{DeviceError, Result};

#[cfg(feature = "ymm")]
pub use scheduler::{PlaybackState, PlayerScheduler};
