//! Crate-wide error type.
//!
//! Covers the usual device-hierarchy failure modes (end of file, invalid
//! argument, not readable/writable, timeout) plus a `Corrupted` variant for
//! malformed codec streams and a transparent `Io` variant for real
//! filesystem failures.

use thiserror::Error;

/// Errors raised anywhere in the device, decoder or scheduler stack.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Read or seek went past the end of the underlying source.
    #[error("end of file")]
    EndOfFile,

    /// A caller-supplied argument is out of range or otherwise invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The device does not support reads.
    #[error("device not readable")]
    NotReadable,

    /// The device does not support writes.
    #[error("device not writable")]
    NotWritable,

    /// The device did not respond in time.
    #[error("device timeout")]
    Timeout,

    /// The stream's contents violate the codec's invariants.
    #[error("corrupted stream: {0}")]
    Corrupted(String),

    /// A real I/O failure from the underlying OS device.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DeviceError>;
