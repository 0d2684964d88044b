use std::io;

use thiserror::Error;

/// Errors returned by the batchline runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket read or write failed. The owning connection is dropped.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Constructor options out of range (batch sizes, queue sizes, windows).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A typed read requires more bytes than the buffer currently holds.
    #[error("insufficient data: need {needed} bytes, have {available}")]
    InsufficientData {
        /// Bytes the read requires.
        needed: usize,
        /// Bytes readable at the time of the call.
        available: usize,
    },
    /// A codec reported an unrecoverable framing error. The stream cannot
    /// be resynchronized and the connection is dropped.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),
    /// The peer closed the connection (zero-length read).
    #[error("end of input")]
    EndOfInput,
}
