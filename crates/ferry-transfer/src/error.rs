//! Session error type.
//!
//! A chunk CRC mismatch is not an error: it is handled inside the retry loop
//! and only shows up as a `ChunkRejected` event and a retransmission count.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::header::HeaderError;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Non-timeout failure on the byte stream.
    #[error("link I/O error: {0}")]
    Link(#[source] io::Error),

    /// A bounded wait ran out of idle reads or stray-byte allowance.
    #[error("timed out waiting for {waiting_for}")]
    LinkTimeout { waiting_for: &'static str },

    #[error("transfer cancelled")]
    Cancelled,

    /// The peer closed its reply with EOT instead of starting a transfer.
    /// Carries the text it sent before the EOT.
    #[error("peer declined the transfer: {0}")]
    Declined(String),

    #[error("bad transfer header: {0}")]
    Header(#[from] HeaderError),

    #[error("chunk {chunk} failed verification {attempts} times")]
    RetryExhausted { chunk: u64, attempts: u32 },

    #[error("local file {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransferError {
    pub(crate) fn local(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::LocalIo { path, source }
    }
}
