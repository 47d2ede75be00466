//! Structured transfer logging.
//!
//! Sessions report what happens on the wire as `TransferEvent`s. The
//! default sink forwards them to `tracing`; tests and embedders can plug in
//! their own.

use std::fmt;

/// One structured log entry.
#[derive(Debug, Clone)]
pub struct TransferLog<'a> {
    pub component: &'static str,
    pub file_name: &'a str,
    pub event: TransferEvent,
}

/// Events a session can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// BOT rendezvous finished.
    RendezvousComplete {
        stray_bytes: usize,
    },
    /// Sender: header written.
    HeaderSent {
        file_size: u32,
        chunk_size: u32,
        checksum: u32,
    },
    /// Receiver: header read and accepted.
    HeaderReceived {
        file_size: u32,
        chunk_size: u32,
        checksum_ok: bool,
    },
    /// Sender: chunk written to the link.
    ChunkSent {
        chunk_idx: u64,
        attempt: u32,
        len: usize,
    },
    /// Chunk trailer matched (receiver computed, sender told by SOK).
    ChunkVerified {
        chunk_idx: u64,
        attempt: u32,
    },
    /// Receiver: trailer did not match the payload.
    ChunkRejected {
        chunk_idx: u64,
        attempt: u32,
        carried: u32,
        computed: u32,
    },
    /// Sender: NOK verdict received.
    NokReceived {
        chunk_idx: u64,
        attempt: u32,
    },
    /// Receiver: idle budget ran out before the chunk was complete.
    ShortRead {
        chunk_idx: u64,
        attempt: u32,
        got: usize,
        expected: usize,
    },
    /// Byte other than the one awaited at a handshake point.
    Desync {
        chunk_idx: u64,
        waiting_for: &'static str,
        byte: u8,
    },
    /// A chunk ran out of attempts.
    RetryExhausted {
        chunk_idx: u64,
        attempts: u32,
        accepted: bool,
    },
    /// Receiver: payload appended to the output file.
    ChunkWritten {
        chunk_idx: u64,
        len: usize,
    },
    TransferComplete {
        total_bytes: u64,
        duration_ms: u64,
        retransmits: u64,
        sha256: String,
    },
    Error {
        message: String,
    },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RendezvousComplete { stray_bytes } => {
                write!(f, "rendezvous_complete stray={}", stray_bytes)
            }
            Self::HeaderSent { file_size, chunk_size, checksum } => {
                write!(f, "header_sent size={} chunk={} crc={:08x}", file_size, chunk_size, checksum)
            }
            Self::HeaderReceived { file_size, chunk_size, checksum_ok } => {
                write!(f, "header_received size={} chunk={} crc_ok={}", file_size, chunk_size, checksum_ok)
            }
            Self::ChunkSent { chunk_idx, attempt, len } => {
                write!(f, "chunk_sent idx={} attempt={} len={}", chunk_idx, attempt, len)
            }
            Self::ChunkVerified { chunk_idx, attempt } => {
                write!(f, "chunk_verified idx={} attempt={}", chunk_idx, attempt)
            }
            Self::ChunkRejected { chunk_idx, attempt, carried, computed } => {
                write!(
                    f,
                    "chunk_rejected idx={} attempt={} carried={} computed={}",
                    chunk_idx,
                    attempt,
                    hex::encode(carried.to_le_bytes()),
                    hex::encode(computed.to_le_bytes()),
                )
            }
            Self::NokReceived { chunk_idx, attempt } => {
                write!(f, "nok_received idx={} attempt={}", chunk_idx, attempt)
            }
            Self::ShortRead { chunk_idx, attempt, got, expected } => {
                write!(f, "short_read idx={} attempt={} got={} expected={}", chunk_idx, attempt, got, expected)
            }
            Self::Desync { chunk_idx, waiting_for, byte } => {
                write!(f, "desync idx={} waiting_for={} got=0x{:02x}", chunk_idx, waiting_for, byte)
            }
            Self::RetryExhausted { chunk_idx, attempts, accepted } => {
                write!(f, "retry_exhausted idx={} attempts={} accepted={}", chunk_idx, attempts, accepted)
            }
            Self::ChunkWritten { chunk_idx, len } => {
                write!(f, "chunk_written idx={} len={}", chunk_idx, len)
            }
            Self::TransferComplete { total_bytes, duration_ms, retransmits, sha256 } => {
                write!(
                    f,
                    "transfer_complete bytes={} duration_ms={} retransmits={} sha256={}",
                    total_bytes, duration_ms, retransmits, sha256
                )
            }
            Self::Error { message } => {
                write!(f, "error: {}", message)
            }
        }
    }
}

/// Sink for transfer events.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog<'_>);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog<'_>) {
        // info for lifecycle, warn for anything that cost a retry, debug for per-chunk spam
        match &entry.event {
            TransferEvent::RendezvousComplete { .. }
            | TransferEvent::HeaderSent { .. }
            | TransferEvent::HeaderReceived { .. }
            | TransferEvent::TransferComplete { .. } => {
                tracing::info!(
                    component = entry.component,
                    file = entry.file_name,
                    "{}",
                    entry.event,
                );
            }
            TransferEvent::ChunkRejected { .. }
            | TransferEvent::NokReceived { .. }
            | TransferEvent::ShortRead { .. }
            | TransferEvent::Desync { .. }
            | TransferEvent::RetryExhausted { .. } => {
                tracing::warn!(
                    component = entry.component,
                    file = entry.file_name,
                    "{}",
                    entry.event,
                );
            }
            TransferEvent::Error { .. } => {
                tracing::error!(
                    component = entry.component,
                    file = entry.file_name,
                    "{}",
                    entry.event,
                );
            }
            _ => {
                tracing::debug!(
                    component = entry.component,
                    file = entry.file_name,
                    "{}",
                    entry.event,
                );
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog<'_>) {}
}
