//! Session configuration.
//!
//! Both ends of a transfer must agree on `retry_limit` and
//! `retry_exhaustion`: they count the same NOK bytes and leave the retry
//! loop on the same attempt only when configured alike.

use std::sync::Arc;

use crate::crc::Crc32;
use crate::error::TransferError;
use crate::header::{HeaderValidation, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crate::logging::{TracingLogger, TransferLogger};

/// Wire chunk size expected by small-buffer peers (60 payload bytes).
pub const DEFAULT_CHUNK_SIZE: u32 = 64;

/// Attempts per chunk before `RetryExhaustion` applies.
pub const DEFAULT_RETRY_LIMIT: u32 = 2;

/// Consecutive idle reads tolerated by a wait. At the serial link's 0.5 s
/// read timeout this is one minute.
pub const DEFAULT_MAX_IDLE_READS: u32 = 120;

/// Unexpected bytes discarded by a single wait before it gives up.
pub const DEFAULT_MAX_STRAY_BYTES: usize = 64 * 1024;

/// What a session does when a chunk fails `retry_limit` times in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryExhaustion {
    /// Fail the transfer with `TransferError::RetryExhausted`.
    #[default]
    Abort,
    /// Keep the last received bytes, record the chunk as unverified and
    /// carry on with the next chunk.
    AcceptUnverified,
}

/// Bounds for every "read until byte X" wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitBudget {
    pub max_idle_reads: u32,
    pub max_stray_bytes: usize,
}

impl Default for WaitBudget {
    fn default() -> Self {
        Self {
            max_idle_reads: DEFAULT_MAX_IDLE_READS,
            max_stray_bytes: DEFAULT_MAX_STRAY_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Wire chunk size including the 4-byte trailer. Only the sender's value
    /// matters; the receiver takes it from the header.
    pub chunk_size: u32,
    pub retry_limit: u32,
    pub header_validation: HeaderValidation,
    pub retry_exhaustion: RetryExhaustion,
    pub wait: WaitBudget,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_limit: DEFAULT_RETRY_LIMIT,
            header_validation: HeaderValidation::Strict,
            retry_exhaustion: RetryExhaustion::Abort,
            wait: WaitBudget::default(),
        }
    }
}

impl TransferConfig {
    /// Settings compatible with peers that never seal the header checksum
    /// and never give up on a chunk.
    pub fn lenient() -> Self {
        Self {
            header_validation: HeaderValidation::Lenient,
            retry_exhaustion: RetryExhaustion::AcceptUnverified,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(TransferError::Config(format!(
                "chunk size {} outside {}..={}",
                self.chunk_size, MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
        if self.retry_limit == 0 {
            return Err(TransferError::Config("retry limit must be at least 1".into()));
        }
        if self.wait.max_idle_reads == 0 {
            return Err(TransferError::Config(
                "wait budget must allow at least one idle read".into(),
            ));
        }
        Ok(())
    }
}

/// Everything a session needs besides the link and the file.
#[derive(Clone)]
pub struct SessionOptions {
    pub transfer: TransferConfig,
    pub crc: Crc32,
    pub logger: Arc<dyn TransferLogger>,
}

impl SessionOptions {
    pub fn new(transfer: TransferConfig) -> Self {
        Self {
            transfer,
            ..Self::default()
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.logger = logger;
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            transfer: TransferConfig::default(),
            crc: Crc32::standard(),
            logger: Arc::new(TracingLogger),
        }
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("transfer", &self.transfer)
            .field("crc", &self.crc)
            .finish_non_exhaustive()
    }
}
