//! Progress counters shared between a running session and an observer
//! thread, plus the cooperative cancellation flag.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

/// Session state constants.
pub const STATE_IDLE: u8 = 0;
pub const STATE_HANDSHAKE: u8 = 1;
pub const STATE_TRANSFERRING: u8 = 2;
pub const STATE_COMPLETE: u8 = 3;
pub const STATE_ERROR: u8 = 4;
pub const STATE_CANCELLED: u8 = 5;

#[derive(Debug, Default)]
pub struct TransferProgress {
    pub bytes_done: AtomicU64,
    pub bytes_total: AtomicU64,
    pub state: AtomicU8,
    pub cancelled: AtomicBool,
    pub chunks_complete: AtomicU64,
    pub chunks_total: AtomicU64,
    pub retransmits: AtomicU64,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the session to stop at its next read.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> u8 {
        self.state.load(Ordering::Relaxed)
    }

    pub(crate) fn set_state(&self, state: u8) {
        self.state.store(state, Ordering::Relaxed);
    }

    pub(crate) fn begin(&self, bytes_total: u64, chunks_total: u64) {
        self.bytes_total.store(bytes_total, Ordering::Relaxed);
        self.chunks_total.store(chunks_total, Ordering::Relaxed);
        self.bytes_done.store(0, Ordering::Relaxed);
        self.chunks_complete.store(0, Ordering::Relaxed);
        self.retransmits.store(0, Ordering::Relaxed);
        self.set_state(STATE_TRANSFERRING);
    }

    pub(crate) fn chunk_done(&self, payload_len: usize) {
        self.bytes_done
            .fetch_add(payload_len as u64, Ordering::Relaxed);
        self.chunks_complete.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn retransmit(&self) {
        self.retransmits.fetch_add(1, Ordering::Relaxed);
    }

    /// Fraction complete in 0.0..=1.0. An empty file counts by chunks.
    pub fn fraction(&self) -> f64 {
        let total = self.bytes_total.load(Ordering::Relaxed);
        if total > 0 {
            return self.bytes_done.load(Ordering::Relaxed) as f64 / total as f64;
        }
        let chunks = self.chunks_total.load(Ordering::Relaxed);
        if chunks == 0 {
            0.0
        } else {
            self.chunks_complete.load(Ordering::Relaxed) as f64 / chunks as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters() {
        let p = TransferProgress::new();
        assert_eq!(p.state(), STATE_IDLE);
        p.begin(120, 3);
        assert_eq!(p.state(), STATE_TRANSFERRING);
        p.chunk_done(60);
        p.retransmit();
        assert_eq!(p.bytes_done.load(Ordering::Relaxed), 60);
        assert_eq!(p.retransmits.load(Ordering::Relaxed), 1);
        assert!((p.fraction() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_file_fraction() {
        let p = TransferProgress::new();
        p.begin(0, 1);
        assert_eq!(p.fraction(), 0.0);
        p.chunk_done(0);
        assert_eq!(p.fraction(), 1.0);
    }

    #[test]
    fn cancel_flag() {
        let p = TransferProgress::new();
        assert!(!p.is_cancelled());
        p.cancel();
        assert!(p.is_cancelled());
    }
}
