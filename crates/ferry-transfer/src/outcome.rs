use std::time::Duration;

/// Result of a session that reached its terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Name carried in the header.
    pub file_name: String,
    pub bytes: u64,
    /// Chunks exchanged, remainder chunk included.
    pub chunks: u64,
    /// NOK verdicts exchanged over the whole transfer.
    pub retransmits: u64,
    /// Chunks kept after running out of attempts.
    pub unverified_chunks: Vec<u64>,
    /// SHA-256 (hex) of the payload bytes sent or written.
    pub sha256: String,
    pub elapsed: Duration,
}

impl TransferOutcome {
    /// True when every chunk passed its CRC check.
    pub fn is_verified(&self) -> bool {
        self.unverified_chunks.is_empty()
    }

    pub fn throughput_bps(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}
