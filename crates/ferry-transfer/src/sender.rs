//! Push direction: local file -> link.
//!
//! ```text
//! AwaitPeerReady    write BOT, wait for the echo
//! SendHeader        88-byte header, unacknowledged
//! SendFullChunk*    wait EOT -> payload+trailer -> wait SYNC -> echo SYNC -> SOK | NOK
//! SendRemainder     same exchange, remainder+4 bytes (4 when the file divides evenly)
//! Done              file closed, nothing further on the wire
//! ```

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use sha2::{Digest, Sha256};

use crate::config::{RetryExhaustion, SessionOptions};
use crate::control::ControlByte;
use crate::error::TransferError;
use crate::header::{TRAILER_LEN, TransferHeader};
use crate::link::Link;
use crate::logging::{TransferEvent, TransferLog};
use crate::outcome::TransferOutcome;
use crate::plan::ChunkPlan;
use crate::progress::{
    STATE_CANCELLED, STATE_COMPLETE, STATE_ERROR, STATE_HANDSHAKE, TransferProgress,
};

const COMPONENT: &str = "sender";

/// Push `local_path` to the peer, announcing it as `remote_name`. Blocks
/// until the remainder chunk is acknowledged or the session fails.
pub fn send_file<L: Read + Write>(
    link: &mut L,
    local_path: &Path,
    remote_name: &str,
    options: &SessionOptions,
    progress: &TransferProgress,
) -> Result<TransferOutcome, TransferError> {
    options.transfer.validate()?;
    let file = File::open(local_path).map_err(TransferError::local(local_path))?;
    let file_size = file
        .metadata()
        .map_err(TransferError::local(local_path))?
        .len();

    // file handle is dropped (closed) on every exit path
    send_source(
        link,
        BufReader::new(file),
        local_path,
        file_size,
        remote_name,
        options,
        progress,
    )
}

/// Push `file_size` bytes read from `source`.
pub fn send_reader<L: Read + Write, R: Read>(
    link: &mut L,
    source: R,
    file_size: u64,
    remote_name: &str,
    options: &SessionOptions,
    progress: &TransferProgress,
) -> Result<TransferOutcome, TransferError> {
    options.transfer.validate()?;
    send_source(
        link,
        source,
        Path::new("-"),
        file_size,
        remote_name,
        options,
        progress,
    )
}

/// Push with a throwaway progress tracker.
pub fn run_send<L: Read + Write>(
    stream: &mut L,
    local_path: impl AsRef<Path>,
    remote_name: &str,
    options: &SessionOptions,
) -> Result<TransferOutcome, TransferError> {
    send_file(
        stream,
        local_path.as_ref(),
        remote_name,
        options,
        &TransferProgress::new(),
    )
}

fn send_source<L: Read + Write, R: Read>(
    link: &mut L,
    mut source: R,
    source_path: &Path,
    file_size: u64,
    remote_name: &str,
    options: &SessionOptions,
    progress: &TransferProgress,
) -> Result<TransferOutcome, TransferError> {
    let cfg = &options.transfer;

    // Validate everything local before the first byte goes out.
    let header = TransferHeader::new(remote_name, file_size, cfg.chunk_size, &options.crc)?;
    let plan = ChunkPlan::new(file_size, cfg.chunk_size)?;

    let mut session = SendSession {
        link: Link::new(link, cfg.wait, &progress.cancelled),
        options,
        progress,
        name: remote_name,
        source_path: source_path.to_path_buf(),
        retransmits: 0,
        unverified: Vec::new(),
    };

    let result = session.run(&mut source, &header, &plan);
    match &result {
        Ok(_) => progress.set_state(STATE_COMPLETE),
        Err(TransferError::Cancelled) => progress.set_state(STATE_CANCELLED),
        Err(e) => {
            progress.set_state(STATE_ERROR);
            session.log(TransferEvent::Error {
                message: e.to_string(),
            });
        }
    }
    result
}

struct SendSession<'a, L> {
    link: Link<'a, L>,
    options: &'a SessionOptions,
    progress: &'a TransferProgress,
    name: &'a str,
    source_path: PathBuf,
    retransmits: u64,
    unverified: Vec<u64>,
}

impl<L: Read + Write> SendSession<'_, L> {
    fn log(&self, event: TransferEvent) {
        self.options.logger.log(TransferLog {
            component: COMPONENT,
            file_name: self.name,
            event,
        });
    }

    fn run<R: Read>(
        &mut self,
        source: &mut R,
        header: &TransferHeader,
        plan: &ChunkPlan,
    ) -> Result<TransferOutcome, TransferError> {
        // ── AwaitPeerReady ─────────────────────────────────────────────
        self.progress.set_state(STATE_HANDSHAKE);
        self.link.send_control(ControlByte::Bot)?;
        let stray_bytes = self.link.wait_for(ControlByte::Bot, "BOT echo", |_| {})?;
        self.log(TransferEvent::RendezvousComplete { stray_bytes });

        // ── SendHeader ─────────────────────────────────────────────────
        self.link.send(&header.encode()?)?;
        self.log(TransferEvent::HeaderSent {
            file_size: header.file_size,
            chunk_size: header.chunk_size,
            checksum: header.checksum,
        });

        // ── Chunks ─────────────────────────────────────────────────────
        let start = Instant::now();
        self.progress.begin(plan.file_size, plan.wire_chunks());
        let mut hasher = Sha256::new();
        let mut frame = vec![0u8; plan.chunk_size];

        for idx in 0..plan.wire_chunks() {
            let len = plan.payload_len(idx);
            source
                .read_exact(&mut frame[..len])
                .map_err(TransferError::local(&self.source_path))?;
            hasher.update(&frame[..len]);

            let trailer = self.options.crc.checksum(&frame[..len]);
            frame[len..len + TRAILER_LEN].copy_from_slice(&trailer.to_le_bytes());

            self.send_chunk(idx, &frame[..len + TRAILER_LEN])?;
            self.progress.chunk_done(len);
        }

        let outcome = TransferOutcome {
            file_name: self.name.to_owned(),
            bytes: plan.file_size,
            chunks: plan.wire_chunks(),
            retransmits: self.retransmits,
            unverified_chunks: std::mem::take(&mut self.unverified),
            sha256: hex::encode(hasher.finalize()),
            elapsed: start.elapsed(),
        };
        self.log(TransferEvent::TransferComplete {
            total_bytes: outcome.bytes,
            duration_ms: outcome.elapsed.as_millis() as u64,
            retransmits: outcome.retransmits,
            sha256: outcome.sha256.clone(),
        });
        Ok(outcome)
    }

    /// Deliver one chunk with stop-and-wait retries.
    fn send_chunk(&mut self, idx: u64, wire: &[u8]) -> Result<(), TransferError> {
        let retry_limit = self.options.transfer.retry_limit;
        let options = self.options;
        let logger = &options.logger;
        let name = self.name;
        let desync = |waiting_for: &'static str| {
            move |byte: u8| {
                logger.log(TransferLog {
                    component: COMPONENT,
                    file_name: name,
                    event: TransferEvent::Desync {
                        chunk_idx: idx,
                        waiting_for,
                        byte,
                    },
                })
            }
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            // Receiver asks for data with EOT; anything before it is console
            // chatter or leftovers from a previous exchange.
            let skipped = self.link.wait_for(ControlByte::Eot, "data request (EOT)", |_| {})?;
            if skipped > 0 {
                tracing::debug!(chunk = idx, skipped, "discarded bytes before data request");
            }

            self.link.send(wire)?;
            self.log(TransferEvent::ChunkSent {
                chunk_idx: idx,
                attempt,
                len: wire.len(),
            });

            self.link
                .wait_for(ControlByte::Sync, "SYNC barrier", desync("SYNC"))?;
            self.link.send_control(ControlByte::Sync)?;

            let (verdict, _) = self.link.wait_for_any(
                &[ControlByte::Sok, ControlByte::Nok],
                "verdict",
                desync("verdict"),
            )?;

            if verdict == ControlByte::Sok {
                self.log(TransferEvent::ChunkVerified {
                    chunk_idx: idx,
                    attempt,
                });
                return Ok(());
            }

            self.retransmits += 1;
            self.progress.retransmit();
            self.log(TransferEvent::NokReceived {
                chunk_idx: idx,
                attempt,
            });

            if attempt >= retry_limit {
                return self.exhausted(idx, attempt);
            }
        }
    }

    fn exhausted(&mut self, idx: u64, attempts: u32) -> Result<(), TransferError> {
        match self.options.transfer.retry_exhaustion {
            RetryExhaustion::Abort => {
                self.log(TransferEvent::RetryExhausted {
                    chunk_idx: idx,
                    attempts,
                    accepted: false,
                });
                Err(TransferError::RetryExhausted {
                    chunk: idx,
                    attempts,
                })
            }
            RetryExhaustion::AcceptUnverified => {
                self.log(TransferEvent::RetryExhausted {
                    chunk_idx: idx,
                    attempts,
                    accepted: true,
                });
                self.unverified.push(idx);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::config::TransferConfig;
    use crate::header::HEADER_LEN;
    use crate::logging::TransferLogger;
    use crate::loopback;

    #[derive(Default)]
    struct Capture(Mutex<Vec<TransferEvent>>);

    impl TransferLogger for Capture {
        fn log(&self, entry: TransferLog<'_>) {
            self.0.lock().unwrap().push(entry.event);
        }
    }

    fn read_n(end: &mut impl Read, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            if let Ok(got) = end.read(&mut buf[filled..]) {
                filled += got;
            }
        }
        buf
    }

    #[test]
    fn stray_bytes_at_handshake_points_are_ignored() {
        let (mut a, mut peer) = loopback::pair(Duration::from_millis(10));
        let capture = Arc::new(Capture::default());
        let options = SessionOptions::new(TransferConfig::default()).with_logger(capture.clone());

        let peer = std::thread::spawn(move || {
            assert_eq!(read_n(&mut peer, 1), [0x02]);
            peer.write_all(b"boot chatter\x02").unwrap();
            let header = read_n(&mut peer, HEADER_LEN);
            peer.write_all(b"\r\n\x01").unwrap();
            let chunk = read_n(&mut peer, 4);
            peer.write_all(b"?\x04").unwrap();
            assert_eq!(read_n(&mut peer, 1), [0x04]);
            // OK is not a verdict
            peer.write_all(&[0x05, 0x07]).unwrap();
            (header, chunk)
        });

        let outcome = send_reader(
            &mut a,
            Cursor::new(Vec::new()),
            0,
            "empty",
            &options,
            &TransferProgress::new(),
        )
        .unwrap();
        let (header, chunk) = peer.join().unwrap();

        assert_eq!(outcome.chunks, 1);
        assert_eq!(&header[12..17], b"empty");
        assert_eq!(chunk, options.crc.checksum(&[]).to_le_bytes());

        let events = capture.0.lock().unwrap();
        assert!(events.contains(&TransferEvent::RendezvousComplete { stray_bytes: 12 }));
        assert!(events.contains(&TransferEvent::Desync {
            chunk_idx: 0,
            waiting_for: "SYNC",
            byte: b'?',
        }));
        assert!(events.contains(&TransferEvent::Desync {
            chunk_idx: 0,
            waiting_for: "verdict",
            byte: 0x05,
        }));
    }

    #[test]
    fn oversize_name_fails_before_link_use() {
        let (mut a, _peer) = loopback::pair(Duration::from_millis(5));
        let name = "n".repeat(64);
        let err = send_reader(
            &mut a,
            Cursor::new(vec![1u8; 10]),
            10,
            &name,
            &SessionOptions::default(),
            &TransferProgress::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TransferError::Header(crate::header::HeaderError::NameTooLong(64))
        ));
        assert_eq!(a.writes(), 0);
    }
}
