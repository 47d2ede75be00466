//! Pull direction: link -> local file.
//!
//! ```text
//! AwaitBOT          discard until BOT, echo it (EOT first: declined)
//! ReadHeader        exactly 88 bytes, decode, open the output file
//! ReceiveChunk*     EOT -> read chunk -> CRC check -> SYNC barrier -> SOK | NOK
//! ReceiveRemainder  same exchange, remainder+4 bytes
//! Done              output flushed and closed
//! ```
//!
//! The output file is created only after a valid header arrives and is
//! removed again if the session fails.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use sha2::{Digest, Sha256};

use crate::config::{RetryExhaustion, SessionOptions};
use crate::control::ControlByte;
use crate::error::TransferError;
use crate::header::{HEADER_LEN, HeaderError, TRAILER_LEN, TransferHeader};
use crate::link::Link;
use crate::logging::{TransferEvent, TransferLog};
use crate::outcome::TransferOutcome;
use crate::plan::ChunkPlan;
use crate::progress::{
    STATE_CANCELLED, STATE_COMPLETE, STATE_ERROR, STATE_HANDSHAKE, TransferProgress,
};

const COMPONENT: &str = "receiver";

/// Where received bytes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Write to exactly this path, whatever name the header carries.
    Path(PathBuf),
    /// Write to `<dir>/<header file name>`. The name must be a bare file name.
    Directory(PathBuf),
}

impl Destination {
    pub fn resolve(&self, header: &TransferHeader) -> Result<PathBuf, TransferError> {
        match self {
            Destination::Path(path) => Ok(path.clone()),
            Destination::Directory(dir) => {
                if !header.is_safe_file_name() {
                    return Err(HeaderError::UnsafeName(header.file_name.clone()).into());
                }
                Ok(dir.join(&header.file_name))
            }
        }
    }
}

/// Receive one file into `destination`. Blocks until the remainder chunk is
/// handled or the session fails.
pub fn receive_file<L: Read + Write>(
    link: &mut L,
    destination: &Destination,
    options: &SessionOptions,
    progress: &TransferProgress,
) -> Result<TransferOutcome, TransferError> {
    options.transfer.validate()?;

    let mut session = ReceiveSession {
        link: Link::new(link, options.transfer.wait, &progress.cancelled),
        options,
        progress,
        name: String::new(),
        retransmits: 0,
        unverified: Vec::new(),
    };

    let mut created: Option<PathBuf> = None;
    let result = session.run(destination, &mut created);
    match &result {
        Ok(_) => progress.set_state(STATE_COMPLETE),
        Err(e) => {
            if let Some(path) = created.as_deref() {
                discard_partial(path);
            }
            if matches!(e, TransferError::Cancelled) {
                progress.set_state(STATE_CANCELLED);
            } else {
                progress.set_state(STATE_ERROR);
                session.log(TransferEvent::Error {
                    message: e.to_string(),
                });
            }
        }
    }
    result
}

/// Pull `remote_path` into `local_path` with a throwaway progress tracker.
pub fn run_receive<L: Read + Write>(
    stream: &mut L,
    remote_path: &str,
    local_path: impl AsRef<Path>,
    options: &SessionOptions,
) -> Result<TransferOutcome, TransferError> {
    let destination = Destination::Path(local_path.as_ref().to_path_buf());
    let outcome = receive_file(stream, &destination, options, &TransferProgress::new())?;
    if outcome.file_name != remote_path {
        tracing::warn!(
            requested = remote_path,
            announced = %outcome.file_name,
            "peer sent a different file name than requested"
        );
    }
    Ok(outcome)
}

fn discard_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial output"),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not remove partial output")
        }
    }
}

struct ReceiveSession<'a, L> {
    link: Link<'a, L>,
    options: &'a SessionOptions,
    progress: &'a TransferProgress,
    /// Empty until the header is decoded.
    name: String,
    retransmits: u64,
    unverified: Vec<u64>,
}

impl<L: Read + Write> ReceiveSession<'_, L> {
    fn log(&self, event: TransferEvent) {
        self.options.logger.log(TransferLog {
            component: COMPONENT,
            file_name: &self.name,
            event,
        });
    }

    fn run(
        &mut self,
        destination: &Destination,
        created: &mut Option<PathBuf>,
    ) -> Result<TransferOutcome, TransferError> {
        // ── AwaitBOT / EchoBOT ─────────────────────────────────────────
        // A responder that cannot serve the request answers with text and
        // EOT where BOT would be.
        self.progress.set_state(STATE_HANDSHAKE);
        let mut reply = Vec::new();
        let (first, stray_bytes) = self.link.wait_for_any(
            &[ControlByte::Bot, ControlByte::Eot],
            "BOT",
            |b| reply.push(b),
        )?;
        if first == ControlByte::Eot {
            let text = String::from_utf8_lossy(&reply);
            return Err(TransferError::Declined(text.trim().to_owned()));
        }
        self.link.send_control(ControlByte::Bot)?;
        self.log(TransferEvent::RendezvousComplete { stray_bytes });

        // ── ReadHeader ─────────────────────────────────────────────────
        let mut raw = [0u8; HEADER_LEN];
        if self.link.read_counted(&mut raw)? < HEADER_LEN {
            return Err(TransferError::LinkTimeout {
                waiting_for: "header",
            });
        }
        let crc = &self.options.crc;
        let header = TransferHeader::decode(&raw, crc, self.options.transfer.header_validation)?;
        self.name = header.file_name.clone();
        self.log(TransferEvent::HeaderReceived {
            file_size: header.file_size,
            chunk_size: header.chunk_size,
            checksum_ok: header.compute_checksum(crc).is_ok_and(|c| c == header.checksum),
        });

        let plan = ChunkPlan::new(header.file_size as u64, header.chunk_size)?;
        let path = destination.resolve(&header)?;
        let file = File::create(&path).map_err(TransferError::local(&path))?;
        *created = Some(path.clone());
        let mut out = BufWriter::new(file);

        // ── Chunks ─────────────────────────────────────────────────────
        let start = Instant::now();
        self.progress.begin(plan.file_size, plan.wire_chunks());
        let mut hasher = Sha256::new();
        let mut frame = vec![0u8; plan.chunk_size];

        for idx in 0..plan.wire_chunks() {
            let len = plan.payload_len(idx);
            self.receive_chunk(idx, &mut frame[..len + TRAILER_LEN])?;

            out.write_all(&frame[..len])
                .map_err(TransferError::local(&path))?;
            hasher.update(&frame[..len]);
            self.log(TransferEvent::ChunkWritten {
                chunk_idx: idx,
                len,
            });
            self.progress.chunk_done(len);
        }

        out.flush().map_err(TransferError::local(&path))?;
        drop(out);

        let outcome = TransferOutcome {
            file_name: header.file_name,
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

    /// Fill `frame` (payload + trailer) with one verified chunk, or with the
    /// last attempt's bytes when exhaustion is accepted.
    fn receive_chunk(&mut self, idx: u64, frame: &mut [u8]) -> Result<(), TransferError> {
        let options = self.options;
        let retry_limit = options.transfer.retry_limit;
        let payload_len = frame.len() - TRAILER_LEN;

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            self.link.send_control(ControlByte::Eot)?;
            let got = self.link.read_counted(frame)?;

            // None: nothing to compare, the chunk never fully arrived.
            let check = if got == frame.len() {
                let (payload, trailer) = frame.split_at(payload_len);
                let mut carried = [0u8; TRAILER_LEN];
                carried.copy_from_slice(trailer);
                Some((u32::from_le_bytes(carried), options.crc.checksum(payload)))
            } else {
                self.log(TransferEvent::ShortRead {
                    chunk_idx: idx,
                    attempt,
                    got,
                    expected: frame.len(),
                });
                None
            };

            // SYNC barrier: the sender must echo it before it hears a verdict.
            self.link.send_control(ControlByte::Sync)?;
            let name = self.name.as_str();
            self.link.wait_for(ControlByte::Sync, "SYNC echo", |byte| {
                options.logger.log(TransferLog {
                    component: COMPONENT,
                    file_name: name,
                    event: TransferEvent::Desync {
                        chunk_idx: idx,
                        waiting_for: "SYNC",
                        byte,
                    },
                })
            })?;

            if let Some((carried, computed)) = check {
                if carried == computed {
                    self.link.send_control(ControlByte::Sok)?;
                    self.log(TransferEvent::ChunkVerified {
                        chunk_idx: idx,
                        attempt,
                    });
                    return Ok(());
                }
                self.log(TransferEvent::ChunkRejected {
                    chunk_idx: idx,
                    attempt,
                    carried,
                    computed,
                });
            }

            self.link.send_control(ControlByte::Nok)?;
            self.retransmits += 1;
            self.progress.retransmit();

            if attempt >= retry_limit {
                return self.exhausted(idx, attempt);
            }
        }
    }

    fn exhausted(&mut self, idx: u64, attempts: u32) -> Result<(), TransferError> {
        let accepted = self.options.transfer.retry_exhaustion == RetryExhaustion::AcceptUnverified;
        self.log(TransferEvent::RetryExhausted {
            chunk_idx: idx,
            attempts,
            accepted,
        });
        if !accepted {
            return Err(TransferError::RetryExhausted {
                chunk: idx,
                attempts,
            });
        }
        self.unverified.push(idx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::Crc32;

    fn header(name: &str) -> TransferHeader {
        TransferHeader::new(name, 10, 64, &Crc32::standard()).unwrap()
    }

    #[test]
    fn path_destination_ignores_header_name() {
        let dest = Destination::Path(PathBuf::from("/tmp/out.bin"));
        assert_eq!(
            dest.resolve(&header("../../etc/passwd")).unwrap(),
            PathBuf::from("/tmp/out.bin")
        );
    }

    #[test]
    fn directory_destination_joins_safe_name() {
        let dest = Destination::Directory(PathBuf::from("/srv/in"));
        assert_eq!(
            dest.resolve(&header("report.txt")).unwrap(),
            PathBuf::from("/srv/in/report.txt")
        );
    }

    #[test]
    fn directory_destination_rejects_traversal() {
        let dest = Destination::Directory(PathBuf::from("/srv/in"));
        for name in ["..", "a/b", "..\\x", "c:evil"] {
            let err = dest.resolve(&header(name)).unwrap_err();
            assert!(
                matches!(err, TransferError::Header(HeaderError::UnsafeName(ref n)) if n == name),
                "{name}: {err}"
            );
        }
    }
}
