//! `ferry selftest`: one push over the in-memory loopback link, optionally
//! corrupting a chunk in transit, then a byte-for-byte check of the copy.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ferry_transfer::loopback;
use ferry_transfer::{
    Destination, SessionOptions, TransferOutcome, TransferProgress, receive_file, send_reader,
};
use sha2::{Digest, Sha256};
use tracing::info;

pub struct SelftestPlan {
    pub source: Option<PathBuf>,
    pub size: u64,
    pub out: Option<PathBuf>,
    pub keep: bool,
    /// (chunk index, transmissions to corrupt)
    pub corrupt: Option<(u64, u32)>,
}

pub fn run(plan: &SelftestPlan, options: &SessionOptions) -> Result<()> {
    let (data, name) = match &plan.source {
        Some(path) => {
            let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "selftest.bin".to_owned());
            (data, name)
        }
        None => (pattern(plan.size), "selftest.bin".to_owned()),
    };
    let out = plan
        .out
        .clone()
        .unwrap_or_else(|| {
            std::env::temp_dir().join(format!("ferry-selftest-{}", std::process::id()))
        });

    let (sent, received) = transfer(&data, &name, &out, plan.corrupt, options)?;

    let on_disk = fs::read(&out).with_context(|| format!("reading back {}", out.display()))?;
    let disk_digest = hex::encode(Sha256::digest(&on_disk));
    info!(
        bytes = received.bytes,
        chunks = received.chunks,
        retransmits = received.retransmits,
        unverified = ?received.unverified_chunks,
        elapsed_ms = received.elapsed.as_millis() as u64,
        "selftest transfer done"
    );
    if !plan.keep {
        fs::remove_file(&out).with_context(|| format!("removing {}", out.display()))?;
    }

    println!(
        "{} bytes in {} chunks, {} retransmits, sha256 {}",
        received.bytes, received.chunks, received.retransmits, received.sha256
    );
    if sent.sha256 != received.sha256 || received.sha256 != disk_digest {
        if !received.is_verified() {
            println!(
                "unverified chunks {:?}: copy differs as expected",
                received.unverified_chunks
            );
            return Ok(());
        }
        bail!(
            "copy differs: sent {} received {} on disk {}",
            sent.sha256,
            received.sha256,
            disk_digest
        );
    }
    println!("copy identical");
    Ok(())
}

/// Run both sessions over a loopback pair. The sender's data writes are
/// counted so `corrupt` can hit the n-th chunk.
fn transfer(
    data: &[u8],
    name: &str,
    out: &Path,
    corrupt: Option<(u64, u32)>,
    options: &SessionOptions,
) -> Result<(TransferOutcome, TransferOutcome)> {
    let (send_end, mut recv_end) = loopback::pair(Duration::from_millis(50));
    let mut send_end = match corrupt {
        Some((chunk, times)) => {
            let mut data_writes = 0u64;
            let hit = chunk..chunk + times as u64;
            // writes 0 and 1 are BOT and the header; single bytes are control bytes
            send_end.with_fault(move |idx, bytes| {
                if idx < 2 || bytes.len() < 2 {
                    return;
                }
                if hit.contains(&data_writes) {
                    bytes[0] ^= 0xFF;
                }
                data_writes += 1;
            })
        }
        None => send_end,
    };

    let send_progress = TransferProgress::new();
    let recv_progress = TransferProgress::new();
    let destination = Destination::Path(out.to_path_buf());

    let (sent, received) = thread::scope(|s| {
        let receiver =
            s.spawn(|| receive_file(&mut recv_end, &destination, options, &recv_progress));
        let sent = send_reader(
            &mut send_end,
            Cursor::new(data),
            data.len() as u64,
            name,
            options,
            &send_progress,
        );
        (sent, receiver.join())
    });

    let received = match received {
        Ok(res) => res.context("receiver")?,
        Err(_) => bail!("receiver thread panicked"),
    };
    let sent = sent.context("sender")?;
    Ok((sent, received))
}

/// Deterministic test pattern.
fn pattern(size: u64) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}
