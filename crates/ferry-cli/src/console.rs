//! `ferry connect`: keyboard-driven console.
//!
//! Every line typed is forwarded to the peer first, so both ends see the
//! same command. The console then plays its half: transfers run the
//! matching session, everything else just prints what the peer answers up
//! to its EOT.

use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use ferry_transfer::link::Link;
use ferry_transfer::{
    ControlByte, SessionOptions, TransferError, TransferOutcome, TransferProgress, run_receive,
    run_send,
};
use tracing::{info, warn};

use crate::command::{Command, CommandError};

/// Run the console until QUIT or end of input. Local file names are
/// relative to the working directory.
pub fn run<L: Read + Write>(link: &mut L, options: &SessionOptions) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let local_dir = Path::new(".");
    prompt()?;
    for line in stdin.lock().lines() {
        let line = line.context("reading keyboard input")?;
        match handle_line(link, options, local_dir, &line, &mut stdout.lock())? {
            Flow::Continue => prompt()?,
            Flow::Quit => return Ok(()),
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn prompt() -> Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "> ")?;
    out.flush()?;
    Ok(())
}

/// Forward `line` to the peer and play the console's half of it. Local
/// files resolve against `local_dir`; everything shown goes to `out`.
fn handle_line<L: Read + Write, W: Write>(
    link: &mut L,
    options: &SessionOptions,
    local_dir: &Path,
    line: &str,
    out: &mut W,
) -> Result<Flow> {
    let cmd = match Command::parse(line) {
        Ok(cmd) => cmd,
        Err(CommandError::Empty) => return Ok(Flow::Continue),
        Err(e) => {
            // never forwarded: the peer's line buffer is bounded too
            writeln!(out, "rejected: {e}")?;
            return Ok(Flow::Continue);
        }
    };

    link.write_all(line.trim_end().as_bytes())
        .and_then(|_| link.write_all(b"\n"))
        .and_then(|_| link.flush())
        .context("forwarding command")?;

    match cmd {
        Command::Help | Command::Dir => drain(link, options, out)?,
        Command::Ldir => {
            writeln!(out, "local:")?;
            out.write_all(dir_listing(local_dir)?.as_bytes())?;
            writeln!(out, "remote:")?;
            drain(link, options, out)?;
        }
        Command::Atoh { remote, local } => {
            writeln!(out, "receiving {remote} as {local}")?;
            let result = run_receive(link, &remote, local_dir.join(&local), options);
            // a declined pull already consumed the reply and its EOT
            let declined = matches!(result, Err(TransferError::Declined(_)));
            report(result, out)?;
            if !declined {
                drain(link, options, out)?;
            }
        }
        Command::Htoa { local, remote } => {
            writeln!(out, "sending {local} as {remote}")?;
            report(run_send(link, local_dir.join(&local), &remote, options), out)?;
            drain(link, options, out)?;
        }
        Command::Quit => {
            drain(link, options, out)?;
            return Ok(Flow::Quit);
        }
        Command::Unknown(verb) => {
            writeln!(out, "unknown command {verb}")?;
            drain(link, options, out)?;
        }
    }
    Ok(Flow::Continue)
}

fn report(result: Result<TransferOutcome, TransferError>, out: &mut impl Write) -> Result<()> {
    match result {
        Ok(outcome) => {
            info!(
                file = %outcome.file_name,
                bytes = outcome.bytes,
                chunks = outcome.chunks,
                retransmits = outcome.retransmits,
                bps = outcome.throughput_bps(),
                "transfer finished"
            );
            if outcome.is_verified() {
                writeln!(out, "done: {} bytes, sha256 {}", outcome.bytes, outcome.sha256)?;
            } else {
                writeln!(
                    out,
                    "done with unverified chunks {:?}: {} bytes, sha256 {}",
                    outcome.unverified_chunks, outcome.bytes, outcome.sha256
                )?;
            }
        }
        Err(e) => {
            warn!(error = %e, "transfer failed");
            writeln!(out, "transfer failed: {e}")?;
        }
    }
    Ok(())
}

/// Copy peer output to `out` until its EOT. A peer that never finishes is
/// logged, a failing `out` is returned.
fn drain<L: Read + Write>(
    link: &mut L,
    options: &SessionOptions,
    out: &mut impl Write,
) -> Result<()> {
    let progress = TransferProgress::new();
    let mut link = Link::new(link, options.transfer.wait, &progress.cancelled);
    let mut write_err = None;
    let res = link.wait_for(ControlByte::Eot, "end of response", |b| {
        if write_err.is_none() {
            write_err = out.write_all(&[b]).err();
        }
    });
    if let Some(e) = write_err {
        return Err(e).context("printing peer output");
    }
    out.flush().context("printing peer output")?;
    if let Err(e) = res {
        // a silent peer is not fatal to the console
        warn!(error = %e, "peer did not finish its response");
    }
    Ok(())
}

/// Entries of `dir`, one per line, sorted.
pub fn dir_listing(dir: &Path) -> Result<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    let mut out = String::new();
    for name in names {
        out.push_str(&name);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ferry_transfer::loopback;
    use sha2::{Digest, Sha256};

    use crate::responder;

    /// Accepts `limit` bytes, then fails every write.
    struct BrokenPipe {
        limit: usize,
        taken: Vec<u8>,
    }

    impl Write for BrokenPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.taken.len() + buf.len() > self.limit {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.taken.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn line(console: &mut loopback::LoopbackEnd, local_dir: &Path, text: &str) -> (Flow, String) {
        let mut out = Vec::new();
        let flow = handle_line(console, &SessionOptions::default(), local_dir, text, &mut out)
            .unwrap();
        (flow, String::from_utf8(out).unwrap())
    }

    #[test]
    fn listing_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"").unwrap();
        fs::write(dir.path().join("a.txt"), b"").unwrap();
        assert_eq!(dir_listing(dir.path()).unwrap(), "a.txt\nb.txt\n");
    }

    #[test]
    fn help_is_forwarded_then_drained() {
        let dir = tempfile::tempdir().unwrap();
        let (mut console, mut peer) = loopback::pair(Duration::from_millis(20));
        peer.write_all(b"help text\x01").unwrap();

        let (flow, printed) = line(&mut console, dir.path(), "help");
        assert_eq!(flow, Flow::Continue);
        assert_eq!(printed, "help text");

        let mut forwarded = [0u8; 5];
        peer.read_exact(&mut forwarded).unwrap();
        assert_eq!(&forwarded, b"help\n");
    }

    #[test]
    fn oversize_line_not_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let (mut console, mut peer) = loopback::pair(Duration::from_millis(5));
        let (flow, printed) = line(&mut console, dir.path(), &"x".repeat(300));
        assert_eq!(flow, Flow::Continue);
        assert!(printed.starts_with("rejected:"), "{printed}");
        let mut buf = [0u8; 1];
        assert!(peer.read(&mut buf).is_err());
    }

    #[test]
    fn quit_ends_console() {
        let dir = tempfile::tempdir().unwrap();
        let (mut console, mut peer) = loopback::pair(Duration::from_millis(20));
        peer.write_all(b"bye\x01").unwrap();
        assert_eq!(line(&mut console, dir.path(), "QUIT").0, Flow::Quit);
    }

    #[test]
    fn ldir_lists_local_dir_then_peer() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("here.txt"), b"").unwrap();
        let (mut console, mut peer) = loopback::pair(Duration::from_millis(20));
        peer.write_all(b"there.txt\n\x01").unwrap();

        let (_, printed) = line(&mut console, dir.path(), "ldir");
        assert_eq!(printed, "local:\nhere.txt\nremote:\nthere.txt\n");
    }

    #[test]
    fn push_and_pull_against_responder() {
        let local = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..300).map(|i| (i % 251) as u8).collect();
        let digest = hex::encode(Sha256::digest(&data));
        fs::write(local.path().join("a.txt"), &data).unwrap();

        let (mut console, mut serve_end) = loopback::pair(Duration::from_millis(10));
        let served = remote.path().to_path_buf();
        let server = std::thread::spawn(move || {
            responder::run(&mut serve_end, &served, &SessionOptions::default())
        });

        let (flow, printed) = line(&mut console, local.path(), "HTOA a.txt b.txt");
        assert_eq!(flow, Flow::Continue);
        assert_eq!(fs::read(remote.path().join("b.txt")).unwrap(), data);
        assert!(printed.contains(&format!("done: 300 bytes, sha256 {digest}")), "{printed}");
        assert!(printed.ends_with(&format!("ok b.txt 300 bytes sha256 {digest}\n")), "{printed}");

        let (_, printed) = line(&mut console, local.path(), "atoh b.txt c.txt");
        assert_eq!(fs::read(local.path().join("c.txt")).unwrap(), data);
        assert!(printed.ends_with(&format!("ok b.txt 300 bytes sha256 {digest}\n")), "{printed}");

        let started = std::time::Instant::now();
        let (flow, printed) = line(&mut console, local.path(), "ATOH absent.txt");
        assert_eq!(flow, Flow::Continue);
        assert!(printed.contains("peer declined the transfer: failed:"), "{printed}");
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!local.path().join("absent.txt").exists());

        // the link is still in step after the refusal
        let (_, printed) = line(&mut console, local.path(), "dir");
        assert_eq!(printed, "b.txt\n");

        assert_eq!(line(&mut console, local.path(), "QUIT"), (Flow::Quit, String::from("bye\n")));
        server.join().unwrap().unwrap();
    }

    #[test]
    fn drain_reports_output_failure() {
        let (mut console, mut peer) = loopback::pair(Duration::from_millis(20));
        peer.write_all(b"a long answer\x01").unwrap();
        let mut out = BrokenPipe {
            limit: 4,
            taken: Vec::new(),
        };

        let err = drain(&mut console, &SessionOptions::default(), &mut out).unwrap_err();
        assert_eq!(
            err.downcast_ref::<io::Error>().map(io::Error::kind),
            Some(io::ErrorKind::BrokenPipe)
        );
        assert_eq!(out.taken, b"a lo");
    }
}
