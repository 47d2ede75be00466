//! `ferry serve`: the remote end of a console session.
//!
//! Reads command lines off the link, runs the opposite half of each
//! transfer against `dir`, and closes every response with EOT so the
//! console knows when to stop printing.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use ferry_transfer::header::is_safe_name;
use ferry_transfer::link::{Link, Poll};
use ferry_transfer::{
    ControlByte, Destination, SessionOptions, TransferError, TransferOutcome, TransferProgress,
    receive_file, send_file,
};
use tracing::{debug, info, warn};

use crate::command::{Command, CommandError, HELP_TEXT, MAX_COMMAND_LEN};
use crate::console::dir_listing;

pub fn run<L: Read + Write>(link: &mut L, dir: &Path, options: &SessionOptions) -> Result<()> {
    info!(dir = %dir.display(), "serving");
    let progress = TransferProgress::new();
    loop {
        let line = read_line(link, &progress)?;
        let reply = match Command::parse(&line) {
            Ok(cmd) => {
                debug!(?cmd, "command");
                let quit = cmd == Command::Quit;
                let reply = respond(link, dir, options, cmd);
                if quit {
                    finish(link, &reply)?;
                    return Ok(());
                }
                reply
            }
            Err(CommandError::Empty) => continue,
            Err(e) => format!("rejected: {e}\n"),
        };
        finish(link, &reply)?;
    }
}

/// Run one command. Returns the text to send back before EOT.
fn respond<L: Read + Write>(
    link: &mut L,
    dir: &Path,
    options: &SessionOptions,
    cmd: Command,
) -> String {
    match cmd {
        Command::Help => HELP_TEXT.to_owned(),
        Command::Dir | Command::Ldir => match dir_listing(dir) {
            Ok(listing) => listing,
            Err(e) => format!("{e:#}\n"),
        },
        Command::Atoh { remote, .. } => {
            if !is_safe_name(&remote) {
                return format!("refusing to send {remote:?}\n");
            }
            let progress = TransferProgress::new();
            summary(send_file(link, &dir.join(&remote), &remote, options, &progress))
        }
        Command::Htoa { .. } => {
            let progress = TransferProgress::new();
            let destination = Destination::Directory(dir.to_path_buf());
            summary(receive_file(link, &destination, options, &progress))
        }
        Command::Quit => "bye\n".to_owned(),
        Command::Unknown(verb) => format!("unknown command {verb}\n"),
    }
}

fn summary(result: Result<TransferOutcome, TransferError>) -> String {
    match result {
        Ok(outcome) if outcome.is_verified() => {
            let name = &outcome.file_name;
            format!("ok {name} {} bytes sha256 {}\n", outcome.bytes, outcome.sha256)
        }
        Ok(outcome) => format!(
            "ok {} {} bytes, unverified chunks {:?}\n",
            outcome.file_name, outcome.bytes, outcome.unverified_chunks
        ),
        Err(e) => {
            warn!(error = %e, "transfer failed");
            format!("failed: {e}\n")
        }
    }
}

fn finish<L: Write>(link: &mut L, reply: &str) -> Result<()> {
    link.write_all(reply.as_bytes())
        .and_then(|_| link.write_all(&[ControlByte::Eot.as_byte()]))
        .and_then(|_| link.flush())
        .context("writing response")
}

/// Block until a full command line arrives. Control bytes left over from a
/// transfer are skipped. An oversize line is consumed and returned as is so
/// the parser rejects it. Fails once the peer hangs up.
fn read_line<L: Read + Write>(link: &mut L, progress: &TransferProgress) -> Result<String> {
    let mut link = Link::new(link, Default::default(), &progress.cancelled);
    let mut line = Vec::new();
    loop {
        let byte = match link.poll()? {
            Poll::Byte(byte) => byte,
            Poll::Idle => continue,
            Poll::Closed => bail!("peer closed the link without QUIT"),
        };
        match byte {
            b'\n' => break,
            b if ControlByte::from_byte(b).is_some() => {}
            b => {
                // keep one byte past the limit so the length check still fires
                if line.len() <= MAX_COMMAND_LEN {
                    line.push(b);
                }
            }
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ferry_transfer::loopback;

    fn read_reply(end: &mut impl Read) -> String {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match end.read(&mut byte) {
                Ok(1) if byte[0] == ControlByte::Eot.as_byte() => break,
                Ok(1) => out.push(byte[0]),
                // read timeout while the server works
                _ => continue,
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn answers_dir_and_quit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("served.txt"), b"x").unwrap();
        let (mut console, mut serve_end) = loopback::pair(Duration::from_millis(10));
        let path = dir.path().to_path_buf();

        let server = std::thread::spawn(move || {
            run(&mut serve_end, &path, &SessionOptions::default())
        });

        console.write_all(b"dir\n").unwrap();
        assert_eq!(read_reply(&mut console), "served.txt\n");
        console.write_all(b"nope\n").unwrap();
        assert_eq!(read_reply(&mut console), "unknown command nope\n");
        console.write_all(b"QUIT\n").unwrap();
        assert_eq!(read_reply(&mut console), "bye\n");
        server.join().unwrap().unwrap();
    }

    #[test]
    fn hangup_ends_serving() {
        let dir = tempfile::tempdir().unwrap();
        let (mut console, mut serve_end) = loopback::pair(Duration::from_millis(10));
        console.write_all(b"di").unwrap();
        drop(console);

        let started = std::time::Instant::now();
        let err = run(&mut serve_end, dir.path(), &SessionOptions::default()).unwrap_err();
        assert!(err.to_string().contains("without QUIT"), "{err:#}");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn missing_file_is_declined_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut a, _b) = loopback::pair(Duration::from_millis(5));
        let reply = respond(
            &mut a,
            dir.path(),
            &SessionOptions::default(),
            Command::Atoh {
                remote: "absent.txt".into(),
                local: "absent.txt".into(),
            },
        );
        assert!(reply.starts_with("failed: local file"), "{reply}");
        assert_eq!(a.writes(), 0);
    }

    #[test]
    fn refuses_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let (mut a, _b) = loopback::pair(Duration::from_millis(5));
        let reply = respond(
            &mut a,
            dir.path(),
            &SessionOptions::default(),
            Command::Atoh {
                remote: "../secret".into(),
                local: "x".into(),
            },
        );
        assert!(reply.starts_with("refusing"));
    }
}
