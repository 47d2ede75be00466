//! Bounded-wait primitives over a blocking byte stream.
//!
//! The link is any `Read + Write`. A read that times out (`TimedOut`,
//! `WouldBlock`) or returns zero bytes is an idle tick: serial ports opened
//! with VMIN=0 report their read timeout that way. Every wait counts
//! consecutive idle ticks and discarded bytes against a `WaitBudget` and
//! checks the cancellation flag before each read.
//!
//! `poll` keeps the zero-byte case apart as `Poll::Closed` for callers that
//! wait without a budget and must notice a hangup.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::WaitBudget;
use crate::control::ControlByte;
use crate::error::TransferError;

/// Result of one read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    Byte(u8),
    /// The read timed out.
    Idle,
    /// The read returned zero bytes.
    Closed,
}

pub struct Link<'a, L> {
    inner: &'a mut L,
    budget: WaitBudget,
    cancelled: &'a AtomicBool,
}

impl<'a, L: Read + Write> Link<'a, L> {
    pub fn new(inner: &'a mut L, budget: WaitBudget, cancelled: &'a AtomicBool) -> Self {
        Self {
            inner,
            budget,
            cancelled,
        }
    }

    pub fn send_control(&mut self, byte: ControlByte) -> Result<(), TransferError> {
        self.send(&[byte.as_byte()])
    }

    /// Write `data` as one unit and flush.
    pub fn send(&mut self, data: &[u8]) -> Result<(), TransferError> {
        self.inner.write_all(data).map_err(TransferError::Link)?;
        self.inner.flush().map_err(TransferError::Link)
    }

    /// One read attempt.
    pub fn poll(&mut self) -> Result<Poll, TransferError> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(TransferError::Cancelled);
        }
        let mut byte = [0u8; 1];
        match self.inner.read(&mut byte) {
            Ok(0) => Ok(Poll::Closed),
            Ok(_) => Ok(Poll::Byte(byte[0])),
            Err(e) if is_idle(&e) => Ok(Poll::Idle),
            Err(e) => Err(TransferError::Link(e)),
        }
    }

    /// One read attempt. `None` on an idle tick, zero-byte reads included.
    pub fn poll_byte(&mut self) -> Result<Option<u8>, TransferError> {
        match self.poll()? {
            Poll::Byte(b) => Ok(Some(b)),
            Poll::Idle | Poll::Closed => Ok(None),
        }
    }

    /// Discard bytes until `target` arrives. Each discarded byte is handed to
    /// `on_stray`. Returns the number discarded.
    pub fn wait_for(
        &mut self,
        target: ControlByte,
        waiting_for: &'static str,
        on_stray: impl FnMut(u8),
    ) -> Result<usize, TransferError> {
        self.wait_for_any(&[target], waiting_for, on_stray)
            .map(|(_, strays)| strays)
    }

    /// Discard bytes until one of `targets` arrives. Returns the byte that
    /// ended the wait and the number discarded before it.
    pub fn wait_for_any(
        &mut self,
        targets: &[ControlByte],
        waiting_for: &'static str,
        mut on_stray: impl FnMut(u8),
    ) -> Result<(ControlByte, usize), TransferError> {
        let mut idle = 0u32;
        let mut strays = 0usize;
        loop {
            match self.poll_byte()? {
                Some(b) => {
                    if let Some(hit) = targets.iter().copied().find(|t| t.as_byte() == b) {
                        return Ok((hit, strays));
                    }
                    idle = 0;
                    strays += 1;
                    on_stray(b);
                    if strays > self.budget.max_stray_bytes {
                        return Err(TransferError::LinkTimeout { waiting_for });
                    }
                }
                None => {
                    idle += 1;
                    if idle >= self.budget.max_idle_reads {
                        return Err(TransferError::LinkTimeout { waiting_for });
                    }
                }
            }
        }
    }

    /// Fill `buf` exactly. Returns the number of bytes read, which is short
    /// only when the idle budget ran out mid-read.
    pub fn read_counted(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        let mut filled = 0usize;
        let mut idle = 0u32;
        while filled < buf.len() {
            if self.cancelled.load(Ordering::Relaxed) {
                return Err(TransferError::Cancelled);
            }
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => idle += 1,
                Ok(n) => {
                    filled += n;
                    idle = 0;
                }
                Err(e) if is_idle(&e) => idle += 1,
                Err(e) => return Err(TransferError::Link(e)),
            }
            if idle >= self.budget.max_idle_reads {
                break;
            }
        }
        Ok(filled)
    }
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted stream: reads pop from `input`, `None` entries are timeouts.
    struct Script {
        input: VecDeque<Option<u8>>,
        output: Vec<u8>,
    }

    impl Script {
        fn new(items: &[Option<u8>]) -> Self {
            Self {
                input: items.iter().copied().collect(),
                output: Vec::new(),
            }
        }
    }

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.input.pop_front() {
                Some(Some(b)) => {
                    buf[0] = b;
                    Ok(1)
                }
                Some(None) | None => Err(io::ErrorKind::TimedOut.into()),
            }
        }
    }

    impl Write for Script {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn budget(idle: u32, stray: usize) -> WaitBudget {
        WaitBudget {
            max_idle_reads: idle,
            max_stray_bytes: stray,
        }
    }

    #[test]
    fn wait_for_skips_strays() {
        let flag = AtomicBool::new(false);
        let mut s = Script::new(&[Some(b'x'), None, Some(b'y'), Some(0x02)]);
        let mut seen = Vec::new();
        let mut link = Link::new(&mut s, budget(5, 10), &flag);
        let strays = link
            .wait_for(ControlByte::Bot, "BOT", |b| seen.push(b))
            .unwrap();
        assert_eq!(strays, 2);
        assert_eq!(seen, b"xy");
    }

    #[test]
    fn wait_for_times_out() {
        let flag = AtomicBool::new(false);
        let mut s = Script::new(&[]);
        let mut link = Link::new(&mut s, budget(3, 10), &flag);
        let err = link.wait_for(ControlByte::Bot, "BOT", |_| {}).unwrap_err();
        assert!(matches!(err, TransferError::LinkTimeout { waiting_for: "BOT" }));
    }

    #[test]
    fn wait_for_caps_strays() {
        let flag = AtomicBool::new(false);
        let mut s = Script::new(&[Some(b'a'); 8]);
        let mut link = Link::new(&mut s, budget(3, 4), &flag);
        let err = link.wait_for(ControlByte::Sync, "SYNC", |_| {}).unwrap_err();
        assert!(matches!(err, TransferError::LinkTimeout { .. }));
    }

    #[test]
    fn wait_for_any_reports_match() {
        let flag = AtomicBool::new(false);
        let mut s = Script::new(&[Some(0x04), Some(0x08)]);
        let mut seen = Vec::new();
        let mut link = Link::new(&mut s, budget(3, 4), &flag);
        let (hit, strays) = link
            .wait_for_any(&[ControlByte::Sok, ControlByte::Nok], "verdict", |b| seen.push(b))
            .unwrap();
        assert_eq!(hit, ControlByte::Nok);
        assert_eq!(strays, 1);
        assert_eq!(seen, vec![0x04]);
    }

    #[test]
    fn cancelled_before_read() {
        let flag = AtomicBool::new(true);
        let mut s = Script::new(&[Some(0x02)]);
        let mut link = Link::new(&mut s, budget(3, 4), &flag);
        assert!(matches!(
            link.wait_for(ControlByte::Bot, "BOT", |_| {}),
            Err(TransferError::Cancelled)
        ));
    }

    #[test]
    fn read_counted_short_on_idle() {
        let flag = AtomicBool::new(false);
        let mut s = Script::new(&[Some(1), None, Some(2)]);
        let mut buf = [0u8; 4];
        let mut link = Link::new(&mut s, budget(2, 4), &flag);
        assert_eq!(link.read_counted(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[1, 2]);
    }

    #[test]
    fn poll_tells_hangup_from_timeout() {
        let flag = AtomicBool::new(false);
        let mut s = Script::new(&[Some(b'q'), None]);
        let mut link = Link::new(&mut s, budget(1, 1), &flag);
        assert_eq!(link.poll().unwrap(), Poll::Byte(b'q'));
        assert_eq!(link.poll().unwrap(), Poll::Idle);

        let mut closed = std::io::Cursor::new(Vec::new());
        let mut link = Link::new(&mut closed, budget(1, 1), &flag);
        assert_eq!(link.poll().unwrap(), Poll::Closed);
        assert_eq!(link.poll_byte().unwrap(), None);
    }

    #[test]
    fn send_writes_control_byte() {
        let flag = AtomicBool::new(false);
        let mut s = Script::new(&[]);
        {
            let mut link = Link::new(&mut s, budget(1, 1), &flag);
            link.send_control(ControlByte::Nok).unwrap();
            link.send(b"abc").unwrap();
        }
        assert_eq!(s.output, vec![0x08, b'a', b'b', b'c']);
    }
}
