//! In-memory duplex byte link for tests and `ferry selftest`.
//!
//! ```text
//! [End A] --write--> channel --read--> [End B]
//! [End A] <--read--- channel <--write- [End B]
//! ```
//!
//! Reads time out like a serial port with VMIN=0. Each end can carry a
//! fault hook that sees every write before it goes on the wire, and a
//! recorder that keeps a copy of everything written.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

/// Called with the zero-based write index and the bytes about to be sent.
pub type FaultHook = Box<dyn FnMut(u64, &mut [u8]) + Send>;

/// Shared copy of everything an end has written.
pub type WriteLog = Arc<Mutex<Vec<u8>>>;

pub struct LoopbackEnd {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    read_timeout: Duration,
    writes: u64,
    fault: Option<FaultHook>,
    recorder: Option<WriteLog>,
}

/// Create two connected ends.
pub fn pair(read_timeout: Duration) -> (LoopbackEnd, LoopbackEnd) {
    let (a_tx, b_rx) = unbounded();
    let (b_tx, a_rx) = unbounded();
    (
        LoopbackEnd::new(a_tx, a_rx, read_timeout),
        LoopbackEnd::new(b_tx, b_rx, read_timeout),
    )
}

impl LoopbackEnd {
    fn new(tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>, read_timeout: Duration) -> Self {
        Self {
            tx,
            rx,
            pending: VecDeque::new(),
            read_timeout,
            writes: 0,
            fault: None,
            recorder: None,
        }
    }

    /// Install a hook that may alter outgoing writes.
    pub fn with_fault(mut self, hook: impl FnMut(u64, &mut [u8]) + Send + 'static) -> Self {
        self.fault = Some(Box::new(hook));
        self
    }

    /// Start recording outgoing bytes (after any fault has been applied).
    pub fn record_writes(&mut self) -> WriteLog {
        let log = WriteLog::default();
        self.recorder = Some(log.clone());
        log
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl Read for LoopbackEnd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            match self.rx.recv_timeout(self.read_timeout) {
                Ok(data) => self.pending.extend(data),
                Err(RecvTimeoutError::Timeout) => return Err(io::ErrorKind::TimedOut.into()),
                // peer hung up: look like a silent line
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for LoopbackEnd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = buf.to_vec();
        if let Some(hook) = self.fault.as_mut() {
            hook(self.writes, &mut data);
        }
        self.writes += 1;
        if let Some(log) = &self.recorder {
            if let Ok(mut log) = log.lock() {
                log.extend_from_slice(&data);
            }
        }
        self.tx
            .send(data)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "loopback peer dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
