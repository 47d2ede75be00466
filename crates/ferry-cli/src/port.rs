//! Opening the byte link: a raw serial device or a TCP stream.
//!
//! Both are configured so a read returns within about half a second when
//! the line is quiet, reported as `TimedOut`. A zero-byte read then only
//! ever means the peer hung up.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use nix::fcntl::OFlag;
use nix::sys::termios::{self, BaudRate, ControlFlags, SetArg, SpecialCharacterIndices};
use tracing::info;

use crate::cli::LinkArgs;

/// Read timeout applied to every link, matching VTIME=5 on serial ports.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Any duplex byte stream the sessions can run over.
pub trait Duplex: Read + Write + Send {}

impl<T: Read + Write + Send> Duplex for T {}

pub fn open(args: &LinkArgs) -> Result<Box<dyn Duplex>> {
    if let Some(addr) = args.tcp {
        let stream = TcpStream::connect(addr).with_context(|| format!("connecting to {addr}"))?;
        info!(%addr, "connected");
        return Ok(Box::new(tune_tcp(stream)?));
    }
    if let Some(addr) = args.listen {
        let listener = TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;
        info!(%addr, "waiting for a peer");
        let (stream, peer) = listener.accept().context("accepting peer")?;
        info!(%peer, "peer connected");
        return Ok(Box::new(tune_tcp(stream)?));
    }
    if let Some(device) = &args.port {
        let port = open_serial(device, args.baud)?;
        info!(device = %device.display(), baud = args.baud, "serial port open");
        return Ok(Box::new(port));
    }
    bail!("no link given: use --port, --tcp or --listen (or set FERRY_PORT)")
}

/// Serial device opened with VMIN=0. The kernel reports a quiet line as a
/// zero-byte read, which this turns into `TimedOut`.
pub struct SerialPort<T = File> {
    inner: T,
}

impl<T> SerialPort<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: Read> Read for SerialPort<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf)? {
            0 if !buf.is_empty() => Err(io::ErrorKind::TimedOut.into()),
            n => Ok(n),
        }
    }
}

impl<T: Write> Write for SerialPort<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn tune_tcp(stream: TcpStream) -> Result<TcpStream> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Open `device` raw, 8 data bits, no parity, one stop bit, no flow control,
/// reads returning after 0.5 s of silence.
pub fn open_serial(device: &Path, baud: u32) -> Result<SerialPort> {
    let speed = baud_rate(baud)?;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags((OFlag::O_NOCTTY | OFlag::O_SYNC).bits())
        .open(device)
        .with_context(|| format!("opening {}", device.display()))?;

    let mut tio = termios::tcgetattr(&file).context("tcgetattr")?;
    termios::cfmakeraw(&mut tio);
    termios::cfsetspeed(&mut tio, speed).context("setting line speed")?;
    tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
    tio.control_flags &= !(ControlFlags::CSTOPB | ControlFlags::PARENB);
    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 5;
    termios::tcsetattr(&file, SetArg::TCSANOW, &tio).context("tcsetattr")?;
    Ok(SerialPort::new(file))
}

fn baud_rate(baud: u32) -> Result<BaudRate> {
    let rate = match baud {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        other => bail!("unsupported baud rate {other}"),
    };
    Ok(rate)
}
