//! Command-line arguments.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use ferry_transfer::config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_IDLE_READS, DEFAULT_RETRY_LIMIT};
use ferry_transfer::{
    HeaderValidation, RetryExhaustion, SessionOptions, TransferConfig, WaitBudget,
};

/// ferry - stop-and-wait file transfer over a serial line or TCP.
#[derive(Debug, Parser)]
#[command(name = "ferry", version, about = "stop-and-wait file transfer over a serial line or TCP")]
pub struct Cli {
    /// Increase verbosity (can be repeated: -v, -vv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Debug, Subcommand)]
pub enum Mode {
    /// Interactive console: forward commands to the peer and run transfers.
    Connect {
        #[command(flatten)]
        link: LinkArgs,
        #[command(flatten)]
        transfer: TransferArgs,
    },
    /// Answer console commands from the peer, serving files from a directory.
    Serve {
        #[command(flatten)]
        link: LinkArgs,
        #[command(flatten)]
        transfer: TransferArgs,
        /// Directory to list, send from and receive into
        #[arg(short = 'd', long = "dir", default_value = ".", value_name = "DIR")]
        dir: PathBuf,
    },
    /// Push a file through an in-memory link and check it arrives intact.
    Selftest {
        #[command(flatten)]
        transfer: TransferArgs,
        /// File to send (default: generated pattern)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
        /// Size of the generated pattern in bytes
        #[arg(long = "size", default_value = "10000")]
        size: u64,
        /// Where the received copy is written (removed afterwards unless --keep)
        #[arg(long = "out", value_name = "PATH")]
        out: Option<PathBuf>,
        /// Keep the received copy
        #[arg(long = "keep")]
        keep: bool,
        /// Corrupt this chunk in transit
        #[arg(long = "corrupt-chunk", value_name = "INDEX")]
        corrupt_chunk: Option<u64>,
        /// How many transmissions of the chunk to corrupt
        #[arg(long = "corrupt-times", default_value = "1")]
        corrupt_times: u32,
    },
}

/// Which byte link to open. Exactly one of --port, --tcp, --listen.
#[derive(Debug, Clone, Args)]
pub struct LinkArgs {
    /// Serial device, opened raw 8N1
    #[arg(short = 'p', long = "port", value_name = "DEVICE", env = "FERRY_PORT")]
    pub port: Option<PathBuf>,

    /// Serial line speed
    #[arg(short = 'b', long = "baud", default_value = "115200", env = "FERRY_BAUD")]
    pub baud: u32,

    /// Connect to a peer over TCP instead of a serial device
    #[arg(long = "tcp", value_name = "ADDR", conflicts_with = "listen")]
    pub tcp: Option<SocketAddr>,

    /// Wait for one TCP peer on this address
    #[arg(long = "listen", value_name = "ADDR")]
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, Args)]
pub struct TransferArgs {
    /// Wire chunk size in bytes, including the 4-byte CRC trailer
    #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE, env = "FERRY_CHUNK_SIZE")]
    pub chunk_size: u32,

    /// Attempts per chunk before giving up (must match the peer)
    #[arg(long = "retries", default_value_t = DEFAULT_RETRY_LIMIT, env = "FERRY_RETRIES")]
    pub retries: u32,

    /// Enforce the header checksum and abort on exhausted retries.
    /// `--strict false` accepts unchecked headers and keeps unverified chunks.
    #[arg(
        long = "strict",
        default_value_t = true,
        action = ArgAction::Set,
        value_name = "BOOL",
        env = "FERRY_STRICT"
    )]
    pub strict: bool,

    /// Consecutive idle reads a wait tolerates
    #[arg(long = "idle-reads", default_value_t = DEFAULT_MAX_IDLE_READS)]
    pub idle_reads: u32,
}

impl TransferArgs {
    pub fn transfer_config(&self) -> TransferConfig {
        let (header_validation, retry_exhaustion) = if self.strict {
            (HeaderValidation::Strict, RetryExhaustion::Abort)
        } else {
            (HeaderValidation::Lenient, RetryExhaustion::AcceptUnverified)
        };
        TransferConfig {
            chunk_size: self.chunk_size,
            retry_limit: self.retries,
            header_validation,
            retry_exhaustion,
            wait: WaitBudget {
                max_idle_reads: self.idle_reads,
                ..WaitBudget::default()
            },
        }
    }

    /// Options for a session, validated up front so a bad flag fails before
    /// the link is touched.
    pub fn session_options(&self) -> anyhow::Result<SessionOptions> {
        let transfer = self.transfer_config();
        transfer.validate()?;
        Ok(SessionOptions::new(transfer))
    }
}
