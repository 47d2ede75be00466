/// Ferry transfer engine: stop-and-wait file transfer over a byte link.
///
/// Moves one file at a time across any blocking `Read + Write` stream
/// (serial port, TCP socket, in-memory loopback) with:
/// - BOT rendezvous and a fixed 88-byte header
/// - Per-chunk CRC32 trailer, SYNC barrier and SOK/NOK verdict
/// - Bounded retries with strict or lenient exhaustion handling
/// - Bounded waits with cooperative cancellation
/// - SHA-256 digest of the transferred content

pub mod config;
pub mod control;
pub mod crc;
pub mod error;
pub mod header;
pub mod link;
pub mod logging;
pub mod loopback;
pub mod outcome;
pub mod plan;
pub mod progress;
pub mod receiver;
pub mod sender;

// Re-export key types for convenience.
pub use config::{RetryExhaustion, SessionOptions, TransferConfig, WaitBudget};
pub use control::ControlByte;
pub use crc::{Crc32, CrcError, CrcParams};
pub use error::TransferError;
pub use header::{HeaderError, HeaderValidation, TransferHeader, HEADER_LEN, MAX_FILE_NAME};
pub use logging::{NullLogger, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use outcome::TransferOutcome;
pub use plan::ChunkPlan;
pub use progress::TransferProgress;
pub use receiver::{Destination, receive_file, run_receive};
pub use sender::{run_send, send_file, send_reader};
