//! sft-proto: the three-phase transfer protocol
//!
//! Message sequence (client → server unless noted):
//! ```text
//! 1. login, secret                          ← AUTH_OK | AUTH_FAIL
//! 2. file_name, declared_size (i64), hash   ← READY_FOR_TRANSFER
//! 3. ciphertext                             ← TRANSFER_SUCCESS | TRANSFER_FAIL
//! ```
//! Every field except `declared_size` is a `[u32 BE length][bytes]` frame.

pub mod client;
pub mod codec;
pub mod error;
pub mod session;
pub mod sink;

pub use client::{send_file, PhaseFn, TransferReceipt, TransferRequest};
pub use codec::WireCodec;
pub use error::{ClientError, FramingError, SessionError};
pub use session::{ServerContext, Session, SessionPolicy, SessionReport};
pub use sink::{DirSink, FileSink};

/// Default frame limit (256 MiB) when none is configured
pub const DEFAULT_MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;
