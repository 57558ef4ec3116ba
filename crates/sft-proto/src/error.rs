use thiserror::Error;

use sft_core::Status;
use sft_crypto::CryptoError;

/// Errors reading or writing frames. All of them are fatal to the session.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: u64, max: u32 },

    #[error("text field is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown status token: {0:?}")]
    UnknownStatus(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server-side session failures. The peer only ever sees a status token.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("authentication failed for login {login:?}")]
    Auth { login: String },

    #[error("protocol framing error: {0}")]
    Framing(FramingError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("integrity check failed: expected {expected}, computed {computed}")]
    Integrity { expected: String, computed: String },

    #[error("decrypted size {actual} does not match declared size {declared}")]
    SizeMismatch { declared: i64, actual: u64 },

    #[error("file sink error: {0:#}")]
    Sink(anyhow::Error),

    #[error("transport error: {0}")]
    Transport(std::io::Error),
}

impl From<FramingError> for SessionError {
    fn from(e: FramingError) -> Self {
        match e {
            FramingError::Io(io) => SessionError::Transport(io),
            other => SessionError::Framing(other),
        }
    }
}

impl SessionError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Auth { .. } => "auth",
            SessionError::Framing(_) => "framing",
            SessionError::Crypto(_) => "crypto",
            SessionError::Integrity { .. } => "integrity",
            SessionError::SizeMismatch { .. } => "size_mismatch",
            SessionError::Sink(_) => "sink",
            SessionError::Transport(_) => "transport",
        }
    }
}

/// Client-side failures while driving a transfer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server rejected the credentials")]
    AuthRejected,

    #[error("server did not accept the file metadata (replied {0})")]
    NegotiationRejected(Status),

    #[error("server rejected the transfer (integrity or storage failure)")]
    TransferRejected,

    #[error("unexpected status {got} (expected {expected})")]
    UnexpectedStatus { expected: Status, got: Status },

    #[error(transparent)]
    Framing(#[from] FramingError),
}
