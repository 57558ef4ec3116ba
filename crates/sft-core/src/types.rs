//! Protocol-level types shared by the server session and the client driver

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status tokens exchanged at the end of each protocol phase.
///
/// On the wire each token is a length-prefixed UTF-8 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    AuthOk,
    AuthFail,
    ReadyForTransfer,
    TransferSuccess,
    TransferFail,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::AuthOk,
        Status::AuthFail,
        Status::ReadyForTransfer,
        Status::TransferSuccess,
        Status::TransferFail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::AuthOk => "AUTH_OK",
            Status::AuthFail => "AUTH_FAIL",
            Status::ReadyForTransfer => "READY_FOR_TRANSFER",
            Status::TransferSuccess => "TRANSFER_SUCCESS",
            Status::TransferFail => "TRANSFER_FAIL",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the five status tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status token: {:?}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// File metadata announced by the client during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_name: String,
    /// Plaintext size as declared by the sender (advisory unless enforced)
    pub declared_size: i64,
    /// Lowercase hex SHA-256 of the plaintext, computed before encryption
    pub content_hash: String,
}

impl FileMetadata {
    /// Case-insensitive comparison against a digest recomputed by the receiver.
    pub fn hash_matches(&self, computed: &str) -> bool {
        self.content_hash.eq_ignore_ascii_case(computed)
    }
}

/// Per-connection protocol state.
///
/// `Authenticating → Negotiating → Transferring → Succeeded`, with `Failed`
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Authenticating,
    Negotiating,
    Transferring,
    Succeeded,
    Failed,
}

impl SessionState {
    /// The state that follows a successful phase, or `None` for terminal states.
    pub fn next(&self) -> Option<SessionState> {
        match self {
            SessionState::Authenticating => Some(SessionState::Negotiating),
            SessionState::Negotiating => Some(SessionState::Transferring),
            SessionState::Transferring => Some(SessionState::Succeeded),
            SessionState::Succeeded | SessionState::Failed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Authenticating => "authenticating",
            SessionState::Negotiating => "negotiating",
            SessionState::Transferring => "transferring",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
