//! Client side of the transfer protocol.

use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use sft_core::{SessionState, Status};
use sft_crypto::SharedKey;

use crate::codec::WireCodec;
use crate::ClientError;

/// Callback invoked when the client enters a new protocol phase
pub type PhaseFn = Box<dyn Fn(SessionState) + Send + Sync>;

/// Everything needed to push one file.
pub struct TransferRequest {
    pub login: String,
    pub secret: SecretString,
    /// Name announced to the server (usually the local file's base name)
    pub file_name: String,
    pub plaintext: Vec<u8>,
    /// Largest frame the client will write; should match the server's limit
    pub max_frame_len: u32,
}

impl TransferRequest {
    /// Read a local file into a request, naming it after the path's final component.
    pub fn from_path(
        path: &Path,
        login: impl Into<String>,
        secret: SecretString,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("path has no file name: {}", path.display()))?;
        let plaintext =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

        Ok(Self {
            login: login.into(),
            secret,
            file_name,
            plaintext,
            max_frame_len: crate::DEFAULT_MAX_FRAME_LEN,
        })
    }

    pub fn with_max_frame_len(mut self, max_frame_len: u32) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }
}

/// Result of a transfer the server confirmed.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub file_name: String,
    pub content_hash: String,
    pub plaintext_len: u64,
    pub ciphertext_len: u64,
}

/// Run authentication, negotiation and transfer against a server.
///
/// Stops at the first status other than the expected one.
pub async fn send_file<RW>(
    io: RW,
    request: &TransferRequest,
    key: &SharedKey,
    progress: Option<&PhaseFn>,
) -> Result<TransferReceipt, ClientError>
where
    RW: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut codec = WireCodec::new(io, request.max_frame_len);
    let report = |state: SessionState| {
        if let Some(cb) = progress {
            cb(state);
        }
    };

    // ── Authentication ───────────────────────────────────────────────────
    report(SessionState::Authenticating);
    codec.write_str(&request.login).await?;
    codec.write_str(request.secret.expose_secret()).await?;
    codec.flush().await?;

    match codec.read_status().await? {
        Status::AuthOk => debug!(login = %request.login, "authenticated"),
        Status::AuthFail => return Err(ClientError::AuthRejected),
        got => {
            return Err(ClientError::UnexpectedStatus {
                expected: Status::AuthOk,
                got,
            })
        }
    }

    // ── Negotiation ──────────────────────────────────────────────────────
    report(SessionState::Negotiating);
    let content_hash = sft_crypto::digest(&request.plaintext);
    let declared_size = request.plaintext.len() as i64;

    codec.write_str(&request.file_name).await?;
    codec.write_i64(declared_size).await?;
    codec.write_str(&content_hash).await?;
    codec.flush().await?;

    match codec.read_status().await? {
        Status::ReadyForTransfer => {}
        got => return Err(ClientError::NegotiationRejected(got)),
    }

    // ── Transfer ─────────────────────────────────────────────────────────
    report(SessionState::Transferring);
    let ciphertext = sft_crypto::encrypt(&request.plaintext, key);
    debug!(bytes = ciphertext.len(), "sending ciphertext");

    codec.write_bytes(&ciphertext).await?;
    codec.flush().await?;

    let outcome = match codec.read_status().await? {
        Status::TransferSuccess => Ok(()),
        Status::TransferFail => Err(ClientError::TransferRejected),
        got => Err(ClientError::UnexpectedStatus {
            expected: Status::TransferSuccess,
            got,
        }),
    };

    let _ = codec.shutdown().await;
    outcome?;

    report(SessionState::Succeeded);
    info!(file = %request.file_name, bytes = request.plaintext.len(), "transfer confirmed");

    Ok(TransferReceipt {
        file_name: request.file_name.clone(),
        content_hash,
        plaintext_len: request.plaintext.len() as u64,
        ciphertext_len: ciphertext.len() as u64,
    })
}
