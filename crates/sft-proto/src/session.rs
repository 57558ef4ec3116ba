//! Server-side protocol session: one per accepted connection.
//!
//! ```text
//! Authenticating ──AUTH_OK──▶ Negotiating ──READY──▶ Transferring ──SUCCESS──▶ Succeeded
//!        │                         │                      │
//!        └─────────────────────────┴──────────────────────┴──────────────────▶ Failed
//! ```
//!
//! Phases run strictly in order. Any error moves the session to `Failed`, and
//! the connection is shut down on every exit path.

use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, info_span, warn, Instrument};

use sft_core::{FileMetadata, SessionState, Status};
use sft_crypto::KeyProvider;
use sft_secrets::CredentialStore;

use crate::codec::WireCodec;
use crate::sink::FileSink;
use crate::SessionError;

/// Knobs that change how the transfer phase judges a payload.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Largest frame accepted from the client
    pub max_frame_len: u32,
    /// Fail when the decrypted length differs from the declared size
    pub enforce_declared_size: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_frame_len: crate::DEFAULT_MAX_FRAME_LEN,
            enforce_declared_size: false,
        }
    }
}

impl From<&sft_core::config::TransferConfig> for SessionPolicy {
    fn from(config: &sft_core::config::TransferConfig) -> Self {
        Self {
            max_frame_len: config.max_frame_len,
            enforce_declared_size: config.enforce_declared_size,
        }
    }
}

/// Read-only collaborators shared by every session.
pub struct ServerContext<S> {
    pub credentials: Arc<dyn CredentialStore>,
    pub keys: Arc<dyn KeyProvider>,
    pub sink: Arc<S>,
    pub policy: SessionPolicy,
}

impl<S> Clone for ServerContext<S> {
    fn clone(&self) -> Self {
        Self {
            credentials: self.credentials.clone(),
            keys: self.keys.clone(),
            sink: self.sink.clone(),
            policy: self.policy,
        }
    }
}

/// What happened on one connection.
#[derive(Debug)]
pub struct SessionReport {
    pub peer: String,
    pub state: SessionState,
    pub metadata: Option<FileMetadata>,
    /// Where the verified file was stored
    pub stored_at: Option<PathBuf>,
    /// Plaintext bytes written to the sink
    pub bytes: u64,
    pub error: Option<SessionError>,
}

pub struct Session<RW, S> {
    codec: WireCodec<RW>,
    ctx: ServerContext<S>,
    peer: String,
    state: SessionState,
    metadata: Option<FileMetadata>,
    stored_at: Option<PathBuf>,
    bytes: u64,
}

impl<RW, S> Session<RW, S>
where
    RW: AsyncRead + AsyncWrite + Unpin + Send,
    S: FileSink,
{
    pub fn new(io: RW, peer: impl Into<String>, ctx: ServerContext<S>) -> Self {
        Self {
            codec: WireCodec::new(io, ctx.policy.max_frame_len),
            ctx,
            peer: peer.into(),
            state: SessionState::Authenticating,
            metadata: None,
            stored_at: None,
            bytes: 0,
        }
    }

    /// Drive the connection to a terminal state and close it.
    pub async fn run(mut self) -> SessionReport {
        let span = info_span!("session", peer = %self.peer);

        async move {
            debug!("session started");
            let result = self.drive().await;

            let error = match result {
                Ok(()) => None,
                Err(e) => {
                    log_failure(&e, self.state);
                    self.state = SessionState::Failed;
                    Some(e)
                }
            };

            if let Err(e) = self.codec.shutdown().await {
                debug!(error = %e, "shutdown after session");
            }
            info!(state = %self.state, "connection closed");

            SessionReport {
                peer: self.peer,
                state: self.state,
                metadata: self.metadata,
                stored_at: self.stored_at,
                bytes: self.bytes,
                error,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        self.authenticate().await?;
        let metadata = self.negotiate().await?;
        self.transfer(&metadata).await
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            debug!(from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }

    async fn authenticate(&mut self) -> Result<(), SessionError> {
        let login = self.codec.read_string().await?;
        let secret = SecretString::from(self.codec.read_string().await?);

        if self.ctx.credentials.verify(&login, secret.expose_secret()) {
            self.codec.write_status(Status::AuthOk).await?;
            info!(login = %login, "authenticated");
            self.advance();
            Ok(())
        } else {
            self.codec.write_status(Status::AuthFail).await?;
            Err(SessionError::Auth { login })
        }
    }

    async fn negotiate(&mut self) -> Result<FileMetadata, SessionError> {
        let file_name = self.codec.read_string().await?;
        let declared_size = self.codec.read_i64().await?;
        let content_hash = self.codec.read_string().await?;

        let metadata = FileMetadata {
            file_name,
            declared_size,
            content_hash,
        };
        self.metadata = Some(metadata.clone());

        self.codec.write_status(Status::ReadyForTransfer).await?;
        info!(
            file = %metadata.file_name,
            declared_size = metadata.declared_size,
            "metadata negotiated"
        );
        self.advance();
        Ok(metadata)
    }

    async fn transfer(&mut self, metadata: &FileMetadata) -> Result<(), SessionError> {
        let ciphertext = match self.codec.read_bytes().await {
            Ok(c) => c,
            Err(e) => {
                self.reply_fail_best_effort().await;
                return Err(e.into());
            }
        };
        debug!(bytes = ciphertext.len(), "ciphertext received");

        let (path, bytes) = match Self::verify_and_store(&self.ctx, metadata, &ciphertext).await {
            Ok(stored) => stored,
            Err(e) => {
                self.reply_fail_best_effort().await;
                return Err(e);
            }
        };

        self.stored_at = Some(path.clone());
        self.bytes = bytes;

        self.codec.write_status(Status::TransferSuccess).await?;
        info!(file = %metadata.file_name, path = %path.display(), bytes, "transfer verified and stored");
        self.advance();
        Ok(())
    }

    /// Decrypt, check the content hash, then hand the plaintext to the sink.
    ///
    /// Nothing reaches the sink unless the hash matches.
    async fn verify_and_store(
        ctx: &ServerContext<S>,
        metadata: &FileMetadata,
        ciphertext: &[u8],
    ) -> Result<(PathBuf, u64), SessionError> {
        let plaintext = sft_crypto::decrypt(ciphertext, ctx.keys.current_key())?;

        let computed = sft_crypto::digest(&plaintext);
        if !metadata.hash_matches(&computed) {
            return Err(SessionError::Integrity {
                expected: metadata.content_hash.clone(),
                computed,
            });
        }

        let actual = plaintext.len() as u64;
        if i64::try_from(actual).ok() != Some(metadata.declared_size) {
            if ctx.policy.enforce_declared_size {
                return Err(SessionError::SizeMismatch {
                    declared: metadata.declared_size,
                    actual,
                });
            }
            warn!(
                declared_size = metadata.declared_size,
                actual, "decrypted size differs from declared size"
            );
        }

        let path = ctx
            .sink
            .write(&metadata.file_name, &plaintext)
            .await
            .map_err(SessionError::Sink)?;
        Ok((path, actual))
    }

    async fn reply_fail_best_effort(&mut self) {
        if let Err(e) = self.codec.write_status(Status::TransferFail).await {
            debug!(error = %e, "could not send TRANSFER_FAIL");
        }
    }
}

fn log_failure(error: &SessionError, state: SessionState) {
    match error {
        SessionError::Auth { login } => {
            warn!(login = %login, "authentication failed");
        }
        SessionError::Integrity { expected, computed } => {
            warn!(expected = %expected, computed = %computed, "integrity check failed, payload discarded");
        }
        other => {
            warn!(phase = %state, kind = other.kind(), error = %other, "session failed");
        }
    }
}
