//! Daemon lifecycle: startup, accept loop, graceful shutdown

use anyhow::{Context, Result};
use prometheus_client::registry::Registry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use sft_core::config::{CryptoConfig, SftConfig};
use sft_crypto::KeyFile;
use sft_proto::{DirSink, FileSink, ServerContext, Session, SessionPolicy};
use sft_secrets::StaticCredStore;

use crate::metrics::SessionMetrics;

pub async fn run(config: SftConfig) -> Result<()> {
    info!("daemon starting");

    // ── Shared, read-only collaborators ──────────────────────────────────
    let keys = load_key(&config.crypto)?;
    info!(path = %keys.path().display(), "shared key loaded");

    let credentials = StaticCredStore::load(&config.auth).context("loading credentials")?;
    if credentials.is_empty() {
        warn!("no users configured; all logins will be rejected");
    } else {
        info!(source = %credentials.source, users = credentials.len(), "credentials loaded");
    }

    let received_dir = sft_core::config::expand_tilde(&config.transfer.received_dir);
    let sink = DirSink::create(&received_dir)?;
    info!(dir = %sink.root().display(), "receive directory ready");

    let ctx = ServerContext {
        credentials: Arc::new(credentials),
        keys: Arc::new(keys),
        sink: Arc::new(sink),
        policy: SessionPolicy::from(&config.transfer),
    };

    // ── Metrics ──────────────────────────────────────────────────────────
    let mut registry = Registry::default();
    let metrics = SessionMetrics::new(&mut registry);
    if let Some(addr) = config.daemon.metrics_addr.clone() {
        let registry = Arc::new(registry);
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(addr, registry).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    // ── Accept loop ──────────────────────────────────────────────────────
    let listener = TcpListener::bind(&config.daemon.listen)
        .await
        .with_context(|| format!("binding {}", config.daemon.listen))?;
    info!(addr = %listener.local_addr()?, "listening");

    let shutdown = shutdown_signal()?;
    serve_connections(listener, ctx, metrics, shutdown).await;

    info!("daemon exiting cleanly");
    Ok(())
}

fn load_key(config: &CryptoConfig) -> Result<KeyFile> {
    let path = sft_core::config::expand_tilde(&config.key_file);
    let key = if config.generate_if_missing {
        KeyFile::load_or_generate(&path)
    } else {
        KeyFile::load(&path)
    };
    key.with_context(|| format!("loading shared key: {}", path.display()))
}

/// Resolves on the first SIGTERM or SIGINT.
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    })
}

/// Accept connections until `shutdown` resolves, then wait for in-flight sessions.
///
/// Each connection gets its own task; a failing session never affects the
/// listener or its siblings.
pub async fn serve_connections<S, F>(
    listener: TcpListener,
    ctx: ServerContext<S>,
    metrics: SessionMetrics,
    shutdown: F,
) where
    S: FileSink,
    F: Future<Output = ()>,
{
    let mut sessions = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!(in_flight = sessions.len(), "no longer accepting, draining sessions");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "connection accepted");
                    let session = Session::new(stream, peer.to_string(), ctx.clone());
                    let metrics = metrics.clone();
                    sessions.spawn(async move {
                        let report = session.run().await;
                        metrics.record(&report);
                    });
                }
                Err(e) => {
                    // Usually transient (EMFILE, ECONNABORTED); back off briefly
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    error!("session task failed: {e}");
                }
            }
        }
    }

    while let Some(joined) = sessions.join_next().await {
        if let Err(e) = joined {
            error!("session task failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use sft_crypto::{KeyProvider, SharedKey};
    use sft_proto::{send_file, ClientError, TransferRequest};
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    fn context(root: &std::path::Path, key: SharedKey) -> ServerContext<DirSink> {
        ServerContext {
            credentials: Arc::new(StaticCredStore::new().with_user("admin", "admin123")),
            keys: Arc::new(key),
            sink: Arc::new(DirSink::create(root).unwrap()),
            policy: SessionPolicy::default(),
        }
    }

    fn request(secret: &str, name: &str, body: &[u8]) -> TransferRequest {
        TransferRequest {
            login: "admin".into(),
            secret: SecretString::from(secret.to_string()),
            file_name: name.into(),
            plaintext: body.to_vec(),
        max_frame_len: sft_proto::DEFAULT_MAX_FRAME_LEN,
        }
    }

    #[tokio::test]
    async fn serves_until_shutdown_and_records_metrics() {
        let tmp = TempDir::new().unwrap();
        let key = SharedKey::from_bytes([3u8; 32]);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut registry = Registry::default();
        let metrics = SessionMetrics::new(&mut registry);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(serve_connections(
            listener,
            context(tmp.path(), key.clone()),
            metrics,
            async move {
                let _ = stop_rx.await;
            },
        ));

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        send_file(stream, &request("admin123", "hello.txt", b"hello"), &key, None)
            .await
            .unwrap();

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let err = send_file(stream, &request("bad", "other.txt", b"x"), &key, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthRejected));

        stop_tx.send(()).unwrap();
        server.await.unwrap();

        assert_eq!(std::fs::read(tmp.path().join("hello.txt")).unwrap(), b"hello");
        let body = crate::metrics::render(&registry);
        assert!(body.contains(r#"sft_sessions_total{outcome="succeeded"} 1"#), "{body}");
        assert!(body.contains(r#"sft_sessions_total{outcome="auth"} 1"#), "{body}");
        assert!(body.contains("sft_bytes_received_total 5"), "{body}");
    }

    #[tokio::test]
    async fn stops_accepting_after_shutdown() {
        let tmp = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        serve_connections(
            listener,
            context(tmp.path(), SharedKey::generate()),
            SessionMetrics::default(),
            std::future::ready(()),
        )
        .await;

        // Listener was dropped with the loop.
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[test]
    fn load_key_generates_when_allowed() {
        let tmp = TempDir::new().unwrap();
        let config = CryptoConfig {
            key_file: tmp.path().join("shared_key.txt"),
            generate_if_missing: true,
        };

        let first = load_key(&config).unwrap();
        let second = load_key(&config).unwrap();
        assert_eq!(first.current_key().as_bytes(), second.current_key().as_bytes());
    }

    #[test]
    fn load_key_requires_file_when_generation_disabled() {
        let tmp = TempDir::new().unwrap();
        let config = CryptoConfig {
            key_file: tmp.path().join("missing.txt"),
            generate_if_missing: false,
        };

        assert!(load_key(&config).is_err());
        assert!(!config.key_file.exists());
    }
}
