//! Destination for verified plaintext.

use anyhow::{Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives the plaintext of a transfer whose hash has been verified.
///
/// Called at most once per session and never with unverified bytes.
pub trait FileSink: Send + Sync + 'static {
    /// Store `bytes` under `name`, replacing any existing file of that name.
    ///
    /// Returns where the bytes ended up.
    fn write<'a>(
        &'a self,
        name: &'a str,
        bytes: &'a [u8],
    ) -> impl Future<Output = Result<PathBuf>> + Send + 'a;
}

/// Writes received files into a single directory.
///
/// Only the final component of the negotiated name is used, so a client cannot
/// place files outside `root`. Each file is written to a hidden temporary
/// file in `root` and renamed into place.
#[derive(Debug)]
pub struct DirSink {
    root: PathBuf,
    seq: AtomicU64,
}

impl DirSink {
    /// Create the sink, creating `root` if needed.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating receive directory: {}", root.display()))?;
        Ok(Self {
            root,
            seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hidden temporary path whose length does not depend on the target name.
    fn partial_path(&self) -> PathBuf {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(".sft.{}.{n}.partial", std::process::id()))
    }

    /// Final path for a negotiated name, or `None` if it has no usable file name.
    pub fn target_for(&self, name: &str) -> Option<PathBuf> {
        let file_name = Path::new(name).file_name()?;
        Some(self.root.join(file_name))
    }
}

impl FileSink for DirSink {
    fn write<'a>(
        &'a self,
        name: &'a str,
        bytes: &'a [u8],
    ) -> impl Future<Output = Result<PathBuf>> + Send + 'a {
        async move {
            let target = self
                .target_for(name)
                .with_context(|| format!("refusing file name {name:?}"))?;

            let partial = self.partial_path();

            if let Err(e) = tokio::fs::write(&partial, bytes).await {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e).with_context(|| format!("writing {}", partial.display()));
            }

            if let Err(e) = tokio::fs::rename(&partial, &target).await {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e).with_context(|| format!("renaming into {}", target.display()));
            }

            tracing::debug!(path = %target.display(), bytes = bytes.len(), "file stored");
            Ok(target)
        }
    }
}
