//! Shared key: in-memory type, key file load/generate, provider seam

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use zeroize::Zeroize;

use crate::{CryptoError, KEY_SIZE};

/// The pre-shared 256-bit key used for every connection. Zeroized on drop.
#[derive(Clone)]
pub struct SharedKey {
    bytes: [u8; KEY_SIZE],
}

impl SharedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Generate a random key from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Decode a base64 key, ignoring surrounding whitespace.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;

        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKeyLength(len));
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { bytes })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }
}

impl Drop for SharedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Source of the shared key handed to every session.
///
/// Loaded once before the first connection; implementations must not change
/// the key afterwards.
pub trait KeyProvider: Send + Sync {
    fn current_key(&self) -> &SharedKey;
}

impl KeyProvider for SharedKey {
    fn current_key(&self) -> &SharedKey {
        self
    }
}

/// A shared key read from (or generated into) a base64 key file.
#[derive(Debug)]
pub struct KeyFile {
    key: SharedKey,
    path: PathBuf,
}

impl KeyFile {
    /// Load an existing key file.
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let mut content = std::fs::read_to_string(path)?;
        let key = SharedKey::from_base64(&content);
        content.zeroize();

        Ok(Self {
            key: key?,
            path: path.to_path_buf(),
        })
    }

    /// Load the key file, or generate a fresh key and persist it if the file
    /// does not exist.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            return Self::load(path);
        }

        let key = SharedKey::generate();
        write_key_file(path, &key)?;
        tracing::info!(path = %path.display(), "generated new shared key");

        Ok(Self {
            key,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyProvider for KeyFile {
    fn current_key(&self) -> &SharedKey {
        &self.key
    }
}

/// Write `key` as base64 to `path`, owner-readable only on unix.
pub fn write_key_file(path: &Path, key: &SharedKey) -> Result<(), CryptoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut encoded = key.to_base64();
    let written = std::fs::write(path, encoded.as_bytes());
    encoded.zeroize();
    written?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let k1 = SharedKey::generate();
        let k2 = SharedKey::generate();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_base64_roundtrip_with_whitespace() {
        let key = SharedKey::from_bytes([9u8; KEY_SIZE]);
        let encoded = format!("  {}\n", key.to_base64());

        let decoded = SharedKey::from_base64(&encoded).unwrap();
        assert_eq!(decoded.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_rejects_short_key() {
        let encoded = STANDARD.encode([1u8; 16]);
        let err = SharedKey::from_base64(&encoded).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyLength(16)));
    }

    #[test]
    fn test_rejects_non_base64() {
        let err = SharedKey::from_base64("not base64 at all!").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyEncoding(_)));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SharedKey::from_bytes([0xAB; KEY_SIZE]);
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("171"));
    }

    #[test]
    fn test_load_or_generate_persists_then_reloads() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("keys/shared_key.txt");

        let first = KeyFile::load_or_generate(&path).unwrap();
        assert!(path.exists());

        let second = KeyFile::load_or_generate(&path).unwrap();
        assert_eq!(
            first.current_key().as_bytes(),
            second.current_key().as_bytes(),
            "second call must reuse the persisted key"
        );
        assert_eq!(second.path(), path.as_path());
    }

    #[cfg(unix)]
    #[test]
    fn test_generated_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("shared_key.txt");
        KeyFile::load_or_generate(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = KeyFile::load(&tmp.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, CryptoError::Io(_)));
    }
}
