use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{SftError, SftResult};

/// Top-level configuration (loaded from sft.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SftConfig {
    /// Warn if the config file is world-readable (default: true)
    #[serde(default = "default_true")]
    pub config_file_mode_check: bool,
    pub daemon: DaemonConfig,
    pub client: ClientConfig,
    pub auth: AuthConfig,
    pub crypto: CryptoConfig,
    pub transfer: TransferConfig,
}

fn default_true() -> bool {
    true
}

impl Default for SftConfig {
    fn default() -> Self {
        Self {
            config_file_mode_check: true,
            daemon: DaemonConfig::default(),
            client: ClientConfig::default(),
            auth: AuthConfig::default(),
            crypto: CryptoConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// TCP listen address (default: 0.0.0.0:8888)
    pub listen: String,
    /// Prometheus metrics endpoint (optional, e.g. 127.0.0.1:9100)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or IP (default: localhost)
    pub server: String,
    /// Server port (default: 8888)
    pub port: u16,
    /// Login used when none is given on the command line
    pub login: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// TOML file with a `[users]` table (login = secret)
    pub credentials_file: Option<PathBuf>,
    /// Inline users (login = secret); entries in credentials_file take precedence
    pub users: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Base64 shared key file (default: shared_key.txt)
    pub key_file: PathBuf,
    /// Generate the key file on daemon startup if it does not exist
    pub generate_if_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Directory receiving verified files (default: received)
    pub received_dir: PathBuf,
    /// Largest accepted frame in bytes (default: 256 MiB)
    pub max_frame_len: u32,
    /// Fail transfers whose decrypted length differs from the declared size
    pub enforce_declared_size: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: format!("0.0.0.0:{}", crate::DEFAULT_PORT),
            metrics_addr: None,
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "localhost".into(),
            port: crate::DEFAULT_PORT,
            login: None,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_file: PathBuf::from("shared_key.txt"),
            generate_if_missing: true,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            received_dir: PathBuf::from("received"),
            max_frame_len: 256 * 1024 * 1024,
            enforce_declared_size: false,
        }
    }
}

/// Load configuration from `path`, falling back to defaults if the file is absent.
pub fn load(path: &Path) -> SftResult<SftConfig> {
    if !path.exists() {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            path.display()
        );
        return Ok(SftConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| SftError::Config(format!("parsing {}: {e}", path.display())))
}

/// True if `path` is readable by everyone (always false on non-unix targets).
pub fn is_world_readable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o004 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        false
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}
