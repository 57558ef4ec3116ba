//! sft: secure file transfer client
//!
//! Commands:
//!   send <file>    - authenticate, negotiate and upload one file
//!   keygen         - write a fresh shared key file
//!   config show    - display current configuration (secrets redacted)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sft_core::config::{expand_tilde, SftConfig};
use sft_core::SessionState;
use sft_crypto::{KeyFile, KeyProvider, SharedKey};
use sft_proto::{PhaseFn, TransferRequest};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sft",
    version,
    about = "Secure file transfer client",
    long_about = "sft: push files to an sftd server over an authenticated, encrypted, hash-verified channel"
)]
struct Cli {
    /// Path to sft configuration file
    #[arg(long, short = 'c', env = "SFT_CONFIG", default_value = "/etc/sft/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SFT_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a local file to the server
    Send {
        /// Local file to send
        file: PathBuf,
        /// Server host (overrides [client].server)
        #[arg(long, short = 's')]
        server: Option<String>,
        /// Server port (overrides [client].port)
        #[arg(long, short = 'p')]
        port: Option<u16>,
        /// Login name (overrides [client].login)
        #[arg(long, short = 'l')]
        login: Option<String>,
        /// Password; prompted for when absent
        #[arg(long, env = "SFT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Shared key file (overrides [crypto].key_file)
        #[arg(long, short = 'k', env = "SFT_KEY_FILE")]
        key_file: Option<PathBuf>,
        /// Largest frame to send in bytes (overrides [transfer].max_frame_len)
        #[arg(long)]
        max_frame_len: Option<u32>,
    },

    /// Generate a new shared key file
    Keygen {
        /// Destination (overrides [crypto].key_file)
        #[arg(long, short = 'k')]
        key_file: Option<PathBuf>,
        /// Replace an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Send {
            file,
            server,
            port,
            login,
            password,
            key_file,
            max_frame_len,
        } => {
            let target = SendTarget {
                server: server.unwrap_or_else(|| config.client.server.clone()),
                port: port.unwrap_or(config.client.port),
                login: resolve_login(login, &config)?,
                key_file: key_file.unwrap_or_else(|| config.crypto.key_file.clone()),
                max_frame_len: max_frame_len.unwrap_or(config.transfer.max_frame_len),
            };
            cmd_send(&target, &file, password).await
        }
        Commands::Keygen { key_file, force } => {
            let path = key_file.unwrap_or_else(|| config.crypto.key_file.clone());
            cmd_keygen(&expand_tilde(&path), force)
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Read the config file if present. A missing file is normal for a client,
/// so it is only reported at debug level.
fn load_config(path: &Path) -> Result<SftConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(SftConfig::default());
    }
    Ok(sft_core::config::load(path)?)
}

fn resolve_login(flag: Option<String>, config: &SftConfig) -> Result<String> {
    flag.or_else(|| config.client.login.clone())
        .context("no login given (use --login or set [client].login)")
}

fn resolve_password(flag: Option<String>, login: &str) -> Result<SecretString> {
    match flag {
        Some(p) => Ok(SecretString::from(p)),
        None => rpassword::prompt_password(format!("Password for {login}: "))
            .map(SecretString::from)
            .context("reading password"),
    }
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn phase_message(state: SessionState) -> &'static str {
    match state {
        SessionState::Authenticating => "authenticating...",
        SessionState::Negotiating => "negotiating metadata...",
        SessionState::Transferring => "sending encrypted payload...",
        SessionState::Succeeded => "verified by server",
        SessionState::Failed => "failed",
    }
}

// ── `sft send` ────────────────────────────────────────────────────────────────

struct SendTarget {
    server: String,
    port: u16,
    login: String,
    key_file: PathBuf,
    max_frame_len: u32,
}

async fn cmd_send(target: &SendTarget, file: &Path, password: Option<String>) -> Result<()> {
    let key_path = expand_tilde(&target.key_file);
    let key_file = KeyFile::load(&key_path)
        .with_context(|| format!("loading shared key: {}", key_path.display()))?;
    let key: &SharedKey = key_file.current_key();

    let secret = resolve_password(password, &target.login)?;
    let request = TransferRequest::from_path(file, target.login.clone(), secret)?
        .with_max_frame_len(target.max_frame_len);

    let addr = format!("{}:{}", target.server, target.port);
    let stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    tracing::debug!(addr = %addr, "connected");

    let spinner = make_spinner(&request.file_name);
    let pb = spinner.clone();
    let progress: PhaseFn = Box::new(move |state| pb.set_message(phase_message(state)));

    match sft_proto::send_file(stream, &request, key, Some(&progress)).await {
        Ok(receipt) => {
            spinner.finish_with_message("done");
            println!("sent:       {}", receipt.file_name);
            println!("server:     {addr}");
            println!("bytes:      {}", receipt.plaintext_len);
            println!("encrypted:  {}", receipt.ciphertext_len);
            println!("sha256:     {}", receipt.content_hash);
            Ok(())
        }
        Err(e) => {
            spinner.abandon_with_message("failed");
            Err(e).with_context(|| format!("sending {}", file.display()))
        }
    }
}

// ── `sft keygen` ──────────────────────────────────────────────────────────────

fn cmd_keygen(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "key file already exists: {} (use --force to replace it)",
            path.display()
        );
    }

    let key = SharedKey::generate();
    sft_crypto::keys::write_key_file(path, &key)
        .with_context(|| format!("writing key file: {}", path.display()))?;

    println!("wrote new shared key: {}", path.display());
    println!("copy this file to the server and every client that must talk to it");
    Ok(())
}

// ── `sft config show` ─────────────────────────────────────────────────────────

fn redacted(config: &SftConfig) -> SftConfig {
    let mut shown = config.clone();
    for secret in shown.auth.users.values_mut() {
        *secret = "********".into();
    }
    shown
}

fn cmd_config_show(config: &SftConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered =
        toml::to_string_pretty(&redacted(config)).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_send_flags() {
        let cli = Cli::try_parse_from([
            "sft", "send", "notes.txt", "--server", "files.local", "-p", "9999", "-l", "admin",
        ])
        .unwrap();

        match cli.command {
            Commands::Send {
                file,
                server,
                port,
                login,
                ..
            } => {
                assert_eq!(file, PathBuf::from("notes.txt"));
                assert_eq!(server.as_deref(), Some("files.local"));
                assert_eq!(port, Some(9999));
                assert_eq!(login.as_deref(), Some("admin"));
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn send_frame_limit_flag_parses() {
        let cli = Cli::try_parse_from(["sft", "send", "big.iso", "--max-frame-len", "1073741824"])
            .unwrap();

        match cli.command {
            Commands::Send { max_frame_len, .. } => assert_eq!(max_frame_len, Some(1 << 30)),
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn missing_config_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.client.port, sft_core::DEFAULT_PORT);
        assert_eq!(config.transfer.max_frame_len, sft_proto::DEFAULT_MAX_FRAME_LEN);
    }

    #[test]
    fn present_config_file_is_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sft.toml");
        std::fs::write(&path, "[transfer]\nmax_frame_len = 1073741824\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.transfer.max_frame_len, 1 << 30);
    }

    #[test]
    fn login_flag_beats_config() {
        let mut config = SftConfig::default();
        config.client.login = Some("from-config".into());

        assert_eq!(
            resolve_login(Some("from-flag".into()), &config).unwrap(),
            "from-flag"
        );
        assert_eq!(resolve_login(None, &config).unwrap(), "from-config");
        assert!(resolve_login(None, &SftConfig::default()).is_err());
    }

    #[test]
    fn keygen_refuses_to_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keys").join("shared_key.txt");

        cmd_keygen(&path, false).unwrap();
        let first = KeyFile::load(&path).unwrap();

        assert!(cmd_keygen(&path, false).is_err());
        assert_eq!(
            KeyFile::load(&path).unwrap().current_key().as_bytes(),
            first.current_key().as_bytes()
        );

        cmd_keygen(&path, true).unwrap();
        assert_ne!(
            KeyFile::load(&path).unwrap().current_key().as_bytes(),
            first.current_key().as_bytes()
        );
    }

    #[test]
    fn config_show_hides_inline_secrets() {
        let mut config = SftConfig::default();
        config.auth.users.insert("admin".into(), "admin123".into());

        let rendered = toml::to_string_pretty(&redacted(&config)).unwrap();
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("admin123"));
    }
}
