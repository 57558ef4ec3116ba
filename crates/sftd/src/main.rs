//! sftd: secure file transfer daemon
//!
//! Usage:
//!   sftd [--config /etc/sft/config.toml] [--listen 0.0.0.0:8888]
//!
//! Accepts TCP connections and runs one authenticated, encrypted,
//! hash-verified upload per connection.

mod daemon;
mod metrics;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sftd", version, about = "Secure file transfer daemon")]
struct Cli {
    /// Path to sft configuration file
    #[arg(
        long,
        short = 'c',
        env = "SFT_CONFIG",
        default_value = "/etc/sft/config.toml"
    )]
    config: PathBuf,

    /// Listen address (overrides [daemon].listen)
    #[arg(long, env = "SFT_LISTEN")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error); defaults to [daemon].log_level
    #[arg(long, env = "SFT_LOG")]
    log: Option<String>,

    /// Log format (json, text); defaults to [daemon].log_format
    #[arg(long, env = "SFT_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config first: it supplies the logging defaults
    let mut config = sft_core::config::load(&cli.config)?;

    let level = cli.log.clone().unwrap_or_else(|| config.daemon.log_level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| LogFormat::from_config(&config.daemon.log_format));
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "sftd starting"
    );
    check_config_file(&cli.config, config.config_file_mode_check);

    if let Some(listen) = cli.listen {
        config.daemon.listen = listen;
    }

    daemon::run(config).await
}

fn check_config_file(path: &Path, mode_check: bool) {
    if !path.exists() {
        warn!(
            "config file not found: {}  (using defaults)",
            path.display()
        );
        return;
    }
    if mode_check && sft_core::config::is_world_readable(path) {
        warn!(
            path = %path.display(),
            "config file is world-readable; it may contain credentials (chmod 600 to silence)"
        );
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
