//! Agent configuration
//!
//! Values come from CLI flags (or their environment variables), then an
//! optional TOML file, then built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;
use url::Url;

use kubestream_logs::{DEFAULT_OPEN_TIMEOUT, DEFAULT_TAIL_LINES, StreamSettings};

/// Agent version reported to the master
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_ENV: &str = "default";
const DEFAULT_HEARTBEAT_SECS: u64 = 10;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// Kubestream - relays pod log streams from a cluster to a master over WebSocket
#[derive(Parser, Debug, Default)]
#[command(name = "kubestream")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Master base URL (ws:// or wss://)
    #[arg(long, env = "KUBESTREAM_MASTER_URL")]
    pub master_url: Option<String>,

    /// Cluster tag reported to the master
    #[arg(long, env = "KUBESTREAM_ENV")]
    pub env: Option<String>,

    /// Kubeconfig context (defaults to in-cluster or current context)
    #[arg(long, env = "KUBESTREAM_CONTEXT")]
    pub context: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long, env = "KUBESTREAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds between heartbeats
    #[arg(long)]
    pub heartbeat_secs: Option<u64>,

    /// Seconds to wait before reconnecting to the master
    #[arg(long)]
    pub reconnect_delay_secs: Option<u64>,

    /// Number of historical log lines to send when a stream starts
    #[arg(long)]
    pub tail_lines: Option<i64>,

    /// Seconds allowed for opening a pod log stream
    #[arg(long)]
    pub open_timeout_secs: Option<u64>,
}

/// Contents of the TOML config file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub master_url: Option<String>,
    pub env: Option<String>,
    pub context: Option<String>,
    pub heartbeat_secs: Option<u64>,
    pub reconnect_delay_secs: Option<u64>,
    pub tail_lines: Option<i64>,
    pub open_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).context(format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Fully resolved agent settings
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub master_url: String,
    pub env: String,
    pub context: Option<String>,
    pub heartbeat: Duration,
    pub reconnect_delay: Duration,
    pub stream: StreamSettings,
}

impl AgentConfig {
    /// Load the config file named in `args`, if any, and merge it with the flags
    pub fn from_args(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    /// Merge flags over file values over defaults
    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self> {
        let Some(master_url) = args.master_url.clone().or(file.master_url) else {
            bail!("No master URL configured. Pass --master-url or set KUBESTREAM_MASTER_URL");
        };

        let heartbeat_secs = args
            .heartbeat_secs
            .or(file.heartbeat_secs)
            .unwrap_or(DEFAULT_HEARTBEAT_SECS);
        if heartbeat_secs == 0 {
            bail!("heartbeat_secs must be greater than zero");
        }

        let tail_lines = args
            .tail_lines
            .or(file.tail_lines)
            .unwrap_or(DEFAULT_TAIL_LINES);
        if tail_lines < 0 {
            bail!("tail_lines must not be negative");
        }

        let open_timeout = args
            .open_timeout_secs
            .or(file.open_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_OPEN_TIMEOUT);

        let config = Self {
            master_url,
            env: args
                .env
                .clone()
                .or(file.env)
                .unwrap_or_else(|| DEFAULT_ENV.to_string()),
            context: args.context.clone().or(file.context),
            heartbeat: Duration::from_secs(heartbeat_secs),
            reconnect_delay: Duration::from_secs(
                args.reconnect_delay_secs
                    .or(file.reconnect_delay_secs)
                    .unwrap_or(DEFAULT_RECONNECT_DELAY_SECS),
            ),
            stream: StreamSettings {
                tail_lines,
                open_timeout,
            },
        };

        // Fail early on an unusable URL rather than on every reconnect
        config.websocket_url()?;
        Ok(config)
    }

    /// Master endpoint: `<master_url>/ws?env=<env>&ver=<version>`
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.master_url)
            .context(format!("Invalid master URL: {}", self.master_url))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => bail!("Unsupported master URL scheme '{}', expected ws or wss", other),
        }

        let path = format!("{}/ws", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("env", &self.env)
            .append_pair("ver", VERSION);

        Ok(url)
    }
}
