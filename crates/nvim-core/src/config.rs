//! Centralized configuration for the Neovim RPC client.
//!
//! Wire constants and default limits live on `RpcConfig`; per-connection knobs
//! live on `SessionConfig`; logging is configured from the environment through
//! `LogConfig`.

use crate::{NvimError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Protocol-level constants.
pub struct RpcConfig;

impl RpcConfig {
    // Frame type tags
    pub const REQUEST: u64 = 0;
    pub const RESPONSE: u64 = 1;
    pub const NOTIFICATION: u64 = 2;

    /// First id handed out on a fresh connection.
    pub const FIRST_REQUEST_ID: u64 = 1;

    /// Upper bound on a single buffered frame.
    pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024; // 64MB
    pub const READ_CHUNK_SIZE: usize = 8192;

    /// Timed-out request ids remembered so their late responses are dropped quietly.
    pub const MAX_ABANDONED_IDS: usize = 1024;

    /// Methods tried in order to fetch API metadata.
    pub const API_INFO_METHODS: [&'static str; 2] = ["nvim_get_api_info", "vim_get_api_info"];

    /// Prefixes stripped from un-scoped function names to form short aliases.
    pub const GLOBAL_PREFIXES: [&'static str; 2] = ["nvim_", "vim_"];
}

/// Per-session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline applied to every request; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Largest frame the codec will buffer before giving up.
    pub max_frame_size: usize,
    /// Bytes requested from the transport per read.
    pub read_chunk_size: usize,
    /// How many abandoned request ids to remember; the oldest are forgotten first.
    pub max_abandoned_ids: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_frame_size: RpcConfig::MAX_FRAME_SIZE,
            read_chunk_size: RpcConfig::READ_CHUNK_SIZE,
            max_abandoned_ids: RpcConfig::MAX_ABANDONED_IDS,
        }
    }
}

impl SessionConfig {
    /// Create a new session config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the maximum buffered frame size.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the transport read chunk size.
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set how many abandoned request ids are remembered.
    pub fn with_max_abandoned_ids(mut self, count: usize) -> Self {
        self.max_abandoned_ids = count;
        self
    }
}

/// Logging configuration, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Log file path; `None` logs to stderr.
    pub file: Option<PathBuf>,
    /// Filter directive (a level name like `warn`, or an env-filter directive).
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            filter: Self::DEFAULT_LEVEL.to_string(),
        }
    }
}

impl LogConfig {
    pub const FILE_ENV: &'static str = "NVIM_RPC_LOG_FILE";
    pub const LEVEL_ENV: &'static str = "NVIM_RPC_LOG_LEVEL";
    pub const DEFAULT_LEVEL: &'static str = "warn";

    /// Read `NVIM_RPC_LOG_FILE` and `NVIM_RPC_LOG_LEVEL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    ///
    /// The level accepts names (`debug`, `INFO`, `fatal`, ...), the numeric
    /// severities `0..=5` (debug through unknown), or a full env-filter
    /// directive such as `nvim_core::rpc=trace`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = lookup(Self::FILE_ENV)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        let filter = match lookup(Self::LEVEL_ENV) {
            Some(level) if !level.trim().is_empty() => parse_level(level.trim())?,
            _ => Self::DEFAULT_LEVEL.to_string(),
        };

        Ok(Self { file, filter })
    }

    /// Override the filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Log to a file instead of stderr.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

fn parse_level(level: &str) -> Result<String> {
    let lowered = level.to_ascii_lowercase();
    let named = match lowered.as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "fatal" => Some("error"),
        "off" | "unknown" => Some("off"),
        _ => None,
    };
    if let Some(name) = named {
        return Ok(name.to_string());
    }

    if let Ok(severity) = lowered.parse::<i64>() {
        return match severity {
            i64::MIN..=0 => Ok("debug".to_string()),
            1 => Ok("info".to_string()),
            2 => Ok("warn".to_string()),
            3 | 4 => Ok("error".to_string()),
            _ => Ok("off".to_string()),
        };
    }

    if lowered.contains('=') {
        return Ok(level.to_string());
    }

    Err(NvimError::Argument {
        message: format!("unrecognized log level {:?} in {}", level, LogConfig::LEVEL_ENV),
    })
}
