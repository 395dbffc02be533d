//! Diagnostic logging for the message loop.
//!
//! A `LogContext` is built once from a [`LogConfig`] before the first
//! connection and then either installed process-wide or entered for a scope.
//! Library code only emits `tracing` events; it never configures logging on
//! its own.

use crate::config::LogConfig;
use crate::{NvimError, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::dispatcher::{self, DefaultGuard, Dispatch};
use tracing_subscriber::EnvFilter;

/// A configured log sink and severity filter.
#[derive(Clone)]
pub struct LogContext {
    config: LogConfig,
    dispatch: Dispatch,
}

impl std::fmt::Debug for LogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LogContext {
    /// Build the subscriber described by `config`.
    ///
    /// A log file is opened for appending and created if missing.
    pub fn new(config: LogConfig) -> Result<Self> {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(env_filter(&config.filter)?)
            .with_target(true)
            .with_thread_ids(false);

        let dispatch = match &config.file {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Dispatch::new(builder.with_ansi(false).with_writer(Mutex::new(file)).finish())
            }
            None => Dispatch::new(builder.with_writer(std::io::stderr).finish()),
        };

        Ok(Self { config, dispatch })
    }

    /// Build from `NVIM_RPC_LOG_FILE` and `NVIM_RPC_LOG_LEVEL`.
    pub fn from_env() -> Result<Self> {
        Self::new(LogConfig::from_env()?)
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Make this the process-wide subscriber. Fails if one is already set.
    pub fn install(&self) -> Result<()> {
        dispatcher::set_global_default(self.dispatch.clone()).map_err(|err| NvimError::Argument {
            message: format!("cannot install logger: {}", err),
        })
    }

    /// Use this subscriber on the current thread until the guard is dropped.
    pub fn enter(&self) -> DefaultGuard {
        dispatcher::set_default(&self.dispatch)
    }
}

fn env_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive).map_err(|err| NvimError::Argument {
        message: format!("invalid log filter {:?}: {}", directive, err),
    })
}
