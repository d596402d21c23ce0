//! Runtime configuration.
//!
//! Read from the environment once by the caller (`Config::from_env`) and
//! passed down explicitly; nothing here is cached process-wide.

use crate::backend::native::Native;
use crate::backend::Executor;
use crate::error::{Error, Result};
use itertools::Itertools;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

pub const ENV_BACKENDS: &str = "VACCEL_BACKENDS";
pub const ENV_LOG_LEVEL: &str = "VACCEL_LOG_LEVEL";
pub const ENV_ROOTDIR: &str = "VACCEL_ROOTDIR";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(LogLevel::Error),
            2 => Some(LogLevel::Warn),
            3 => Some(LogLevel::Info),
            4 => Some(LogLevel::Debug),
            _ => None,
        }
    }

    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub backends: Vec<String>,
    pub log_level: LogLevel,
    pub rootdir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backends: vec![Native::NAME.to_string()],
            log_level: LogLevel::Warn,
            rootdir: env::temp_dir().join("vaccel"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(backends) = env::var(ENV_BACKENDS) {
            let names = parse_backends(&backends);
            if !names.is_empty() {
                config.backends = names;
            }
        }

        if let Some(level) = env::var(ENV_LOG_LEVEL)
            .ok()
            .and_then(|v| v.trim().parse::<u8>().ok())
            .and_then(LogLevel::from_level)
        {
            config.log_level = level;
        }

        if let Ok(dir) = env::var(ENV_ROOTDIR) {
            if !dir.trim().is_empty() {
                config.rootdir = PathBuf::from(dir.trim());
            }
        }

        config
    }

    /// Builds the executor for the first configured backend.
    pub fn executor(&self) -> Result<Arc<dyn Executor>> {
        let name = self
            .backends
            .first()
            .ok_or_else(|| Error::invalid("no backend configured"))?;

        match name.as_str() {
            Native::NAME => Ok(Arc::new(Native::new())),
            other => Err(Error::NotFound(PathBuf::from(other))),
        }
    }
}

fn parse_backends(value: &str) -> Vec<String> {
    value
        .split(|c| c == ',' || c == ':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_lowercase)
        .unique()
        .collect()
}
