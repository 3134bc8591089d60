use crate::logging::LogFormat;
use serde::Serialize;
use std::path::PathBuf;

pub const ENV_WORKSPACE: &str = "ROSTERD_WORKSPACE";
pub const ENV_LOG_FORMAT: &str = "ROSTERD_LOG";
pub const ENV_BUS_CAPACITY: &str = "ROSTERD_BUS_CAPACITY";

pub const DEFAULT_BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Workspace opened at startup, before any `workspace.select`.
    pub workspace: Option<PathBuf>,
    pub log_format: LogFormat,
    /// Buffered invalidation signals per subscriber before it lags.
    pub bus_capacity: usize,
    /// Values that were present but unusable. Logged once logging is up.
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            log_format: LogFormat::default(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
            warnings: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; bad values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(ws) = lookup(ENV_WORKSPACE).filter(|v| !v.trim().is_empty()) {
            cfg.workspace = Some(PathBuf::from(ws));
        }

        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            match LogFormat::parse(&raw) {
                Some(f) => cfg.log_format = f,
                None => cfg
                    .warnings
                    .push(format!("{ENV_LOG_FORMAT}={raw:?} is not compact|pretty|json")),
            }
        }

        if let Some(raw) = lookup(ENV_BUS_CAPACITY) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => cfg.bus_capacity = n,
                _ => cfg
                    .warnings
                    .push(format!("{ENV_BUS_CAPACITY}={raw:?} is not a positive integer")),
            }
        }

        cfg
    }
}
