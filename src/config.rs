//! Process configuration from the environment

use crate::engine::DEFAULT_MAX_HOPS;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    /// Holds `rules/` and `context/`
    pub data_dir: PathBuf,
    pub port: u16,
    /// Bound on each remote step call
    pub step_timeout: Duration,
    /// Bound on step invocations per inbound message
    pub max_hops: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            data_dir: lookup("CONVEYOR_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            port: parse_var(&lookup, "CONVEYOR_PORT").unwrap_or(DEFAULT_PORT),
            step_timeout: Duration::from_secs(
                parse_var(&lookup, "CONVEYOR_STEP_TIMEOUT_SECS").unwrap_or(DEFAULT_STEP_TIMEOUT_SECS),
            ),
            max_hops: parse_var(&lookup, "CONVEYOR_MAX_HOPS")
                .filter(|hops: &usize| *hops > 0)
                .unwrap_or(DEFAULT_MAX_HOPS),
        }
    }
}

/// Unset and unparseable values both read as `None`
fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|value| value.trim().parse().ok())
}
