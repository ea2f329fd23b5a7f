use std::env;
use std::net::SocketAddr;

use crate::reducer::{ThresholdError, Thresholds, DEFAULT_SUSPICIOUS_THRESHOLD, DEFAULT_WARNING_THRESHOLD};
use crate::severity::SeverityTable;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_DB_NAME: &str = "proctor_db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not a valid value: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error(transparent)]
    Thresholds(#[from] ThresholdError),

    #[error("malformed severity override {entry:?}, expected tag=weight")]
    SeverityOverride { entry: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub mongo_uri: Option<String>,
    pub db_name: String,
    pub thresholds: Thresholds,
    pub severity: SeverityTable,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests never touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = var("EXAMWATCH_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                var: "EXAMWATCH_BIND",
                value: bind_raw.clone(),
            })?;

        let suspicious = parse_u64(
            "EXAMWATCH_SUSPICIOUS_THRESHOLD",
            var("EXAMWATCH_SUSPICIOUS_THRESHOLD"),
            DEFAULT_SUSPICIOUS_THRESHOLD,
        )?;
        let warning = parse_u64(
            "EXAMWATCH_WARNING_THRESHOLD",
            var("EXAMWATCH_WARNING_THRESHOLD"),
            DEFAULT_WARNING_THRESHOLD,
        )?;
        let thresholds = Thresholds::new(suspicious, warning)?;

        let severity = match var("EXAMWATCH_SEVERITY_OVERRIDES") {
            Some(raw) => SeverityTable::default().with_overrides(parse_overrides(&raw)?),
            None => SeverityTable::default(),
        };

        Ok(Self {
            bind,
            mongo_uri: var("MONGO_URI"),
            db_name: var("EXAMWATCH_DB").unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            thresholds,
            severity,
        })
    }
}

fn parse_u64(var: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}

/// Parses `tag=weight,tag=weight`.
fn parse_overrides(raw: &str) -> Result<Vec<(String, u32)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let malformed = || ConfigError::SeverityOverride {
                entry: entry.to_string(),
            };
            let (tag, weight) = entry.split_once('=').ok_or_else(malformed)?;
            let tag = tag.trim();
            if tag.is_empty() {
                return Err(malformed());
            }
            let weight = weight.trim().parse::<u32>().map_err(|_| malformed())?;
            Ok((tag.to_string(), weight))
        })
        .collect()
}
