//! Controller configuration, read from `STRATA_*` environment variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}, expected text or json")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Upper bound on passes running at the same time.
    pub max_concurrent_reconciles: usize,
    /// Reject references that leave the referring object's namespace.
    pub no_cross_namespace_refs: bool,
    /// Running outside a cluster: the default backend is a local file.
    pub disable_k8s_backend: bool,
    pub engine_url: String,
    pub engine_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub finalize_secrets_attempts: u32,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 4,
            no_cross_namespace_refs: false,
            disable_k8s_backend: false,
            engine_url: "http://127.0.0.1:30000".to_string(),
            engine_timeout: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(30),
            finalize_secrets_attempts: 5,
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unset variables take their
    /// defaults; set but unparsable ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse::<usize, _>(&lookup, "STRATA_MAX_CONCURRENT_RECONCILES")? {
            if v == 0 {
                return Err(ControllerError::Config(
                    "STRATA_MAX_CONCURRENT_RECONCILES must be at least 1".to_string(),
                ));
            }
            config.max_concurrent_reconciles = v;
        }
        if let Some(v) = parse_bool(&lookup, "STRATA_NO_CROSS_NAMESPACE_REFS")? {
            config.no_cross_namespace_refs = v;
        }
        if let Some(v) = parse_bool(&lookup, "STRATA_DISABLE_K8S_BACKEND")? {
            config.disable_k8s_backend = v;
        }
        if let Some(v) = lookup("STRATA_ENGINE_URL") {
            if v.trim().is_empty() {
                return Err(ControllerError::Config(
                    "STRATA_ENGINE_URL must not be empty".to_string(),
                ));
            }
            config.engine_url = v;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "STRATA_ENGINE_TIMEOUT_SECS")? {
            config.engine_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "STRATA_SHUTDOWN_TIMEOUT_SECS")? {
            config.shutdown_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = parse::<u32, _>(&lookup, "STRATA_FINALIZE_SECRETS_ATTEMPTS")? {
            config.finalize_secrets_attempts = v;
        }
        if let Some(v) = parse::<LogFormat, _>(&lookup, "STRATA_LOG_FORMAT")? {
            config.log_format = v;
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ControllerError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ControllerError::Config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}

fn parse_bool<F>(lookup: &F, key: &str) -> Result<Option<bool>, ControllerError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ControllerError::Config(format!(
                "{key}={raw:?}: expected true or false"
            ))),
        })
        .transpose()
}
