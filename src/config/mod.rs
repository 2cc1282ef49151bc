//! Typed configuration.
//!
//! Loads once at startup from an optional TOML file, then environment
//! variables, then CLI flags (applied by the binary). Every setting has a
//! default; a value that is present but unparseable fails fast.

use crate::dispatch::DispatchConfig;
use crate::error::{Error, Result};
use crate::race::RaceConfig;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub dispatch: DispatchConfig,
    pub race: RaceConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            race: RaceConfig::default(),
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables over the defaults.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with an injected variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        config.apply_vars(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables onto an existing config.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(n) = parse_var(&lookup, "FANOUT_WORKERS")? {
            self.dispatch.workers = n;
        }
        if let Some(n) = parse_var(&lookup, "FANOUT_INPUT_CAPACITY")? {
            self.dispatch.input_capacity = n;
        }
        if let Some(n) = parse_var(&lookup, "FANOUT_OUTPUT_CAPACITY")? {
            self.dispatch.output_capacity = n;
        }
        if let Some(ms) = parse_var(&lookup, "FANOUT_JOB_DELAY_MS")? {
            self.dispatch.job_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "FANOUT_TIMER_DELAY_MS")? {
            self.race.timer_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "FANOUT_DEADLINE_MS")? {
            self.race.deadline = Duration::from_millis(ms);
        }
        if let Some(endpoint) = lookup("OTEL_ENDPOINT").filter(|s| !s.is_empty()) {
            self.otel_endpoint = Some(endpoint);
        }
        if let Some(level) = lookup("LOG_LEVEL").filter(|s| !s.is_empty()) {
            self.log_level = level;
        }
        Ok(())
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))?;

        let mut config = Self::default();
        let d = &mut config.dispatch;
        d.workers = file.dispatch.workers.unwrap_or(d.workers);
        d.input_capacity = file.dispatch.input_capacity.unwrap_or(d.input_capacity);
        d.output_capacity = file.dispatch.output_capacity.unwrap_or(d.output_capacity);
        if let Some(ms) = file.dispatch.job_delay_ms {
            d.job_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.race.timer_delay_ms {
            config.race.timer_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.race.deadline_ms {
            config.race.deadline = Duration::from_millis(ms);
        }
        config.otel_endpoint = file.otel_endpoint;
        if let Some(level) = file.log_level {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate()
    }
}

/// On-disk TOML layout.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    otel_endpoint: Option<String>,
    log_level: Option<String>,
    #[serde(default)]
    dispatch: DispatchSection,
    #[serde(default)]
    race: RaceSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DispatchSection {
    workers: Option<usize>,
    input_capacity: Option<usize>,
    output_capacity: Option<usize>,
    job_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RaceSection {
    timer_delay_ms: Option<u64>,
    deadline_ms: Option<u64>,
}

fn parse_var<T>(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("environment variable {name}={raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_treats_blank_as_unset() {
        let got: Option<usize> = parse_var(|_| Some("  ".to_string()), "X").unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn parse_var_names_the_variable_on_error() {
        let err = parse_var::<usize>(|_| Some("many".to_string()), "FANOUT_WORKERS").unwrap_err();
        assert!(err.to_string().contains("FANOUT_WORKERS"));
    }
}
