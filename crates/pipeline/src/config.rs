use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fluxgen_comfyui::config::{DEFAULT_HOST, DEFAULT_PORT};
use fluxgen_comfyui::EngineConfig;

/// Default template location, relative to the working directory.
pub const DEFAULT_TEMPLATE_PATH: &str = "workflows/flux_workflow.json";

/// Default artifact directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Polling cadence and overall wait budget for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Fixed delay between queue inspections (default: 2 s).
    pub poll_interval: Duration,
    /// Give up waiting after this long (default: 300 s).
    pub budget: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            budget: Duration::from_secs(300),
        }
    }
}

/// Everything the generation pipeline needs, built once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub engine: EngineConfig,
    pub tracker: TrackerConfig,
    pub template_path: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            tracker: TrackerConfig::default(),
            template_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

/// An environment variable was set to something unparsable.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{key} must be a valid {expected}, got '{value}'")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                         |
    /// |---------------------------|---------------------------------|
    /// | `COMFYUI_HOST`            | `127.0.0.1`                     |
    /// | `COMFYUI_PORT`            | `8188`                          |
    /// | `SUBMIT_TIMEOUT_SECS`     | `30`                            |
    /// | `POLL_INTERVAL_MS`        | `2000`                          |
    /// | `COMPLETION_TIMEOUT_SECS` | `300`                           |
    /// | `TEMPLATE_PATH`           | `workflows/flux_workflow.json`  |
    /// | `OUTPUT_DIR`              | `output`                        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("COMFYUI_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port: u16 = parse_var(&lookup, "COMFYUI_PORT", DEFAULT_PORT, "port number")?;

        let mut engine = EngineConfig::from_host_port(&host, port);
        engine.submit_timeout = Duration::from_secs(parse_positive_var(
            &lookup,
            "SUBMIT_TIMEOUT_SECS",
            engine.submit_timeout.as_secs(),
            "positive number of seconds",
        )?);

        let defaults = TrackerConfig::default();
        let tracker = TrackerConfig {
            poll_interval: Duration::from_millis(parse_positive_var(
                &lookup,
                "POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
                "positive number of milliseconds",
            )?),
            budget: Duration::from_secs(parse_var(
                &lookup,
                "COMPLETION_TIMEOUT_SECS",
                defaults.budget.as_secs(),
                "number of seconds",
            )?),
        };

        let template_path = lookup("TEMPLATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_PATH));
        let output_dir = lookup("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        Ok(Self {
            engine,
            tracker,
            template_path,
            output_dir,
        })
    }
}

fn parse_var<T, F>(
    lookup: &F,
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError {
            key,
            value,
            expected,
        }),
    }
}

/// Like [`parse_var`], but zero is rejected.
fn parse_positive_var<F>(
    lookup: &F,
    key: &'static str,
    default: u64,
    expected: &'static str,
) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var(lookup, key, default, expected)? {
        0 => Err(ConfigError {
            key,
            value: "0".to_string(),
            expected,
        }),
        value => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = PipelineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.engine.api_url, "http://127.0.0.1:8188");
        assert_eq!(config.tracker, TrackerConfig::default());
        assert_eq!(config.template_path, PathBuf::from(DEFAULT_TEMPLATE_PATH));
        assert_eq!(config.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
    }

    #[test]
    fn overrides_are_applied() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("COMFYUI_HOST", "gpu-box"),
            ("COMFYUI_PORT", "9000"),
            ("SUBMIT_TIMEOUT_SECS", "10"),
            ("POLL_INTERVAL_MS", "500"),
            ("COMPLETION_TIMEOUT_SECS", "60"),
            ("OUTPUT_DIR", "/tmp/out"),
        ]))
        .unwrap();

        assert_eq!(config.engine.api_url, "http://gpu-box:9000");
        assert_eq!(config.engine.submit_timeout, Duration::from_secs(10));
        assert_eq!(config.tracker.poll_interval, Duration::from_millis(500));
        assert_eq!(config.tracker.budget, Duration::from_secs(60));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn unparsable_value_is_an_error() {
        let lookup = lookup_from(&[("COMFYUI_PORT", "eighty")]);
        let err = PipelineConfig::from_lookup(lookup).unwrap_err();
        assert_eq!(err.key, "COMFYUI_PORT");
        assert_eq!(err.value, "eighty");
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let lookup = lookup_from(&[("POLL_INTERVAL_MS", "0")]);
        let err = PipelineConfig::from_lookup(lookup).unwrap_err();
        assert_eq!(err.key, "POLL_INTERVAL_MS");
        assert_eq!(err.value, "0");
        assert_eq!(err.expected, "positive number of milliseconds");

        let lookup = lookup_from(&[("SUBMIT_TIMEOUT_SECS", "0")]);
        let err = PipelineConfig::from_lookup(lookup).unwrap_err();
        assert_eq!(err.key, "SUBMIT_TIMEOUT_SECS");
    }

    #[test]
    fn smallest_poll_interval_is_accepted() {
        let lookup = lookup_from(&[("POLL_INTERVAL_MS", "1")]);
        let config = PipelineConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.tracker.poll_interval, Duration::from_millis(1));
    }
}
