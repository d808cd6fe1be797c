//! Connection settings for one ComfyUI instance.

use std::time::Duration;

/// Default ComfyUI host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default ComfyUI port.
pub const DEFAULT_PORT: u16 = 8188;

/// Base URL plus per-endpoint request timeouts.
///
/// Each timeout bounds a single HTTP call. The overall wait for a job to
/// finish is a separate budget owned by the completion tracker.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// HTTP base URL, e.g. `http://127.0.0.1:8188`.
    pub api_url: String,
    /// Sent with every submission so the engine can attribute jobs.
    pub client_id: String,
    /// `POST /prompt` (default 30 s).
    pub submit_timeout: Duration,
    /// `GET /queue` while polling (default 5 s).
    pub poll_timeout: Duration,
    /// `GET /history/{id}` (default 10 s).
    pub history_timeout: Duration,
    /// `GET /view` artifact download (default 30 s).
    pub download_timeout: Duration,
    /// Liveness probe and auxiliary queries (default 5 s).
    pub status_timeout: Duration,
}

impl EngineConfig {
    /// Settings for the engine at `api_url` with default timeouts.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
            submit_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(5),
            history_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(30),
            status_timeout: Duration::from_secs(5),
        }
    }

    /// Settings for `http://{host}:{port}`.
    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self::new(format!("http://{host}:{port}"))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_host_port(DEFAULT_HOST, DEFAULT_PORT)
    }
}
