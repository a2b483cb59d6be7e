use anyhow::{Context, Result};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 120;

/// Engine configuration. Host applications either construct this directly
/// or load it from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the generation/entity backend, without a trailing slash.
    pub base_url: String,
    /// Bearer token for the backend, if it requires one.
    pub api_key: Option<String>,
    /// Deadline for atomic generation calls.
    pub request_timeout_secs: u64,
    /// Max wait between frames on a streaming call. A stream that goes
    /// silent longer than this fails with a timeout reason rather than
    /// hanging. Does not apply to user think-time in PreviewReady/Editing.
    pub stream_idle_timeout_secs: u64,
}

impl EngineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            stream_idle_timeout_secs: DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
        }
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(EngineConfig {
            base_url: require_env("QUILL_BACKEND_URL")?,
            api_key: std::env::var("QUILL_API_KEY").ok(),
            request_timeout_secs: env_or_default(
                "QUILL_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            stream_idle_timeout_secs: env_or_default(
                "QUILL_STREAM_IDLE_TIMEOUT_SECS",
                DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
            )?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or_default(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("'{key}' must be a number of seconds")),
        Err(_) => Ok(default),
    }
}
