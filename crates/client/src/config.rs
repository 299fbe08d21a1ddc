//! Client configuration

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the chatdesk API, e.g. `https://shop.test`
    pub api_url: String,
    /// WebSocket endpoint, e.g. `wss://shop.test/api/v1/ws/chat`
    pub ws_url: String,

    pub typing_timeout: Duration,
    pub poll_interval: Duration,

    pub request_timeout: Duration,
    /// Retry attempts for idempotent reads
    pub max_retries: usize,
    pub retry_base_delay: Duration,

    /// Reconnect attempts after the realtime connection drops
    pub reconnect_attempts: usize,
    pub reconnect_base_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            ws_url: "ws://localhost:3000/api/v1/ws/chat".to_string(),
            typing_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            reconnect_attempts: 10,
            reconnect_base_delay: Duration::from_millis(250),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `CHATDESK_*` environment variables.
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_url = env::var("CHATDESK_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);
        let ws_url = env::var("CHATDESK_WS_URL").unwrap_or_else(|_| derive_ws_url(&api_url));

        Self {
            api_url,
            ws_url,
            typing_timeout: env_millis("CHATDESK_TYPING_TIMEOUT_MS").unwrap_or(defaults.typing_timeout),
            poll_interval: env::var("CHATDESK_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            request_timeout: env_millis("CHATDESK_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout),
            max_retries: env::var("CHATDESK_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            ..defaults
        }
    }

    /// Receivers drop a typing indicator after this long without a stop signal
    pub fn typing_stale_timeout(&self) -> Duration {
        self.typing_timeout * 3
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}

fn derive_ws_url(api_url: &str) -> String {
    let base = if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    };
    format!("{base}/api/v1/ws/chat")
}
