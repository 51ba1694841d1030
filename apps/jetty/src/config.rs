use std::env;
use std::time::Duration;

use url::Url;

/// Logical remote target the socket URL is derived from. Owned by the
/// Connection Manager; connecting to a different target tears down the
/// existing connection first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Workflow execution sync: `/ws/workflow/{id}/`.
    Workflow { id: String },
    /// Remote browser video/input session: `/ws/video/`.
    Video,
}

impl Target {
    pub fn workflow(id: impl Into<String>) -> Self {
        Self::Workflow { id: id.into() }
    }

    fn path(&self) -> String {
        match self {
            Self::Workflow { id } => format!("/ws/workflow/{id}/"),
            Self::Video => "/ws/video/".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid API origin {origin:?}: {source}")]
    InvalidOrigin {
        origin: String,
        source: url::ParseError,
    },
    #[error("unsupported API origin scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),
}

/// Bounded automatic reconnection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(3000),
        }
    }
}

/// Client configuration, loaded from the environment with defaults
/// suitable for local development.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP(S) origin of the API the socket URL is derived from.
    pub api_origin: String,
    pub reconnect: ReconnectPolicy,
    /// Minimum interval between forwarded pointer-move messages.
    pub pointer_throttle: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let api_origin = env::var("JETTY_API_ORIGIN")
            .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
        Self {
            api_origin,
            ..Self::default()
        }
    }

    /// Derive the socket URL for a target: http→ws / https→wss scheme
    /// substitution on the API origin plus the target's path.
    pub fn socket_url(&self, target: &Target) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.api_origin).map_err(|source| ConfigError::InvalidOrigin {
            origin: self.api_origin.clone(),
            source,
        })?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        // set_scheme only rejects invalid scheme transitions; ws/wss
        // from http/https is always accepted.
        url.set_scheme(scheme)
            .map_err(|()| ConfigError::UnsupportedScheme(scheme.to_string()))?;
        url.set_path(&target.path());
        url.set_query(None);
        Ok(url)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_origin: "http://127.0.0.1:8000".to_string(),
            reconnect: ReconnectPolicy::default(),
            pointer_throttle: Duration::from_millis(16),
        }
    }
}
