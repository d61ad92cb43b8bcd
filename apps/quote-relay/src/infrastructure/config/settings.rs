//! Relay Configuration Settings
//!
//! Configuration types for the quote relay, loaded from environment variables
//! once at startup and shared read-only afterwards.

use std::fmt;
use std::time::Duration;

use crate::domain::quote::InstrumentSet;

/// Environment variable holding the provider API key.
pub const API_KEY_VAR: &str = "TWELVEDATA_API_KEY";

/// Default provider price stream.
pub const DEFAULT_UPSTREAM_URL: &str = "wss://ws.twelvedata.com/v1/quotes/price";

/// Provider API credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Provider stream location plus the key appended to it.
///
/// `Display` and `Debug` never show the key.
#[derive(Clone)]
pub struct UpstreamEndpoint {
    base_url: String,
    credentials: Credentials,
}

impl UpstreamEndpoint {
    /// Create an endpoint.
    #[must_use]
    pub const fn new(base_url: String, credentials: Credentials) -> Self {
        Self {
            base_url,
            credentials,
        }
    }

    /// Full URL including the `apikey` query parameter.
    #[must_use]
    pub fn url(&self) -> String {
        let sep = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{sep}apikey={}",
            self.base_url,
            self.credentials.api_key()
        )
    }

    /// URL without credentials.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl fmt::Display for UpstreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.base_url.contains('?') { '&' } else { '?' };
        write!(f, "{}{sep}apikey=[REDACTED]", self.base_url)
    }
}

impl fmt::Debug for UpstreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UpstreamEndpoint")
            .field(&self.to_string())
            .finish()
    }
}

/// Upstream reconnection settings.
///
/// `max_attempts == 0` keeps the connection fire-once: a failed dial or a
/// remote close ends the upstream side of the session for good.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Maximum reconnection attempts (0 = never reconnect).
    pub max_attempts: u32,
    /// Initial reconnection delay.
    pub initial_delay: Duration,
    /// Maximum reconnection delay.
    pub max_delay: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub multiplier: f64,
}

impl ReconnectSettings {
    /// Whether reconnection is enabled.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.max_attempts > 0
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Upstream connection settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Provider stream URL without credentials.
    pub base_url: String,
    /// Symbols subscribed on every connection.
    pub instruments: InstrumentSet,
    /// Capacity of the per-session event channel.
    pub event_capacity: usize,
    /// Reconnection behaviour.
    pub reconnect: ReconnectSettings,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            instruments: InstrumentSet::default(),
            event_capacity: 1024,
            reconnect: ReconnectSettings::default(),
        }
    }
}

/// Listener and admission settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP/WebSocket listen port.
    pub port: u16,
    /// Maximum concurrent sessions (0 = unlimited).
    pub max_sessions: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 5001,
            max_sessions: 0,
        }
    }
}

/// Origins allowed by the CORS layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CorsOrigins {
    /// Any origin (`*`).
    #[default]
    Any,
    /// Exact origins.
    List(Vec<String>),
}

impl CorsOrigins {
    /// Parse `*` or a comma-separated origin list.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let origins: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            Self::Any
        } else {
            Self::List(origins)
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Provider credentials.
    pub credentials: Credentials,
    /// Upstream connection settings.
    pub upstream: UpstreamSettings,
    /// Listener settings.
    pub server: ServerSettings,
    /// CORS policy.
    pub cors: CorsOrigins,
}

impl RelayConfig {
    /// Configuration with defaults for everything except the credential.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            upstream: UpstreamSettings::default(),
            server: ServerSettings::default(),
            cors: CorsOrigins::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or empty, or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or empty, or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key =
            lookup(API_KEY_VAR).ok_or_else(|| ConfigError::MissingEnvVar(API_KEY_VAR.to_string()))?;

        if api_key.trim().is_empty() {
            return Err(ConfigError::EmptyValue(API_KEY_VAR.to_string()));
        }

        // The key goes into the query string as-is.
        if !api_key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
        {
            return Err(ConfigError::InvalidValue {
                key: API_KEY_VAR.to_string(),
                reason: "must contain only letters, digits, '-', '.', '_' or '~'".to_string(),
            });
        }

        let defaults = UpstreamSettings::default();

        let base_url = lookup("RELAY_UPSTREAM_URL").unwrap_or(defaults.base_url);
        if !(base_url.starts_with("wss://") || base_url.starts_with("ws://")) {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_UPSTREAM_URL".to_string(),
                reason: "expected a ws:// or wss:// URL".to_string(),
            });
        }

        let instruments = match lookup("RELAY_SYMBOLS") {
            Some(csv) => {
                let set = InstrumentSet::parse(&csv);
                if set.is_empty() {
                    return Err(ConfigError::EmptyValue("RELAY_SYMBOLS".to_string()));
                }
                set
            }
            None => defaults.instruments,
        };

        let reconnect_defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            max_attempts: parse_u32(
                &lookup,
                "RELAY_UPSTREAM_MAX_RECONNECTS",
                reconnect_defaults.max_attempts,
            ),
            initial_delay: parse_duration_millis(
                &lookup,
                "RELAY_RECONNECT_DELAY_INITIAL_MS",
                reconnect_defaults.initial_delay,
            ),
            max_delay: parse_duration_secs(
                &lookup,
                "RELAY_RECONNECT_DELAY_MAX_SECS",
                reconnect_defaults.max_delay,
            ),
            multiplier: reconnect_defaults.multiplier,
        };

        let upstream = UpstreamSettings {
            base_url,
            instruments,
            event_capacity: parse_usize(&lookup, "RELAY_EVENT_CAPACITY", defaults.event_capacity)
                .max(1),
            reconnect,
        };

        let server = ServerSettings {
            port: parse_u16(&lookup, "PORT", ServerSettings::default().port),
            max_sessions: parse_usize(
                &lookup,
                "RELAY_MAX_SESSIONS",
                ServerSettings::default().max_sessions,
            ),
        };

        let cors = lookup("RELAY_CORS_ORIGINS")
            .map(|v| CorsOrigins::parse(&v))
            .unwrap_or_default();

        Ok(Self {
            credentials: Credentials::new(api_key),
            upstream,
            server,
            cors,
        })
    }

    /// Upstream endpoint with credentials attached.
    #[must_use]
    pub fn upstream_endpoint(&self) -> UpstreamEndpoint {
        UpstreamEndpoint::new(self.upstream.base_url.clone(), self.credentials.clone())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn parse_u16<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u16) -> u16 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_u32<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u32) -> u32 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_usize<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: usize) -> usize {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
