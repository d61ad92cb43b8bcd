//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    API_KEY_VAR, ConfigError, CorsOrigins, Credentials, DEFAULT_UPSTREAM_URL, ReconnectSettings,
    RelayConfig, ServerSettings, UpstreamEndpoint, UpstreamSettings,
};
