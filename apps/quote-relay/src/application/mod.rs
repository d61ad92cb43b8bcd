//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the relay services and the port interfaces that
//! decouple them from concrete transports.

/// Port interfaces for upstream, downstream, and admission seams.
pub mod ports;

/// Fan-out sessions, the session registry, and admission policies.
pub mod services;
