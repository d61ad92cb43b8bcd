//! Domain Layer - Core relay types and business logic.
//!
//! This layer contains the core domain types for quote relaying with no
//! transport dependencies. All types here are pure Rust with serialization
//! support.

/// Quote payloads, instrument sets, and the subscription control message.
pub mod quote;

/// Session identity and upstream connection state.
pub mod session;
