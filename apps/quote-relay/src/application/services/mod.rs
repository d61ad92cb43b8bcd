//! Application Services
//!
//! Services that bind downstream clients to their upstream connections.
//!
//! - `ClientSession`: Relays one client's quotes and owns its connector
//! - `SessionRegistry`: Admission and accounting for live sessions
//! - `admission`: Pluggable admission policies

pub mod admission;
pub mod registry;
pub mod session;

pub use admission::{AdmissionError, AlwaysAdmit, MaxSessions};
pub use registry::SessionRegistry;
pub use session::{ClientSession, STOCK_DATA_EVENT, SessionHandle, SessionReport};
