//! Twelve Data Adapter
//!
//! Client side of the Twelve Data real-time price stream
//! (`wss://ws.twelvedata.com/v1/quotes/price`).
//!
//! Each downstream session owns one [`UpstreamConnector`]. The connector
//! authenticates through the `apikey` query parameter, subscribes once to the
//! configured instruments and relays every decoded message back to its session.

pub mod codec;
pub mod connector;
pub mod reconnect;
pub mod transport;

pub use codec::{CodecError, JsonCodec};
pub use connector::{
    CloseOutcome, ConnectorConfig, DEFAULT_CLOSE_TIMEOUT, UpstreamConnector, UpstreamEvent,
};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use transport::{TungsteniteDialer, TungsteniteLink};
