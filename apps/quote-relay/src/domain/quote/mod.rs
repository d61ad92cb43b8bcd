//! Quote Types
//!
//! A [`Quote`] is whatever JSON the provider sent, kept verbatim so the relay
//! never reshapes provider data. The accessors exist for logging only.
//!
//! [`InstrumentSet`] is the fixed list of symbols every new upstream
//! connection subscribes to, and [`SubscribeRequest`] is the control frame
//! that carries it:
//!
//! ```json
//! {"action":"subscribe","params":{"symbols":"AAPL,BTC/USD,ETH/USD"}}
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Symbols subscribed when no override is configured.
pub const DEFAULT_SYMBOLS: &[&str] = &[
    "AAPL", "BTC/USD", "ETH/USD", "EUR/USD", "GBP/USD", "USD/JPY", "USD/INR",
];

// =============================================================================
// Quote
// =============================================================================

/// One decoded upstream message, forwarded to the client unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quote(Value);

impl Quote {
    /// Wrap a decoded provider payload.
    #[must_use]
    pub const fn new(payload: Value) -> Self {
        Self(payload)
    }

    /// The raw provider payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.0
    }

    /// Consume the quote, returning the raw payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.0
    }

    /// Provider event tag (`price`, `subscribe-status`, `heartbeat`, ...).
    #[must_use]
    pub fn event(&self) -> Option<&str> {
        self.0.get("event").and_then(Value::as_str)
    }

    /// Instrument symbol, if the payload carries one.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        self.0.get("symbol").and_then(Value::as_str)
    }

    /// Price as a decimal. Accepts JSON numbers and numeric strings.
    #[must_use]
    pub fn price(&self) -> Option<Decimal> {
        match self.0.get("price")? {
            Value::Number(n) => {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .ok()
            }
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    /// Provider timestamp (unix seconds) as UTC.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let secs = self.0.get("timestamp").and_then(Value::as_i64)?;
        DateTime::from_timestamp(secs, 0)
    }
}

impl From<Value> for Quote {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}

// =============================================================================
// Instrument Set
// =============================================================================

/// Ordered, de-duplicated symbol list subscribed on every upstream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentSet {
    symbols: Vec<String>,
}

impl InstrumentSet {
    /// Build a set from symbols. Whitespace is trimmed, blanks and repeats
    /// are dropped, first-seen order is kept.
    #[must_use]
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for symbol in symbols {
            let symbol = symbol.as_ref().trim();
            if symbol.is_empty() || out.iter().any(|s| s == symbol) {
                continue;
            }
            out.push(symbol.to_string());
        }
        Self { symbols: out }
    }

    /// Parse a comma-separated symbol list.
    #[must_use]
    pub fn parse(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    /// Symbols in subscription order.
    #[must_use]
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Number of symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the set has no symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Comma-separated form used in the subscription request.
    #[must_use]
    pub fn to_param(&self) -> String {
        self.symbols.join(",")
    }
}

impl Default for InstrumentSet {
    fn default() -> Self {
        Self::new(DEFAULT_SYMBOLS.iter().copied())
    }
}

impl fmt::Display for InstrumentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_param())
    }
}

// =============================================================================
// Subscription Request
// =============================================================================

/// Parameters of a subscription control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeParams {
    /// Comma-separated instrument identifiers.
    pub symbols: String,
}

/// Control message sent once per upstream connection after it opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Always `subscribe`.
    pub action: String,
    /// Request parameters.
    pub params: SubscribeParams,
}

impl SubscribeRequest {
    /// Create a subscribe request for the given instruments.
    #[must_use]
    pub fn subscribe(instruments: &InstrumentSet) -> Self {
        Self {
            action: "subscribe".to_string(),
            params: SubscribeParams {
                symbols: instruments.to_param(),
            },
        }
    }

    /// Serialize to the JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
