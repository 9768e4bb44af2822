use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Epoch milliseconds. Every history is keyed in this one format.
pub type TimestampMs = u64;

/// Identifies a tradable instrument.
///
/// Equality and hashing use `key` only (WKN or exchange instrument id); the
/// display name is informational and may differ between pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentRef {
    pub key: String,
    pub name: String,
}

impl InstrumentRef {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

impl PartialEq for InstrumentRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for InstrumentRef {}

impl Hash for InstrumentRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for InstrumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.key)
        } else {
            write!(f, "{} ({})", self.name, self.key)
        }
    }
}

/// A bid/ask observation. Either side may be missing on a partial update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotePoint {
    pub ts_ms: TimestampMs,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

/// A trade print to classify.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub instrument: Option<InstrumentRef>,
    pub price: f64,
    pub size: f64,
    pub ts_ms: TimestampMs,
}

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
    Unknown,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
            Side::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One merge-mode update as delivered by the feed client.
///
/// Times are kept in the feed's own string format here; they are normalised
/// by [`crate::time::parse_feed_time`] before touching any history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedUpdate {
    pub instrument: Option<InstrumentRef>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub bid_time: Option<String>,
    pub ask_time: Option<String>,
    pub trade: Option<f64>,
    pub trade_size: Option<f64>,
    pub trade_time: Option<String>,
}

/// Event produced on the primary tab and forwarded to secondaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum MarketEvent {
    Quote {
        instrument: Option<InstrumentRef>,
        bid: Option<f64>,
        ask: Option<f64>,
        ts_ms: TimestampMs,
    },
    Trade {
        instrument: Option<InstrumentRef>,
        price: f64,
        size: f64,
        ts_ms: TimestampMs,
        side: Side,
    },
}

impl MarketEvent {
    pub fn instrument(&self) -> Option<&InstrumentRef> {
        match self {
            MarketEvent::Quote { instrument, .. } | MarketEvent::Trade { instrument, .. } => {
                instrument.as_ref()
            }
        }
    }

    pub fn ts_ms(&self) -> TimestampMs {
        match self {
            MarketEvent::Quote { ts_ms, .. } | MarketEvent::Trade { ts_ms, .. } => *ts_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_identity_ignores_display_name() {
        let a = InstrumentRef::new("918422", "NVIDIA CORP. DL-,001");
        let b = InstrumentRef::new("918422", "nvidia-dl-01-aktie");
        let c = InstrumentRef::new("43763", "NVIDIA CORP. DL-,001");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn trade_event_serializes_with_kind_tag() {
        let ev = MarketEvent::Trade {
            instrument: Some(InstrumentRef::new("918422", "NVIDIA")),
            price: 10.2,
            size: 50.0,
            ts_ms: 2,
            side: Side::Buy,
        };

        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["kind"], "TRADE");
        assert_eq!(json["side"], "BUY");
        assert_eq!(json["instrument"]["key"], "918422");
    }
}
