//! QuoteBook
//!
//! Owns one [`InstrumentHistory`] per instrument and turns raw feed updates
//! into [`MarketEvent`]s:
//!   • trades are validated, de-duplicated on trade time, and classified
//!   • bid/ask updates are normalised to epoch millis and recorded
//!
//! Histories are never shared across instruments. Updates that arrive
//! without an instrument go to a single anonymous history.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::classifier::{classify, observe_quote};
use crate::history::{HistoryConfig, InstrumentHistory};
use crate::time::parse_feed_time;
use crate::types::{FeedUpdate, InstrumentRef, MarketEvent, QuotePoint, Side, TradeEvent};

const ANONYMOUS: &str = "";

fn history_key(instrument: Option<&InstrumentRef>) -> &str {
    instrument.map(|i| i.key.as_str()).unwrap_or(ANONYMOUS)
}

#[derive(Debug, Default)]
pub struct QuoteBook {
    cfg: HistoryConfig,
    histories: HashMap<String, InstrumentHistory>,
    /// Raw trade time of the last processed trade per instrument.
    last_trade_time: HashMap<String, String>,
}

impl QuoteBook {
    pub fn new(cfg: HistoryConfig) -> Self {
        Self {
            cfg,
            histories: HashMap::new(),
            last_trade_time: HashMap::new(),
        }
    }

    pub fn history(&self, instrument: Option<&InstrumentRef>) -> Option<&InstrumentHistory> {
        self.histories.get(history_key(instrument))
    }

    pub fn instruments(&self) -> usize {
        self.histories.len()
    }

    fn history_mut(&mut self, instrument: Option<&InstrumentRef>) -> &mut InstrumentHistory {
        let cfg = self.cfg;
        self.histories
            .entry(history_key(instrument).to_string())
            .or_insert_with(|| InstrumentHistory::new(cfg))
    }

    /// Record a bid/ask observation for `instrument`.
    pub fn observe_quote(&mut self, instrument: Option<&InstrumentRef>, point: QuotePoint) {
        observe_quote(self.history_mut(instrument), point);
    }

    /// Classify a trade against its instrument's history.
    pub fn classify_trade(&mut self, trade: &TradeEvent) -> Side {
        classify(trade, self.history_mut(trade.instrument.as_ref()))
    }

    /// Process one merge-mode feed update.
    ///
    /// The trade part (if any) is handled before the quote part, so a quote
    /// carried in the same update can never classify its own trade.
    pub fn ingest(&mut self, update: FeedUpdate, now_ms: u64) -> Vec<MarketEvent> {
        let mut out = Vec::with_capacity(2);

        if let Some(ev) = self.ingest_trade(&update) {
            out.push(ev);
        }
        if let Some(ev) = self.ingest_quote(&update, now_ms) {
            out.push(ev);
        }

        out
    }

    fn ingest_trade(&mut self, update: &FeedUpdate) -> Option<MarketEvent> {
        let raw_time = update.trade_time.as_deref()?;
        let key = history_key(update.instrument.as_ref()).to_string();

        // The feed repeats the last trade on every merge update.
        if self.last_trade_time.get(&key).map(String::as_str) == Some(raw_time) {
            debug!(target: "classifier", instrument = %key, "trade time unchanged; skipping");
            return None;
        }
        self.last_trade_time.insert(key.clone(), raw_time.to_string());

        let (Some(price), Some(size)) = (update.trade, update.trade_size) else {
            debug!(target: "classifier", instrument = %key, "incomplete trade data");
            return None;
        };
        if size <= 0.0 {
            debug!(target: "classifier", instrument = %key, size, "non-positive trade size");
            return None;
        }
        let Some(ts_ms) = parse_feed_time(raw_time) else {
            warn!(target: "classifier", instrument = %key, raw_time, "unparseable trade time");
            return None;
        };

        let trade = TradeEvent {
            instrument: update.instrument.clone(),
            price,
            size,
            ts_ms,
        };
        let side = self.classify_trade(&trade);

        Some(MarketEvent::Trade {
            instrument: trade.instrument,
            price,
            size,
            ts_ms,
            side,
        })
    }

    fn ingest_quote(&mut self, update: &FeedUpdate, now_ms: u64) -> Option<MarketEvent> {
        if update.bid.is_none() && update.ask.is_none() {
            return None;
        }

        let raw_time = update
            .bid_time
            .as_deref()
            .or(update.ask_time.as_deref())
            .or(update.trade_time.as_deref());

        let ts_ms = match raw_time {
            Some(raw) => parse_feed_time(raw).unwrap_or_else(|| {
                warn!(target: "classifier", raw, "unparseable quote time; using now");
                now_ms
            }),
            None => now_ms,
        };

        let point = QuotePoint {
            ts_ms,
            bid: update.bid,
            ask: update.ask,
        };
        self.observe_quote(update.instrument.as_ref(), point);

        Some(MarketEvent::Quote {
            instrument: update.instrument.clone(),
            bid: update.bid,
            ask: update.ask,
            ts_ms,
        })
    }
}
