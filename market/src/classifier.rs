//! Trade-direction classifier.
//!
//! A trade is attributed to the side of the book it printed against: a
//! trade at the ask lifted the offer (buyer-initiated), a trade at the bid
//! hit the bid (seller-initiated). Only quote history older than the trade
//! is considered. A match against an in-history point compacts everything up
//! to and including that point into the last-known bid/ask.

use tracing::{debug, trace};

use crate::history::InstrumentHistory;
use crate::types::{QuotePoint, Side, TimestampMs, TradeEvent};

/// Absolute tolerance for price comparison.
pub const PRICE_EPSILON: f64 = 1e-4;

fn price_matches(quoted: Option<f64>, price: f64) -> bool {
    quoted.is_some_and(|q| (q - price).abs() < PRICE_EPSILON)
}

/// Record a quote. Never compacts.
pub fn observe_quote(history: &mut InstrumentHistory, point: QuotePoint) {
    history.upsert(point);
}

/// Remove every point with `ts <= through_ts`, folding their bid/ask forward.
pub fn compact(history: &mut InstrumentHistory, through_ts: TimestampMs) -> usize {
    let removed = history.fold_through(through_ts);
    if removed > 0 {
        debug!(
            target: "classifier",
            removed,
            through_ts,
            remaining = history.len(),
            "compacted quote history"
        );
    }
    removed
}

/// Classify `trade` against `history`, compacting on an in-history match.
pub fn classify(trade: &TradeEvent, history: &mut InstrumentHistory) -> Side {
    let price = trade.price;

    // Newest first; each point is checked ask-then-bid before moving older.
    let in_history = history.points_before(trade.ts_ms).find_map(|p| {
        if price_matches(p.ask, price) {
            Some((Side::Buy, p.ts_ms))
        } else if price_matches(p.bid, price) {
            Some((Side::Sell, p.ts_ms))
        } else {
            None
        }
    });

    if let Some((side, matched_ts)) = in_history {
        debug!(
            target: "classifier",
            price,
            trade_ts = trade.ts_ms,
            matched_ts,
            %side,
            "trade matched quote history"
        );
        compact(history, matched_ts);
        return side;
    }

    if price_matches(history.last_known_ask(), price) {
        debug!(target: "classifier", price, "trade matched last known ask");
        return Side::Buy;
    }
    if price_matches(history.last_known_bid(), price) {
        debug!(target: "classifier", price, "trade matched last known bid");
        return Side::Sell;
    }

    trace!(
        target: "classifier",
        price,
        trade_ts = trade.ts_ms,
        points = history.len(),
        "no matching bid/ask"
    );
    Side::Unknown
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]
        #[test]
        fn classification_never_leaves_resolved_points(
            quotes in prop::collection::vec((0u64..200, 0u32..40, 0u32..40), 0..60),
            trade_price in 0u32..40,
            trade_ts in 0u64..220,
        ) {
            let mut h = InstrumentHistory::default();
            for (ts, bid, ask) in &quotes {
                observe_quote(&mut h, QuotePoint {
                    ts_ms: *ts,
                    bid: Some(*bid as f64 / 4.0),
                    ask: Some(*ask as f64 / 4.0),
                });
            }
            let before: Vec<QuotePoint> = h.points().copied().collect();
            let t = TradeEvent {
                instrument: None,
                price: trade_price as f64 / 4.0,
                size: 1.0,
                ts_ms: trade_ts,
            };

            let side = classify(&t, &mut h);
            let after: Vec<QuotePoint> = h.points().copied().collect();

            if after.len() == before.len() {
                // Unmatched in history: nothing may change.
                prop_assert_eq!(&after, &before);
            } else {
                prop_assert_ne!(side, Side::Unknown);
                // Survivors are exactly a suffix of the prior ledger.
                prop_assert_eq!(&before[before.len() - after.len()..], &after[..]);
                let removed_max = before[before.len() - after.len() - 1].ts_ms;
                prop_assert!(removed_max < trade_ts);
            }
        }
    }
}
