use std::collections::BTreeMap;

use crate::types::{QuotePoint, TimestampMs};

pub const DEFAULT_MAX_POINTS: usize = 10_000;
pub const DEFAULT_MAX_AGE_MS: u64 = 15 * 60 * 1_000;

/// Safety bounds for unresolved quote history.
#[derive(Debug, Clone, Copy)]
pub struct HistoryConfig {
    /// Hard cap on retained points per instrument.
    pub max_points: usize,

    /// Points older than the newest point by more than this are evicted.
    /// `None` disables the time window.
    pub max_age_ms: Option<u64>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            max_age_ms: Some(DEFAULT_MAX_AGE_MS),
        }
    }
}

/// Per-instrument quote ledger plus the bid/ask carried forward by compaction.
///
/// Points are ordered by timestamp. Anything removed from the ledger, whether
/// by compaction or by the safety bounds, is folded into `last_known_*` in
/// ascending order so the most recent removed value wins.
#[derive(Debug, Clone)]
pub struct InstrumentHistory {
    points: BTreeMap<TimestampMs, QuotePoint>,
    last_known_bid: Option<f64>,
    last_known_ask: Option<f64>,
    cfg: HistoryConfig,
}

impl Default for InstrumentHistory {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl InstrumentHistory {
    pub fn new(cfg: HistoryConfig) -> Self {
        Self {
            points: BTreeMap::new(),
            last_known_bid: None,
            last_known_ask: None,
            cfg: HistoryConfig {
                max_points: cfg.max_points.max(1),
                ..cfg
            },
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_known_bid(&self) -> Option<f64> {
        self.last_known_bid
    }

    pub fn last_known_ask(&self) -> Option<f64> {
        self.last_known_ask
    }

    pub fn get(&self, ts_ms: TimestampMs) -> Option<&QuotePoint> {
        self.points.get(&ts_ms)
    }

    /// Points in ascending timestamp order.
    pub fn points(&self) -> impl DoubleEndedIterator<Item = &QuotePoint> {
        self.points.values()
    }

    /// Points strictly before `ts_ms`, newest first.
    pub fn points_before(&self, ts_ms: TimestampMs) -> impl Iterator<Item = &QuotePoint> {
        self.points.range(..ts_ms).rev().map(|(_, p)| p)
    }

    /// Insert a point, merging present sides into any point already at that
    /// timestamp, then enforce the safety bounds.
    pub(crate) fn upsert(&mut self, point: QuotePoint) {
        let slot = self.points.entry(point.ts_ms).or_insert(QuotePoint {
            ts_ms: point.ts_ms,
            bid: None,
            ask: None,
        });
        if point.bid.is_some() {
            slot.bid = point.bid;
        }
        if point.ask.is_some() {
            slot.ask = point.ask;
        }

        self.evict_over_bounds();
    }

    /// Remove every point with `ts <= through_ts`, folding them forward.
    /// Returns how many points were removed.
    pub(crate) fn fold_through(&mut self, through_ts: TimestampMs) -> usize {
        let kept = match through_ts.checked_add(1) {
            Some(next) => self.points.split_off(&next),
            None => BTreeMap::new(),
        };
        let removed = std::mem::replace(&mut self.points, kept);

        let count = removed.len();
        for point in removed.into_values() {
            self.fold(&point);
        }
        count
    }

    fn fold(&mut self, point: &QuotePoint) {
        if point.bid.is_some() {
            self.last_known_bid = point.bid;
        }
        if point.ask.is_some() {
            self.last_known_ask = point.ask;
        }
    }

    /// Evict oldest points beyond the point cap or outside the time window.
    fn evict_over_bounds(&mut self) {
        while self.points.len() > self.cfg.max_points {
            if let Some((_, oldest)) = self.points.pop_first() {
                self.fold(&oldest);
            }
        }

        let Some(max_age) = self.cfg.max_age_ms else {
            return;
        };
        let Some(newest) = self.points.keys().next_back().copied() else {
            return;
        };

        while let Some((&oldest_ts, _)) = self.points.first_key_value() {
            if newest - oldest_ts > max_age {
                if let Some((_, oldest)) = self.points.pop_first() {
                    self.fold(&oldest);
                }
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(ts_ms: u64, bid: Option<f64>, ask: Option<f64>) -> QuotePoint {
        QuotePoint { ts_ms, bid, ask }
    }

    #[test]
    fn upsert_merges_partial_sides() {
        let mut h = InstrumentHistory::default();
        h.upsert(pt(5, Some(10.0), None));
        h.upsert(pt(5, None, Some(10.2)));
        h.upsert(pt(5, Some(10.1), None));

        assert_eq!(h.len(), 1);
        assert_eq!(h.get(5), Some(&pt(5, Some(10.1), Some(10.2))));
    }

    #[test]
    fn fold_through_keeps_most_recent_sides() {
        let mut h = InstrumentHistory::default();
        h.upsert(pt(1, Some(9.0), Some(9.5)));
        h.upsert(pt(2, Some(9.1), None));
        h.upsert(pt(3, None, Some(9.6)));
        h.upsert(pt(4, Some(9.2), Some(9.7)));

        assert_eq!(h.fold_through(3), 3);
        assert_eq!(h.last_known_bid(), Some(9.1));
        assert_eq!(h.last_known_ask(), Some(9.6));
        assert_eq!(h.points().map(|p| p.ts_ms).collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn fold_through_max_timestamp_empties_history() {
        let mut h = InstrumentHistory::default();
        h.upsert(pt(u64::MAX, Some(1.0), Some(2.0)));
        assert_eq!(h.fold_through(u64::MAX), 1);
        assert!(h.is_empty());
        assert_eq!(h.last_known_ask(), Some(2.0));
    }

    #[test]
    fn point_cap_evicts_oldest_into_last_known() {
        let mut h = InstrumentHistory::new(HistoryConfig {
            max_points: 2,
            max_age_ms: None,
        });
        h.upsert(pt(1, Some(1.0), Some(1.5)));
        h.upsert(pt(2, Some(2.0), None));
        h.upsert(pt(3, Some(3.0), Some(3.5)));

        assert_eq!(h.len(), 2);
        assert_eq!(h.last_known_bid(), Some(1.0));
        assert_eq!(h.last_known_ask(), Some(1.5));
    }

    #[test]
    fn time_window_evicts_stale_points() {
        let mut h = InstrumentHistory::new(HistoryConfig {
            max_points: 100,
            max_age_ms: Some(1_000),
        });
        h.upsert(pt(0, Some(1.0), None));
        h.upsert(pt(500, Some(2.0), None));
        h.upsert(pt(1_600, Some(3.0), None));

        assert_eq!(
            h.points().map(|p| p.ts_ms).collect::<Vec<_>>(),
            vec![1_600]
        );
        assert_eq!(h.last_known_bid(), Some(2.0));
    }

    #[test]
    fn points_before_is_strict_and_descending() {
        let mut h = InstrumentHistory::default();
        for ts in [1, 2, 3, 4] {
            h.upsert(pt(ts, Some(ts as f64), None));
        }
        let seen: Vec<u64> = h.points_before(3).map(|p| p.ts_ms).collect();
        assert_eq!(seen, vec![2, 1]);
    }
}
