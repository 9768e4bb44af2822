use std::collections::VecDeque;

use market::types::MarketEvent;
use parking_lot::Mutex;
use roles::model::TabId;
use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 100;

/// How many events a status query returns.
pub const SERVED: usize = 50;

/// An event as seen by the relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedEvent {
    #[serde(flatten)]
    pub event: MarketEvent,
    pub received_at_ms: u64,
    pub tab_id: TabId,
}

/// Bounded buffer of the latest events, oldest evicted first.
pub struct RecentEvents {
    capacity: usize,
    events: Mutex<VecDeque<RecordedEvent>>,
}

impl Default for RecentEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RecentEvents {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, event: RecordedEvent) {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// The newest `SERVED` events, oldest first.
    pub fn latest(&self) -> Vec<RecordedEvent> {
        self.last(SERVED)
    }

    pub fn last(&self, n: usize) -> Vec<RecordedEvent> {
        let events = self.events.lock();
        let skip = events.len().saturating_sub(n);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(ts_ms: u64) -> RecordedEvent {
        RecordedEvent {
            event: MarketEvent::Quote {
                instrument: None,
                bid: Some(1.0),
                ask: None,
                ts_ms,
            },
            received_at_ms: ts_ms,
            tab_id: TabId::from(1u64),
        }
    }

    #[test]
    fn keeps_capacity_and_serves_newest() {
        let recent = RecentEvents::default();
        for ts in 0..150 {
            recent.push(recorded(ts));
        }

        assert_eq!(recent.len(), DEFAULT_CAPACITY);

        let served = recent.latest();
        assert_eq!(served.len(), SERVED);
        assert_eq!(served.first().map(|e| e.event.ts_ms()), Some(100));
        assert_eq!(served.last().map(|e| e.event.ts_ms()), Some(149));
    }

    #[test]
    fn short_buffer_serves_everything() {
        let recent = RecentEvents::new(3);
        assert!(recent.is_empty());
        recent.push(recorded(1));
        recent.push(recorded(2));

        let ts: Vec<u64> = recent.latest().iter().map(|e| e.event.ts_ms()).collect();
        assert_eq!(ts, vec![1, 2]);
    }

    #[test]
    fn serializes_flat() {
        let json = serde_json::to_value(recorded(7)).unwrap();
        assert_eq!(json["kind"], "QUOTE");
        assert_eq!(json["receivedAtMs"], 7);
        assert_eq!(json["tabId"], "1");
    }
}
