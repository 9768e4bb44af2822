//! FeedRelay
//! ---------
//! Entry point for feed updates delivered to the primary tab:
//!
//!  - updates from any other tab are ignored (one feed, one source)
//!  - the QuoteBook validates, de-duplicates and classifies them
//!  - every resulting event is recorded, routed to matching secondaries and
//!    handed to the sink
use std::sync::Arc;

use common::logger::{TraceId, child_span, root_span};
use common::time::now_ms;
use market::manager::QuoteBook;
use market::types::{FeedUpdate, MarketEvent};
use parking_lot::Mutex;
use roles::model::{Role, TabId};
use roles::registry::TabRegistry;
use roles::store::RoleStore;
use router::EventRouter;
use tracing::{Instrument, debug, info, warn};

use crate::recent::{RecentEvents, RecordedEvent};
use crate::sink::EventSink;

pub struct FeedRelay<S: RoleStore, R: TabRegistry, K: EventSink> {
    book: Mutex<QuoteBook>,
    router: EventRouter<S, R>,
    sink: Arc<K>,
    recent: RecentEvents,
}

impl<S: RoleStore, R: TabRegistry, K: EventSink> FeedRelay<S, R, K> {
    pub fn new(book: QuoteBook, router: EventRouter<S, R>, sink: Arc<K>, recent: RecentEvents) -> Self {
        Self {
            book: Mutex::new(book),
            router,
            sink,
            recent,
        }
    }

    pub fn router(&self) -> &EventRouter<S, R> {
        &self.router
    }

    /// Latest recorded events for status queries, oldest first.
    pub fn recent_events(&self) -> Vec<RecordedEvent> {
        self.recent.latest()
    }

    /// Process one update received from `source`. Returns the events it
    /// produced.
    pub async fn handle_update(&self, source: &TabId, update: FeedUpdate) -> Vec<MarketEvent> {
        let trace_id = TraceId::new();
        let span = root_span("feed_update", &trace_id);
        span.record("tab_id", tracing::field::display(source));
        if let Some(instrument) = &update.instrument {
            span.record("instrument", tracing::field::display(&instrument.key));
        }

        self.handle_update_inner(source, update).instrument(span).await
    }

    async fn handle_update_inner(&self, source: &TabId, update: FeedUpdate) -> Vec<MarketEvent> {
        if self.router.coordinator().role_of(source).await != Some(Role::Primary) {
            debug!(component = "relay", "update from non-primary tab ignored");
            return Vec::new();
        }

        let events = self.book.lock().ingest(update, now_ms());

        for event in &events {
            if let MarketEvent::Trade { price, size, side, .. } = event {
                info!(component = "relay", event = "trade", %side, price, size, "trade classified");
            }

            self.recent.push(RecordedEvent {
                event: event.clone(),
                received_at_ms: now_ms(),
                tab_id: source.clone(),
            });

            let report = self
                .router
                .broadcast(event)
                .instrument(child_span("route_event"))
                .await;
            debug!(
                delivered = report.delivered.len(),
                skipped = report.skipped,
                pruned = report.pruned.len(),
                "event routed"
            );

            if let Err(e) = self.sink.publish(event).await {
                warn!(component = "relay", error = %e, "sink rejected event");
            }
        }

        events
    }
}
