//! Forwarding of primary-tab market events to the secondaries that display
//! the same instrument.

pub mod router;

pub use router::{BroadcastReport, EventRouter};
