//! Host-side wiring: configuration, the recent-events buffer, and the feed
//! relay that runs every update from the primary tab through classification
//! and routing.

pub mod app;
pub mod config;
pub mod error;
pub mod recent;
pub mod relay;
pub mod sink;

pub use app::RelayApp;
pub use config::AppConfig;
pub use error::ConfigError;
pub use recent::{RecentEvents, RecordedEvent};
pub use relay::FeedRelay;
pub use sink::EventSink;
