//! Market-data side of the relay: instrument identity, quote history and
//! trade-direction classification.

pub mod classifier;
pub mod history;
pub mod manager;
pub mod time;
pub mod types;

pub use classifier::{PRICE_EPSILON, classify, compact, observe_quote};
pub use history::{HistoryConfig, InstrumentHistory};
pub use manager::QuoteBook;
pub use types::{FeedUpdate, InstrumentRef, MarketEvent, QuotePoint, Side, TradeEvent};
