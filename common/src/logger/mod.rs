mod init;
mod macros;
mod slow;
mod trace_id;

pub use init::init_logger;
pub use macros::{child_span, root_span};
pub use slow::warn_if_slow;
pub use trace_id::TraceId;
