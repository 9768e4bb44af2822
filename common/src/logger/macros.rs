use super::TraceId;
use tracing::{Level, Span, field};

/// Create a root span for a role request / feed tick / audit pass
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::span!(
        Level::INFO,
        "root",
        name = %name,
        trace_id = %trace_id,
        tab_id = field::Empty,
        instrument = field::Empty
    )
}

/// Create a child span (inherits trace_id automatically)
pub fn child_span(name: &'static str) -> Span {
    tracing::span!(
        Level::INFO,
        "child",
        name = %name,
        tab_id = field::Empty,
        instrument = field::Empty
    )
}
