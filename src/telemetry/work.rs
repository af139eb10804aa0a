//! Per-item span helpers.
//!
//! Provides span creation and transition recording for identifiers flowing
//! through the action worker.

use opentelemetry::KeyValue;
use tracing::Span;

use super::metrics;
use crate::model::Identifier;

/// Start a span for processing one identifier.
///
/// The `item.disposition` field is declared empty and is filled by
/// [`record_disposition`].
pub fn start_item_span(worker: &str, id: &Identifier) -> Span {
    tracing::info_span!(
        "item.process",
        "item.worker" = worker,
        "item.id" = %id,
        "item.disposition" = tracing::field::Empty,
    )
}

/// Record a pool transition on the given span.
///
/// Emits a tracing `info` event scoped to the span and bumps the
/// `harvest.pool.transitions` counter.
pub fn record_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "pool_transition");
    });
    metrics::pool_transitions().add(
        1,
        &[
            KeyValue::new("from", from.to_string()),
            KeyValue::new("to", to.to_string()),
        ],
    );
}

/// Fill in the span's disposition field.
pub fn record_disposition(span: &Span, disposition: &str) {
    span.record("item.disposition", disposition);
}
