//! Metric instrument factories for harvest-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"harvest-rs"` meter.

use opentelemetry::metrics::{Counter, Meter};

/// Returns the shared meter for harvest-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("harvest-rs")
}

/// Counter: identifiers newly added to the pending pool by discovery.
/// Labels: `keyword`.
pub fn identifiers_discovered() -> Counter<u64> {
    meter()
        .u64_counter("harvest.discovery.identifiers")
        .with_description("Identifiers newly queued by discovery")
        .build()
}

/// Counter: search cycles.
/// Labels: `result` ("ok" | "error").
pub fn searches() -> Counter<u64> {
    meter()
        .u64_counter("harvest.discovery.searches")
        .with_description("Number of search cycles")
        .build()
}

/// Counter: identifier dispositions in the action worker.
/// Labels: `disposition`.
pub fn dispositions() -> Counter<u64> {
    meter()
        .u64_counter("harvest.action.dispositions")
        .with_description("Identifier dispositions in the action worker")
        .build()
}

/// Counter: identifiers moving between pools.
/// Labels: `from`, `to` ("pending" | "processed" | "removed").
pub fn pool_transitions() -> Counter<u64> {
    meter()
        .u64_counter("harvest.pool.transitions")
        .with_description("Identifiers moved between pools")
        .build()
}

/// Counter: actuator outcomes.
/// Labels: `outcome` ("success" | "rate_limited" | "error" | "driver_broken").
pub fn action_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("harvest.action.outcomes")
        .with_description("Actuator outcomes")
        .build()
}

/// Counter: driver recoveries.
/// Labels: `context` ("search" | "action").
pub fn driver_recoveries() -> Counter<u64> {
    meter()
        .u64_counter("harvest.driver.recoveries")
        .with_description("Number of driver re-creations")
        .build()
}

/// Counter: processed entries evicted by the sweep.
pub fn swept() -> Counter<u64> {
    meter()
        .u64_counter("harvest.sweep.evicted")
        .with_description("Processed entries evicted by the retention sweep")
        .build()
}
