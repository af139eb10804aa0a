//! Pipeline counters owned by the supervisor and shared with the workers.
//!
//! Each `record_*` call bumps the in-process counter and the matching OTel
//! instrument, so a snapshot is available even without an exporter.

use opentelemetry::KeyValue;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::{ActionOutcome, Disposition};
use crate::telemetry::metrics;

#[derive(Debug, Default)]
pub struct PipelineStats {
    discovered: AtomicU64,
    searches: AtomicU64,
    search_failures: AtomicU64,
    committed: AtomicU64,
    ineligible: AtomicU64,
    dropped: AtomicU64,
    deferred: AtomicU64,
    rate_limited: AtomicU64,
    recoveries: AtomicU64,
    swept: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub discovered: u64,
    pub searches: u64,
    pub search_failures: u64,
    pub committed: u64,
    pub ineligible: u64,
    pub dropped: u64,
    pub deferred: u64,
    pub rate_limited: u64,
    pub recoveries: u64,
    pub swept: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_search(&self, keyword: &str, added: usize) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.discovered.fetch_add(added as u64, Ordering::Relaxed);
        metrics::searches().add(1, &[KeyValue::new("result", "ok")]);
        metrics::identifiers_discovered()
            .add(added as u64, &[KeyValue::new("keyword", keyword.to_string())]);
    }

    pub fn record_search_failure(&self) {
        self.search_failures.fetch_add(1, Ordering::Relaxed);
        metrics::searches().add(1, &[KeyValue::new("result", "error")]);
    }

    pub fn record_outcome(&self, outcome: &ActionOutcome) {
        metrics::action_outcomes().add(1, &[KeyValue::new("outcome", outcome.label())]);
    }

    pub fn record_disposition(&self, disposition: &Disposition) {
        let counter = match disposition {
            Disposition::Committed => &self.committed,
            Disposition::Ineligible => &self.ineligible,
            Disposition::AlreadyProcessed | Disposition::Dropped => &self.dropped,
            Disposition::RateLimited => &self.rate_limited,
            Disposition::Deferred(_) => &self.deferred,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::dispositions().add(1, &[KeyValue::new("disposition", disposition.label())]);
    }

    pub fn record_recovery(&self, context: &str) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
        metrics::driver_recoveries().add(1, &[KeyValue::new("context", context.to_string())]);
    }

    pub fn record_swept(&self, evicted: usize) {
        self.swept.fetch_add(evicted as u64, Ordering::Relaxed);
        metrics::swept().add(evicted as u64, &[]);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            discovered: self.discovered.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            search_failures: self.search_failures.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            ineligible: self.ineligible.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
        }
    }
}
