//! Action worker: pending identifiers in, processed identifiers out.
//!
//! Every cycle samples a small batch from pending and walks each identifier
//! through the anti-duplicate guard, the eligibility window and the
//! actuator. Commit order is `processed.put` before `pending.remove`, so an
//! identifier is never absent from both pools.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use super::pacing::{jittered, sleep_or_cancel};
use crate::capability::{Actuator, DriverFactory, DriverSlot, PublishTimeReader};
use crate::config::{ActionConfig, Config, ConfigSource};
use crate::error::Result;
use crate::model::{ActionOutcome, Disposition, Identifier, PublishTime};
use crate::pool::IdentifierPool;
use crate::stats::PipelineStats;
use crate::telemetry::work::{record_disposition, record_transition, start_item_span};
use crate::template::TemplateEngine;

pub const ACTION_CONTEXT: &str = "action";

/// What one action cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Dispositions in processing order. Items left unvisited after a rate
    /// limit are not listed.
    pub entries: Vec<(Identifier, Disposition)>,
    /// The cycle was skipped because cooldown was active.
    pub cooling_down: bool,
    /// Entries evicted by a sweep that ran this cycle.
    pub swept: Option<usize>,
}

impl CycleReport {
    pub fn disposition_of(&self, id: &Identifier) -> Option<&Disposition> {
        self.entries.iter().find(|(i, _)| i == id).map(|(_, d)| d)
    }

    pub fn count(&self, label: &str) -> usize {
        self.entries.iter().filter(|(_, d)| d.label() == label).count()
    }
}

/// Consumer loop. Owns its actuator; shares the pools, config and stats.
pub struct ActionWorker {
    config: Arc<ConfigSource>,
    pending: Arc<IdentifierPool>,
    processed: Arc<IdentifierPool>,
    stats: Arc<PipelineStats>,
    actuator: DriverSlot<dyn Actuator>,
    reader: Arc<dyn PublishTimeReader>,
    cooldown_until: Option<DateTime<Utc>>,
    last_sweep: Option<Instant>,
}

impl ActionWorker {
    pub fn new(
        config: Arc<ConfigSource>,
        pending: Arc<IdentifierPool>,
        processed: Arc<IdentifierPool>,
        stats: Arc<PipelineStats>,
        factory: DriverFactory<dyn Actuator>,
        reader: Arc<dyn PublishTimeReader>,
    ) -> Self {
        Self {
            config,
            pending,
            processed,
            stats,
            actuator: DriverSlot::new(ACTION_CONTEXT, factory),
            reader,
            cooldown_until: None,
            last_sweep: None,
        }
    }

    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_until
    }

    pub fn in_cooldown(&self) -> bool {
        self.cooldown_until.is_some_and(|until| Utc::now() < until)
    }

    pub fn actuator_open(&self) -> bool {
        self.actuator.is_open()
    }

    /// Run one cycle: reload, maybe sweep, then work through one batch.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let config = self.config.reload();
        let mut report = CycleReport::default();

        let due = self
            .last_sweep
            .is_none_or(|at| at.elapsed() >= config.action.sweep_interval());
        if due {
            match self.sweep_with(&config.action) {
                Ok(evicted) => report.swept = Some(evicted),
                Err(e) => error!(error = %e, "sweep failed"),
            }
        }

        if self.in_cooldown() {
            debug!(until = ?self.cooldown_until, "cooling down, skipping batch");
            report.cooling_down = true;
            return report;
        }
        if self.cooldown_until.take().is_some() {
            info!("cooldown over");
        }

        let batch = self.pending.sample(config.action.batch_size);
        if batch.is_empty() {
            debug!("pending pool is empty");
            return report;
        }

        let templates = TemplateEngine::new(&config.grammar);
        for id in batch {
            let span = start_item_span(ACTION_CONTEXT, &id);
            let disposition = self
                .process(&id, &config, &templates)
                .instrument(span.clone())
                .await;
            record_disposition(&span, disposition.label());
            self.stats.record_disposition(&disposition);
            match disposition {
                Disposition::Committed | Disposition::Ineligible => {
                    record_transition(&span, "pending", "processed");
                }
                Disposition::AlreadyProcessed | Disposition::Dropped => {
                    record_transition(&span, "pending", "removed");
                }
                Disposition::RateLimited | Disposition::Deferred(_) => {}
            }

            let stop = disposition == Disposition::RateLimited;
            report.entries.push((id, disposition));
            if stop {
                break;
            }
        }

        info!(
            handled = report.entries.len(),
            committed = report.count("committed"),
            pending = self.pending.len(),
            processed = self.processed.len(),
            "action cycle finished"
        );
        report
    }

    async fn process(
        &mut self,
        id: &Identifier,
        config: &Config,
        templates: &TemplateEngine,
    ) -> Disposition {
        if self.processed.contains(id) {
            debug!(id = %id, "already processed");
            self.pending.remove(id);
            self.save_pending();
            return Disposition::AlreadyProcessed;
        }

        let now = Utc::now();
        match self.reader.read_publish_time(id).await {
            Ok(PublishTime::Gone) => {
                info!(id = %id, "item is gone, dropping");
                self.pending.remove(id);
                self.save_pending();
                return Disposition::Dropped;
            }
            Ok(PublishTime::At(published)) if !is_eligible(published, now, &config.action) => {
                info!(id = %id, published = %published, "outside eligibility window");
                self.commit(id, now);
                return Disposition::Ineligible;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(id = %id, error = %e, "failed to read publish time");
                return Disposition::Deferred(format!("publish time unavailable: {e}"));
            }
        }

        let text = templates.generate();
        if text.is_empty() {
            warn!(id = %id, "grammar produced no text");
            return Disposition::Deferred("no text to act with".to_string());
        }

        let outcome = match self.actuator.acquire().await {
            Ok(actuator) => actuator.act(id, &text).await,
            Err(e) => ActionOutcome::broken(format!("failed to open actuator: {e}")),
        };
        self.stats.record_outcome(&outcome);

        match outcome {
            ActionOutcome::Success => {
                info!(id = %id, "action succeeded");
                self.commit(id, Utc::now());
                Disposition::Committed
            }
            ActionOutcome::RateLimited => {
                let until = Utc::now()
                    .checked_add_signed(config.action.cooldown())
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                warn!(id = %id, until = %until, "rate limited, cooling down");
                self.cooldown_until = Some(until);
                Disposition::RateLimited
            }
            ActionOutcome::Error {
                cause,
                driver_broken: true,
            } => {
                error!(id = %id, cause = %cause, "actuator broken");
                self.actuator.recover().await;
                self.stats.record_recovery(ACTION_CONTEXT);
                Disposition::Deferred(cause)
            }
            ActionOutcome::Error { cause, .. } => {
                warn!(id = %id, cause = %cause, "action failed");
                Disposition::Deferred(cause)
            }
        }
    }

    /// Record `id` as processed at `at`, then release it from pending.
    fn commit(&self, id: &Identifier, at: DateTime<Utc>) {
        self.processed.put(id.clone(), at.timestamp().to_string());
        self.pending.remove(id);
        if let Err(e) = self.processed.save() {
            error!(pool = self.processed.name(), error = %e, "failed to save pool");
        }
        self.save_pending();
        debug!(id = %id, "committed");
    }

    fn save_pending(&self) {
        if let Err(e) = self.pending.save() {
            error!(pool = self.pending.name(), error = %e, "failed to save pool");
        }
    }

    /// GC pass over processed using the current config. Returns the number evicted.
    pub fn sweep(&mut self) -> Result<usize> {
        let config = self.config.current();
        self.sweep_with(&config.action)
    }

    fn sweep_with(&mut self, action: &ActionConfig) -> Result<usize> {
        self.last_sweep = Some(Instant::now());
        let now = Utc::now();
        let stamp = now.timestamp().to_string();

        let mut restamped = 0;
        for (id, metadata) in self.processed.entries() {
            if parse_stamp(&metadata).is_none() {
                self.processed.put(id, stamp.clone());
                restamped += 1;
            }
        }

        // A retention reaching past the earliest representable time evicts nothing.
        let cutoff = action
            .retention()
            .and_then(|retention| now.checked_sub_signed(retention));
        let evicted = match cutoff {
            Some(cutoff) => {
                let cutoff = cutoff.timestamp();
                self.processed
                    .remove_where(|_, metadata| parse_stamp(metadata).is_some_and(|t| t < cutoff))
                    .len()
            }
            None => 0,
        };

        self.processed.save()?;
        self.stats.record_swept(evicted);
        info!(restamped, evicted, remaining = self.processed.len(), "processed pool swept");
        Ok(evicted)
    }

    /// Loop until cancelled, then close the actuator.
    pub async fn run(mut self, token: CancellationToken) {
        info!("action worker started");
        while !token.is_cancelled() {
            self.run_cycle().await;
            let config = self.config.current();
            let pause = jittered(config.action.interval(), config.action.jitter);
            debug!(pause_ms = pause.as_millis() as u64, "action sleeping");
            if !sleep_or_cancel(pause, &token).await {
                break;
            }
        }
        self.actuator.close().await;
        info!("action worker stopped");
    }
}

impl std::fmt::Debug for ActionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionWorker")
            .field("actuator", &self.actuator)
            .field("cooldown_until", &self.cooldown_until)
            .finish()
    }
}

/// Within `max_age` of now (when set) and not before the floor.
pub fn is_eligible(published: DateTime<Utc>, now: DateTime<Utc>, action: &ActionConfig) -> bool {
    let too_old = action
        .max_age()
        .and_then(|max_age| now.checked_sub_signed(max_age))
        .is_some_and(|floor| published < floor);
    !too_old && published >= action.min_publish_time
}

fn parse_stamp(metadata: &str) -> Option<i64> {
    metadata.trim().parse().ok()
}
