//! Supervisor: owns the worker tasks, the shared pools and the stop signal.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::action::ActionWorker;
use super::discovery::DiscoveryWorker;
use crate::capability::{Actuator, DriverFactory, PublishTimeReader, Searcher};
use crate::config::ConfigSource;
use crate::pool::IdentifierPool;
use crate::stats::{PipelineStats, StatsSnapshot};

/// Starts and stops the pipeline workers.
///
/// Shutdown is soft: cancelling wakes sleeping workers, but an in-flight
/// search or action is allowed to finish.
pub struct Supervisor {
    config: Arc<ConfigSource>,
    pending: Arc<IdentifierPool>,
    processed: Arc<IdentifierPool>,
    stats: Arc<PipelineStats>,
    shutdown_token: CancellationToken,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Supervisor {
    pub fn new(
        config: Arc<ConfigSource>,
        pending: Arc<IdentifierPool>,
        processed: Arc<IdentifierPool>,
    ) -> Self {
        Self {
            config,
            pending,
            processed,
            stats: Arc::new(PipelineStats::new()),
            shutdown_token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn pending(&self) -> &Arc<IdentifierPool> {
        &self.pending
    }

    pub fn processed(&self) -> &Arc<IdentifierPool> {
        &self.processed
    }

    /// A token that fires when [`shutdown`](Self::shutdown) is called.
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub async fn spawn_discovery(&self, factory: DriverFactory<dyn Searcher>) {
        let worker = DiscoveryWorker::new(
            Arc::clone(&self.config),
            Arc::clone(&self.pending),
            Arc::clone(&self.processed),
            Arc::clone(&self.stats),
            factory,
        );
        self.spawn("discovery", worker.run(self.token())).await;
    }

    pub async fn spawn_action(
        &self,
        factory: DriverFactory<dyn Actuator>,
        reader: Arc<dyn PublishTimeReader>,
    ) {
        let worker = ActionWorker::new(
            Arc::clone(&self.config),
            Arc::clone(&self.pending),
            Arc::clone(&self.processed),
            Arc::clone(&self.stats),
            factory,
            reader,
        );
        self.spawn("action", worker.run(self.token())).await;
    }

    async fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.handles.lock().await.push((name, handle));
        info!(worker = name, "worker spawned");
    }

    /// Signal every worker to stop after its current step.
    pub fn shutdown(&self) {
        if !self.shutdown_token.is_cancelled() {
            info!("shutdown requested");
        }
        self.shutdown_token.cancel();
    }

    /// Wait for the workers to exit, sharing one deadline across all of them.
    ///
    /// Workers still running at the deadline are abandoned, not aborted.
    /// Returns the names of the abandoned workers.
    pub async fn join(&self, timeout: Duration) -> Vec<&'static str> {
        let handles = std::mem::take(&mut *self.handles.lock().await);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut abandoned = Vec::new();

        for (name, handle) in handles {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => info!(worker = name, "worker exited"),
                Ok(Err(e)) => warn!(worker = name, error = %e, "worker task failed"),
                Err(_) => {
                    warn!(worker = name, "worker missed the shutdown deadline, abandoning");
                    abandoned.push(name);
                }
            }
        }
        abandoned
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let workers = self
            .handles
            .try_lock()
            .map(|handles| handles.len())
            .unwrap_or_default();
        f.debug_struct("Supervisor")
            .field("workers", &workers)
            .field("pending", &self.pending.len())
            .field("processed", &self.processed.len())
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish()
    }
}
