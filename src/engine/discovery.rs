//! Discovery worker: keywords in, pending identifiers out.

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pacing::{jittered, sleep_or_cancel};
use crate::capability::{DriverFactory, DriverSlot, Searcher};
use crate::config::ConfigSource;
use crate::error::{Error, Result};
use crate::model::Identifier;
use crate::pool::IdentifierPool;
use crate::stats::PipelineStats;

pub const SEARCH_CONTEXT: &str = "search";

/// Producer loop. Owns its searcher; shares the pools, config and stats.
pub struct DiscoveryWorker {
    config: Arc<ConfigSource>,
    pending: Arc<IdentifierPool>,
    processed: Arc<IdentifierPool>,
    stats: Arc<PipelineStats>,
    searcher: DriverSlot<dyn Searcher>,
    keywords: Vec<String>,
    cursor: usize,
}

impl DiscoveryWorker {
    pub fn new(
        config: Arc<ConfigSource>,
        pending: Arc<IdentifierPool>,
        processed: Arc<IdentifierPool>,
        stats: Arc<PipelineStats>,
        factory: DriverFactory<dyn Searcher>,
    ) -> Self {
        let keywords = config.current().search.keywords.clone();
        Self {
            config,
            pending,
            processed,
            stats,
            searcher: DriverSlot::new(SEARCH_CONTEXT, factory),
            keywords,
            cursor: 0,
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Round-robin over the keyword list.
    pub fn next_keyword(&mut self) -> Result<String> {
        if self.keywords.is_empty() {
            return Err(Error::IllegalState("keyword list is empty".to_string()));
        }
        self.cursor %= self.keywords.len();
        let keyword = self.keywords[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.keywords.len();
        Ok(keyword)
    }

    /// One search round. Returns how many identifiers were newly added to pending.
    pub async fn run_cycle(&mut self) -> Result<usize> {
        let config = self.config.reload();
        if config.search.keywords != self.keywords {
            info!(count = config.search.keywords.len(), "keyword list changed");
            self.keywords = config.search.keywords.clone();
        }

        let keyword = self.next_keyword()?;
        let raw = match self.search(&keyword).await {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.record_search_failure();
                if e.is_driver_fault() {
                    self.searcher.recover().await;
                    self.stats.record_recovery(SEARCH_CONTEXT);
                }
                return Err(e);
            }
        };

        let exclude: HashSet<&str> = config.search.exclude.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let mut added = 0;
        for token in raw {
            let Ok(id) = Identifier::new(token) else {
                continue;
            };
            if exclude.contains(id.as_str()) || !seen.insert(id.clone()) {
                continue;
            }
            if self.processed.contains(&id) {
                continue;
            }
            if self.pending.add(id, "") {
                added += 1;
            }
        }

        if let Err(e) = self.pending.save() {
            error!(pool = self.pending.name(), error = %e, "failed to save pool");
        }
        self.stats.record_search(&keyword, added);
        info!(keyword = %keyword, added, pending = self.pending.len(), "search finished");
        Ok(added)
    }

    async fn search(&mut self, keyword: &str) -> Result<Vec<String>> {
        let searcher = self.searcher.acquire().await?;
        searcher.search(keyword).await
    }

    /// Loop until cancelled, then close the searcher.
    pub async fn run(mut self, token: CancellationToken) {
        info!("discovery worker started");
        while !token.is_cancelled() {
            match self.run_cycle().await {
                Ok(_) => {}
                Err(e @ Error::IllegalState(_)) => warn!(error = %e, "nothing to search"),
                Err(e) => warn!(error = %e, "search cycle failed"),
            }
            let config = self.config.current();
            let pause = jittered(config.search.interval(), config.search.jitter);
            debug!(pause_ms = pause.as_millis() as u64, "discovery sleeping");
            if !sleep_or_cancel(pause, &token).await {
                break;
            }
        }
        self.searcher.close().await;
        info!("discovery worker stopped");
    }
}

impl std::fmt::Debug for DiscoveryWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryWorker")
            .field("searcher", &self.searcher)
            .field("keywords", &self.keywords)
            .field("cursor", &self.cursor)
            .finish()
    }
}
