//! Shared fixtures and in-memory drivers for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use harvest_rs::capability::{Actuator, Driver, DriverFactory, PublishTimeReader, Searcher};
use harvest_rs::config::{ActionConfig, Config, ConfigSource, SearchConfig};
use harvest_rs::error::{Error, Result};
use harvest_rs::model::{ActionOutcome, Identifier, PublishTime};
use harvest_rs::pool::IdentifierPool;
use harvest_rs::stats::PipelineStats;
use harvest_rs::template::Grammar;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub fn id(s: &str) -> Identifier {
    Identifier::new(s).unwrap()
}

/// Config with a one-template grammar, no age limit and no jitter.
pub fn test_config() -> Config {
    Config {
        search: SearchConfig {
            keywords: vec!["alpha".into(), "beta".into()],
            jitter: 0.0,
            ..SearchConfig::default()
        },
        action: ActionConfig {
            max_age_secs: 0,
            jitter: 0.0,
            ..ActionConfig::default()
        },
        grammar: Grammar {
            templates: vec!["hello :who;".into()],
            vars: [("who".to_string(), vec!["there".to_string()])].into(),
        },
        ..Config::default()
    }
}

/// Temp state directory with both pools and the shared handles.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: Arc<ConfigSource>,
    pub pending: Arc<IdentifierPool>,
    pub processed: Arc<IdentifierPool>,
    pub stats: Arc<PipelineStats>,
}

impl Fixture {
    pub fn new(config: Config) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pending = Arc::new(IdentifierPool::new("pending", dir.path().join("pending.txt")));
        let processed = Arc::new(IdentifierPool::new(
            "processed",
            dir.path().join("processed.txt"),
        ));
        Self {
            dir,
            config: Arc::new(ConfigSource::fixed(config)),
            pending,
            processed,
            stats: Arc::new(PipelineStats::new()),
        }
    }

    pub fn with_pending(self, ids: &[&str]) -> Self {
        for s in ids {
            self.pending.add(id(s), "");
        }
        self
    }

    pub fn pending_ids(&self) -> Vec<String> {
        sorted_ids(&self.pending)
    }

    pub fn processed_ids(&self) -> Vec<String> {
        sorted_ids(&self.processed)
    }
}

fn sorted_ids(pool: &IdentifierPool) -> Vec<String> {
    let mut ids: Vec<_> = pool
        .entries()
        .into_iter()
        .map(|(id, _)| id.as_str().to_string())
        .collect();
    ids.sort();
    ids
}

// ---------------------------------------------------------------------------
// Actuator
// ---------------------------------------------------------------------------

/// Everything the scripted actuators did, shared across recreations.
#[derive(Clone, Default)]
pub struct ActuatorLog {
    pub calls: Arc<Mutex<Vec<(String, String)>>>,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    /// Outcomes handed out in order; `Success` once exhausted.
    pub script: Arc<Mutex<VecDeque<ActionOutcome>>>,
    /// Number of upcoming `open` calls that fail.
    pub failing_opens: Arc<AtomicUsize>,
    /// When set, `act` signals `started` and then sleeps this long.
    pub stall: Option<Duration>,
    pub started: Arc<Notify>,
}

impl ActuatorLog {
    pub fn scripted(outcomes: impl IntoIterator<Item = ActionOutcome>) -> Self {
        let log = Self::default();
        log.script.lock().unwrap().extend(outcomes);
        log
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn called_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect();
        ids.sort();
        ids
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn factory(&self) -> DriverFactory<dyn Actuator> {
        let log = self.clone();
        Box::new(move || -> Box<dyn Actuator> { Box::new(ScriptedActuator { log: log.clone() }) })
    }
}

pub struct ScriptedActuator {
    log: ActuatorLog,
}

#[async_trait]
impl Driver for ScriptedActuator {
    async fn open(&mut self, _context: &str) -> Result<()> {
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        let failing = &self.log.failing_opens;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Driver("scripted open failure".into()));
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Actuator for ScriptedActuator {
    async fn act(&mut self, id: &Identifier, text: &str) -> ActionOutcome {
        self.log
            .calls
            .lock()
            .unwrap()
            .push((id.as_str().to_string(), text.to_string()));
        if let Some(stall) = self.log.stall {
            self.log.started.notify_one();
            tokio::time::sleep(stall).await;
        }
        let next = self.log.script.lock().unwrap().pop_front();
        next.unwrap_or(ActionOutcome::Success)
    }
}

// ---------------------------------------------------------------------------
// Searcher
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub enum SearchStep {
    Found(Vec<&'static str>),
    Fail,
    Broken,
}

#[derive(Clone, Default)]
pub struct SearcherLog {
    pub keywords: Arc<Mutex<Vec<String>>>,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    /// Steps handed out in order; empty results once exhausted.
    pub script: Arc<Mutex<VecDeque<SearchStep>>>,
}

impl SearcherLog {
    pub fn scripted(steps: impl IntoIterator<Item = SearchStep>) -> Self {
        let log = Self::default();
        log.script.lock().unwrap().extend(steps);
        log
    }

    pub fn keywords(&self) -> Vec<String> {
        self.keywords.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn factory(&self) -> DriverFactory<dyn Searcher> {
        let log = self.clone();
        Box::new(move || -> Box<dyn Searcher> { Box::new(ScriptedSearcher { log: log.clone() }) })
    }
}

pub struct ScriptedSearcher {
    log: SearcherLog,
}

#[async_trait]
impl Driver for ScriptedSearcher {
    async fn open(&mut self, _context: &str) -> Result<()> {
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Searcher for ScriptedSearcher {
    async fn search(&mut self, keyword: &str) -> Result<Vec<String>> {
        self.log.keywords.lock().unwrap().push(keyword.to_string());
        let step = self.log.script.lock().unwrap().pop_front();
        match step {
            Some(SearchStep::Found(ids)) => Ok(ids.into_iter().map(str::to_string).collect()),
            Some(SearchStep::Fail) => Err(Error::Other("scripted search failure".into())),
            Some(SearchStep::Broken) => Err(Error::Driver("scripted broken searcher".into())),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Publish-time reader
// ---------------------------------------------------------------------------

/// Answers from a fixed table; unlisted identifiers are `Unknown`.
#[derive(Default)]
pub struct TableReader {
    answers: HashMap<String, Option<PublishTime>>,
}

impl TableReader {
    pub fn at(mut self, id: &str, time: PublishTime) -> Self {
        self.answers.insert(id.to_string(), Some(time));
        self
    }

    /// Reading `id` fails.
    pub fn failing(mut self, id: &str) -> Self {
        self.answers.insert(id.to_string(), None);
        self
    }
}

#[async_trait]
impl PublishTimeReader for TableReader {
    async fn read_publish_time(&self, id: &Identifier) -> Result<PublishTime> {
        match self.answers.get(id.as_str()) {
            Some(Some(time)) => Ok(*time),
            Some(None) => Err(Error::Other("scripted reader failure".into())),
            None => Ok(PublishTime::Unknown),
        }
    }
}
