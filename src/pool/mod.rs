//! File-backed, deduplicated identifier pool.
//!
//! The live set is a concurrent map, so workers add, remove and scan without
//! external locking. Persistence rewrites the whole file and is serialized by
//! a lock; each save snapshots the map while holding it, so the last save to
//! finish always writes the latest membership.

pub mod line;

use dashmap::DashMap;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::Identifier;

pub use line::{LegacyTimestampMigrator, Migrate};

/// A deduplicated set of identifiers with per-identifier metadata.
#[derive(Debug)]
pub struct IdentifierPool {
    name: String,
    path: PathBuf,
    entries: DashMap<Identifier, String>,
    file_lock: Mutex<()>,
}

impl IdentifierPool {
    /// Create an empty pool backed by `path`. Nothing is read until [`load`].
    ///
    /// [`load`]: IdentifierPool::load
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            entries: DashMap::new(),
            file_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert if absent. Existing metadata is never overwritten.
    /// Returns `true` if the identifier was new.
    pub fn add(&self, id: Identifier, metadata: impl Into<String>) -> bool {
        let mut inserted = false;
        self.entries.entry(id).or_insert_with(|| {
            inserted = true;
            metadata.into()
        });
        inserted
    }

    /// Insert or overwrite metadata.
    pub fn put(&self, id: Identifier, metadata: impl Into<String>) {
        self.entries.insert(id, metadata.into());
    }

    /// Idempotent delete. Returns `true` if something was removed.
    pub fn remove(&self, id: &Identifier) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &Identifier) -> Option<String> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time copy of every entry.
    pub fn entries(&self) -> Vec<(Identifier, String)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn keys(&self) -> Vec<Identifier> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Uniformly random member, or `None` if empty.
    ///
    /// Selection runs over a snapshot; the chosen identifier may already be
    /// gone by the time the caller uses it. Membership changes are
    /// idempotent, so callers tolerate that.
    pub fn pick_random(&self) -> Option<Identifier> {
        self.pick_random_with(&mut rand::rng())
    }

    pub fn pick_random_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Identifier> {
        self.keys().choose(rng).cloned()
    }

    /// Up to `n` distinct members chosen uniformly from a snapshot.
    pub fn sample(&self, n: usize) -> Vec<Identifier> {
        self.sample_with(n, &mut rand::rng())
    }

    pub fn sample_with<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Identifier> {
        self.keys().choose_multiple(rng, n).cloned().collect()
    }

    /// Remove every entry matching `predicate` and return what was removed.
    pub fn remove_where<F>(&self, mut predicate: F) -> Vec<(Identifier, String)>
    where
        F: FnMut(&Identifier, &str) -> bool,
    {
        let mut removed = Vec::new();
        self.entries.retain(|id, metadata| {
            if predicate(id, metadata) {
                removed.push((id.clone(), metadata.clone()));
                false
            } else {
                true
            }
        });
        removed
    }

    /// Rewrite the backing file with the current membership.
    ///
    /// The file is written to a sibling temp path and renamed into place.
    pub fn save(&self) -> Result<()> {
        let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut body = String::new();
        for (id, metadata) in self.entries() {
            body.push_str(&line::encode(&id, &metadata));
            body.push('\n');
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.tmp_path();
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        debug!(pool = %self.name, entries = self.len(), "pool saved");
        Ok(())
    }

    /// Merge the backing file into memory. A missing file is created empty.
    ///
    /// Returns the number of entries merged.
    pub fn load(&self, migrator: Option<&dyn Migrate>) -> Result<usize> {
        let content = {
            let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());
            if !self.path.exists() {
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::File::create(&self.path)?;
                return Ok(0);
            }
            std::fs::read_to_string(&self.path)?
        };

        let mut merged = 0;
        for raw in content.lines() {
            match line::decode(raw, migrator) {
                Some((id, metadata)) => {
                    self.entries.insert(id, metadata);
                    merged += 1;
                }
                None if raw.trim().is_empty() => {}
                None => warn!(pool = %self.name, line = raw, "skipping unreadable pool line"),
            }
        }

        debug!(pool = %self.name, merged, "pool loaded");
        Ok(merged)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
