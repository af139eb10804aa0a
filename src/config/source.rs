//! Hot-reloadable config source.
//!
//! Workers call [`ConfigSource::reload`] at the top of every cycle. A missing
//! file is created from the default document; a file that fails to parse
//! keeps the last good config (or the default, at startup).

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use super::{Config, DEFAULT_CONFIG_TOML};
use crate::error::Result;

#[derive(Debug)]
pub struct ConfigSource {
    path: Option<PathBuf>,
    /// Per-process seed so the keyword order is stable across reloads.
    seed: u64,
    current: RwLock<Arc<Config>>,
}

impl ConfigSource {
    /// Open the config file, writing the default document if it is missing.
    ///
    /// Never fails on a bad document; only creating the missing file can fail.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            write_default(&path)?;
            info!(path = %path.display(), "wrote default config");
        }
        let source = Self {
            path: Some(path),
            seed: rand::random(),
            current: RwLock::new(Arc::new(Config::default())),
        };
        source.reload();
        Ok(source)
    }

    /// A fixed config with no backing file; `reload` is a no-op.
    pub fn fixed(config: Config) -> Self {
        Self {
            path: None,
            seed: 0,
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The config as of the last reload.
    pub fn current(&self) -> Arc<Config> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Re-read the file and return the resulting config.
    pub fn reload(&self) -> Arc<Config> {
        let Some(path) = &self.path else {
            return self.current();
        };

        let parsed = std::fs::read_to_string(path)
            .map_err(crate::error::Error::from)
            .and_then(|text| Config::from_toml(&text));

        match parsed {
            Ok(mut config) => {
                self.shuffle_keywords(&mut config);
                let config = Arc::new(config);
                *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&config);
                debug!(path = %path.display(), "config reloaded");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config unreadable, keeping previous");
                self.current()
            }
        }
    }

    fn shuffle_keywords(&self, config: &mut Config) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        config.search.keywords.shuffle(&mut rng);
    }
}

/// Write the default document to `path`, creating parent directories.
pub fn write_default(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TOML)?;
    Ok(())
}
