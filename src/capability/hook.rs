//! Hook-executable drivers.
//!
//! The searcher and actuator can be any executable. Inputs go in through
//! `HARVEST_*` environment variables; results come back through stdout and
//! the exit status:
//!
//! | exit | searcher                 | actuator                  |
//! |------|--------------------------|---------------------------|
//! | 0    | stdout = one id per line | success                   |
//! | 75   | error                    | rate limited              |
//! | 69   | driver broken            | driver broken             |
//! | else | error                    | error, item stays pending |
//!
//! Spawn failures and timeouts count as a broken driver.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use super::{Actuator, Driver, Searcher};
use crate::error::{Error, Result};
use crate::model::{ActionOutcome, Identifier};

/// `EX_TEMPFAIL`: the target asked us to back off.
pub const EXIT_RATE_LIMITED: i32 = 75;
/// `EX_UNAVAILABLE`: the hook's own environment is broken.
pub const EXIT_UNAVAILABLE: i32 = 69;

/// Shared plumbing for both hook drivers.
#[derive(Debug, Clone)]
struct Hook {
    command: PathBuf,
    timeout: Duration,
    context: String,
}

impl Hook {
    fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
            context: String::new(),
        }
    }

    fn open(&mut self, context: &str) -> Result<()> {
        // Resolve against the process CWD once, so later runs do not depend on it.
        if self.command.is_relative() {
            self.command = std::env::current_dir()?.join(&self.command);
        }
        if !self.command.is_file() {
            return Err(Error::Driver(format!(
                "hook {} does not exist",
                self.command.display()
            )));
        }
        self.context = context.to_string();
        Ok(())
    }

    async fn run(&self, envs: &[(&str, &str)]) -> Result<Output> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.command);
        cmd.env("HARVEST_CONTEXT", &self.context)
            .envs(envs.iter().copied())
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::Driver(format!(
                    "failed to run {}: {e}",
                    self.command.display()
                )));
            }
            Err(_) => {
                return Err(Error::Driver(format!(
                    "{} timed out after {}s",
                    self.command.display(),
                    self.timeout.as_secs()
                )));
            }
        };

        debug!(
            context = %self.context,
            command = %self.command.display(),
            status = output.status.code().unwrap_or(-1),
            duration_ms = start.elapsed().as_millis() as u64,
            "hook finished"
        );
        Ok(output)
    }

    fn describe_failure(&self, output: &Output) -> String {
        let stderr = String::from_utf8_lossy(&output.stderr);
        format!(
            "{} exited with status {}: {}",
            self.command.display(),
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )
    }
}

/// Searcher that runs an executable with `HARVEST_KEYWORD` set.
#[derive(Debug, Clone)]
pub struct HookSearcher {
    hook: Hook,
}

impl HookSearcher {
    pub fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            hook: Hook::new(command, timeout),
        }
    }

    pub fn command(&self) -> &Path {
        &self.hook.command
    }
}

#[async_trait]
impl Driver for HookSearcher {
    async fn open(&mut self, context: &str) -> Result<()> {
        self.hook.open(context)
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl Searcher for HookSearcher {
    async fn search(&mut self, keyword: &str) -> Result<Vec<String>> {
        let output = self.hook.run(&[("HARVEST_KEYWORD", keyword)]).await?;
        match output.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()),
            Some(EXIT_UNAVAILABLE) | None => Err(Error::Driver(self.hook.describe_failure(&output))),
            Some(_) => Err(Error::Other(self.hook.describe_failure(&output))),
        }
    }
}

/// Actuator that runs an executable with `HARVEST_ID` and `HARVEST_TEXT` set.
#[derive(Debug, Clone)]
pub struct HookActuator {
    hook: Hook,
}

impl HookActuator {
    pub fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            hook: Hook::new(command, timeout),
        }
    }

    pub fn command(&self) -> &Path {
        &self.hook.command
    }
}

#[async_trait]
impl Driver for HookActuator {
    async fn open(&mut self, context: &str) -> Result<()> {
        self.hook.open(context)
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl Actuator for HookActuator {
    async fn act(&mut self, id: &Identifier, text: &str) -> ActionOutcome {
        let output = match self
            .hook
            .run(&[("HARVEST_ID", id.as_str()), ("HARVEST_TEXT", text)])
            .await
        {
            Ok(output) => output,
            Err(e) => return ActionOutcome::broken(e.to_string()),
        };
        match output.status.code() {
            Some(0) => ActionOutcome::Success,
            Some(EXIT_RATE_LIMITED) => ActionOutcome::RateLimited,
            // Killed by a signal counts as broken too.
            Some(EXIT_UNAVAILABLE) | None => {
                ActionOutcome::broken(self.hook.describe_failure(&output))
            }
            Some(_) => ActionOutcome::error(self.hook.describe_failure(&output)),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[tokio::test]
    async fn searcher_reads_stdout_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            dir.path(),
            "search",
            r#"echo "$HARVEST_KEYWORD-1"; echo; echo "  $HARVEST_CONTEXT-2 ""#,
        );
        let mut searcher = HookSearcher::new(path, Duration::from_secs(10));
        searcher.open("search").await.unwrap();
        let ids = searcher.search("rust").await.unwrap();
        assert_eq!(ids, vec!["rust-1".to_string(), "search-2".to_string()]);
    }

    #[tokio::test]
    async fn missing_hook_fails_open_as_driver_fault() {
        let mut searcher = HookSearcher::new("/definitely/not/here", Duration::from_secs(1));
        let err = searcher.open("search").await.unwrap_err();
        assert!(err.is_driver_fault());
    }

    #[tokio::test]
    async fn actuator_maps_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            dir.path(),
            "act",
            r#"case "$HARVEST_ID" in ok) exit 0;; slow) exit 75;; dead) exit 69;; *) exit 3;; esac"#,
        );
        let mut actuator = HookActuator::new(path, Duration::from_secs(10));
        actuator.open("action").await.unwrap();

        assert_eq!(actuator.act(&id("ok"), "hi").await, ActionOutcome::Success);
        assert_eq!(actuator.act(&id("slow"), "hi").await, ActionOutcome::RateLimited);
        assert!(matches!(
            actuator.act(&id("dead"), "hi").await,
            ActionOutcome::Error { driver_broken: true, .. }
        ));
        assert!(matches!(
            actuator.act(&id("other"), "hi").await,
            ActionOutcome::Error { driver_broken: false, .. }
        ));
    }

    #[tokio::test]
    async fn actuator_timeout_is_driver_fault() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "act", "sleep 5");
        let mut actuator = HookActuator::new(path, Duration::from_millis(100));
        actuator.open("action").await.unwrap();
        assert!(matches!(
            actuator.act(&id("x"), "hi").await,
            ActionOutcome::Error { driver_broken: true, .. }
        ));
    }
}
