//! Boundary capabilities: the searcher, the actuator and the publish-time
//! reader.
//!
//! Searchers and actuators are *drivers*: stateful, possibly fragile handles
//! owned by exactly one worker. A [`DriverSlot`] pairs a factory with the live
//! instance so a worker can throw a broken driver away and get a fresh one
//! on next use.

pub mod hook;
pub mod http;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::model::{ActionOutcome, Identifier, PublishTime};

pub use hook::{HookActuator, HookSearcher};
pub use http::HttpPublishTimeReader;

/// Lifecycle shared by searchers and actuators.
#[async_trait]
pub trait Driver: Send {
    /// Prepare the driver. `context` names the owning worker.
    async fn open(&mut self, context: &str) -> Result<()>;

    /// Release resources. Must not fail.
    async fn close(&mut self);
}

/// Performs the real-world action for one identifier.
#[async_trait]
pub trait Actuator: Driver {
    async fn act(&mut self, id: &Identifier, text: &str) -> ActionOutcome;
}

/// Finds identifiers for a keyword. Best-effort: partial or empty results
/// are fine. Returns raw tokens; the caller validates them.
///
/// `Error::Driver` means the searcher is unusable and must be recreated.
#[async_trait]
pub trait Searcher: Driver {
    async fn search(&mut self, keyword: &str) -> Result<Vec<String>>;
}

/// Reads an item's publish time. Read-only and shareable.
#[async_trait]
pub trait PublishTimeReader: Send + Sync {
    async fn read_publish_time(&self, id: &Identifier) -> Result<PublishTime>;
}

/// Reader used when no metadata source is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPublishTime;

#[async_trait]
impl PublishTimeReader for NoPublishTime {
    async fn read_publish_time(&self, _id: &Identifier) -> Result<PublishTime> {
        Ok(PublishTime::Unknown)
    }
}

pub type DriverFactory<T> = Box<dyn Fn() -> Box<T> + Send + Sync>;

/// One worker's driver: opened lazily, recreated after a fault.
pub struct DriverSlot<T: Driver + ?Sized> {
    context: String,
    factory: DriverFactory<T>,
    current: Option<Box<T>>,
}

impl<T: Driver + ?Sized> DriverSlot<T> {
    pub fn new(context: impl Into<String>, factory: DriverFactory<T>) -> Self {
        Self {
            context: context.into(),
            factory,
            current: None,
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// The live driver, creating and opening one if needed.
    pub async fn acquire(&mut self) -> Result<&mut T> {
        let driver = match self.current.take() {
            Some(driver) => driver,
            None => {
                let mut driver = (self.factory)();
                if let Err(e) = driver.open(&self.context).await {
                    // Release whatever a partial open acquired.
                    driver.close().await;
                    return Err(e);
                }
                info!(context = %self.context, "driver opened");
                driver
            }
        };
        Ok(&mut **self.current.insert(driver))
    }

    /// Close and discard the current driver; the next `acquire` builds a new one.
    pub async fn recover(&mut self) {
        warn!(context = %self.context, "recovering driver");
        self.close().await;
    }

    pub async fn close(&mut self) {
        if let Some(mut driver) = self.current.take() {
            driver.close().await;
            info!(context = %self.context, "driver closed");
        }
    }
}

impl<T: Driver + ?Sized> std::fmt::Debug for DriverSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverSlot")
            .field("context", &self.context)
            .field("open", &self.is_open())
            .finish()
    }
}
