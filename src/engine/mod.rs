//! Pipeline engine: the discovery and action workers and their supervisor.

pub mod action;
pub mod discovery;
pub mod pacing;
pub mod supervisor;

pub use action::{ActionWorker, CycleReport};
pub use discovery::DiscoveryWorker;
pub use supervisor::Supervisor;
