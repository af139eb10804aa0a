//! # harvest-rs
//!
//! A two-stage work pipeline. A discovery worker searches keywords and fills
//! a persistent pending pool; an action worker drains it through an
//! eligibility check and a pluggable actuator, recording results in a
//! persistent processed pool. Messages come from a small template grammar.

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod pool;
pub mod stats;
pub mod telemetry;
pub mod template;
