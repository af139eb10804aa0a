//! Core data model.
//!
//! An identifier names one unit of work. It lives in exactly one of the two
//! pools at a time and is the only thing that moves through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// An opaque, stable token for one unit of work.
///
/// Construction trims surrounding whitespace; after that, equality is
/// exact-string on the stored token, so `" BV1 "` and `"BV1"` name the same
/// item while `"bv1"` does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validate and wrap a token.
    ///
    /// Tokens are trimmed. Empty tokens and tokens containing the pool
    /// record separator or a line break are rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let token = raw.trim();
        if token.is_empty() || token.contains([';', '\n', '\r']) {
            return Err(Error::InvalidIdentifier(raw));
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl std::str::FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Boundary results
// ---------------------------------------------------------------------------

/// What the actuator reported for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    /// The target asked us to back off. Not an error.
    RateLimited,
    Error {
        cause: String,
        /// The actuator itself is broken and must be recreated.
        driver_broken: bool,
    },
}

impl ActionOutcome {
    pub fn error(cause: impl Into<String>) -> Self {
        Self::Error {
            cause: cause.into(),
            driver_broken: false,
        }
    }

    pub fn broken(cause: impl Into<String>) -> Self {
        Self::Error {
            cause: cause.into(),
            driver_broken: true,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RateLimited => "rate_limited",
            Self::Error {
                driver_broken: true,
                ..
            } => "driver_broken",
            Self::Error { .. } => "error",
        }
    }
}

/// Auxiliary publish time of an item, as reported by the metadata reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishTime {
    At(DateTime<Utc>),
    /// The item no longer exists upstream.
    Gone,
    /// No reader configured, or the reader had nothing to say.
    Unknown,
}

impl PublishTime {
    /// Map a raw epoch-seconds value where negatives mean "gone".
    pub fn from_epoch_secs(secs: i64) -> Self {
        if secs < 0 {
            return Self::Gone;
        }
        DateTime::<Utc>::from_timestamp(secs, 0).map_or(Self::Gone, Self::At)
    }
}

// ---------------------------------------------------------------------------
// Disposition
// ---------------------------------------------------------------------------

/// What the action worker did with one identifier in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Acted successfully; moved to processed.
    Committed,
    /// Outside the eligibility window; moved to processed without acting.
    Ineligible,
    /// Already in processed; removed from pending only.
    AlreadyProcessed,
    /// Gone upstream; removed from pending and not recorded.
    Dropped,
    /// Rate limited; stays pending and the worker cools down.
    RateLimited,
    /// Stays pending for a later cycle.
    Deferred(String),
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Ineligible => "ineligible",
            Self::AlreadyProcessed => "already_processed",
            Self::Dropped => "dropped",
            Self::RateLimited => "rate_limited",
            Self::Deferred(_) => "deferred",
        }
    }

    /// Whether the identifier is still in the pending pool afterwards.
    pub fn stays_pending(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Deferred(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_trims_and_rejects_separators() {
        assert_eq!(Identifier::new("  BV1abc ").unwrap().as_str(), "BV1abc");
        assert!(Identifier::new("").is_err());
        assert!(Identifier::new("   ").is_err());
        assert!(Identifier::new("a;b").is_err());
        assert!(Identifier::new("a\nb").is_err());
    }

    #[test]
    fn identifiers_compare_exactly_after_trimming() {
        let padded = Identifier::new("\tBV1 ").unwrap();
        assert_eq!(padded, Identifier::new("BV1").unwrap());
        assert_ne!(padded, Identifier::new("bv1").unwrap());
        assert_ne!(
            Identifier::new("B V1").unwrap(),
            Identifier::new("BV1").unwrap()
        );
    }

    #[test]
    fn negative_publish_time_means_gone() {
        assert_eq!(PublishTime::from_epoch_secs(-1), PublishTime::Gone);
        assert!(matches!(
            PublishTime::from_epoch_secs(946_684_800),
            PublishTime::At(_)
        ));
    }
}
