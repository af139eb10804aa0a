//! Versioned line codec for pool files.
//!
//! Current lines look like `v2;<identifier>;<metadata>`. Anything without the
//! version tag is legacy and is routed through a caller-supplied migrator, or
//! kept as a bare identifier when no migrator is given.

use crate::model::Identifier;

/// Prefix marking a line in the current format.
pub const VERSION_TAG: &str = "v2;";
/// Separates the identifier from its metadata.
pub const SEPARATOR: char = ';';

/// Turns a legacy line into a current-format body (`<id>;<metadata>`,
/// without the version tag). `None` drops the line.
pub trait Migrate: Send + Sync {
    fn migrate(&self, line: &str) -> Option<String>;
}

impl<F> Migrate for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn migrate(&self, line: &str) -> Option<String> {
        self(line)
    }
}

/// Migrator for the historical `<id>;pubdate<digits>` processed-pool format.
///
/// The old number was a publish time, not a processing time, so it is
/// discarded. The entry comes back with empty metadata and the next sweep
/// stamps it with the current time.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyTimestampMigrator;

impl Migrate for LegacyTimestampMigrator {
    fn migrate(&self, line: &str) -> Option<String> {
        let (id, rest) = line.split_once(SEPARATOR)?;
        let digits = rest.strip_prefix("pubdate")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(id.to_string())
    }
}

/// Encode one entry in the current format.
pub fn encode(id: &Identifier, metadata: &str) -> String {
    format!("{VERSION_TAG}{id}{SEPARATOR}{metadata}")
}

/// Decode one raw line. Blank lines and lines that do not yield a valid
/// identifier return `None`.
pub fn decode(raw: &str, migrator: Option<&dyn Migrate>) -> Option<(Identifier, String)> {
    let line = raw.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let body = match line.strip_prefix(VERSION_TAG) {
        Some(body) => body.to_string(),
        None => match migrator {
            Some(migrator) => migrator.migrate(line)?,
            None => return Identifier::new(line).ok().map(|id| (id, String::new())),
        },
    };

    split_body(&body)
}

fn split_body(body: &str) -> Option<(Identifier, String)> {
    let (id, metadata) = match body.split_once(SEPARATOR) {
        Some((id, metadata)) => (id, metadata),
        None => (body, ""),
    };
    Identifier::new(id).ok().map(|id| (id, metadata.to_string()))
}
