//! Error types for harvest-rs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The searcher or actuator itself is unusable and must be recreated.
    #[error("driver unusable: {0}")]
    Driver(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means the owning worker should recreate its driver.
    pub fn is_driver_fault(&self) -> bool {
        matches!(self, Error::Driver(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
