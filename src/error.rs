//! Error types

use crate::driver::DriverError;
use thiserror::Error;

/// Crate result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by configuration, lifecycle and cursor operations
///
/// Statement and bulk-copy operations never return these: they convert every
/// driver failure into an outcome value (see [`crate::RunOutcome`]).
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure (reading a credentials or certificate file)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or connection string
    #[error("configuration error: {0}")]
    Config(String),

    /// Illegal session state transition
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state description
        expected: String,
        /// Actual state description
        actual: String,
    },

    /// Failure reported by the database driver
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Operation needs a live connection and there is none
    #[error("no connection established")]
    NoConnection,

    /// Fetch attempted before any statement produced a result set
    #[error("no results to fetch")]
    NoResults,

    /// Malformed credentials file
    #[error("credentials error: {0}")]
    Credentials(String),
}

impl Error {
    /// Vendor code carried by a driver error, if any
    pub fn vendor_code(&self) -> Option<&str> {
        match self {
            Error::Driver(err) => err.code(),
            _ => None,
        }
    }
}
