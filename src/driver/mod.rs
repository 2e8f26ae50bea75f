//! Database driver seam
//!
//! The session consumes a driver through these traits. Every driver failure is
//! converted into a [`DriverError`] at this boundary; nothing above it sees a
//! driver-specific error type.

mod postgres;

pub use postgres::{PgConnection, PgDriver};

use crate::connection::{ConnectionConfig, SessionOptions};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Broad driver failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Connectivity failure (refused, reset, closed, timed out)
    Operational,
    /// Error reported by the server for a statement
    Database,
    /// Client-side misuse or value conversion failure
    Interface,
}

/// Failure reported by a driver, with the server's SQLSTATE when there is one
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    kind: DriverErrorKind,
    code: Option<String>,
    message: String,
}

impl DriverError {
    /// Connectivity failure without a vendor code
    pub fn operational(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Operational,
            code: None,
            message: message.into(),
        }
    }

    /// Server-reported failure with a SQLSTATE
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Database,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Client-side failure
    pub fn interface(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Interface,
            code: None,
            message: message.into(),
        }
    }

    /// Failure category
    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    /// SQLSTATE, if the server sent one
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Human readable message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result of one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Column names, empty for statements that return no rows
    pub columns: Vec<String>,
    /// Row values in column order
    pub rows: Vec<Vec<Value>>,
    /// Rows returned or affected
    pub affected: u64,
}

impl RowSet {
    /// Result of a statement that returns no rows
    pub fn command(affected: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected,
        }
    }

    /// Whether the statement produced a result set
    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Opens connections
#[async_trait]
pub trait Driver: Send + Sync {
    /// Connection type produced by this driver
    type Connection: DriverConnection;

    /// Open one connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, DriverError>;
}

/// One open database connection
///
/// Transactions are implicit: with autocommit off, the first statement after
/// `commit`/`rollback` opens a new transaction.
#[async_trait]
pub trait DriverConnection: Send {
    /// Apply session characteristics; must not be called inside a transaction
    async fn apply_options(&mut self, options: &SessionOptions) -> Result<(), DriverError>;

    /// Execute one statement and buffer its result
    async fn execute(&mut self, sql: &str) -> Result<RowSet, DriverError>;

    /// Commit the open transaction, if any
    async fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the open transaction, if any
    async fn rollback(&mut self) -> Result<(), DriverError>;

    /// Run a `COPY ... FROM STDIN` command fed from `source`, returning the row count
    async fn copy_in(
        &mut self,
        sql: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, DriverError>;

    /// Close the connection; closing twice is a no-op
    async fn close(&mut self) -> Result<(), DriverError>;
}
