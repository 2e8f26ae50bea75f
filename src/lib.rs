//! resilient-pg: a self-healing Postgres session
//!
//! The crate wraps one logical Postgres connection and keeps it usable across
//! server restarts:
//! * blocking reconnect loop with a fixed retry period
//! * SQLSTATE-driven recovery policy (reconnect vs rollback)
//! * statement execution through positional or dictionary cursors
//! * bulk `COPY ... FROM STDIN` loads with commit/rollback handling
//!
//! The database driver sits behind the [`driver::Driver`] trait. [`driver::PgDriver`]
//! implements it on top of `tokio-postgres`.
//!
//! ```no_run
//! # async fn example() -> resilient_pg::Result<()> {
//! use resilient_pg::{ExecOptions, PgDriver, ResilientSession};
//! use std::time::Duration;
//!
//! let config = resilient_pg::client::parse_connection_string("postgres://app@db.internal/app")?;
//! let driver = PgDriver::from_config(&config)?;
//! let mut session = ResilientSession::builder(driver, config)
//!     .retry_period(Duration::from_secs(5))
//!     .build();
//!
//! session.wait_for_connection(Duration::from_secs(5)).await;
//! if !session.execute("DELETE FROM staging", ExecOptions::reconnecting()).await {
//!     tracing::warn!("staging cleanup did not run");
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod client;
pub mod connection;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod recovery;

pub use client::{
    CopyOptions, CopyOutcome, Cursor, ExecOptions, LoggingCursor, ResilientSession, Row,
    RowShape, RunOutcome, SessionBuilder,
};
pub use connection::{ConnectionConfig, IsolationLevel, SessionOptions, SessionState};
pub use driver::{Driver, DriverConnection, DriverError, DriverErrorKind, PgDriver, RowSet};
pub use error::{Error, Result};
pub use recovery::{classify, ErrorClass};
