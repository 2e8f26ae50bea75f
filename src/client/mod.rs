//! Session client
//!
//! [`ResilientSession`] is the entry point. Connection strings are parsed by
//! [`parse_connection_string`].

mod connection_string;
mod cursor;
mod outcome;
mod session;

pub use connection_string::parse_connection_string;
pub use cursor::{Cursor, LoggingCursor, Row};
pub use outcome::{
    CopyOptions, CopyOutcome, ExecOptions, RowShape, RunOutcome, NO_CONNECTION_SENTINEL,
};
pub use session::{ResilientSession, SessionBuilder, DEFAULT_RETRY_PERIOD};
