//! Failure classification
//!
//! Recovery decisions depend only on the SQLSTATE carried by a driver error,
//! never on the message text.

use crate::driver::{DriverError, DriverErrorKind};

/// SQLSTATE codes that mean "the server is going away or not up yet"
pub mod sqlstate {
    /// `admin_shutdown`: server is shutting down on operator request
    pub const ADMIN_SHUTDOWN: &str = "57P01";

    /// `crash_shutdown`: another backend crashed, server is restarting
    pub const CRASH_SHUTDOWN: &str = "57P02";

    /// `cannot_connect_now`: server is starting up or in recovery
    pub const CANNOT_CONNECT_NOW: &str = "57P03";

    /// All codes treated as recoverable by reconnecting
    pub const RECONNECTABLE: [&str; 3] = [ADMIN_SHUTDOWN, CRASH_SHUTDOWN, CANNOT_CONNECT_NOW];
}

/// How a failure should be recovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Server restarting or the connection itself broke: reconnect
    TransientConnectivity,

    /// Any other database error: roll back and report the code
    Statement,

    /// The session holds no connection
    NoConnection,
}

impl ErrorClass {
    /// Whether the failure is recoverable by reconnecting
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::TransientConnectivity)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransientConnectivity => write!(f, "transient_connectivity"),
            Self::Statement => write!(f, "statement"),
            Self::NoConnection => write!(f, "no_connection"),
        }
    }
}

/// Classify a driver failure
///
/// An operational error without a vendor code means the link itself broke
/// (socket closed, I/O failure) and is treated like a server shutdown.
pub fn classify(err: &DriverError) -> ErrorClass {
    match err.code() {
        Some(code) if sqlstate::RECONNECTABLE.contains(&code) => ErrorClass::TransientConnectivity,
        None if err.kind() == DriverErrorKind::Operational => ErrorClass::TransientConnectivity,
        _ => ErrorClass::Statement,
    }
}
