//! Connection configuration and lifecycle
//!
//! This module handles:
//! * Connection parameters and their builder
//! * Session characteristics applied after every connect
//! * Session state machine enforcement
//! * TLS configuration and the rustls connector handed to the driver

mod config;
mod options;
mod state;
mod tls;

pub use config::{ConnectionConfig, ConnectionConfigBuilder, DEFAULT_PORT};
pub use options::{IsolationLevel, SessionOptions};
pub use state::SessionState;
pub use tls::{parse_server_name, RustlsConnector, SslMode, TlsConfig, TlsConfigBuilder};
