//! Connection parameters

use super::tls::SslMode;
use std::time::Duration;

/// Default Postgres port
pub const DEFAULT_PORT: u16 = 5432;

/// Connection configuration
///
/// Immutable once built. The password is optional: when absent the driver
/// resolves it from `PGPASSWORD` or the `.pgpass` file at connect time.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Host name, IP address, or unix socket directory (starts with `/`)
    pub host: String,
    /// Port
    pub port: u16,
    /// Database name
    pub database: String,
    /// Username
    pub user: String,
    /// Password (optional)
    pub password: Option<String>,
    /// Connection establishment timeout
    pub connect_timeout: Option<Duration>,
    /// TCP keepalive idle interval
    pub keepalive_idle: Option<Duration>,
    /// Application name for Postgres logs
    pub application_name: Option<String>,
    /// SSL/TLS mode
    pub sslmode: SslMode,
    /// Path to custom CA certificate (PEM)
    pub sslrootcert: Option<String>,
}

impl ConnectionConfig {
    /// Create new configuration with defaults
    ///
    /// The database name defaults to the user name.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self::builder(host, user).build()
    }

    /// Create a builder for advanced configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use resilient_pg::ConnectionConfig;
    /// use std::time::Duration;
    ///
    /// let config = ConnectionConfig::builder("db.internal", "arc_energo")
    ///     .connect_timeout(Duration::from_secs(10))
    ///     .application_name("loader")
    ///     .build();
    /// assert_eq!(config.database, "arc_energo");
    /// assert_eq!(config.port, 5432);
    /// ```
    pub fn builder(host: impl Into<String>, user: impl Into<String>) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            host: host.into(),
            port: DEFAULT_PORT,
            database: None,
            user: user.into(),
            password: None,
            connect_timeout: None,
            keepalive_idle: None,
            application_name: None,
            sslmode: SslMode::default(),
            sslrootcert: None,
        }
    }

    /// Whether `host` names a unix socket directory
    pub fn is_unix_socket(&self) -> bool {
        self.host.starts_with('/')
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("keepalive_idle", &self.keepalive_idle)
            .field("application_name", &self.application_name)
            .field("sslmode", &self.sslmode)
            .field("sslrootcert", &self.sslrootcert)
            .finish()
    }
}

/// Builder for creating `ConnectionConfig`
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    host: String,
    port: u16,
    database: Option<String>,
    user: String,
    password: Option<String>,
    connect_timeout: Option<Duration>,
    keepalive_idle: Option<Duration>,
    application_name: Option<String>,
    sslmode: SslMode,
    sslrootcert: Option<String>,
}

impl ConnectionConfigBuilder {
    /// Set the port
    ///
    /// Default: 5432
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database name
    ///
    /// Default: the user name
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set connection timeout
    ///
    /// Default: None (driver default)
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set TCP keepalive idle interval
    ///
    /// Default: None (OS default)
    pub fn keepalive_idle(mut self, duration: Duration) -> Self {
        self.keepalive_idle = Some(duration);
        self
    }

    /// Set application name for Postgres logs
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Set SSL/TLS mode
    pub fn sslmode(mut self, mode: SslMode) -> Self {
        self.sslmode = mode;
        self
    }

    /// Set custom CA certificate path
    pub fn sslrootcert(mut self, path: impl Into<String>) -> Self {
        self.sslrootcert = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        let database = self.database.unwrap_or_else(|| self.user.clone());
        ConnectionConfig {
            host: self.host,
            port: self.port,
            database,
            user: self.user,
            password: self.password,
            connect_timeout: self.connect_timeout,
            keepalive_idle: self.keepalive_idle,
            application_name: self.application_name,
            sslmode: self.sslmode,
            sslrootcert: self.sslrootcert,
        }
    }
}
