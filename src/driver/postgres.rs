//! `tokio-postgres` driver
//!
//! Emulates the implicit-transaction model: with autocommit off, the first
//! statement after a commit or rollback issues `BEGIN`.

use super::{Driver, DriverConnection, DriverError, RowSet};
use crate::auth;
use crate::connection::{ConnectionConfig, SessionOptions, SslMode, TlsConfig};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::SinkExt;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, CopyInSink, NoTls};

/// Read size for bulk-copy sources
const COPY_CHUNK_SIZE: usize = 8192;

/// How long `close` waits for the connection task to say goodbye
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Postgres driver
#[derive(Debug, Clone, Default)]
pub struct PgDriver {
    tls: Option<TlsConfig>,
}

impl PgDriver {
    /// Plaintext-only driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver able to honour `sslmode=require`
    pub fn with_tls(tls: TlsConfig) -> Self {
        Self { tls: Some(tls) }
    }

    /// Driver prepared for `config`'s sslmode
    ///
    /// TLS roots are loaded here, once, so a bad CA file fails fast instead of
    /// failing every connect attempt.
    pub fn from_config(config: &ConnectionConfig) -> crate::Result<Self> {
        match config.sslmode {
            SslMode::Disable => Ok(Self::new()),
            SslMode::Prefer | SslMode::Require => {
                let mut builder = TlsConfig::builder();
                if let Some(ca) = &config.sslrootcert {
                    builder = builder.ca_cert_path(ca);
                }
                Ok(Self::with_tls(builder.build()?))
            }
        }
    }

    fn pg_config(config: &ConnectionConfig) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user);

        if let Some(password) = auth::resolve_password(config) {
            pg.password(password);
        }
        if let Some(timeout) = config.connect_timeout {
            pg.connect_timeout(timeout);
        }
        if let Some(idle) = config.keepalive_idle {
            pg.keepalives_idle(idle);
        }
        if let Some(name) = &config.application_name {
            pg.application_name(name);
        }
        pg.ssl_mode(match config.sslmode {
            SslMode::Disable => tokio_postgres::config::SslMode::Disable,
            SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            SslMode::Require => tokio_postgres::config::SslMode::Require,
        });

        pg
    }
}

#[async_trait]
impl Driver for PgDriver {
    type Connection = PgConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<PgConnection, DriverError> {
        let pg = Self::pg_config(config);

        let (client, task) = match (config.sslmode, &self.tls) {
            // without a connector, prefer degrades to plaintext
            (SslMode::Disable, _) | (SslMode::Prefer, None) => {
                let (client, connection) = pg.connect(NoTls).await.map_err(driver_error)?;
                (client, spawn_connection(connection))
            }
            (SslMode::Prefer | SslMode::Require, Some(tls)) => {
                let (client, connection) =
                    pg.connect(tls.connector()).await.map_err(driver_error)?;
                (client, spawn_connection(connection))
            }
            (SslMode::Require, None) => {
                return Err(DriverError::interface(
                    "sslmode=require but the driver has no TLS configuration",
                ));
            }
        };

        tracing::debug!(host = %config.host, port = config.port, "postgres startup complete");
        Ok(PgConnection {
            client: Some(client),
            task: Some(task),
            autocommit: false,
            in_transaction: false,
        })
    }
}

/// Drive the connection's I/O until the client goes away
fn spawn_connection<S, T>(connection: tokio_postgres::Connection<S, T>) -> JoinHandle<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match connection.await {
            Ok(()) => tracing::debug!("postgres connection task finished"),
            Err(e) => tracing::warn!(error = %e, "postgres connection task ended with error"),
        }
    })
}

/// Open `tokio-postgres` connection
pub struct PgConnection {
    client: Option<Client>,
    task: Option<JoinHandle<()>>,
    autocommit: bool,
    in_transaction: bool,
}

impl PgConnection {
    /// Whether the underlying connection has gone away
    pub fn is_closed(&self) -> bool {
        self.client.as_ref().map_or(true, Client::is_closed)
    }

    /// Whether a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn client(&self) -> Result<&Client, DriverError> {
        self.client
            .as_ref()
            .ok_or_else(|| DriverError::operational("connection already closed"))
    }

    async fn begin_if_needed(&mut self) -> Result<(), DriverError> {
        if !self.autocommit && !self.in_transaction {
            self.client()?
                .batch_execute("BEGIN")
                .await
                .map_err(driver_error)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn end_transaction(&mut self, sql: &str) -> Result<(), DriverError> {
        if !self.in_transaction {
            return Ok(());
        }
        // the server ends the transaction even when COMMIT fails
        self.in_transaction = false;
        self.client()?.batch_execute(sql).await.map_err(driver_error)
    }
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.is_closed())
            .field("autocommit", &self.autocommit)
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

#[async_trait]
impl DriverConnection for PgConnection {
    async fn apply_options(&mut self, options: &SessionOptions) -> Result<(), DriverError> {
        if self.in_transaction {
            return Err(DriverError::interface(
                "set_session cannot be used inside a transaction",
            ));
        }

        if let Some(sql) = options.characteristics_sql() {
            self.client()?
                .batch_execute(&sql)
                .await
                .map_err(driver_error)?;
        }
        self.autocommit = options.autocommit;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<RowSet, DriverError> {
        self.begin_if_needed().await?;
        let client = self.client()?;

        let statement = client.prepare(sql).await.map_err(driver_error)?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        if columns.is_empty() {
            let affected = client
                .execute(&statement, &[])
                .await
                .map_err(driver_error)?;
            return Ok(RowSet::command(affected));
        }

        let rows = client
            .query(&statement, &[])
            .await
            .map_err(driver_error)?;
        let rows = rows
            .iter()
            .map(row_values)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RowSet {
            columns,
            affected: rows.len() as u64,
            rows,
        })
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.end_transaction("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.end_transaction("ROLLBACK").await
    }

    async fn copy_in(
        &mut self,
        sql: &str,
        mut source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, DriverError> {
        self.begin_if_needed().await?;
        let client = self.client()?;

        let sink: CopyInSink<Bytes> = client.copy_in(sql).await.map_err(driver_error)?;
        futures::pin_mut!(sink);

        let mut buf = BytesMut::with_capacity(COPY_CHUNK_SIZE);
        loop {
            // dropping the sink on error aborts the COPY server-side
            let n = AsyncReadExt::read_buf(&mut source, &mut buf)
                .await
                .map_err(|e| DriverError::interface(format!("reading copy source: {}", e)))?;
            if n == 0 {
                break;
            }
            sink.send(buf.split().freeze()).await.map_err(driver_error)?;
            buf.reserve(COPY_CHUNK_SIZE);
        }

        sink.as_mut().finish().await.map_err(driver_error)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.in_transaction = false;
        drop(self.client.take());

        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            match tokio::time::timeout(CLOSE_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => {
                    return Err(DriverError::operational(format!(
                        "connection task failed: {}",
                        e
                    )));
                }
                Err(_) => {
                    abort.abort();
                    tracing::debug!("connection task did not finish in time, aborted");
                }
            }
        }
        Ok(())
    }
}

/// Convert a `tokio-postgres` error at the driver boundary
///
/// Server-reported errors keep their SQLSTATE. Errors without one are
/// connectivity failures only when the link itself broke; client-side
/// statement errors (parameter mismatch, encoding, conversion) are
/// interface errors.
fn driver_error(err: tokio_postgres::Error) -> DriverError {
    if let Some(db) = err.as_db_error() {
        return DriverError::database(db.code().code(), db.message());
    }

    if is_link_failure(err.is_closed(), std::error::Error::source(&err)) {
        DriverError::operational(err.to_string())
    } else {
        DriverError::interface(err.to_string())
    }
}

/// Closed connection, or an I/O failure underneath (timeouts included)
fn is_link_failure(closed: bool, source: Option<&(dyn std::error::Error + 'static)>) -> bool {
    closed || source.map_or(false, |source| source.is::<std::io::Error>())
}

fn row_values(row: &tokio_postgres::Row) -> Result<Vec<Value>, DriverError> {
    (0..row.len()).map(|idx| column_value(row, idx)).collect()
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Option<T>, DriverError> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        DriverError::interface(format!(
            "column '{}': {}",
            row.columns()[idx].name(),
            e
        ))
    })
}

fn column_value(row: &tokio_postgres::Row, idx: usize) -> Result<Value, DriverError> {
    let ty = row.columns()[idx].type_();

    let value = if *ty == Type::BOOL {
        get::<bool>(row, idx)?.map(Value::Bool)
    } else if *ty == Type::CHAR {
        get::<i8>(row, idx)?.map(Value::from)
    } else if *ty == Type::INT2 {
        get::<i16>(row, idx)?.map(Value::from)
    } else if *ty == Type::INT4 {
        get::<i32>(row, idx)?.map(Value::from)
    } else if *ty == Type::INT8 {
        get::<i64>(row, idx)?.map(Value::from)
    } else if *ty == Type::OID {
        get::<u32>(row, idx)?.map(Value::from)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row, idx)?.map(|v| Value::from(f64::from(v)))
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row, idx)?.map(Value::from)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        get::<Value>(row, idx)?
    } else if <String as FromSql>::accepts(ty) {
        get::<String>(row, idx)?.map(Value::String)
    } else {
        tracing::debug!(
            column = row.columns()[idx].name(),
            pg_type = %ty,
            "no JSON mapping for column type, returning null"
        );
        None
    };

    Ok(value.unwrap_or(Value::Null))
}
