//! ResilientSession implementation

use super::cursor::{Cursor, LoggingCursor, Row};
use super::outcome::{CopyOptions, CopyOutcome, ExecOptions, RowShape, RunOutcome};
use crate::connection::{ConnectionConfig, SessionOptions, SessionState};
use crate::driver::{Driver, DriverConnection, DriverError};
use crate::metrics::{counters, histograms, labels};
use crate::recovery::{classify, ErrorClass};
use crate::{Error, Result};
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tracing::{Instrument, Span};

/// Default pause between connect attempts
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(5);

/// Connection plus the cursors derived from it
///
/// Cursors are only reachable through this value, so they cannot outlive the
/// connection they belong to.
struct Live<C> {
    conn: C,
    cursor: Cursor,
    dict_cursor: Cursor,
}

impl<C> Live<C> {
    fn new(conn: C) -> Self {
        Self {
            conn,
            cursor: Cursor::new(RowShape::Tuple),
            dict_cursor: Cursor::new(RowShape::Dict),
        }
    }

    fn cursor_mut(&mut self, shape: RowShape) -> &mut Cursor {
        match shape {
            RowShape::Tuple => &mut self.cursor,
            RowShape::Dict => &mut self.dict_cursor,
        }
    }
}

/// What the recovery policy did with a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    RolledBack,
    Lost,
    Reconnected,
}

/// One self-healing Postgres connection
///
/// Statement and copy operations never return driver errors: each failure is
/// classified (see [`crate::recovery`]) and turned into an outcome value.
/// Operations borrow the session mutably, so a session is driven by one task
/// at a time.
pub struct ResilientSession<D: Driver> {
    driver: D,
    config: ConnectionConfig,
    options: SessionOptions,
    retry_period: Duration,
    state: SessionState,
    live: Option<Live<D::Connection>>,
    span: Span,
}

/// Builder for [`ResilientSession`]
pub struct SessionBuilder<D: Driver> {
    driver: D,
    config: ConnectionConfig,
    options: SessionOptions,
    retry_period: Duration,
    span: Option<Span>,
}

impl<D: Driver> SessionBuilder<D> {
    /// Pause between reconnect attempts when an operation reconnects on its own
    ///
    /// Default: 5 seconds
    pub fn retry_period(mut self, period: Duration) -> Self {
        self.retry_period = period;
        self
    }

    /// Session characteristics applied after every connect
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Span every session event is recorded in
    ///
    /// Default: `pg_session` with host, port, user and database fields
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Build the session (disconnected)
    pub fn build(self) -> ResilientSession<D> {
        let span = self.span.unwrap_or_else(|| {
            tracing::info_span!(
                "pg_session",
                host = %self.config.host,
                port = self.config.port,
                user = %self.config.user,
                database = %self.config.database
            )
        });

        ResilientSession {
            driver: self.driver,
            config: self.config,
            options: self.options,
            retry_period: self.retry_period,
            state: SessionState::Disconnected,
            live: None,
            span,
        }
    }
}

impl<D: Driver> ResilientSession<D> {
    /// Session with default settings
    pub fn new(driver: D, config: ConnectionConfig) -> Self {
        Self::builder(driver, config).build()
    }

    /// Start building a session
    pub fn builder(driver: D, config: ConnectionConfig) -> SessionBuilder<D> {
        SessionBuilder {
            driver,
            config,
            options: SessionOptions::default(),
            retry_period: DEFAULT_RETRY_PERIOD,
            span: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a live connection is held
    pub fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    /// Connection parameters
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Session characteristics applied on connect
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Retry period used by reconnecting operations
    pub fn retry_period(&self) -> Duration {
        self.retry_period
    }

    /// Span the session logs into
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Make one connect attempt
    ///
    /// Any previous connection is released first. On failure the session is
    /// left `Disconnected` and the driver error is returned.
    pub async fn connect(&mut self) -> Result<()> {
        let span = self.span.clone();
        self.connect_once().instrument(span).await
    }

    /// Block until a connection is established
    ///
    /// Retries forever, sleeping `retry_period` between attempts. There is no
    /// backoff and no attempt limit; drop the future to give up.
    pub async fn wait_for_connection(&mut self, retry_period: Duration) {
        let span = self.span.clone();
        self.reconnect_loop(retry_period).instrument(span).await
    }

    /// Replace the session characteristics
    ///
    /// Applied immediately when connected and again after every reconnect.
    /// Options the server rejects are not kept. When the apply fails because
    /// the link dropped, they are kept for the next connect.
    pub async fn set_session(&mut self, options: SessionOptions) -> Result<()> {
        let span = self.span.clone();
        async {
            let Some(live) = self.live.as_mut() else {
                self.options = options;
                return Ok(());
            };

            let applied = live.conn.apply_options(&options).await;
            if let Err(err) = applied {
                tracing::warn!(code = err.code().unwrap_or(labels::CODE_NONE), error = %err, "set_session failed");
                if classify(&err).is_transient() {
                    self.release().await;
                    self.options = options;
                }
                return Err(err.into());
            }
            tracing::debug!(options = ?options, "session options applied");
            self.options = options;
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Execute one statement without fetching
    ///
    /// Never reconnects unless `opts.reconnect` is set. Without a connection
    /// and without `reconnect`, returns [`RunOutcome::NoConnection`] and sends
    /// nothing.
    pub async fn run(&mut self, sql: &str, opts: ExecOptions) -> RunOutcome {
        let span = self.span.clone();
        self.run_statement(labels::OPERATION_RUN, sql, opts)
            .instrument(span)
            .await
    }

    /// Execute one statement; `true` only if it ran during this call
    ///
    /// With `opts.reconnect`, a lost connection blocks until reconnected and
    /// the call still returns `false`: the statement is not resubmitted.
    pub async fn execute(&mut self, sql: &str, opts: ExecOptions) -> bool {
        let span = self.span.clone();
        self.run_statement(labels::OPERATION_EXECUTE, sql, opts)
            .instrument(span)
            .await
            .is_success()
    }

    /// Commit the current transaction
    pub async fn commit(&mut self) -> bool {
        let span = self.span.clone();
        async {
            let Some(live) = self.live.as_mut() else {
                tracing::warn!("commit skipped: no connection");
                return false;
            };
            let result = live.conn.commit().await;
            match result {
                Ok(()) => true,
                Err(err) => {
                    self.recover(labels::OPERATION_COMMIT, &err, false).await;
                    false
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Roll back the current transaction
    pub async fn rollback(&mut self) -> bool {
        let span = self.span.clone();
        async {
            if self.live.is_none() {
                tracing::warn!("rollback skipped: no connection");
                return false;
            }
            self.rollback_current(labels::OPERATION_ROLLBACK).await
        }
        .instrument(span)
        .await
    }

    /// Bulk-load delimited text from `source` into `table`
    ///
    /// The payload is never resubmitted: after [`CopyOutcome::Reconnected`] the
    /// caller decides whether to retry with a fresh source.
    pub async fn copy_from<R>(
        &mut self,
        source: &mut R,
        table: &str,
        options: &CopyOptions,
    ) -> CopyOutcome
    where
        R: AsyncRead + Unpin + Send,
    {
        let sql = options.to_sql(table);
        let span = self.span.clone();
        self.copy(&sql, source, options.reconnect)
            .instrument(span)
            .await
    }

    /// Bulk-load through a caller-supplied `COPY ... FROM STDIN` command
    pub async fn copy_expert<R>(&mut self, sql: &str, source: &mut R, reconnect: bool) -> CopyOutcome
    where
        R: AsyncRead + Unpin + Send,
    {
        let span = self.span.clone();
        self.copy(sql, source, reconnect).instrument(span).await
    }

    /// Cursor holding the last result for `shape`; `None` while disconnected
    pub fn cursor(&mut self, shape: RowShape) -> Option<&mut Cursor> {
        self.live.as_mut().map(|live| live.cursor_mut(shape))
    }

    /// Row-logging view over the cursor for `shape`
    pub fn logging_cursor(&mut self, shape: RowShape) -> Option<LoggingCursor<'_>> {
        self.cursor(shape).map(LoggingCursor::new)
    }

    /// Next row from the cursor for `shape`
    pub fn fetch_one(&mut self, shape: RowShape) -> Result<Option<Row>> {
        self.cursor(shape).ok_or(Error::NoConnection)?.fetch_one()
    }

    /// All remaining rows from the cursor for `shape`
    pub fn fetch_all(&mut self, shape: RowShape) -> Result<Vec<Row>> {
        self.cursor(shape).ok_or(Error::NoConnection)?.fetch_all()
    }

    /// Release cursors and connection; the session ends `Closed`
    ///
    /// Safe to call in any state, any number of times.
    pub async fn close(&mut self) {
        let span = self.span.clone();
        async {
            if self.state == SessionState::Closed && self.live.is_none() {
                tracing::debug!("session already closed");
                return;
            }
            self.release().await;
            // any state may close
            self.state = SessionState::Closed;
            tracing::info!("session closed");
        }
        .instrument(span)
        .await
    }

    async fn connect_once(&mut self) -> Result<()> {
        self.release().await;
        self.state.transition(SessionState::Connecting)?;
        counters::connect_attempted(&self.config.host);

        let opened = self.open().await;
        match opened {
            Ok(conn) => {
                self.live = Some(Live::new(conn));
                self.state.transition(SessionState::Connected)?;
                tracing::info!(host = %self.config.host, user = %self.config.user, "postgres connected");
                Ok(())
            }
            Err(err) => {
                counters::connect_failed(&self.config.host);
                self.state.transition(SessionState::Disconnected)?;
                Err(err.into())
            }
        }
    }

    async fn open(&self) -> std::result::Result<D::Connection, DriverError> {
        let mut conn = self.driver.connect(&self.config).await?;
        if let Err(err) = conn.apply_options(&self.options).await {
            let _ = conn.close().await;
            return Err(err);
        }
        Ok(conn)
    }

    async fn reconnect_loop(&mut self, retry_period: Duration) {
        let started = Instant::now();
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            tracing::info!(
                host = %self.config.host,
                user = %self.config.user,
                attempt,
                "trying connection to postgres"
            );

            match self.connect_once().await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(
                        host = %self.config.host,
                        user = %self.config.user,
                        error = %e,
                        "connection failed, retrying in {:?}",
                        retry_period
                    );
                    tokio::time::sleep(retry_period).await;
                }
            }
        }

        histograms::reconnect_wait(started.elapsed().as_millis() as u64);
    }

    /// Drop cursors, then the connection; tolerates nothing being held
    async fn release(&mut self) {
        if let Some(mut live) = self.live.take() {
            live.cursor.reset();
            live.dict_cursor.reset();
            if let Err(e) = live.conn.close().await {
                tracing::debug!(error = %e, "error while closing connection");
            }
        }

        // an abandoned connect attempt also lands here
        if matches!(self.state, SessionState::Connected | SessionState::Connecting) {
            self.state = SessionState::Disconnected;
        }
    }

    async fn run_statement(
        &mut self,
        operation: &'static str,
        sql: &str,
        opts: ExecOptions,
    ) -> RunOutcome {
        if self.live.is_none() {
            if !opts.reconnect {
                tracing::warn!(operation, "no connection, statement not sent");
                return RunOutcome::NoConnection;
            }
            tracing::info!(operation, "no connection, waiting for postgres before executing");
            self.reconnect_loop(self.retry_period).await;
        }

        let Some(live) = self.live.as_mut() else {
            return RunOutcome::NoConnection;
        };

        let started = Instant::now();
        let result = live.conn.execute(sql).await;
        histograms::statement_duration(operation, started.elapsed().as_millis() as u64);

        let cursor = live.cursor_mut(opts.shape);
        let err = match result {
            Ok(set) => {
                cursor.load(set);
                return RunOutcome::Success;
            }
            Err(err) => {
                cursor.reset();
                err
            }
        };

        let code = err.code().map(str::to_string);
        match self.recover(operation, &err, opts.reconnect).await {
            Recovery::RolledBack => RunOutcome::Failed { code },
            Recovery::Lost => RunOutcome::ConnectionLost { code },
            Recovery::Reconnected => RunOutcome::Reconnected,
        }
    }

    async fn copy(
        &mut self,
        sql: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
        reconnect: bool,
    ) -> CopyOutcome {
        if self.live.is_none() {
            if !reconnect {
                tracing::warn!("no connection, copy not started");
                return CopyOutcome::Failed;
            }
            tracing::info!("no connection, waiting for postgres before copy");
            self.reconnect_loop(self.retry_period).await;
        }

        let Some(live) = self.live.as_mut() else {
            return CopyOutcome::Failed;
        };

        let copied = live.conn.copy_in(sql, source).await;
        let result = match copied {
            Ok(rows) => live.conn.commit().await.map(|()| rows),
            Err(err) => Err(err),
        };

        match result {
            Ok(rows) => {
                counters::copy_rows(rows);
                tracing::info!(rows, "copy committed");
                CopyOutcome::Committed { rows }
            }
            Err(err) => match self.recover(labels::OPERATION_COPY, &err, reconnect).await {
                Recovery::Reconnected => CopyOutcome::Reconnected,
                Recovery::RolledBack | Recovery::Lost => CopyOutcome::Failed,
            },
        }
    }

    /// Recovery policy shared by every operation
    async fn recover(&mut self, operation: &'static str, err: &DriverError, reconnect: bool) -> Recovery {
        let code = err.code().unwrap_or(labels::CODE_NONE);

        match classify(err) {
            ErrorClass::TransientConnectivity => {
                counters::connection_lost(operation);
                tracing::warn!(
                    host = %self.config.host,
                    user = %self.config.user,
                    operation,
                    code,
                    error = %err,
                    "connection to postgres lost"
                );
                self.release().await;

                if reconnect {
                    self.reconnect_loop(self.retry_period).await;
                    Recovery::Reconnected
                } else {
                    Recovery::Lost
                }
            }
            ErrorClass::Statement | ErrorClass::NoConnection => {
                counters::statement_failed(operation, err.code());
                tracing::error!(
                    host = %self.config.host,
                    user = %self.config.user,
                    operation,
                    code,
                    error = %err,
                    "PG error"
                );
                self.rollback_current(operation).await;
                Recovery::RolledBack
            }
        }
    }

    async fn rollback_current(&mut self, operation: &'static str) -> bool {
        let Some(live) = self.live.as_mut() else {
            return false;
        };

        counters::rollback_issued();
        let result = live.conn.rollback().await;
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    operation,
                    code = err.code().unwrap_or(labels::CODE_NONE),
                    error = %err,
                    "rollback failed"
                );
                if classify(&err).is_transient() {
                    counters::connection_lost(operation);
                    self.release().await;
                }
                false
            }
        }
    }
}

impl<D: Driver> std::fmt::Debug for ResilientSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientSession")
            .field("config", &self.config)
            .field("options", &self.options)
            .field("retry_period", &self.retry_period)
            .field("state", &self.state)
            .field("connected", &self.live.is_some())
            .finish()
    }
}
