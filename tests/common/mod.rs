//! Scripted in-memory driver
//!
//! Each operation pops its next result from a queue; an empty queue means
//! success. Every call is recorded so tests can assert on ordering.

#![allow(dead_code)]

use async_trait::async_trait;
use resilient_pg::{
    ConnectionConfig, Driver, DriverConnection, DriverError, ResilientSession, RowSet,
    SessionOptions,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Retry period used by test sessions
pub const RETRY: Duration = Duration::from_secs(3);

/// One recorded driver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    ApplyOptions(SessionOptions),
    Execute(String),
    Commit,
    Rollback,
    CopyIn { sql: String, payload: String },
    Close,
}

#[derive(Default)]
struct Script {
    connects: VecDeque<Result<(), DriverError>>,
    applies: VecDeque<Result<(), DriverError>>,
    executes: VecDeque<Result<RowSet, DriverError>>,
    commits: VecDeque<Result<(), DriverError>>,
    rollbacks: VecDeque<Result<(), DriverError>>,
    copies: VecDeque<Result<u64, DriverError>>,
    calls: Vec<Call>,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    script: Arc<Mutex<Script>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        f(&mut self.script.lock().unwrap())
    }

    /// Next `n` connect attempts are refused
    pub fn refuse_connects(&self, n: usize) {
        self.with(|s| {
            for _ in 0..n {
                s.connects
                    .push_back(Err(DriverError::operational("connection refused")));
            }
        });
    }

    pub fn push_connect(&self, result: Result<(), DriverError>) {
        self.with(|s| s.connects.push_back(result));
    }

    pub fn push_apply(&self, result: Result<(), DriverError>) {
        self.with(|s| s.applies.push_back(result));
    }

    pub fn push_execute(&self, result: Result<RowSet, DriverError>) {
        self.with(|s| s.executes.push_back(result));
    }

    pub fn push_commit(&self, result: Result<(), DriverError>) {
        self.with(|s| s.commits.push_back(result));
    }

    pub fn push_rollback(&self, result: Result<(), DriverError>) {
        self.with(|s| s.rollbacks.push_back(result));
    }

    pub fn push_copy(&self, result: Result<u64, DriverError>) {
        self.with(|s| s.copies.push_back(result));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    pub fn count(&self, call: &Call) -> usize {
        self.with(|s| s.calls.iter().filter(|c| *c == call).count())
    }

    pub fn connects(&self) -> usize {
        self.count(&Call::Connect)
    }

    fn record(&self, call: Call) {
        self.with(|s| s.calls.push(call));
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Connection = MockConnection;

    async fn connect(&self, _config: &ConnectionConfig) -> Result<MockConnection, DriverError> {
        self.record(Call::Connect);
        self.with(|s| s.connects.pop_front()).unwrap_or(Ok(()))?;
        Ok(MockConnection {
            driver: self.clone(),
            closed: false,
        })
    }
}

pub struct MockConnection {
    driver: MockDriver,
    closed: bool,
}

#[async_trait]
impl DriverConnection for MockConnection {
    async fn apply_options(&mut self, options: &SessionOptions) -> Result<(), DriverError> {
        self.driver.record(Call::ApplyOptions(options.clone()));
        self.driver.with(|s| s.applies.pop_front()).unwrap_or(Ok(()))
    }

    async fn execute(&mut self, sql: &str) -> Result<RowSet, DriverError> {
        self.driver.record(Call::Execute(sql.to_string()));
        self.driver
            .with(|s| s.executes.pop_front())
            .unwrap_or_else(|| Ok(RowSet::command(0)))
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.driver.record(Call::Commit);
        self.driver.with(|s| s.commits.pop_front()).unwrap_or(Ok(()))
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.driver.record(Call::Rollback);
        self.driver.with(|s| s.rollbacks.pop_front()).unwrap_or(Ok(()))
    }

    async fn copy_in(
        &mut self,
        sql: &str,
        mut source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, DriverError> {
        let mut payload = String::new();
        AsyncReadExt::read_to_string(&mut source, &mut payload)
            .await
            .map_err(|e| DriverError::interface(e.to_string()))?;
        let lines = payload.lines().count() as u64;
        self.driver.record(Call::CopyIn {
            sql: sql.to_string(),
            payload,
        });
        self.driver
            .with(|s| s.copies.pop_front())
            .unwrap_or(Ok(lines))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if !self.closed {
            self.closed = true;
            self.driver.record(Call::Close);
        }
        Ok(())
    }
}

pub fn config() -> ConnectionConfig {
    ConnectionConfig::builder("db.test", "loader")
        .database("warehouse")
        .build()
}

pub fn session(driver: &MockDriver) -> ResilientSession<MockDriver> {
    ResilientSession::builder(driver.clone(), config())
        .retry_period(RETRY)
        .build()
}

/// Session already holding a connection, with the call log cleared
pub async fn connected_session(driver: &MockDriver) -> ResilientSession<MockDriver> {
    let mut session = session(driver);
    session.connect().await.unwrap();
    driver.clear_calls();
    session
}

/// Server-side shutdown error carrying `code`
pub fn shutdown(code: &str) -> DriverError {
    DriverError::database(code, "terminating connection due to administrator command")
}

pub fn undefined_table() -> DriverError {
    DriverError::database("42P01", "relation \"missing\" does not exist")
}
