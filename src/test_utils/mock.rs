//! An in-memory driver that answers statements from a script.
//!
//! ```rust
//! use pg_middleware::prelude::*;
//! use pg_middleware::test_utils::{MockDatabase, MockReply};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), PgMiddlewareError> {
//! let db = MockDatabase::new(|stmt| {
//!     if stmt.sql.starts_with("INSERT") {
//!         MockReply::Affected(1)
//!     } else {
//!         MockReply::rows(&["n"], vec![vec![RowValues::Int(1)]])
//!     }
//! });
//! let client = db.client("doc").await?;
//! let q = ParameterizedQuery::new("INSERT INTO t(a) VALUES ($1)", vec![RowValues::Int(1)])?;
//! assert_eq!(client.execute(&q).await?.rows_affected, 1);
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bb8::ManageConnection;

use crate::client::{Client, ClientConfig};
use crate::driver::{DriverConnection, RawRow, RowSource};
use crate::error::PgMiddlewareError;
use crate::pool::{PoolRegistry, PoolSettings};
use crate::query::BoundStatement;
use crate::types::RowValues;

/// One cell of a scripted row.
#[derive(Debug, Clone)]
pub enum MockCell {
    Value(RowValues),
    /// A cell the driver cannot decode; reading it yields `TypeMismatch`.
    Undecodable(String),
}

impl From<RowValues> for MockCell {
    fn from(value: RowValues) -> Self {
        MockCell::Value(value)
    }
}

/// Scripted answer to one statement.
#[derive(Debug, Clone)]
pub enum MockReply {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<MockCell>>,
    },
    Affected(u64),
    /// The server rejects the statement.
    Error(String),
    /// Rows are delivered, then the transport fails.
    RowsThenError {
        columns: Vec<String>,
        rows: Vec<Vec<MockCell>>,
        error: String,
    },
}

impl MockReply {
    #[must_use]
    pub fn rows(columns: &[&str], rows: Vec<Vec<RowValues>>) -> Self {
        MockReply::Rows {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(MockCell::Value).collect())
                .collect(),
        }
    }

    #[must_use]
    pub fn empty(columns: &[&str]) -> Self {
        Self::rows(columns, Vec::new())
    }
}

type Responder = dyn Fn(&BoundStatement) -> MockReply + Send + Sync;

/// Shared state behind every mock connection: the script and a log.
pub struct MockDatabase {
    responder: Box<Responder>,
    log: Mutex<Vec<BoundStatement>>,
    connects: AtomicUsize,
    refuse_connections: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl std::fmt::Debug for MockDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDatabase")
            .field("connects", &self.connect_count())
            .finish_non_exhaustive()
    }
}

impl MockDatabase {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&BoundStatement) -> MockReply + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            log: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            refuse_connections: AtomicBool::new(false),
            latency: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn manager(self: &Arc<Self>) -> MockManager {
        MockManager {
            db: Arc::clone(self),
        }
    }

    /// Open a client on a fresh registry with a single-connection pool.
    ///
    /// # Errors
    /// Returns the pool build error.
    pub async fn client(self: &Arc<Self>, key: &str) -> Result<Client<MockManager>, PgMiddlewareError> {
        let config = ClientConfig {
            database: key.to_string(),
            pool: PoolSettings {
                max_size: 1,
                acquire_timeout: Duration::from_secs(5),
                close_timeout: Duration::from_secs(1),
                ..PoolSettings::default()
            },
            ..ClientConfig::default()
        };
        Client::open(&PoolRegistry::new(), key, self.manager(), config).await
    }

    /// Statements seen so far, in execution order.
    #[must_use]
    pub fn statements(&self) -> Vec<BoundStatement> {
        match self.log.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make new connection attempts fail with `ConnectionError`.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Delay every statement by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        match self.latency.lock() {
            Ok(mut guard) => *guard = latency,
            Err(poisoned) => *poisoned.into_inner() = latency,
        }
    }

    async fn answer(&self, stmt: &BoundStatement) -> MockReply {
        let latency = match self.latency.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.log.lock() {
            Ok(mut log) => log.push(stmt.clone()),
            Err(poisoned) => poisoned.into_inner().push(stmt.clone()),
        }
        (self.responder)(stmt)
    }
}

/// `bb8` manager handing out [`MockConnection`]s.
#[derive(Debug, Clone)]
pub struct MockManager {
    db: Arc<MockDatabase>,
}

impl ManageConnection for MockManager {
    type Connection = MockConnection;
    type Error = PgMiddlewareError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let db = Arc::clone(&self.db);
        async move {
            if db.refuse_connections.load(Ordering::SeqCst) {
                return Err(PgMiddlewareError::ConnectionError(
                    "mock database refused the connection".to_string(),
                ));
            }
            let id = db.connects.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(MockConnection { db, id })
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        _conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async { Ok(()) }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// One scripted connection.
#[derive(Debug)]
pub struct MockConnection {
    db: Arc<MockDatabase>,
    id: usize,
}

impl MockConnection {
    /// Sequence number of this connection, from 1.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }
}

#[derive(Debug)]
pub struct MockRow {
    cells: Vec<MockCell>,
}

impl RawRow for MockRow {
    fn column_count(&self) -> usize {
        self.cells.len()
    }

    fn decode_column(&self, idx: usize) -> Result<RowValues, PgMiddlewareError> {
        match self.cells.get(idx) {
            Some(MockCell::Value(v)) => Ok(v.clone()),
            Some(MockCell::Undecodable(reason)) => {
                Err(PgMiddlewareError::type_mismatch("mock", reason.clone()))
            }
            None => Err(PgMiddlewareError::ExecutionError(format!(
                "column {idx} out of range"
            ))),
        }
    }
}

#[derive(Debug)]
pub struct MockRows {
    columns: Arc<Vec<String>>,
    rows: VecDeque<Vec<MockCell>>,
    trailing_error: Option<String>,
}

#[async_trait]
impl RowSource for MockRows {
    type Row = MockRow;

    fn columns(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.columns)
    }

    async fn next_raw(&mut self) -> Result<Option<MockRow>, PgMiddlewareError> {
        if let Some(cells) = self.rows.pop_front() {
            return Ok(Some(MockRow { cells }));
        }
        match self.trailing_error.take() {
            Some(err) => Err(PgMiddlewareError::ExecutionError(err)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    type Rows = MockRows;

    async fn query(&mut self, stmt: &BoundStatement) -> Result<MockRows, PgMiddlewareError> {
        let (columns, rows, trailing_error) = match self.db.answer(stmt).await {
            MockReply::Rows { columns, rows } => (columns, rows, None),
            MockReply::RowsThenError {
                columns,
                rows,
                error,
            } => (columns, rows, Some(error)),
            MockReply::Affected(_) => (Vec::new(), Vec::new(), None),
            MockReply::Error(msg) => return Err(PgMiddlewareError::ExecutionError(msg)),
        };
        Ok(MockRows {
            columns: Arc::new(columns),
            rows: rows.into(),
            trailing_error,
        })
    }

    async fn execute(&mut self, stmt: &BoundStatement) -> Result<u64, PgMiddlewareError> {
        match self.db.answer(stmt).await {
            MockReply::Affected(n) => Ok(n),
            MockReply::Rows { rows, .. } => Ok(rows.len() as u64),
            MockReply::Error(msg) | MockReply::RowsThenError { error: msg, .. } => {
                Err(PgMiddlewareError::ExecutionError(msg))
            }
        }
    }
}
