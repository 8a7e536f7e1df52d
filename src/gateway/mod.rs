//! Store gateway interface.
//!
//! The registry never talks to a database driver directly; it hands
//! parameterized queries to a [`QueryGateway`] and gets back scalars or
//! tabular rows. Implementations:
//! - `SqliteQueryGateway`: sqlx-backed SQLite execution (feature `sqlite`)
//! - `MockQueryGateway`: in-memory mock for testing

use async_trait::async_trait;

pub mod mock;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteQueryGateway;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur executing queries against the store.
///
/// `AlreadyExists` is a structured classification of the backend's
/// "duplicate object" failure, produced at the gateway boundary so the
/// core never compares literal error messages.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("malformed result: {0}")]
    MalformedResult(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// A named bind value attached to a query.
#[derive(Debug, Clone)]
pub struct Bind {
    pub name: &'static str,
    pub value: String,
}

/// A parameterized query handed to the gateway.
///
/// The SQL uses positional `?` placeholders, filled in the order of
/// `binds`. Names travel with the values so gateways that are not
/// prepared-statement based (and tests) can address binds without
/// parsing the SQL. All subscription queries bind text values only.
#[derive(Debug, Clone)]
pub struct StoreQuery {
    sql: String,
    binds: Vec<Bind>,
}

impl StoreQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    /// Attach a named bind value. Order of calls is placeholder order.
    pub fn bind(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.binds.push(Bind {
            name,
            value: value.into(),
        });
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn binds(&self) -> &[Bind] {
        &self.binds
    }

    /// Look up a bind value by name.
    pub fn bind_value(&self, name: &str) -> Option<&str> {
        self.binds
            .iter()
            .find(|bind| bind.name == name)
            .map(|bind| bind.value.as_str())
    }
}

/// One row of a tabular result, columns read as text.
#[derive(Debug, Clone, Default)]
pub struct TabularRow {
    columns: Vec<(String, String)>,
}

impl TabularRow {
    pub fn from_columns(columns: Vec<(String, String)>) -> Self {
        Self { columns }
    }

    /// Value of the named column, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Query-execution capability of the durable relational store.
///
/// The registry treats this purely as a capability: no transaction
/// control, no retries, no timeouts. A blocked call blocks its caller
/// and every failure surfaces synchronously.
#[async_trait]
pub trait QueryGateway: Send + Sync {
    /// Execute a query returning a single integer scalar.
    async fn execute_scalar(&self, query: &StoreQuery) -> Result<i64>;

    /// Execute a query with no result.
    async fn execute(&self, query: &StoreQuery) -> Result<()>;

    /// Execute a query returning a row set.
    async fn execute_tabular(&self, query: &StoreQuery) -> Result<Vec<TabularRow>>;
}
