//! Relational store boundary used by the keyset builder
//!
//! The engine only needs two things from a store: run a statement and hand
//! back its rows as column-name maps, and run a statement returning a single
//! count. Everything else (pooling, deadlines, retries) belongs to the store.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use uuid::Uuid;

/// One result row, keyed by column name.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Store errors; always propagated to the caller unchanged
#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "sqlite")]
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Query task failed: {0}")]
    Task(String),
}

/// Bind value for a statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

/// RFC 3339 with fixed millisecond precision, so text ordering matches time ordering.
impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Text(v.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Text(v.hyphenated().to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Placeholder syntax of the target store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    /// `?1`, `?2`, ...
    #[default]
    Sqlite,
    /// `$1`, `$2`, ...
    Postgres,
}

impl SqlDialect {
    /// Placeholder for the 1-based parameter `index`
    pub fn placeholder(self, index: usize) -> String {
        match self {
            SqlDialect::Sqlite => format!("?{}", index),
            SqlDialect::Postgres => format!("${}", index),
        }
    }
}

/// SQL text plus positional bind values
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Append a parameter and return the placeholder that refers to it
    pub(crate) fn push_param(&mut self, dialect: SqlDialect, value: SqlValue) -> String {
        self.params.push(value);
        dialect.placeholder(self.params.len())
    }
}

/// The caller's filtered, unordered query that a keyset connection pages over.
///
/// `sql` must be a complete `SELECT` whose placeholders are numbered from 1
/// in the store's dialect; authorization and visibility filtering must
/// already be applied. The engine wraps it as a derived table and never adds
/// filters of its own.
pub type BaseQuery = Statement;

/// Relational store collaborator
///
/// Implementations acquire a connection per call and release it when the
/// statement completes.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    fn dialect(&self) -> SqlDialect;

    /// Run a statement and return every row
    async fn fetch_records(&self, statement: &Statement) -> Result<Vec<Record>, StoreError>;

    /// Run a statement whose first column of the first row is a count
    async fn fetch_count(&self, statement: &Statement) -> Result<u64, StoreError>;
}
