//! SQLite-backed [`RelationalStore`]
//!
//! Requires SQLite 3.25+ for window functions; the bundled build satisfies it.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use serde_json::Value;
use tracing::instrument;

use crate::store::{Record, RelationalStore, SqlDialect, SqlValue, Statement, StoreError};

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            SqlValue::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            SqlValue::Bool(v) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*v))),
        })
    }
}

/// A shared SQLite connection; each statement locks it only while it runs.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// Run setup SQL (schema, fixtures) outside the pagination path
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    async fn with_conn<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&Connection) -> Result<R, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::from(v),
        ValueRef::Real(v) => Value::from(v),
        ValueRef::Text(v) => Value::String(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::String(BASE64.encode(v)),
    }
}

fn query_records(conn: &Connection, statement: &Statement) -> Result<Vec<Record>, StoreError> {
    let mut stmt = conn.prepare(&statement.sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query(params_from_iter(statement.params.iter()))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (idx, name) in names.iter().enumerate() {
            record.insert(name.clone(), column_value(row.get_ref(idx)?));
        }
        records.push(record);
    }

    Ok(records)
}

#[async_trait]
impl RelationalStore for SqliteStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    #[instrument(level = "trace", skip_all)]
    async fn fetch_records(&self, statement: &Statement) -> Result<Vec<Record>, StoreError> {
        let statement = statement.clone();
        self.with_conn(move |conn| query_records(conn, &statement))
            .await
    }

    #[instrument(level = "trace", skip_all)]
    async fn fetch_count(&self, statement: &Statement) -> Result<u64, StoreError> {
        let statement = statement.clone();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                &statement.sql,
                params_from_iter(statement.params.iter()),
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
