//! # relay-connections
//!
//! Relay-style connection engine for GraphQL list fields.
//!
//! ## Features
//!
//! - **Cursor Codec** - Opaque, namespaced, restart-stable cursors
//! - **Argument Resolution** - `first`/`after` to bounded `take`/`skip`
//! - **Offset Connections** - Pages over materialized collections
//! - **Keyset Connections** - Pages over ordered relational queries, with
//!   total count and page flags from a single windowed query
//! - **SQLite Store** - `rusqlite`-backed store (feature `sqlite`, on by default)
//!
//! ## Usage
//!
//! ```rust
//! use relay_connections::{connection_from_array, ConnectionArguments};
//!
//! let args = ConnectionArguments::first(2);
//! let connection = connection_from_array(vec!["a", "b", "c"], &args, None).unwrap();
//!
//! assert_eq!(connection.total_count, 3);
//! assert!(connection.page_info.has_next_page);
//! ```

pub mod args;
pub mod cursor;
pub mod keyset;
pub mod offset;
pub mod pagination;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use args::{ConnectionArgsResolver, ConnectionArguments, ResolverConfig, Take, TakeSkip};
pub use cursor::{CursorCodec, Position};
pub use keyset::{
    KeyKind, KeysetConnectionBuilder, KeysetSource, OrderSpec, SortColumn, SortDirection,
};
pub use offset::{connection_from_array, OffsetConnectionBuilder};
pub use pagination::{Connection, ConnectionStrategy, Edge, NoEdgeFields, PageInfo, RankSpan};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::{BaseQuery, RelationalStore, SqlDialect, SqlValue, Statement, StoreError};

use async_graphql::ErrorExtensions;
use thiserror::Error;

/// Error codes for the `extensions.code` field of GraphQL errors.
pub mod code {
    pub const BAD_USER_INPUT: &str = "BAD_USER_INPUT";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid connection arguments: {0}")]
    InvalidArguments(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to decode row: {0}")]
    Decode(String),
}

impl ConnectionError {
    /// Caused by the request rather than by the server
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            ConnectionError::InvalidCursor(_) | ConnectionError::InvalidArguments(_)
        )
    }
}

impl ErrorExtensions for ConnectionError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_err, e| {
            if self.is_user_input() {
                e.set("code", code::BAD_USER_INPUT);
            } else {
                e.set("code", code::INTERNAL_SERVER_ERROR);
            }
        })
    }
}

/// Result type for connection operations
pub type Result<T> = std::result::Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::Value;

    #[test]
    fn test_user_input_errors_are_tagged() {
        let err = ConnectionError::InvalidCursor("bad".to_string()).extend();
        let tag = err.extensions.as_ref().and_then(|ext| ext.get("code")).cloned();
        assert_eq!(tag, Some(Value::String(code::BAD_USER_INPUT.into())));
        assert_eq!(err.message, "Invalid cursor: bad");
    }

    #[test]
    fn test_store_errors_are_internal() {
        let err = ConnectionError::from(StoreError::Connection("gone".to_string()));
        assert!(!err.is_user_input());
        let extended = err.extend();
        let tag = extended.extensions.as_ref().and_then(|ext| ext.get("code")).cloned();
        assert_eq!(tag, Some(Value::String(code::INTERNAL_SERVER_ERROR.into())));
    }
}
