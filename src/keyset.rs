//! Keyset connections over lazy relational queries
//!
//! The caller hands over a filtered `SELECT` (the base query), an ordering and
//! a unique id column. One statement wraps the base query in a ranked derived
//! table and cuts the requested before/after windows out of it; the same rows
//! carry the total count, so a page costs a single round trip (two when the
//! page is empty and the total must be counted separately).
//!
//! Pages are not snapshots: rows written between two page fetches can shift
//! `total_count` or show up twice / not at all across a page boundary.

use std::fmt;

use async_graphql::Enum;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::args::{ConnectionArgsResolver, ConnectionArguments, ResolverConfig, Take};
use crate::cursor::CursorCodec;
use crate::pagination::{Connection, ConnectionStrategy, Edge, RankSpan};
use crate::store::{BaseQuery, Record, RelationalStore, SqlDialect, SqlValue, Statement};
use crate::{ConnectionError, Result};

const RANKED: &str = "__ranked";
const SOURCE: &str = "__source";
const RANK: &str = "__rank";
const TOTAL_COUNT: &str = "__total_count";
const WINDOW: &str = "__window";

/// Sort direction
#[derive(Enum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Operator selecting rows that sort after a given row
    fn after_op(self) -> &'static str {
        match self {
            SortDirection::Asc => ">",
            SortDirection::Desc => "<",
        }
    }

    /// Operator selecting rows that sort before a given row
    fn before_op(self) -> &'static str {
        match self {
            SortDirection::Asc => "<",
            SortDirection::Desc => ">",
        }
    }
}

/// How id values are bound when decoded from a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Integer,
    Text,
}

/// A column an entity may be sorted or keyed by.
///
/// Implement it on a closed enum per entity: the enum is the allowlist, and
/// only its `&'static str` names ever reach the generated SQL.
///
/// Sort columns may be nullable: NULLs sort before every value ascending and
/// after every value descending, on SQLite and Postgres alike. The id column
/// must be unique and non-null.
///
/// ```
/// use relay_connections::{KeyKind, SortColumn};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum CommentColumn {
///     Id,
///     CreatedAt,
/// }
///
/// impl SortColumn for CommentColumn {
///     fn name(self) -> &'static str {
///         match self {
///             CommentColumn::Id => "id",
///             CommentColumn::CreatedAt => "created_at",
///         }
///     }
///
///     fn key_kind(self) -> KeyKind {
///         KeyKind::Integer
///     }
/// }
/// ```
pub trait SortColumn: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Column name as projected by the base query
    fn name(self) -> &'static str;

    /// How cursor keys bind against this column; only consulted for the id column
    fn key_kind(self) -> KeyKind;
}

/// Ordering of a keyset connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSpec<C> {
    pub column: C,
    pub direction: SortDirection,
}

impl<C> OrderSpec<C> {
    pub fn asc(column: C) -> Self {
        Self {
            column,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: C) -> Self {
        Self {
            column,
            direction: SortDirection::Desc,
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quoted(name: &str) -> String {
    format!("\"{}\"", name)
}

/// The statements a keyset page runs
#[derive(Debug, Clone, PartialEq)]
pub struct KeysetPlan {
    /// Windowed fetch; rows carry `__rank`, `__total_count` and `__window`
    pub statement: Statement,
    /// Fallback total, only run when the fetch returns no rows
    pub count: Statement,
    /// `first: 0` without a cursor: an empty page that still sits at the head
    pub empty_at_head: bool,
}

/// Which side of a cursor a window extends to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Before,
    After,
}

/// Builds keyset-paginated connections for one ordering of one entity
#[derive(Debug, Clone)]
pub struct KeysetConnectionBuilder<C> {
    order: OrderSpec<C>,
    id_column: C,
    resolver: ConnectionArgsResolver,
    codec: CursorCodec,
    merge: bool,
}

impl<C: SortColumn> KeysetConnectionBuilder<C> {
    /// # Panics
    ///
    /// When a column name is not a plain SQL identifier; that is a bug in the
    /// `SortColumn` impl, not bad user input.
    pub fn new(order: OrderSpec<C>, id_column: C) -> Self {
        for column in [order.column, id_column] {
            assert!(
                is_identifier(column.name()),
                "sort column {:?} maps to {:?}, which is not a plain SQL identifier",
                column,
                column.name()
            );
        }

        Self {
            order,
            id_column,
            resolver: ConnectionArgsResolver::default(),
            codec: CursorCodec::default(),
            merge: false,
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.resolver = ConnectionArgsResolver::new(config).with_codec(self.codec);
        self
    }

    pub fn with_codec(mut self, codec: CursorCodec) -> Self {
        self.codec = codec;
        self.resolver = self.resolver.with_codec(codec);
        self
    }

    /// Accept `after` and `before` together, returning the before-window
    /// followed by the after-window.
    ///
    /// For clients that rendered a list up to one boundary and from another
    /// and want to fill both gaps in one request. The result is then two
    /// windows back to back, not one contiguous page.
    pub fn merge(mut self) -> Self {
        self.merge = true;
        self
    }

    pub fn order(&self) -> OrderSpec<C> {
        self.order
    }

    /// Pair the builder with a store and base query as a [`ConnectionStrategy`].
    pub fn source<'a, S>(&'a self, store: &'a S, base: &'a BaseQuery) -> KeysetSource<'a, S, C>
    where
        S: RelationalStore + ?Sized,
    {
        KeysetSource {
            builder: self,
            store,
            base,
        }
    }

    fn decode_id(&self, cursor: Option<&str>) -> Result<Option<SqlValue>> {
        let kind = self.id_column.key_kind();
        self.codec
            .decode(cursor)
            .and_then(|payload| match kind {
                KeyKind::Integer => payload.parse::<i64>().ok().map(SqlValue::Integer),
                KeyKind::Text => Some(SqlValue::Text(payload)),
            })
            .into_option()
    }

    /// Validate `args` and render the statements for one page. Runs no I/O.
    pub fn plan(
        &self,
        base: &BaseQuery,
        dialect: SqlDialect,
        args: &ConnectionArguments,
    ) -> Result<KeysetPlan> {
        args.validate()?;
        if args.after.is_some() && args.before.is_some() && !self.merge {
            return Err(ConnectionError::InvalidArguments(
                "'after' and 'before' can only be combined on a merged connection".to_string(),
            ));
        }

        let after = self.decode_id(args.after.as_deref())?;
        let before = self.decode_id(args.before.as_deref())?;

        // Only `last` and no cursors: the tail of the list.
        let tail =
            after.is_none() && before.is_none() && args.last.is_some() && args.first.is_none();
        let with_before = before.is_some() || tail;
        let with_after = after.is_some() || (before.is_none() && !tail);

        let empty_at_head =
            with_after && after.is_none() && !with_before && args.first == Some(0);

        let mut statement = base.clone();
        let mut windows = Vec::new();

        if with_before {
            let take = self.resolver.resolve_take(args.last);
            windows.push(self.window(
                &mut statement,
                dialect,
                Side::Before,
                before,
                args.include_before,
                take,
            ));
        }
        if with_after {
            let take = self.resolver.resolve_take(args.first);
            windows.push(self.window(
                &mut statement,
                dialect,
                Side::After,
                after,
                args.include_after,
                take,
            ));
        }

        statement.sql = format!(
            "{} {} ORDER BY {}, {}",
            self.ranked_cte(&base.sql),
            windows.join(" UNION ALL "),
            WINDOW,
            RANK
        );

        let count = Statement {
            sql: format!("SELECT COUNT(*) FROM ({}) AS {}", base.sql, SOURCE),
            params: base.params.clone(),
        };

        Ok(KeysetPlan {
            statement,
            count,
            empty_at_head,
        })
    }

    fn ranked_cte(&self, base_sql: &str) -> String {
        let dir = self.order.direction.sql();
        format!(
            "WITH {ranked} AS (SELECT {source}.*, COUNT(*) OVER () AS {total}, \
             ROW_NUMBER() OVER (ORDER BY ({source}.{col} IS NOT NULL) {dir}, \
             {source}.{col} {dir}, {source}.{id} {dir}) AS {rank} \
             FROM ({base}) AS {source})",
            ranked = RANKED,
            source = SOURCE,
            total = TOTAL_COUNT,
            rank = RANK,
            col = quoted(self.order.column.name()),
            id = quoted(self.id_column.name()),
            dir = dir,
            base = base_sql,
        )
    }

    /// Rows on one side of `cursor` (or from the matching end of the list
    /// without one), nearest first, as a tagged subquery.
    fn window(
        &self,
        statement: &mut Statement,
        dialect: SqlDialect,
        side: Side,
        cursor: Option<SqlValue>,
        inclusive: bool,
        take: Take,
    ) -> String {
        let (tag, alias, op, rank_order) = match side {
            Side::Before => (0, "__before", self.order.direction.before_op(), "DESC"),
            Side::After => (1, "__after", self.order.direction.after_op(), "ASC"),
        };

        let filter = cursor
            .map(|value| {
                let key = statement.push_param(dialect, value);
                format!(" WHERE {}", self.seek_condition(op, inclusive, &key))
            })
            .unwrap_or_default();

        let limit = take
            .limit()
            .map(|n| {
                let n = i64::try_from(n).unwrap_or(i64::MAX);
                format!(" LIMIT {}", statement.push_param(dialect, SqlValue::Integer(n)))
            })
            .unwrap_or_default();

        format!(
            "SELECT * FROM (SELECT {ranked}.*, {tag} AS {window} FROM {ranked}{filter} \
             ORDER BY {rank} {rank_order}{limit}) AS {alias}",
            ranked = RANKED,
            tag = tag,
            window = WINDOW,
            filter = filter,
            rank = RANK,
            rank_order = rank_order,
            limit = limit,
            alias = alias,
        )
    }

    /// Rows strictly past the cursor row in sort order (or including it when
    /// `inclusive`). Compares NULL-ness of the sort column first, then its
    /// value, then the id, mirroring the ranking order.
    fn seek_condition(&self, op: &str, inclusive: bool, key: &str) -> String {
        let id = quoted(self.id_column.name());
        let id_op = if inclusive { format!("{}=", op) } else { op.to_string() };

        if self.order.column == self.id_column {
            return format!("{} {} {}", id, id_op, key);
        }

        let col = quoted(self.order.column.name());
        let cursor_row =
            |expr: &str| format!("(SELECT {} FROM {} WHERE {} = {})", expr, RANKED, id, key);
        let present = format!("({} IS NOT NULL)", col);
        let cursor_present = cursor_row(&format!("{} IS NOT NULL", col));
        let cursor_value = cursor_row(&col);

        format!(
            "({present} {op} {cursor_present} OR ({present} = {cursor_present} AND \
             ({col} {op} {value} OR (({col} IS NULL OR {col} = {value}) AND {id} {id_op} {key}))))",
            present = present,
            cursor_present = cursor_present,
            col = col,
            op = op,
            value = cursor_value,
            id = id,
            id_op = id_op,
            key = key,
        )
    }

    /// Fetch one page of `T` from `store`.
    #[instrument(
        skip_all,
        fields(column = self.order.column.name(), direction = ?self.order.direction)
    )]
    pub async fn build<T, S>(
        &self,
        store: &S,
        base: &BaseQuery,
        args: &ConnectionArguments,
    ) -> Result<Connection<T>>
    where
        T: DeserializeOwned,
        S: RelationalStore + ?Sized,
    {
        let plan = self.plan(base, store.dialect(), args)?;
        debug!(
            sql = %plan.statement.sql,
            params = plan.statement.params.len(),
            "keyset page query"
        );

        let records = store.fetch_records(&plan.statement).await?;
        let total_count = match records.first() {
            Some(record) => read_u64(record, TOTAL_COUNT)?,
            None => {
                trace!("empty page, counting base query separately");
                store.fetch_count(&plan.count).await?
            }
        };

        let mut edges = Vec::with_capacity(records.len());
        let mut ranks = Vec::with_capacity(records.len());
        for record in records {
            let (rank, edge) = self.edge(record)?;
            ranks.push(rank);
            edges.push(edge);
        }

        let span = match (ranks.first(), ranks.last()) {
            (Some(&first), Some(&last)) => Some(RankSpan::new(first, last)),
            _ if plan.empty_at_head => Some(RankSpan::head()),
            _ => None,
        };

        debug!(edges = edges.len(), total_count, "keyset page built");
        Ok(Connection::from_window(edges, span, total_count))
    }

    fn edge<T: DeserializeOwned>(&self, mut record: Record) -> Result<(u64, Edge<T>)> {
        let rank = read_u64(&record, RANK)?;
        record.remove(RANK);
        record.remove(TOTAL_COUNT);
        record.remove(WINDOW);

        let id_name = self.id_column.name();
        let key = match record.get(id_name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            other => {
                return Err(ConnectionError::Decode(format!(
                    "id column {} has no usable value: {:?}",
                    id_name, other
                )))
            }
        };

        let node = serde_json::from_value(Value::Object(record))
            .map_err(|e| ConnectionError::Decode(e.to_string()))?;

        Ok((rank, Edge::new(self.codec.encode_key(&key), node)))
    }
}

fn read_u64(record: &Record, column: &str) -> Result<u64> {
    record
        .get(column)
        .and_then(Value::as_u64)
        .ok_or_else(|| ConnectionError::Decode(format!("row is missing {}", column)))
}

/// A keyset builder bound to a store and base query
pub struct KeysetSource<'a, S: ?Sized, C> {
    builder: &'a KeysetConnectionBuilder<C>,
    store: &'a S,
    base: &'a BaseQuery,
}

#[async_trait]
impl<'a, S, C, T> ConnectionStrategy<T> for KeysetSource<'a, S, C>
where
    S: RelationalStore + ?Sized,
    C: SortColumn,
    T: DeserializeOwned + Send + 'static,
{
    async fn connection(self, args: &ConnectionArguments) -> Result<Connection<T>> {
        self.builder.build(self.store, self.base, args).await
    }
}
