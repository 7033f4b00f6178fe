//! Relay-style connection types and the page-info rules shared by every builder

use std::borrow::Cow;

use async_graphql::{Object, ObjectType, OutputType, SimpleObject, TypeName};
use async_trait::async_trait;

use crate::args::ConnectionArguments;
use crate::Result;

/// Page information
#[derive(SimpleObject, Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// 1-based, inclusive rank range a page covers within the whole ordered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankSpan {
    pub first_rank: u64,
    pub last_rank: u64,
}

impl RankSpan {
    pub fn new(first_rank: u64, last_rank: u64) -> Self {
        Self { first_rank, last_rank }
    }

    /// Empty page positioned before rank 1, e.g. `first: 0` with no cursor.
    pub fn head() -> Self {
        Self { first_rank: 1, last_rank: 0 }
    }
}

impl PageInfo {
    /// Derive page flags from the ranks a page covers. Flags depend only on
    /// ranks and the total, never on which arguments were supplied.
    pub fn compose(
        span: Option<RankSpan>,
        total_count: u64,
        start_cursor: Option<String>,
        end_cursor: Option<String>,
    ) -> Self {
        let (has_previous_page, has_next_page) = match span {
            Some(span) => (span.first_rank > 1, span.last_rank < total_count),
            None => (false, false),
        };

        Self {
            has_next_page,
            has_previous_page,
            start_cursor,
            end_cursor,
        }
    }
}

/// Edge metadata placeholder for lists that attach none.
///
/// `async_graphql::connection::EmptyFields` is not `Clone`, hence our own.
#[derive(SimpleObject, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[graphql(fake)]
pub struct NoEdgeFields;

/// Edge in a connection
///
/// `E` carries per-edge metadata (a `pinned` flag, a relation timestamp...)
/// that callers attach after the page is built; its fields are flattened into
/// the GraphQL edge type.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge<T, E = NoEdgeFields> {
    pub cursor: String,
    pub node: T,
    pub additional_fields: E,
}

impl<T> Edge<T> {
    pub fn new(cursor: String, node: T) -> Self {
        Self {
            cursor,
            node,
            additional_fields: NoEdgeFields,
        }
    }
}

#[Object(name_type)]
impl<T, E> Edge<T, E>
where
    T: OutputType,
    E: ObjectType,
{
    async fn cursor(&self) -> &str {
        &self.cursor
    }

    async fn node(&self) -> &T {
        &self.node
    }

    #[graphql(flatten)]
    async fn additional_fields(&self) -> &E {
        &self.additional_fields
    }
}

impl<T: OutputType, E: ObjectType> TypeName for Edge<T, E> {
    fn type_name() -> Cow<'static, str> {
        format!("{}Edge", <T as OutputType>::type_name()).into()
    }
}

/// Connection (paginated result)
#[derive(Debug, Clone, PartialEq)]
pub struct Connection<T, E = NoEdgeFields> {
    pub edges: Vec<Edge<T, E>>,
    pub page_info: PageInfo,
    pub total_count: u64,
}

#[Object(name_type)]
impl<T, E> Connection<T, E>
where
    T: OutputType,
    E: ObjectType,
{
    async fn edges(&self) -> &[Edge<T, E>] {
        &self.edges
    }

    async fn nodes(&self) -> Vec<&T> {
        self.edges.iter().map(|e| &e.node).collect()
    }

    async fn page_info(&self) -> &PageInfo {
        &self.page_info
    }

    async fn total_count(&self) -> u64 {
        self.total_count
    }
}

impl<T: OutputType, E: ObjectType> TypeName for Connection<T, E> {
    fn type_name() -> Cow<'static, str> {
        format!("{}Connection", <T as OutputType>::type_name()).into()
    }
}

impl<T> Connection<T> {
    /// Finish a page: cursors come from the edges, flags from `span`.
    pub fn from_window(edges: Vec<Edge<T>>, span: Option<RankSpan>, total_count: u64) -> Self {
        let start_cursor = edges.first().map(|e| e.cursor.clone());
        let end_cursor = edges.last().map(|e| e.cursor.clone());

        Self {
            page_info: PageInfo::compose(span, total_count, start_cursor, end_cursor),
            edges,
            total_count,
        }
    }

    /// Create empty connection
    pub fn empty() -> Self {
        Self::from_window(Vec::new(), None, 0)
    }

    /// Attach per-edge metadata computed from each node.
    pub fn with_edge_fields<E>(self, mut f: impl FnMut(&T) -> E) -> Connection<T, E> {
        let edges = self
            .edges
            .into_iter()
            .map(|edge| Edge {
                additional_fields: f(&edge.node),
                cursor: edge.cursor,
                node: edge.node,
            })
            .collect();

        Connection {
            edges,
            page_info: self.page_info,
            total_count: self.total_count,
        }
    }
}

impl<T, E> Connection<T, E> {
    /// Convert nodes, keeping cursors and page info untouched.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Connection<U, E> {
        let edges = self
            .edges
            .into_iter()
            .map(|edge| Edge {
                cursor: edge.cursor,
                node: f(edge.node),
                additional_fields: edge.additional_fields,
            })
            .collect();

        Connection {
            edges,
            page_info: self.page_info,
            total_count: self.total_count,
        }
    }
}

/// A way of producing a connection for a list field.
///
/// Offset and keyset builders both implement this, so a resolver can pick a
/// strategy per call site and still hand back identical page-info semantics.
#[async_trait]
pub trait ConnectionStrategy<T>: Send {
    async fn connection(self, args: &ConnectionArguments) -> Result<Connection<T>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::{EmptyMutation, EmptySubscription, Schema};

    #[derive(SimpleObject, Debug, Clone, PartialEq)]
    struct Article {
        id: i64,
        title: String,
    }

    #[derive(SimpleObject, Debug, Clone, PartialEq)]
    struct Pin {
        pinned: bool,
    }

    fn articles(n: i64) -> Connection<Article> {
        let edges = (1..=n)
            .map(|id| {
                Edge::new(
                    format!("c{}", id),
                    Article {
                        id,
                        title: format!("article {}", id),
                    },
                )
            })
            .collect();
        Connection::from_window(edges, Some(RankSpan::new(1, n as u64)), 5)
    }

    #[test]
    fn test_compose_middle_page() {
        let info = PageInfo::compose(Some(RankSpan::new(4, 6)), 10, None, None);
        assert!(info.has_previous_page);
        assert!(info.has_next_page);
    }

    #[test]
    fn test_compose_edges_of_list() {
        let first = PageInfo::compose(Some(RankSpan::new(1, 3)), 3, None, None);
        assert!(!first.has_previous_page);
        assert!(!first.has_next_page);

        let head = PageInfo::compose(Some(RankSpan::head()), 4, None, None);
        assert!(!head.has_previous_page);
        assert!(head.has_next_page);

        let nothing = PageInfo::compose(Some(RankSpan::head()), 0, None, None);
        assert!(!nothing.has_next_page);
    }

    #[test]
    fn test_compose_without_span() {
        let info = PageInfo::compose(None, 10, None, None);
        assert_eq!(info, PageInfo::default());
    }

    #[test]
    fn test_connection_creation() {
        let conn = articles(2);
        assert_eq!(conn.edges.len(), 2);
        assert_eq!(conn.total_count, 5);
        assert_eq!(conn.page_info.start_cursor.as_deref(), Some("c1"));
        assert_eq!(conn.page_info.end_cursor.as_deref(), Some("c2"));
        assert!(conn.page_info.has_next_page);
        assert!(!conn.page_info.has_previous_page);
    }

    #[test]
    fn test_empty_connection() {
        let conn: Connection<Article> = Connection::empty();
        assert!(conn.edges.is_empty());
        assert_eq!(conn.total_count, 0);
        assert_eq!(conn.page_info, PageInfo::default());
    }

    #[test]
    fn test_map_keeps_cursors() {
        let conn = articles(2).map(|a| a.id);
        assert_eq!(conn.edges[1].node, 2);
        assert_eq!(conn.edges[1].cursor, "c2");
        assert!(conn.page_info.has_next_page);
    }

    #[tokio::test]
    async fn test_graphql_output_with_edge_fields() {
        struct Query;

        #[Object]
        impl Query {
            async fn articles(&self) -> Connection<Article, Pin> {
                articles(2).with_edge_fields(|a| Pin { pinned: a.id == 1 })
            }
        }

        let schema = Schema::new(Query, EmptyMutation, EmptySubscription);
        let sdl = schema.sdl();
        assert!(sdl.contains("type ArticleConnection"));
        assert!(sdl.contains("type ArticleEdge"));

        let response = schema
            .execute(
                "{ articles { totalCount nodes { id } edges { cursor pinned node { title } } \
                 pageInfo { hasNextPage hasPreviousPage startCursor endCursor } } }",
            )
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let data = response.data.into_json().unwrap();
        assert_eq!(data["articles"]["totalCount"], 5);
        assert_eq!(data["articles"]["nodes"][1]["id"], 2);
        assert_eq!(data["articles"]["edges"][0]["pinned"], true);
        assert_eq!(data["articles"]["edges"][1]["pinned"], false);
        assert_eq!(data["articles"]["edges"][0]["node"]["title"], "article 1");
        assert_eq!(data["articles"]["pageInfo"]["hasNextPage"], true);
        assert_eq!(data["articles"]["pageInfo"]["endCursor"], "c2");
    }
}
