//! Connections over already-materialized, ordered collections

use async_trait::async_trait;

use crate::args::ConnectionArguments;
use crate::cursor::CursorCodec;
use crate::pagination::{Connection, ConnectionStrategy, Edge, RankSpan};
use crate::{ConnectionError, Result};

/// Builds a connection from an ordered `Vec`, using offset cursors.
///
/// Two modes:
///
/// - With a known total ([`with_total_count`](Self::with_total_count)) the
///   data is one slice of a larger result that the caller fetched upstream
///   (typically with a `take`/`skip` from
///   [`ConnectionArgsResolver`](crate::ConnectionArgsResolver)). Cursors are
///   absolute positions in that larger result, so successive independently
///   fetched slices keep globally consistent cursors.
/// - Without one, the data is the whole result and the builder windows it by
///   `after`/`before`/`first`/`last` itself.
#[derive(Debug, Clone)]
pub struct OffsetConnectionBuilder<T> {
    data: Vec<T>,
    total_count: Option<u64>,
    codec: CursorCodec,
}

impl<T> OffsetConnectionBuilder<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            total_count: None,
            codec: CursorCodec::default(),
        }
    }

    pub fn with_total_count(mut self, total_count: u64) -> Self {
        self.total_count = Some(total_count);
        self
    }

    pub fn with_codec(mut self, codec: CursorCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn build(self, args: &ConnectionArguments) -> Result<Connection<T>> {
        args.validate()?;
        let after = self.codec.decode_offset(args.after.as_deref()).into_option()?;
        let before = self.codec.decode_offset(args.before.as_deref()).into_option()?;

        match self.total_count {
            Some(total_count) => self.build_slice(after, total_count),
            None => Ok(self.build_window(after, before, args)),
        }
    }

    /// Rejects an `after` offset that would push slice positions past `u64`.
    fn build_slice(self, after: Option<u64>, total_count: u64) -> Result<Connection<T>> {
        let start = match after {
            Some(offset) => offset.checked_add(1),
            None => Some(0),
        };
        let len = self.data.len() as u64;
        let start = start
            .filter(|start| start.checked_add(len).is_some())
            .ok_or_else(|| {
                ConnectionError::InvalidCursor(format!(
                    "offset {} is out of range",
                    after.unwrap_or_default()
                ))
            })?;

        Ok(self.finish(start, total_count))
    }

    fn build_window(
        mut self,
        after: Option<u64>,
        before: Option<u64>,
        args: &ConnectionArguments,
    ) -> Connection<T> {
        let len = self.data.len() as u64;

        let mut start = after.map_or(0, |offset| offset.saturating_add(1)).min(len);
        let mut end = before.map_or(len, |offset| offset.min(len)).max(start);

        if let Some(first) = args.first {
            end = end.min(start + first.max(0) as u64);
        }
        if let Some(last) = args.last {
            start = start.max(end.saturating_sub(last.max(0) as u64));
        }

        self.data.truncate(end as usize);
        self.data.drain(..start as usize);

        self.finish(start, len)
    }

    /// `start` is the absolute position of `self.data[0]`.
    fn finish(self, start: u64, total_count: u64) -> Connection<T> {
        let codec = self.codec;
        let edges: Vec<Edge<T>> = self
            .data
            .into_iter()
            .enumerate()
            .map(|(idx, node)| Edge::new(codec.encode_offset(start + idx as u64), node))
            .collect();

        let span = match edges.len() as u64 {
            0 => None,
            n => Some(RankSpan::new(start + 1, start + n)),
        };

        Connection::from_window(edges, span, total_count)
    }
}

#[async_trait]
impl<T: Send> ConnectionStrategy<T> for OffsetConnectionBuilder<T> {
    async fn connection(self, args: &ConnectionArguments) -> Result<Connection<T>> {
        self.build(args)
    }
}

/// Shorthand for [`OffsetConnectionBuilder`] with the default codec.
pub fn connection_from_array<T>(
    data: Vec<T>,
    args: &ConnectionArguments,
    total_count: Option<u64>,
) -> Result<Connection<T>> {
    let builder = OffsetConnectionBuilder::new(data);
    match total_count {
        Some(total) => builder.with_total_count(total).build(args),
        None => builder.build(args),
    }
}
