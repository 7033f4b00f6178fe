//! Opaque cursor encoding/decoding

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::{ConnectionError, Result};

/// Namespace used when none is configured, kept compatible with cursors
/// issued by Relay's `connectionFromArray` helpers.
pub const DEFAULT_NAMESPACE: &str = "arrayconnection";

/// Outcome of decoding a cursor.
///
/// Decoding never fails: callers decide what a missing or malformed cursor
/// means through [`Position::into_option`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position<T> {
    /// No cursor was supplied (or it was empty).
    Absent,
    /// The cursor could not be read back into a position.
    Malformed,
    /// A valid position.
    At(T),
}

impl<T> Position<T> {
    /// Absent means "start of list"; malformed is a user-input error.
    pub fn into_option(self) -> Result<Option<T>> {
        match self {
            Position::Absent => Ok(None),
            Position::Malformed => Err(ConnectionError::InvalidCursor(
                "cursor is not a valid position".to_string(),
            )),
            Position::At(value) => Ok(Some(value)),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Position::Malformed)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Position<U> {
        match self {
            Position::Absent => Position::Absent,
            Position::Malformed => Position::Malformed,
            Position::At(value) => Position::At(f(value)),
        }
    }

    /// Like [`Position::map`], demoting to `Malformed` when `f` rejects the value.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Option<U>) -> Position<U> {
        match self {
            Position::Absent => Position::Absent,
            Position::Malformed => Position::Malformed,
            Position::At(value) => f(value).map_or(Position::Malformed, Position::At),
        }
    }
}

/// Cursor encoding/decoding
///
/// A cursor is the base64 form of `"<namespace>:<payload>"`. The payload is
/// either an absolute offset (offset connections) or the textual id value of
/// a row (keyset connections). Cursors depend on nothing but the namespace and
/// the payload, so they stay valid across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorCodec {
    namespace: &'static str,
}

impl Default for CursorCodec {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl CursorCodec {
    pub const fn new(namespace: &'static str) -> Self {
        Self { namespace }
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Encode an absolute offset
    pub fn encode_offset(&self, offset: u64) -> String {
        self.encode_key(&offset.to_string())
    }

    /// Encode a sort-key / id value
    pub fn encode_key(&self, value: &str) -> String {
        BASE64.encode(format!("{}:{}", self.namespace, value).as_bytes())
    }

    /// Decode a cursor into its raw payload
    pub fn decode(&self, cursor: Option<&str>) -> Position<String> {
        let cursor = match cursor {
            Some(c) if !c.is_empty() => c,
            _ => return Position::Absent,
        };

        let Ok(bytes) = BASE64.decode(cursor.as_bytes()) else {
            return Position::Malformed;
        };
        let Ok(text) = String::from_utf8(bytes) else {
            return Position::Malformed;
        };

        match text.split_once(':') {
            Some((namespace, payload)) if namespace == self.namespace => {
                Position::At(payload.to_string())
            }
            _ => Position::Malformed,
        }
    }

    /// Decode an offset cursor; the payload must be a non-negative integer
    pub fn decode_offset(&self, cursor: Option<&str>) -> Position<u64> {
        self.decode(cursor).and_then(|payload| payload.parse::<u64>().ok())
    }
}
