//! Connection arguments and their normalization into `take`/`skip`

use std::env;
use std::str::FromStr;

use async_graphql::InputObject;
use serde::Deserialize;
use thiserror::Error;

use crate::cursor::CursorCodec;
use crate::{ConnectionError, Result};

/// Pagination arguments accepted by list fields
///
/// Follows the Relay Cursor Connections Specification:
/// https://relay.dev/graphql/connections.htm
///
/// `after` and `before` may be combined only by a builder running in merge
/// mode; `include_before` and `include_after` are mutually exclusive.
#[derive(InputObject, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionArguments {
    /// Cursor to start from (forward pagination)
    pub after: Option<String>,

    /// Cursor to end at (backward pagination)
    pub before: Option<String>,

    /// Number of items to return (forward pagination)
    pub first: Option<i32>,

    /// Number of items to return (backward pagination)
    pub last: Option<i32>,

    /// Include the `before` cursor's own row in the result
    #[graphql(default)]
    pub include_before: bool,

    /// Include the `after` cursor's own row in the result
    #[graphql(default)]
    pub include_after: bool,
}

impl ConnectionArguments {
    pub fn first(n: i32) -> Self {
        Self {
            first: Some(n),
            ..Self::default()
        }
    }

    pub fn last(n: i32) -> Self {
        Self {
            last: Some(n),
            ..Self::default()
        }
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    pub fn before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }

    pub fn include_before(mut self) -> Self {
        self.include_before = true;
        self
    }

    pub fn include_after(mut self) -> Self {
        self.include_after = true;
        self
    }

    /// Validate argument combinations; runs before any query is issued
    pub fn validate(&self) -> Result<()> {
        if self.include_before && self.include_after {
            return Err(ConnectionError::InvalidArguments(
                "'includeBefore' and 'includeAfter' cannot be used together".to_string(),
            ));
        }

        if let Some(first) = self.first {
            if first < 0 {
                return Err(ConnectionError::InvalidArguments(
                    "'first' must be non-negative".to_string(),
                ));
            }
        }

        if let Some(last) = self.last {
            if last < 0 {
                return Err(ConnectionError::InvalidArguments(
                    "'last' must be non-negative".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Page-size limits applied by [`ConnectionArgsResolver`]
///
/// Deserializable so services can embed it in their own configuration; every
/// field falls back to its default when missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// A missing `first` means "no limit" instead of `default_take`
    pub allow_take_all: bool,
    pub default_take: u64,
    pub max_take: u64,
    pub max_skip: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            allow_take_all: false,
            default_take: 20,
            max_take: 100,
            max_skip: 10_000,
        }
    }
}

#[derive(Error, Debug)]
#[error("Invalid value for {var}: {value:?}")]
pub struct ConfigError {
    pub var: String,
    pub value: String,
}

impl ResolverConfig {
    /// Read overrides from `<PREFIX>_ALLOW_TAKE_ALL`, `<PREFIX>_DEFAULT_TAKE`,
    /// `<PREFIX>_MAX_TAKE` and `<PREFIX>_MAX_SKIP`.
    pub fn from_env(prefix: &str) -> std::result::Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            allow_take_all: env_or(prefix, "ALLOW_TAKE_ALL", defaults.allow_take_all)?,
            default_take: env_or(prefix, "DEFAULT_TAKE", defaults.default_take)?,
            max_take: env_or(prefix, "MAX_TAKE", defaults.max_take)?,
            max_skip: env_or(prefix, "MAX_SKIP", defaults.max_skip)?,
        })
    }
}

fn env_or<T: FromStr>(prefix: &str, name: &str, default: T) -> std::result::Result<T, ConfigError> {
    let var = format!("{}_{}", prefix, name);
    match env::var(&var) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError { var, value }),
        Err(_) => Ok(default),
    }
}

/// Number of rows to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Take {
    Limited(u64),
    /// No limit; only reachable with `allow_take_all`
    All,
}

impl Take {
    pub fn limit(self) -> Option<u64> {
        match self {
            Take::Limited(n) => Some(n),
            Take::All => None,
        }
    }
}

/// Bounded `take`/`skip` pair for offset-paginated queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TakeSkip {
    pub take: Take,
    pub skip: u64,
}

/// Normalizes raw connection arguments into validated, bounded page parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionArgsResolver {
    config: ResolverConfig,
    codec: CursorCodec,
}

impl ConnectionArgsResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            codec: CursorCodec::default(),
        }
    }

    pub fn with_codec(mut self, codec: CursorCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve `first`/`after` into `take`/`skip`
    pub fn resolve(&self, args: &ConnectionArguments) -> Result<TakeSkip> {
        args.validate()?;

        let take = self.resolve_take(args.first);
        let skip = match self.codec.decode_offset(args.after.as_deref()).into_option()? {
            Some(offset) => offset.saturating_add(1).min(self.config.max_skip),
            None => 0,
        };

        Ok(TakeSkip { take, skip })
    }

    /// Clamp a requested page size; negative sizes count as zero.
    pub fn resolve_take(&self, requested: Option<i32>) -> Take {
        match requested {
            Some(n) => Take::Limited((n.max(0) as u64).min(self.config.max_take)),
            None if self.config.allow_take_all => Take::All,
            None => Take::Limited(self.config.default_take.min(self.config.max_take)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn resolver() -> ConnectionArgsResolver {
        ConnectionArgsResolver::new(ResolverConfig {
            allow_take_all: false,
            default_take: 10,
            max_take: 50,
            max_skip: 100,
        })
    }

    #[test]
    fn test_take_defaults_and_clamps() {
        let r = resolver();
        assert_eq!(r.resolve_take(None), Take::Limited(10));
        assert_eq!(r.resolve_take(Some(0)), Take::Limited(0));
        assert_eq!(r.resolve_take(Some(30)), Take::Limited(30));
        assert_eq!(r.resolve_take(Some(500)), Take::Limited(50));
    }

    #[test]
    fn test_take_all_only_when_allowed() {
        let r = ConnectionArgsResolver::new(ResolverConfig {
            allow_take_all: true,
            ..ResolverConfig::default()
        });
        assert_eq!(r.resolve_take(None), Take::All);
        assert_eq!(r.resolve_take(Some(500)), Take::Limited(100));
    }

    #[test]
    fn test_skip_follows_after_cursor() {
        let r = resolver();
        let codec = CursorCodec::default();

        let page = assert_ok!(r.resolve(&ConnectionArguments::first(5)));
        assert_eq!(page, TakeSkip { take: Take::Limited(5), skip: 0 });

        let args = ConnectionArguments::first(5).after(codec.encode_offset(4));
        let page = assert_ok!(r.resolve(&args));
        assert_eq!(page.skip, 5);

        let args = ConnectionArguments::first(5).after(codec.encode_offset(5_000));
        let page = assert_ok!(r.resolve(&args));
        assert_eq!(page.skip, 100);
    }

    #[test]
    fn test_malformed_after_is_rejected() {
        let args = ConnectionArguments::first(5).after("bm90IGEgY3Vyc29y");
        let err = assert_err!(resolver().resolve(&args));
        assert!(matches!(err, ConnectionError::InvalidCursor(_)));
    }

    #[test]
    fn test_validate_include_flags_are_exclusive() {
        let codec = CursorCodec::default();
        let args = ConnectionArguments::first(3)
            .after(codec.encode_offset(1))
            .include_before()
            .include_after();
        assert!(matches!(
            args.validate(),
            Err(ConnectionError::InvalidArguments(_))
        ));
        assert_err!(resolver().resolve(&args));
        assert_ok!(ConnectionArguments::first(3).include_after().validate());
    }

    #[test]
    fn test_validate_negative_sizes() {
        assert_err!(ConnectionArguments::first(-1).validate());
        assert_err!(ConnectionArguments::last(-1).validate());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ResolverConfig = serde_json::from_str(r#"{ "max_take": 25 }"#).unwrap();
        assert_eq!(config.max_take, 25);
        assert_eq!(config.default_take, 20);
        assert!(!config.allow_take_all);
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("RC_TEST_CFG_DEFAULT_TAKE", "7");
        std::env::set_var("RC_TEST_CFG_ALLOW_TAKE_ALL", "true");
        let config = ResolverConfig::from_env("RC_TEST_CFG").unwrap();
        assert_eq!(config.default_take, 7);
        assert!(config.allow_take_all);
        assert_eq!(config.max_take, 100);

        std::env::set_var("RC_TEST_BAD_MAX_SKIP", "lots");
        let err = ResolverConfig::from_env("RC_TEST_BAD").unwrap_err();
        assert_eq!(err.var, "RC_TEST_BAD_MAX_SKIP");
    }
}
