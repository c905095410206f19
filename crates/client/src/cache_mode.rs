//! Per-request cache directive.
//!
//! The directive travels as the `Cache-Mode` request header. Values are
//! trimmed and compared case-insensitively; an absent or unknown value
//! behaves as `network-only`.

use std::fmt;
use std::str::FromStr;

/// Header carrying the directive. Never sent on the wire.
pub const CACHE_MODE_HEADER: &str = "cache-mode";

/// Ordering between cache lookup and network dispatch for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheMode {
    /// Always dispatch to the network; never read the cache.
    #[default]
    NetworkOnly,
    /// Serve a fresh cache entry if there is one, otherwise go to the network.
    CacheElseNetwork,
    /// Go to the network; if that fails, serve a fresh cache entry instead.
    NetworkElseCache,
    /// Explicit alias of `NetworkOnly`.
    LoadDefault,
}

impl CacheMode {
    pub const ALL: [CacheMode; 4] =
        [CacheMode::LoadDefault, CacheMode::CacheElseNetwork, CacheMode::NetworkElseCache, CacheMode::NetworkOnly];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheMode::NetworkOnly => "network-only",
            CacheMode::CacheElseNetwork => "cache-else-network",
            CacheMode::NetworkElseCache => "network-else-cache",
            CacheMode::LoadDefault => "load-default",
        }
    }

    /// Resolve the directive from a raw header value.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::parse::<CacheMode>) {
            Some(Ok(mode)) => mode,
            Some(Err(err)) => {
                tracing::debug!("{err}; treating as network-only");
                CacheMode::NetworkOnly
            }
            None => CacheMode::NetworkOnly,
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `Cache-Mode` value that names none of the known modes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cache mode: {0:?}")]
pub struct UnknownCacheMode(pub String);

impl FromStr for CacheMode {
    type Err = UnknownCacheMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        CacheMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownCacheMode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_values() {
        assert_eq!("load-default".parse::<CacheMode>(), Ok(CacheMode::LoadDefault));
        assert_eq!("cache-else-network".parse::<CacheMode>(), Ok(CacheMode::CacheElseNetwork));
        assert_eq!("network-else-cache".parse::<CacheMode>(), Ok(CacheMode::NetworkElseCache));
        assert_eq!("network-only".parse::<CacheMode>(), Ok(CacheMode::NetworkOnly));
    }

    #[test]
    fn test_parse_is_case_insensitive_and_trimmed() {
        assert_eq!(" Cache-Else-NETWORK ".parse::<CacheMode>(), Ok(CacheMode::CacheElseNetwork));
    }

    #[test]
    fn test_from_header_defaults() {
        assert_eq!(CacheMode::from_header(None), CacheMode::NetworkOnly);
        assert_eq!(CacheMode::from_header(Some("")), CacheMode::NetworkOnly);
        assert_eq!(CacheMode::from_header(Some("cache-first")), CacheMode::NetworkOnly);
        assert_eq!(CacheMode::from_header(Some("NETWORK-ELSE-CACHE")), CacheMode::NetworkElseCache);
    }

    #[test]
    fn test_display_round_trips() {
        for mode in CacheMode::ALL {
            assert_eq!(mode.to_string().parse::<CacheMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_unknown_mode_error() {
        let err = "sometimes".parse::<CacheMode>().unwrap_err();
        assert_eq!(err, UnknownCacheMode("sometimes".into()));
        assert!(err.to_string().contains("sometimes"));
    }
}
