//! Vendor origin resolution.
//!
//! Maps a `(service, raw path)` pair to the upstream URL and to the cache
//! key the asset lives under in every tier.

use std::fmt;
use std::str::FromStr;

use crate::error::ProxyError;

/// Prefix of every proxied object in the durable store.
pub const PROXY_KEY_PREFIX: &str = "proxy";

/// Prefix of fast-tier keys.
pub const FAST_KEY_PREFIX: &str = "img:";

/// Size token Kinopoisk oversize requests collapse onto.
pub const KINOPOISK_FALLBACK_SIZE: &str = "600x900";

/// Size tokens Kinopoisk serves identically to [`KINOPOISK_FALLBACK_SIZE`].
const KINOPOISK_OVERSIZE_TOKENS: &[&str] = &["x1000", "orig"];

const TMDB_UPSTREAM: &str = "https://www.themoviedb.org/t/p/";
const KINOPOISK_IMAGES_BASE: &str = "https://avatars.mds.yandex.net/get-kinopoisk-image/";
const KINOPOISK_OTT_BASE: &str = "https://avatars.mds.yandex.net/get-ott/";
const KINOPOISK_ST_BASE: &str = "https://st.kp.yandex.net/images/";

// =============================================================================
// Vendor Service
// =============================================================================

/// A third-party artwork vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VendorService {
    TmdbImages,
    KinopoiskImages,
    KinopoiskOttImages,
    KinopoiskStImages,
}

impl VendorService {
    pub const ALL: [VendorService; 4] = [
        VendorService::TmdbImages,
        VendorService::KinopoiskImages,
        VendorService::KinopoiskOttImages,
        VendorService::KinopoiskStImages,
    ];

    /// The token used in request paths and cache keys.
    pub const fn as_str(&self) -> &'static str {
        match self {
            VendorService::TmdbImages => "tmdb-images",
            VendorService::KinopoiskImages => "kinopoisk-images",
            VendorService::KinopoiskOttImages => "kinopoisk-ott-images",
            VendorService::KinopoiskStImages => "kinopoisk-st-images",
        }
    }

    pub const fn is_kinopoisk(&self) -> bool {
        !matches!(self, VendorService::TmdbImages)
    }

    /// Base URL the normalized path is appended to.
    ///
    /// TMDB is reached through a configurable forwarding proxy that takes
    /// the real URL in its `url` query parameter.
    pub fn base_url(&self, tmdb_proxy: &str) -> String {
        match self {
            VendorService::TmdbImages => format!("{}?url={}", tmdb_proxy, TMDB_UPSTREAM),
            VendorService::KinopoiskImages => KINOPOISK_IMAGES_BASE.to_string(),
            VendorService::KinopoiskOttImages => KINOPOISK_OTT_BASE.to_string(),
            VendorService::KinopoiskStImages => KINOPOISK_ST_BASE.to_string(),
        }
    }

    /// Canonical form of a request path for this vendor.
    ///
    /// Leading slashes are dropped. Kinopoisk paths ending in an oversize
    /// token are rewritten to the fixed fallback size; TMDB paths are
    /// otherwise kept as is.
    pub fn normalize_path(&self, raw_path: &str) -> String {
        let path = raw_path.trim_start_matches('/');

        if self.is_kinopoisk() {
            for token in KINOPOISK_OVERSIZE_TOKENS {
                if let Some(stem) = path.strip_suffix(token) {
                    return format!("{}{}", stem, KINOPOISK_FALLBACK_SIZE);
                }
            }
        }

        path.to_string()
    }

    /// Upstream URL for an already normalized path.
    pub fn upstream_url(&self, tmdb_proxy: &str, normalized_path: &str) -> String {
        format!("{}{}", self.base_url(tmdb_proxy), normalized_path)
    }
}

impl fmt::Display for VendorService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VendorService {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VendorService::ALL
            .into_iter()
            .find(|service| service.as_str() == s)
            .ok_or_else(|| ProxyError::UnknownService(s.to_string()))
    }
}

// =============================================================================
// Cache Key
// =============================================================================

/// Where a proxied asset lives: `proxy/{service}/{normalized path}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    service: VendorService,
    path: String,
    key: String,
}

impl CacheKey {
    /// Derive the key for a raw request path.
    pub fn new(service: VendorService, raw_path: &str) -> Self {
        let path = service.normalize_path(raw_path);
        let key = format!("{}/{}/{}", PROXY_KEY_PREFIX, service.as_str(), path);
        Self { service, path, key }
    }

    pub fn service(&self) -> VendorService {
        self.service
    }

    /// The normalized request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Durable store key.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Fast-tier key.
    pub fn fast_key(&self) -> String {
        format!("{}{}", FAST_KEY_PREFIX, self.key)
    }

    /// Upstream URL the key is filled from.
    pub fn upstream_url(&self, tmdb_proxy: &str) -> String {
        self.service.upstream_url(tmdb_proxy, &self.path)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
