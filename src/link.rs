use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::shortcode::Shortcode;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Origin that every shortened URL is built on, stored without a trailing slash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseUrl(String);

impl Default for BaseUrl {
    fn default() -> Self {
        Self(DEFAULT_BASE_URL.to_owned())
    }
}

#[derive(Debug, Error)]
pub enum BaseUrlError {
    #[error("invalid base URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("base URL {0} must have a host and no query or fragment")]
    Unsupported(Url),
}

impl BaseUrl {
    /// # Errors
    /// Returns [`Err`] if `base` is not an absolute URL with a host,
    /// or carries a query or fragment.
    pub fn new(base: &str) -> Result<Self, BaseUrlError> {
        let url = Url::parse(base)?;
        if !url.has_host() || url.query().is_some() || url.fragment().is_some() {
            return Err(BaseUrlError::Unsupported(url));
        }
        Ok(Self(url.as_str().trim_end_matches('/').to_owned()))
    }

    #[must_use]
    pub fn shortened_url(&self, shortcode: &Shortcode) -> String {
        format!("{}/{shortcode}", self.0)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A shortened link. Never mutated once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredLink", into = "StoredLink")]
pub struct LinkRecord {
    original_url: String,
    shortcode: Shortcode,
    shortened_url: String,
    created_at: OffsetDateTime,
    expires_at: Option<OffsetDateTime>,
}

impl LinkRecord {
    /// Builds a record expiring `validity_minutes` after `created_at`.
    ///
    /// An expiry past the representable time range is stored as "never".
    #[must_use]
    pub fn new(
        base: &BaseUrl,
        original_url: String,
        shortcode: Shortcode,
        created_at: OffsetDateTime,
        validity_minutes: NonZeroU32,
    ) -> Self {
        let expires_at =
            created_at.checked_add(Duration::minutes(i64::from(validity_minutes.get())));
        Self {
            shortened_url: base.shortened_url(&shortcode),
            original_url,
            shortcode,
            created_at,
            expires_at,
        }
    }

    #[must_use]
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    #[must_use]
    pub const fn shortcode(&self) -> &Shortcode {
        &self.shortcode
    }

    #[must_use]
    pub fn shortened_url(&self) -> &str {
        &self.shortened_url
    }

    #[must_use]
    pub const fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    #[must_use]
    pub const fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }
}

/// Persisted shape of a [`LinkRecord`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLink {
    original_url: String,
    shortened_url: String,
    shortcode: Shortcode,
    #[serde(default, with = "time::serde::rfc3339::option")]
    expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

#[derive(Debug, Error)]
#[error("stored shortened URL {shortened_url} does not end with shortcode {shortcode}")]
pub struct DivergentShortenedUrl {
    shortened_url: String,
    shortcode: Shortcode,
}

impl TryFrom<StoredLink> for LinkRecord {
    type Error = DivergentShortenedUrl;

    fn try_from(
        StoredLink {
            original_url,
            shortened_url,
            shortcode,
            expires_at,
            created_at,
        }: StoredLink,
    ) -> Result<Self, Self::Error> {
        let matches_shortcode = shortened_url
            .rsplit_once('/')
            .is_some_and(|(_, tail)| tail == shortcode.as_str());
        if !matches_shortcode {
            return Err(DivergentShortenedUrl {
                shortened_url,
                shortcode,
            });
        }

        Ok(Self {
            original_url,
            shortcode,
            shortened_url,
            created_at,
            expires_at,
        })
    }
}

impl From<LinkRecord> for StoredLink {
    fn from(
        LinkRecord {
            original_url,
            shortcode,
            shortened_url,
            created_at,
            expires_at,
        }: LinkRecord,
    ) -> Self {
        Self {
            original_url,
            shortened_url,
            shortcode,
            expires_at,
            created_at,
        }
    }
}
