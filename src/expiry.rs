use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

/// Display status of a link. Expired links are kept, never deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LinkStatus {
    Active,
    Expired,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "Active",
            Self::Expired => "Expired",
        })
    }
}

/// A link without an expiry never expires.
#[must_use]
pub fn is_expired(expires_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    expires_at.is_some_and(|expires_at| expires_at < now)
}

#[must_use]
pub fn status(expires_at: Option<OffsetDateTime>, now: OffsetDateTime) -> LinkStatus {
    if is_expired(expires_at, now) {
        LinkStatus::Expired
    } else {
        LinkStatus::Active
    }
}
