use std::num::NonZeroU32;

use thiserror::Error;
use url::Url;

use crate::shortcode::{Shortcode, ShortcodeValidationError};

/// Validity applied when a request leaves it blank.
pub const DEFAULT_VALIDITY_MINUTES: NonZeroU32 = match NonZeroU32::new(30) {
    Some(minutes) => minutes,
    None => unreachable!(),
};

/// Roughly a century; keeps `created_at + validity` representable.
pub const MAX_VALIDITY_MINUTES: u32 = 52_560_000;

/// Raw shortening input, as typed by a user.
///
/// Blank optional fields mean "not provided".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShortenRequest {
    pub original_url: String,
    pub validity_minutes: Option<String>,
    pub preferred_shortcode: Option<String>,
}

impl ShortenRequest {
    #[must_use]
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_validity(mut self, validity_minutes: impl Into<String>) -> Self {
        self.validity_minutes = Some(validity_minutes.into());
        self
    }

    #[must_use]
    pub fn with_shortcode(mut self, preferred_shortcode: impl Into<String>) -> Self {
        self.preferred_shortcode = Some(preferred_shortcode.into());
        self
    }
}

/// A [`ShortenRequest`] that passed every rule in [`validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Trimmed as typed; parsing only checks it.
    pub original_url: String,
    pub validity_minutes: Option<NonZeroU32>,
    pub preferred_shortcode: Option<Shortcode>,
}

impl ValidatedRequest {
    #[must_use]
    pub fn validity_or_default(&self) -> NonZeroU32 {
        self.validity_minutes.unwrap_or(DEFAULT_VALIDITY_MINUTES)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("URL cannot be empty")]
    EmptyUrl,
    #[error("invalid URL format {url:?}, please include http:// or https://")]
    InvalidUrlFormat { url: String },
    #[error("validity must be a positive integer in minutes, got {validity:?}")]
    InvalidValidity { validity: String },
    #[error("shortcode must be 3-15 alphanumeric characters: {0}")]
    InvalidShortcode(#[from] ShortcodeValidationError),
}

impl ValidationError {
    /// Name of the request field that failed.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyUrl | Self::InvalidUrlFormat { .. } => "originalUrl",
            Self::InvalidValidity { .. } => "validityMinutes",
            Self::InvalidShortcode(_) => "preferredShortcode",
        }
    }
}

/// Checks `request` field by field; the first failing rule wins.
///
/// # Errors
/// Returns the [`ValidationError`] of the first rule that fails.
pub fn validate(request: &ShortenRequest) -> Result<ValidatedRequest, ValidationError> {
    let original_url = request.original_url.trim();
    if original_url.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }
    if !Url::parse(original_url).is_ok_and(|url| url.has_host()) {
        return Err(ValidationError::InvalidUrlFormat {
            url: original_url.to_owned(),
        });
    }

    let validity_minutes = non_blank(request.validity_minutes.as_deref())
        .map(parse_validity)
        .transpose()?;

    let preferred_shortcode = non_blank(request.preferred_shortcode.as_deref())
        .map(|code| Shortcode::new(code.to_owned()))
        .transpose()?;

    Ok(ValidatedRequest {
        original_url: original_url.to_owned(),
        validity_minutes,
        preferred_shortcode,
    })
}

fn non_blank(field: Option<&str>) -> Option<&str> {
    field.map(str::trim).filter(|value| !value.is_empty())
}

/// Accepts any decimal spelling of a whole number of minutes, so `60`,
/// `60.00` and `6e1` are the same validity.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_validity(validity: &str) -> Result<NonZeroU32, ValidationError> {
    validity
        .parse::<f64>()
        .ok()
        .filter(|minutes| {
            minutes.is_finite()
                && minutes.fract() == 0.0
                && (1.0..=f64::from(MAX_VALIDITY_MINUTES)).contains(minutes)
        })
        // in range and integral, so the cast is exact
        .and_then(|minutes| NonZeroU32::new(minutes as u32))
        .ok_or_else(|| ValidationError::InvalidValidity {
            validity: validity.to_owned(),
        })
}
