use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    expiry::LinkStatus,
    link::LinkRecord,
    service::LinkStats,
    validator::ShortenRequest,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortenPayload {
    pub original_url: String,
    #[serde(default)]
    pub validity_minutes: Option<FormValue>,
    #[serde(default)]
    pub preferred_shortcode: Option<String>,
}

/// A form field that may arrive as a JSON string or number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Text(String),
    Number(serde_json::Number),
}

impl From<FormValue> for String {
    fn from(value: FormValue) -> Self {
        match value {
            FormValue::Text(text) => text,
            FormValue::Number(number) => number.to_string(),
        }
    }
}

impl From<ShortenPayload> for ShortenRequest {
    fn from(
        ShortenPayload {
            original_url,
            validity_minutes,
            preferred_shortcode,
        }: ShortenPayload,
    ) -> Self {
        Self {
            original_url,
            validity_minutes: validity_minutes.map(String::from),
            preferred_shortcode,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortenedUrl {
    pub shortened_url: String,
    /// Timestamp in RFC 3339 format
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub shortcode: String,
}

impl From<&LinkRecord> for ShortenedUrl {
    fn from(record: &LinkRecord) -> Self {
        Self {
            shortened_url: record.shortened_url().to_owned(),
            expires_at: record.expires_at(),
            shortcode: record.shortcode().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRow {
    pub original_url: String,
    pub shortened_url: String,
    pub shortcode: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub status: LinkStatus,
}

impl From<&LinkStats> for StatsRow {
    fn from(LinkStats { record, status }: &LinkStats) -> Self {
        Self {
            original_url: record.original_url().to_owned(),
            shortened_url: record.shortened_url().to_owned(),
            shortcode: record.shortcode().to_string(),
            expires_at: record.expires_at(),
            status: *status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Error {
    pub error: String,
}
