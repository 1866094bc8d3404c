use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::shortcode::Shortcode;

/// A named lifecycle notification with a structured payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum LinkEvent {
    AppMounted,
    UrlsLoaded {
        count: usize,
    },
    LoadError {
        error: String,
    },
    UrlsSaved {
        count: usize,
    },
    SaveError {
        error: String,
    },
    ValidationFailed {
        field: &'static str,
        error: String,
    },
    ValidatingInput,
    InputValidationSuccess,
    ShortcodeGenerationAttempt {
        shortcode: Shortcode,
        unique: bool,
    },
    ShortcodeCollision {
        preferred_shortcode: Shortcode,
    },
    UrlShorteningStarted {
        original_url: String,
    },
    SimulatingShortenApiCall {
        original_url: String,
    },
    ShortenApiSuccess {
        shortened_url: String,
        #[serde(with = "time::serde::rfc3339::option")]
        expires_at: Option<OffsetDateTime>,
    },
    ShortenedUrlAdded {
        shortcode: Shortcode,
    },
    UrlShorteningCompleted {
        shortcode: Shortcode,
    },
    UrlShorteningFailed {
        error: String,
    },
    ShortenAllInitiated {
        count: usize,
    },
    ShortenAllFinished {
        succeeded: usize,
        failed: usize,
    },
    MaxUrlInputsReached {
        max: usize,
    },
    NavigationView {
        view: &'static str,
    },
    UrlCopied {
        url: String,
    },
    RedirectAttempt {
        shortcode: String,
    },
    RedirectSuccess {
        original_url: String,
    },
    RedirectNotFound {
        shortcode: String,
    },
}

impl LinkEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AppMounted => "AppMounted",
            Self::UrlsLoaded { .. } => "UrlsLoaded",
            Self::LoadError { .. } => "LoadError",
            Self::UrlsSaved { .. } => "UrlsSaved",
            Self::SaveError { .. } => "SaveError",
            Self::ValidationFailed { .. } => "ValidationFailed",
            Self::ValidatingInput => "ValidatingInput",
            Self::InputValidationSuccess => "InputValidationSuccess",
            Self::ShortcodeGenerationAttempt { .. } => "ShortcodeGenerationAttempt",
            Self::ShortcodeCollision { .. } => "ShortcodeCollision",
            Self::UrlShorteningStarted { .. } => "UrlShorteningStarted",
            Self::SimulatingShortenApiCall { .. } => "SimulatingShortenApiCall",
            Self::ShortenApiSuccess { .. } => "ShortenApiSuccess",
            Self::ShortenedUrlAdded { .. } => "ShortenedUrlAdded",
            Self::UrlShorteningCompleted { .. } => "UrlShorteningCompleted",
            Self::UrlShorteningFailed { .. } => "UrlShorteningFailed",
            Self::ShortenAllInitiated { .. } => "ShortenAllInitiated",
            Self::ShortenAllFinished { .. } => "ShortenAllFinished",
            Self::MaxUrlInputsReached { .. } => "MaxUrlInputsReached",
            Self::NavigationView { .. } => "NavigationView",
            Self::UrlCopied { .. } => "UrlCopied",
            Self::RedirectAttempt { .. } => "RedirectAttempt",
            Self::RedirectSuccess { .. } => "RedirectSuccess",
            Self::RedirectNotFound { .. } => "RedirectNotFound",
        }
    }
}

/// Receives every [`LinkEvent`] the core emits.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LinkEvent);
}

/// Writes events as structured `tracing` records.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &LinkEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => info!(event = event.name(), %payload, "Link event"),
            Err(err) => error!(event = event.name(), ?err, "Failed to serialize link event"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _: &LinkEvent) {}
}

/// Keeps every emitted event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<LinkEvent>>,
}

impl RecordingEventSink {
    #[must_use]
    pub fn events(&self) -> Vec<LinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(LinkEvent::name)
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &LinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
