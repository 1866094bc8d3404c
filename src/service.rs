use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use rearch::CapsuleHandle;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    backend::{Clock, RoundTrip, SimulatedDelay, SystemClock},
    config::{base_url_capsule, event_sink_capsule, link_registry_capsule, service_options_capsule},
    events::{EventSink, LinkEvent},
    expiry::{self, LinkStatus},
    link::{BaseUrl, LinkRecord},
    registry::LinkRegistry,
    shortcode::{ShortcodeError, ShortcodeGenerator},
    validator::{self, ShortenRequest, ValidationError},
};

/// How many inputs a caller should submit in one batch.
pub const MAX_BATCH_INPUTS: usize = 5;

pub fn shortening_service_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn ShorteningService> {
    let registry = Arc::clone(get.as_ref(link_registry_capsule));
    let events = Arc::clone(get.as_ref(event_sink_capsule));
    let base_url = get.as_ref(base_url_capsule).clone();
    let options = *get.as_ref(service_options_capsule);
    Arc::new(
        LinkShortener::new(registry, events, base_url)
            .with_round_trip(Arc::new(SimulatedDelay::new(options.round_trip_delay)))
            .with_recheck_on_commit(options.recheck_on_commit),
    )
}

#[async_trait]
pub trait ShorteningService: Send + Sync {
    async fn shorten(&self, request: ShortenRequest) -> Result<LinkRecord, ShortenError>;

    /// Shortens every request concurrently; results keep the input order.
    async fn shorten_batch(
        &self,
        requests: Vec<ShortenRequest>,
    ) -> Vec<Result<LinkRecord, ShortenError>>;

    async fn statistics(&self) -> Vec<LinkStats>;

    /// Returns the original URL exactly as it was submitted.
    async fn redirect(&self, shortcode: &str) -> Result<String, RedirectError>;

    /// Returns the shortened URL text for the clipboard.
    async fn copy_link(&self, shortcode: &str) -> Result<String, RedirectError>;
}

#[derive(Debug, Error)]
pub enum ShortenError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Shortcode(#[from] ShortcodeError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedirectError {
    #[error("shortened URL {shortcode} not found")]
    NotFound { shortcode: String },
}

/// One row of the statistics view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkStats {
    pub record: LinkRecord,
    pub status: LinkStatus,
}

pub struct LinkShortener {
    registry: Arc<LinkRegistry>,
    events: Arc<dyn EventSink>,
    base_url: BaseUrl,
    generator: ShortcodeGenerator,
    round_trip: Arc<dyn RoundTrip>,
    clock: Arc<dyn Clock>,
    recheck_on_commit: bool,
}

impl LinkShortener {
    #[must_use]
    pub fn new(registry: Arc<LinkRegistry>, events: Arc<dyn EventSink>, base_url: BaseUrl) -> Self {
        Self {
            registry,
            events,
            base_url,
            generator: ShortcodeGenerator::default(),
            round_trip: Arc::new(SimulatedDelay::default()),
            clock: Arc::new(SystemClock),
            recheck_on_commit: false,
        }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: ShortcodeGenerator) -> Self {
        self.generator = generator;
        self
    }

    #[must_use]
    pub fn with_round_trip(mut self, round_trip: Arc<dyn RoundTrip>) -> Self {
        self.round_trip = round_trip;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// When set, a shortcode taken by a concurrent request during the round
    /// trip fails the later request with a collision instead of being stored twice.
    #[must_use]
    pub const fn with_recheck_on_commit(mut self, recheck_on_commit: bool) -> Self {
        self.recheck_on_commit = recheck_on_commit;
        self
    }

    async fn try_shorten(&self, request: &ShortenRequest) -> Result<LinkRecord, ShortenError> {
        self.events.emit(&LinkEvent::ValidatingInput);
        let validated = match validator::validate(request) {
            Ok(validated) => validated,
            Err(err) => {
                self.events.emit(&LinkEvent::ValidationFailed {
                    field: err.field(),
                    error: err.to_string(),
                });
                return Err(err.into());
            }
        };
        self.events.emit(&LinkEvent::InputValidationSuccess);

        // NOTE: uniqueness is decided against this snapshot, taken before the round trip
        let existing_codes = self.registry.snapshot_codes().await;
        let shortcode = self.generator.resolve(
            validated.preferred_shortcode.as_ref(),
            &existing_codes,
            self.events.as_ref(),
        )?;

        self.events.emit(&LinkEvent::UrlShorteningStarted {
            original_url: validated.original_url.clone(),
        });
        self.events.emit(&LinkEvent::SimulatingShortenApiCall {
            original_url: validated.original_url.clone(),
        });
        self.round_trip.round_trip().await;

        let record = LinkRecord::new(
            &self.base_url,
            validated.original_url.clone(),
            shortcode,
            self.clock.now(),
            validated.validity_or_default(),
        );
        self.events.emit(&LinkEvent::ShortenApiSuccess {
            shortened_url: record.shortened_url().to_owned(),
            expires_at: record.expires_at(),
        });

        if self.recheck_on_commit {
            self.registry.append_unique(record.clone()).await?;
        } else {
            self.registry.append(record.clone()).await;
        }
        Ok(record)
    }

    async fn lookup(&self, shortcode: &str) -> Result<LinkRecord, RedirectError> {
        self.registry
            .find(shortcode)
            .await
            .ok_or_else(|| RedirectError::NotFound {
                shortcode: shortcode.to_owned(),
            })
    }
}

#[async_trait]
impl ShorteningService for LinkShortener {
    #[instrument(skip(self))]
    async fn shorten(&self, request: ShortenRequest) -> Result<LinkRecord, ShortenError> {
        match self.try_shorten(&request).await {
            Ok(record) => {
                info!(shortcode = %record.shortcode(), "Shortened URL");
                self.events.emit(&LinkEvent::UrlShorteningCompleted {
                    shortcode: record.shortcode().clone(),
                });
                Ok(record)
            }
            Err(err) => {
                warn!(%err, "Failed to shorten URL");
                self.events.emit(&LinkEvent::UrlShorteningFailed {
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    #[instrument(skip_all, fields(count = requests.len()))]
    async fn shorten_batch(
        &self,
        requests: Vec<ShortenRequest>,
    ) -> Vec<Result<LinkRecord, ShortenError>> {
        self.events.emit(&LinkEvent::ShortenAllInitiated {
            count: requests.len(),
        });
        let results = join_all(requests.into_iter().map(|request| self.shorten(request))).await;

        let succeeded = results.iter().filter(|result| result.is_ok()).count();
        self.events.emit(&LinkEvent::ShortenAllFinished {
            succeeded,
            failed: results.len() - succeeded,
        });
        results
    }

    #[instrument(skip(self))]
    async fn statistics(&self) -> Vec<LinkStats> {
        self.events
            .emit(&LinkEvent::NavigationView { view: "statistics" });
        let now = self.clock.now();
        self.registry
            .all()
            .await
            .into_iter()
            .map(|record| LinkStats {
                status: expiry::status(record.expires_at(), now),
                record,
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn redirect(&self, shortcode: &str) -> Result<String, RedirectError> {
        self.events.emit(&LinkEvent::RedirectAttempt {
            shortcode: shortcode.to_owned(),
        });
        match self.lookup(shortcode).await {
            Ok(record) => {
                let original_url = record.original_url().to_owned();
                self.events.emit(&LinkEvent::RedirectSuccess {
                    original_url: original_url.clone(),
                });
                Ok(original_url)
            }
            Err(err) => {
                self.events.emit(&LinkEvent::RedirectNotFound {
                    shortcode: shortcode.to_owned(),
                });
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    async fn copy_link(&self, shortcode: &str) -> Result<String, RedirectError> {
        let shortened_url = self.lookup(shortcode).await?.shortened_url().to_owned();
        self.events.emit(&LinkEvent::UrlCopied {
            url: shortened_url.clone(),
        });
        Ok(shortened_url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::clone_on_ref_ptr)]
mod tests {
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration as StdDuration,
    };

    use time::{Duration, OffsetDateTime, macros::datetime};
    use tokio::time::Instant;

    use crate::{
        backend::MockClock,
        events::RecordingEventSink,
        shortcode::{MockCandidateSource, Shortcode},
        store::MemoryStore,
    };

    use super::*;

    const NOW: OffsetDateTime = datetime!(2025-05-01 09:00 UTC);

    struct Harness {
        service: LinkShortener,
        registry: Arc<LinkRegistry>,
        events: Arc<RecordingEventSink>,
    }

    async fn harness() -> Harness {
        let events = Arc::new(RecordingEventSink::default());
        let registry =
            Arc::new(LinkRegistry::load(Arc::new(MemoryStore::default()), events.clone()).await);
        let mut clock = MockClock::new();
        clock.expect_now().return_const(NOW);
        let service = LinkShortener::new(
            registry.clone(),
            events.clone(),
            BaseUrl::new("http://localhost:3000").unwrap(),
        )
        .with_clock(Arc::new(clock));
        Harness {
            service,
            registry,
            events,
        }
    }

    fn code(s: &str) -> Shortcode {
        Shortcode::new(s.to_owned()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorten_defaults() {
        let Harness {
            service, registry, ..
        } = harness().await;

        let start = Instant::now();
        let record = service
            .shorten(ShortenRequest::new("https://example.com/a/b"))
            .await
            .unwrap();

        assert!(start.elapsed() >= StdDuration::from_millis(1000));
        assert_eq!(record.created_at(), NOW);
        assert_eq!(record.expires_at(), Some(NOW + Duration::minutes(30)));
        assert_eq!(record.shortcode().as_str().len(), 6);
        assert!(
            record
                .shortcode()
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        );
        assert_eq!(
            record.shortened_url(),
            format!("http://localhost:3000/{}", record.shortcode())
        );
        assert_eq!(registry.all().await, [record]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorten_custom_validity_and_shortcode() {
        let Harness { service, .. } = harness().await;
        let record = service
            .shorten(
                ShortenRequest::new("https://example.com")
                    .with_validity("90")
                    .with_shortcode("mylink"),
            )
            .await
            .unwrap();
        assert_eq!(record.shortcode(), &code("mylink"));
        assert_eq!(record.expires_at(), Some(NOW + Duration::minutes(90)));
        assert_eq!(record.shortened_url(), "http://localhost:3000/mylink");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorten_event_sequence() {
        let Harness {
            service, events, ..
        } = harness().await;
        service
            .shorten(ShortenRequest::new("https://example.com").with_shortcode("abc"))
            .await
            .unwrap();
        assert_eq!(
            events.names(),
            [
                "UrlsLoaded",
                "ValidatingInput",
                "InputValidationSuccess",
                "UrlShorteningStarted",
                "SimulatingShortenApiCall",
                "ShortenApiSuccess",
                "ShortenedUrlAdded",
                "UrlsSaved",
                "UrlShorteningCompleted",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorten_preferred_collision() {
        let Harness {
            service,
            registry,
            events,
        } = harness().await;
        let request = ShortenRequest::new("https://example.com").with_shortcode("abc");

        service.shorten(request.clone()).await.unwrap();
        let err = service.shorten(request).await.unwrap_err();

        assert!(matches!(
            err,
            ShortenError::Shortcode(ShortcodeError::Collision(taken)) if taken == code("abc")
        ));
        assert_eq!(registry.len().await, 1);
        assert_eq!(
            events.names().last().copied(),
            Some("UrlShorteningFailed")
        );
    }

    #[tokio::test]
    async fn test_validation_failure_skips_round_trip() {
        let Harness {
            service,
            registry,
            events,
        } = harness().await;
        let start = Instant::now();

        let err = service
            .shorten(ShortenRequest::new("not-a-url"))
            .await
            .unwrap_err();

        // NOTE: real time here; any round trip would take a full second
        assert!(start.elapsed() < StdDuration::from_millis(500));
        assert!(matches!(
            err,
            ShortenError::Validation(ValidationError::InvalidUrlFormat { .. })
        ));
        assert!(registry.is_empty().await);
        assert!(events.events().contains(&LinkEvent::ValidationFailed {
            field: "originalUrl",
            error: err.to_string(),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_exhausted_surfaces() {
        let Harness {
            service, registry, ..
        } = harness().await;
        service
            .shorten(ShortenRequest::new("https://example.com").with_shortcode("stuck1"))
            .await
            .unwrap();

        let mut candidates = MockCandidateSource::new();
        candidates.expect_candidate().returning(|| code("stuck1"));
        let service = service.with_generator(ShortcodeGenerator::new(Box::new(candidates), 3));

        let err = service
            .shorten(ShortenRequest::new("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShortenError::Shortcode(ShortcodeError::GenerationExhausted { attempts: 3 })
        ));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_same_preferred_code_without_recheck() {
        let Harness {
            service, registry, ..
        } = harness().await;
        let request = ShortenRequest::new("https://example.com").with_shortcode("dupe");

        let (first, second) = tokio::join!(
            service.shorten(request.clone()),
            service.shorten(request)
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_same_preferred_code_with_recheck() {
        let Harness {
            service, registry, ..
        } = harness().await;
        let service = service.with_recheck_on_commit(true);
        let request = ShortenRequest::new("https://example.com").with_shortcode("dupe");

        let (first, second) = tokio::join!(
            service.shorten(request.clone()),
            service.shorten(request)
        );

        // NOTE: either request may commit first
        let (committed, rejected) = if first.is_ok() {
            (first, second)
        } else {
            (second, first)
        };
        assert!(committed.is_ok());
        assert!(matches!(
            rejected,
            Err(ShortenError::Shortcode(ShortcodeError::Collision(_)))
        ));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorten_batch_keeps_order_and_isolates_failures() {
        let Harness {
            service,
            registry,
            events,
        } = harness().await;
        let draws = AtomicUsize::new(0);
        let mut candidates = MockCandidateSource::new();
        candidates
            .expect_candidate()
            .returning(move || code(&format!("gen{:03}", draws.fetch_add(1, Ordering::SeqCst))));
        let service = service.with_generator(ShortcodeGenerator::new(Box::new(candidates), 8));

        let start = Instant::now();
        let results = service
            .shorten_batch(vec![
                ShortenRequest::new("https://one.example"),
                ShortenRequest::new(""),
                ShortenRequest::new("https://three.example").with_shortcode("three"),
                ShortenRequest::new("https://four.example").with_validity("0"),
                ShortenRequest::new("https://five.example"),
            ])
            .await;

        // NOTE: all round trips overlap
        assert!(start.elapsed() < StdDuration::from_millis(2000));
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].as_ref().unwrap().original_url(), "https://one.example");
        assert!(matches!(
            results[1],
            Err(ShortenError::Validation(ValidationError::EmptyUrl))
        ));
        assert_eq!(results[2].as_ref().unwrap().shortcode(), &code("three"));
        assert!(matches!(
            results[3],
            Err(ShortenError::Validation(ValidationError::InvalidValidity { .. }))
        ));
        assert_eq!(results[4].as_ref().unwrap().original_url(), "https://five.example");

        let codes: HashSet<_> = registry
            .all()
            .await
            .iter()
            .map(|record| record.shortcode().clone())
            .collect();
        assert_eq!(codes.len(), 3);
        assert_eq!(events.names().first().copied(), Some("UrlsLoaded"));
        assert!(events.events().contains(&LinkEvent::ShortenAllFinished {
            succeeded: 3,
            failed: 2
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_statistics_status() {
        let events = Arc::new(RecordingEventSink::default());
        let registry =
            Arc::new(LinkRegistry::load(Arc::new(MemoryStore::default()), events.clone()).await);
        let base_url = BaseUrl::new("http://localhost:3000").unwrap();

        registry
            .append(LinkRecord::new(
                &base_url,
                "https://old.example".to_owned(),
                code("old"),
                NOW - Duration::minutes(90),
                std::num::NonZeroU32::new(30).unwrap(),
            ))
            .await;
        registry
            .append(LinkRecord::new(
                &base_url,
                "https://new.example".to_owned(),
                code("new"),
                NOW,
                std::num::NonZeroU32::new(30).unwrap(),
            ))
            .await;

        let mut clock = MockClock::new();
        clock.expect_now().return_const(NOW);
        let service =
            LinkShortener::new(registry, events.clone(), base_url).with_clock(Arc::new(clock));

        let stats = service.statistics().await;
        assert_eq!(
            stats
                .iter()
                .map(|row| (row.record.shortcode().as_str(), row.status))
                .collect::<Vec<_>>(),
            [("old", LinkStatus::Expired), ("new", LinkStatus::Active)]
        );
        assert!(events.events().contains(&LinkEvent::NavigationView { view: "statistics" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_and_copy() {
        let Harness {
            service, events, ..
        } = harness().await;
        service
            .shorten(ShortenRequest::new("https://example.com/target").with_shortcode("go"))
            .await
            .unwrap_err();
        service
            .shorten(ShortenRequest::new("https://example.com/target").with_shortcode("goto"))
            .await
            .unwrap();

        assert_eq!(
            service.redirect("goto").await.unwrap(),
            "https://example.com/target"
        );
        assert_eq!(
            service.copy_link("goto").await.unwrap(),
            "http://localhost:3000/goto"
        );
        assert_eq!(
            service.redirect("missing").await,
            Err(RedirectError::NotFound {
                shortcode: "missing".to_owned()
            })
        );
        assert!(service.copy_link("missing").await.is_err());

        let names = events.names();
        assert!(names.ends_with(&[
            "RedirectAttempt",
            "RedirectSuccess",
            "UrlCopied",
            "RedirectAttempt",
            "RedirectNotFound",
        ]));
    }
}
