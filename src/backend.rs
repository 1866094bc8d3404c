//! Seams standing in for the remote side of shortening: wall-clock time and
//! the network round trip.

use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;

pub const DEFAULT_ROUND_TRIP_DELAY: Duration = Duration::from_millis(1000);

#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// The suspension point of a shortening call; a real network client goes here.
#[async_trait]
pub trait RoundTrip: Send + Sync {
    async fn round_trip(&self);
}

/// Sleeps for a fixed duration, modelling network latency.
#[derive(Clone, Copy, Debug)]
pub struct SimulatedDelay {
    delay: Duration,
}

impl SimulatedDelay {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedDelay {
    fn default() -> Self {
        Self::new(DEFAULT_ROUND_TRIP_DELAY)
    }
}

#[async_trait]
impl RoundTrip for SimulatedDelay {
    async fn round_trip(&self) {
        debug!(delay_ms = self.delay.as_millis(), "Simulating backend round trip");
        tokio::time::sleep(self.delay).await;
    }
}
