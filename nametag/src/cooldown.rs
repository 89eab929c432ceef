//! Minimum spacing between outbound RPC calls.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Shared rate limiter enforcing a minimum interval between calls.
///
/// Share one instance (behind an `Arc`) between every resolver that talks to
/// the same endpoint. [`Cooldown::wait`] holds the lock while sleeping, so
/// concurrent callers are released one interval apart.
#[derive(Debug)]
pub struct Cooldown {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Cooldown {
    /// Limiter with the given minimum interval. A zero interval never waits.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    /// The configured interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the interval has elapsed since the previous call, then mark
    /// now as the latest call.
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            if ready_at > Instant::now() {
                debug!(wait_ms = (ready_at - Instant::now()).as_millis(), "cooling down");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// When the last call was let through, if ever.
    pub async fn last_call(&self) -> Option<Instant> {
        *self.last_call.lock().await
    }
}
