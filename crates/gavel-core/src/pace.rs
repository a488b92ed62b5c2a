//! Request pacing between consecutive navigations.
//!
//! One run drives one site with one browser session, so pacing is a single
//! slot rather than a per-domain table: before each navigation the pacer
//! sleeps out the remainder of `delay + jitter` since the previous one.
//! The delay is read-only for the lifetime of a run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Pacing configuration.
#[derive(Debug, Clone)]
pub struct PaceConfig {
    /// Minimum delay between consecutive navigations.
    pub delay: Duration,

    /// Maximum random jitter added on top of `delay` (uniform [0, jitter]).
    /// Randomises request timing. Set to `Duration::ZERO` to disable.
    pub jitter: Duration,
}

impl PaceConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let jitter_ms = rand_jitter_ms(self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(jitter_ms)
    }
}

impl Default for PaceConfig {
    /// 1 second delay, 500ms jitter.
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            jitter: Duration::from_millis(500),
        }
    }
}

/// Enforces the configured delay between consecutive navigations.
#[derive(Clone)]
pub struct Pacer {
    config: PaceConfig,
    last: Arc<Mutex<Option<Instant>>>,
}

impl Pacer {
    pub fn new(config: PaceConfig) -> Self {
        Self {
            config,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Sleep until the configured delay since the previous call has
    /// elapsed, then record now as the last navigation time. The first
    /// call never sleeps.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;

        if let Some(prev) = *last {
            let required = self.config.effective_delay();
            let elapsed = prev.elapsed();
            if elapsed < required {
                let sleep_duration = required - elapsed;
                tracing::debug!(sleep_ms = %sleep_duration.as_millis(), "pacing request");
                tokio::time::sleep(sleep_duration).await;
            }
        }

        *last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Jitter without the `rand` crate: xorshift seeded from the current time.
// ---------------------------------------------------------------------------

fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    // Seeded from the high-resolution clock. Not crypto.
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_delay_without_jitter() {
        let config = PaceConfig::new(Duration::from_secs(1));
        assert_eq!(config.effective_delay(), Duration::from_secs(1));
    }

    #[test]
    fn effective_delay_with_jitter_is_bounded() {
        let config =
            PaceConfig::new(Duration::from_millis(100)).with_jitter(Duration::from_millis(50));
        for _ in 0..100 {
            let d = config.effective_delay();
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(150));
        }
    }

    #[tokio::test]
    async fn first_wait_does_not_sleep() {
        let pacer = Pacer::new(PaceConfig::new(Duration::from_millis(200)));
        let start = Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn second_wait_enforces_delay() {
        let pacer = Pacer::new(PaceConfig::new(Duration::from_millis(100)));
        let start = Instant::now();
        pacer.wait().await;
        pacer.wait().await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(100),
            "second wait should have slept at least 100ms, elapsed: {elapsed:?}"
        );
    }

    #[test]
    fn default_config_is_sensible() {
        let config = PaceConfig::default();
        assert_eq!(config.delay, Duration::from_secs(1));
        assert_eq!(config.jitter, Duration::from_millis(500));
    }
}
