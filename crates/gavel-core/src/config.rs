use std::path::PathBuf;
use std::time::Duration;

use crate::pace::PaceConfig;
use crate::record::Source;
use crate::retry::RetryPolicy;

/// Browser viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// What the session driver needs to launch one browser context.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    /// Override for the browser's User-Agent header. `None` keeps the
    /// engine default.
    pub user_agent: Option<String>,
    pub viewport: Viewport,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            viewport: Viewport::default(),
        }
    }
}

/// Cap on index pages visited in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLimit {
    Unbounded,
    Max(u32),
}

impl PageLimit {
    /// True once `pages_visited` pages have been consumed.
    pub fn reached(&self, pages_visited: u32) -> bool {
        match self {
            PageLimit::Unbounded => false,
            PageLimit::Max(cap) => pages_visited >= *cap,
        }
    }
}

/// Immutable configuration for one scrape run, built once at startup and
/// passed into the orchestrator. There is no global scraper state.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: Source,
    pub session: SessionConfig,
    /// Pacing between consecutive navigations.
    pub pace: PaceConfig,
    pub max_pages: PageLimit,
    pub retry: RetryPolicy,
    /// Timeout for a single navigation attempt, distinct from any
    /// whole-run deadline.
    pub per_attempt_timeout: Duration,
    /// How long to wait for intercepted network payloads before falling
    /// back to DOM extraction.
    pub payload_window: Duration,
    /// Directory the CSV artifact is written into.
    pub out_dir: PathBuf,
}

impl RunConfig {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            session: SessionConfig::default(),
            pace: PaceConfig::default(),
            max_pages: PageLimit::Unbounded,
            retry: RetryPolicy::default(),
            per_attempt_timeout: Duration::from_secs(30),
            payload_window: Duration::from_secs(10),
            out_dir: PathBuf::from("."),
        }
    }

    pub fn with_max_pages(mut self, limit: PageLimit) -> Self {
        self.max_pages = limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limit_semantics() {
        assert!(!PageLimit::Unbounded.reached(10_000));
        assert!(!PageLimit::Max(3).reached(2));
        assert!(PageLimit::Max(3).reached(3));
    }

    #[test]
    fn run_config_defaults() {
        let config = RunConfig::new(Source::Crexi);
        assert!(config.session.headless);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.max_pages, PageLimit::Unbounded);
    }
}
