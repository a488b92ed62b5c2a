//! Test utilities: mock implementations of the session traits and a
//! scriptable site strategy.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` for interior mutability, allowing tests to assert on
//! recorded calls.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::ScrapeError;
use crate::paginate::PaginationMode;
use crate::record::{ListingRef, Payload, PayloadMatcher, RawRecord, Source};
use crate::traits::{Page, PageView, Session, SessionDriver, SiteStrategy};

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

/// Page that serves scripted HTML. A sequence is consumed front-to-back
/// and the final entry repeats, which models a page that stops changing.
#[derive(Clone)]
pub struct MockPage {
    htmls: Arc<Mutex<Vec<String>>>,
    payloads: Arc<Mutex<Vec<Payload>>>,
    clicks: Arc<AtomicU32>,
    clicks_before_error: Option<u32>,
}

impl MockPage {
    pub fn with_html(html: &str) -> Self {
        Self::with_html_sequence(vec![html.to_string()])
    }

    pub fn with_html_sequence(htmls: Vec<String>) -> Self {
        Self {
            htmls: Arc::new(Mutex::new(htmls)),
            payloads: Arc::new(Mutex::new(Vec::new())),
            clicks: Arc::new(AtomicU32::new(0)),
            clicks_before_error: None,
        }
    }

    pub fn with_payloads(mut self, payloads: Vec<Payload>) -> Self {
        self.payloads = Arc::new(Mutex::new(payloads));
        self
    }

    /// Allow `n` successful clicks, then fail. Models a load-more control
    /// that disappears once the index is complete.
    pub fn with_click_error_after(mut self, n: u32) -> Self {
        self.clicks_before_error = Some(n);
        self
    }

    pub fn click_count(&self) -> u32 {
        self.clicks.load(Ordering::SeqCst)
    }
}

impl Page for MockPage {
    async fn html(&self) -> Result<String, ScrapeError> {
        let mut htmls = self.htmls.lock().unwrap();
        if htmls.len() > 1 {
            Ok(htmls.remove(0))
        } else {
            Ok(htmls
                .first()
                .cloned()
                .unwrap_or_else(|| "<html><body></body></html>".to_string()))
        }
    }

    async fn click(&self, _selector: &str) -> Result<(), ScrapeError> {
        let done = self.clicks.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.clicks_before_error {
            if done >= limit {
                return Err(ScrapeError::Navigation {
                    url: "mock://page".into(),
                    message: "element not found".into(),
                });
            }
        }
        Ok(())
    }

    async fn payloads(&self, _window: Duration) -> Vec<Payload> {
        self.payloads.lock().unwrap().drain(..).collect()
    }
}

// ---------------------------------------------------------------------------
// MockSession
// ---------------------------------------------------------------------------

/// Session that pops a scripted navigation result per `navigate` call and
/// records every visited URL. An exhausted script serves blank pages.
#[derive(Clone)]
pub struct MockSession {
    pages: Arc<Mutex<Vec<Result<MockPage, ScrapeError>>>>,
    visited: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicU32>,
}

impl MockSession {
    pub fn with_pages(pages: Vec<Result<MockPage, ScrapeError>>) -> Self {
        Self {
            pages: Arc::new(Mutex::new(pages)),
            visited: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn navigations(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Session for MockSession {
    type Page = MockPage;

    async fn navigate(
        &self,
        url: &str,
        _timeout: Duration,
        _capture: Option<&PayloadMatcher>,
    ) -> Result<MockPage, ScrapeError> {
        self.visited.lock().unwrap().push(url.to_string());
        let mut pages = self.pages.lock().unwrap();
        if pages.is_empty() {
            Ok(MockPage::with_html("<html><body></body></html>"))
        } else {
            pages.remove(0)
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockDriver
// ---------------------------------------------------------------------------

/// Driver handing out one prepared session, or failing to launch.
#[derive(Clone)]
pub struct MockDriver {
    session: Arc<Mutex<Option<MockSession>>>,
    start_error: Arc<Mutex<Option<ScrapeError>>>,
}

impl MockDriver {
    pub fn with_session(session: MockSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(Some(session))),
            start_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_start_error(error: ScrapeError) -> Self {
        Self {
            session: Arc::new(Mutex::new(None)),
            start_error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl SessionDriver for MockDriver {
    type Session = MockSession;

    async fn open(&self, _config: &SessionConfig) -> Result<MockSession, ScrapeError> {
        if let Some(e) = self.start_error.lock().unwrap().take() {
            return Err(e);
        }
        self.session
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ScrapeError::SessionStart("mock session already taken".into()))
    }
}

// ---------------------------------------------------------------------------
// StubStrategy
// ---------------------------------------------------------------------------

/// Strategy whose index "pages" are plain-text scripts: each line is
/// either `ref:<url>` (a listing) or `next:<url>` (the next index page).
/// Extraction pops from a queue of prepared results.
pub struct StubStrategy {
    mode: PaginationMode,
    extractions: Arc<Mutex<Vec<Result<RawRecord, ScrapeError>>>>,
    capture: Option<PayloadMatcher>,
}

impl StubStrategy {
    pub fn index() -> Self {
        Self {
            mode: PaginationMode::Index,
            extractions: Arc::new(Mutex::new(Vec::new())),
            capture: None,
        }
    }

    pub fn incremental(stagnation_polls: u32) -> Self {
        Self {
            mode: PaginationMode::Incremental {
                load_more: "button.load-more",
                poll_interval: Duration::from_millis(1),
                stagnation_polls,
            },
            extractions: Arc::new(Mutex::new(Vec::new())),
            capture: None,
        }
    }

    pub fn with_extractions(self, extractions: Vec<Result<RawRecord, ScrapeError>>) -> Self {
        *self.extractions.lock().unwrap() = extractions;
        self
    }

    pub fn with_capture(mut self, matcher: PayloadMatcher) -> Self {
        self.capture = Some(matcher);
        self
    }
}

impl SiteStrategy for StubStrategy {
    fn source(&self) -> Source {
        Source::Crexi
    }

    fn start_url(&self) -> String {
        "https://stub.example/start".to_string()
    }

    fn pagination(&self) -> PaginationMode {
        self.mode
    }

    fn payload_matcher(&self) -> Option<PayloadMatcher> {
        self.capture.clone()
    }

    fn listing_refs(&self, index_html: &str) -> Result<Vec<ListingRef>, ScrapeError> {
        Ok(index_html
            .lines()
            .filter_map(|line| line.strip_prefix("ref:"))
            .map(ListingRef::new)
            .collect())
    }

    fn next_page_url(&self, index_html: &str, _page_no: u32) -> Option<String> {
        index_html
            .lines()
            .find_map(|line| line.strip_prefix("next:"))
            .map(str::to_string)
    }

    fn extract(&self, reference: &ListingRef, _view: &PageView) -> Result<RawRecord, ScrapeError> {
        let mut queue = self.extractions.lock().unwrap();
        if queue.is_empty() {
            Ok(RawRecord::new(Source::Crexi, reference.url.clone()))
        } else {
            queue.remove(0)
        }
    }
}
