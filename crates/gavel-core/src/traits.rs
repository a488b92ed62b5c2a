use std::future::Future;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::ScrapeError;
use crate::paginate::PaginationMode;
use crate::record::{ListingRef, Payload, PayloadMatcher, RawRecord, Source};

/// One rendered page inside a browser session.
pub trait Page: Send + Sync {
    /// The fully rendered DOM, serialized to HTML.
    fn html(&self) -> impl Future<Output = Result<String, ScrapeError>> + Send;

    /// Click the first element matching a CSS selector.
    fn click(&self, selector: &str) -> impl Future<Output = Result<(), ScrapeError>> + Send;

    /// Drain network payloads captured for this page, waiting at most
    /// `window` for in-flight responses. Empty when capture was not
    /// requested at navigation time or nothing matched; callers fall back
    /// to DOM extraction in that case.
    fn payloads(&self, window: Duration) -> impl Future<Output = Vec<Payload>> + Send;
}

/// One browser context. Created at run start, torn down on every exit path.
pub trait Session: Send + Sync {
    type Page: Page;

    /// Navigate to `url` within `timeout`. Timeouts and hard navigation
    /// failures are distinct errors so the retry policy can tell them
    /// apart. When `capture` is set, the network interceptor is attached
    /// before navigation begins.
    fn navigate(
        &self,
        url: &str,
        timeout: Duration,
        capture: Option<&PayloadMatcher>,
    ) -> impl Future<Output = Result<Self::Page, ScrapeError>> + Send;

    /// Tear down the browser context. Idempotent and safe to call after a
    /// prior failure.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Launches browser sessions.
pub trait SessionDriver: Send + Sync {
    type Session: Session;

    fn open(
        &self,
        config: &SessionConfig,
    ) -> impl Future<Output = Result<Self::Session, ScrapeError>> + Send;
}

/// Everything a strategy gets to look at for one listing: the rendered
/// DOM and whatever network payloads were captured for the page.
#[derive(Debug, Clone)]
pub struct PageView {
    pub html: String,
    pub payloads: Vec<Payload>,
}

impl PageView {
    pub fn dom_only(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            payloads: Vec::new(),
        }
    }
}

/// Site-specific extraction strategy. One implementation per marketplace,
/// selected by the `source` tag at run configuration time.
///
/// Strategies are pure: `extract` is a function of its inputs and never
/// mutates shared state.
pub trait SiteStrategy: Send + Sync {
    fn source(&self) -> Source;

    /// First index page of the listing set.
    fn start_url(&self) -> String;

    /// How the listing index grows: numbered pages or a load-more control.
    fn pagination(&self) -> PaginationMode;

    /// Network capture this strategy wants during detail navigation.
    /// `None` means DOM-only extraction.
    fn payload_matcher(&self) -> Option<PayloadMatcher> {
        None
    }

    /// Discover listing references on an index page.
    fn listing_refs(&self, index_html: &str) -> Result<Vec<ListingRef>, ScrapeError>;

    /// URL of the page after `page_no`, if the index advertises one.
    /// Only consulted in index-pagination mode.
    fn next_page_url(&self, index_html: &str, page_no: u32) -> Option<String>;

    /// Map one listing page (or its intercepted payloads) to a raw record.
    fn extract(&self, reference: &ListingRef, view: &PageView) -> Result<RawRecord, ScrapeError>;
}
