//! Drives the listing index: numbered "next page" chains or incremental
//! "load more" growth, with a stagnation guard against pages that never
//! stop loading.

use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::PageLimit;
use crate::error::ScrapeError;
use crate::pace::Pacer;
use crate::record::ListingRef;
use crate::retry::{with_retry, RetryPolicy};
use crate::traits::{Page, Session, SiteStrategy};

/// How a site's listing index grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    /// Follow an explicit "next page" control until absent.
    Index,
    /// Trigger a "load more" action and poll the same page for DOM growth.
    Incremental {
        /// CSS selector of the load-more control.
        load_more: &'static str,
        /// Delay between growth polls.
        poll_interval: Duration,
        /// Consecutive polls without new refs before giving up.
        stagnation_polls: u32,
    },
}

/// Why pagination stopped. Each termination path is distinct so run
/// summaries can tell a short index from a stuck one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No further page or load-more control was advertised.
    Exhausted,
    /// The configured page cap was hit.
    PageCapReached,
    /// Repeated polls produced no new listings.
    Stagnated,
    /// An index page kept failing after retries; earlier pages were kept.
    PageFailed,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Exhausted => "exhausted",
            StopReason::PageCapReached => "page cap reached",
            StopReason::Stagnated => "stagnated",
            StopReason::PageFailed => "page failed",
        }
    }
}

/// Result of walking the listing index: refs in discovery order, each
/// unique, plus how the walk ended.
#[derive(Debug)]
pub struct Crawl {
    pub refs: Vec<ListingRef>,
    pub pages_visited: u32,
    pub stop: StopReason,
}

/// Walks a site's listing index and collects listing references.
pub struct Paginator<'a> {
    pub retry: &'a RetryPolicy,
    pub limit: PageLimit,
    pub per_page_timeout: Duration,
    pub pacer: &'a Pacer,
    pub cancel: &'a CancellationToken,
}

impl Paginator<'_> {
    pub async fn collect<Sess, Strat>(
        &self,
        session: &Sess,
        strategy: &Strat,
    ) -> Result<Crawl, ScrapeError>
    where
        Sess: Session,
        Strat: SiteStrategy,
    {
        match strategy.pagination() {
            PaginationMode::Index => self.collect_index(session, strategy).await,
            PaginationMode::Incremental {
                load_more,
                poll_interval,
                stagnation_polls,
            } => {
                self.collect_incremental(session, strategy, load_more, poll_interval, stagnation_polls)
                    .await
            }
        }
    }

    /// Fetch one index page and discover its refs. A page that renders but
    /// yields zero refs is treated as transient: listing indexes are
    /// expected to be non-empty, and these marketplaces intermittently
    /// serve half-rendered pages.
    async fn fetch_page<Sess, Strat>(
        &self,
        session: &Sess,
        strategy: &Strat,
        url: &str,
    ) -> Result<(String, Vec<ListingRef>), ScrapeError>
    where
        Sess: Session,
        Strat: SiteStrategy,
    {
        with_retry(self.retry, self.cancel, || async move {
            self.pacer.wait().await;
            let page = session.navigate(url, self.per_page_timeout, None).await?;
            let html = page.html().await?;
            let refs = strategy.listing_refs(&html)?;
            if refs.is_empty() {
                return Err(ScrapeError::EmptyPage { url: url.to_string() });
            }
            Ok((html, refs))
        })
        .await
    }

    async fn collect_index<Sess, Strat>(
        &self,
        session: &Sess,
        strategy: &Strat,
    ) -> Result<Crawl, ScrapeError>
    where
        Sess: Session,
        Strat: SiteStrategy,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut refs: Vec<ListingRef> = Vec::new();
        let mut url = strategy.start_url();
        let mut pages_visited = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }

            let (html, page_refs) = match self.fetch_page(session, strategy, &url).await {
                Ok(fetched) => fetched,
                Err(ScrapeError::Cancelled) => return Err(ScrapeError::Cancelled),
                Err(e) if pages_visited == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(page = pages_visited + 1, %url, error = %e, "index page failed, keeping earlier pages");
                    return Ok(Crawl {
                        refs,
                        pages_visited,
                        stop: StopReason::PageFailed,
                    });
                }
            };

            pages_visited += 1;
            let fresh = push_fresh(&mut seen, &mut refs, page_refs);
            tracing::info!(page = pages_visited, fresh, total = refs.len(), "index page collected");

            if self.limit.reached(pages_visited) {
                return Ok(Crawl {
                    refs,
                    pages_visited,
                    stop: StopReason::PageCapReached,
                });
            }

            match strategy.next_page_url(&html, pages_visited) {
                Some(next) => url = next,
                None => {
                    return Ok(Crawl {
                        refs,
                        pages_visited,
                        stop: StopReason::Exhausted,
                    });
                }
            }
        }
    }

    async fn collect_incremental<Sess, Strat>(
        &self,
        session: &Sess,
        strategy: &Strat,
        load_more: &str,
        poll_interval: Duration,
        stagnation_polls: u32,
    ) -> Result<Crawl, ScrapeError>
    where
        Sess: Session,
        Strat: SiteStrategy,
    {
        let start_url = strategy.start_url();
        let start_url = start_url.as_str();
        self.pacer.wait().await;
        let page = with_retry(self.retry, self.cancel, || async move {
            session
                .navigate(start_url, self.per_page_timeout, None)
                .await
        })
        .await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut refs: Vec<ListingRef> = Vec::new();
        let mut stagnant = 0u32;
        let mut polls = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }

            let html = page.html().await?;
            let batch = strategy.listing_refs(&html)?;
            polls += 1;

            let fresh = push_fresh(&mut seen, &mut refs, batch);
            if fresh == 0 {
                stagnant += 1;
                tracing::debug!(stagnant, "poll yielded no new listings");
                if stagnant >= stagnation_polls.max(1) {
                    return Ok(Crawl {
                        refs,
                        pages_visited: polls,
                        stop: StopReason::Stagnated,
                    });
                }
            } else {
                stagnant = 0;
                tracing::info!(fresh, total = refs.len(), "incremental load grew");
            }

            if self.limit.reached(polls) {
                return Ok(Crawl {
                    refs,
                    pages_visited: polls,
                    stop: StopReason::PageCapReached,
                });
            }

            // A missing load-more control means the index is complete.
            if page.click(load_more).await.is_err() {
                return Ok(Crawl {
                    refs,
                    pages_visited: polls,
                    stop: StopReason::Exhausted,
                });
            }

            tokio::select! {
                () = tokio::time::sleep(poll_interval) => {}
                () = self.cancel.cancelled() => return Err(ScrapeError::Cancelled),
            }
        }
    }
}

/// Append refs not seen before, preserving discovery order. Returns how
/// many were new.
fn push_fresh(
    seen: &mut HashSet<String>,
    refs: &mut Vec<ListingRef>,
    batch: Vec<ListingRef>,
) -> usize {
    let mut fresh = 0;
    for r in batch {
        if seen.insert(r.url.clone()) {
            refs.push(r);
            fresh += 1;
        }
    }
    fresh
}
