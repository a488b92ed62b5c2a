//! Run orchestration: one session, one site, one artifact.
//!
//! The orchestrator owns the full control flow. Session teardown is
//! guaranteed on every exit path, and an export is always attempted, so a
//! cancelled or partially failed run still delivers the records it got.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::clean;
use crate::config::RunConfig;
use crate::error::ScrapeError;
use crate::export::export;
use crate::pace::Pacer;
use crate::paginate::{Paginator, StopReason};
use crate::record::Record;
use crate::report::{RunOutcome, SkipReason, Tally};
use crate::retry::with_retry;
use crate::traits::{Page, PageView, Session, SessionDriver, SiteStrategy};

pub struct Orchestrator<D, S> {
    driver: D,
    strategy: S,
    config: RunConfig,
}

/// Accumulated state of the listing loop, separate from the outcome so the
/// export step runs regardless of how the loop ended.
struct DriveState {
    records: Vec<Record>,
    tally: Tally,
    stop: StopReason,
    structure_changes: Vec<String>,
    cancelled: bool,
}

impl<D, S> Orchestrator<D, S>
where
    D: SessionDriver,
    S: SiteStrategy,
{
    pub fn new(driver: D, strategy: S, config: RunConfig) -> Self {
        Self {
            driver,
            strategy,
            config,
        }
    }

    /// Execute the run to completion or cancellation.
    ///
    /// Fatal errors are only [`ScrapeError::SessionStart`] and
    /// [`ScrapeError::ExportIo`]; everything else degrades to
    /// skip-and-continue and shows up in the tally.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunOutcome, ScrapeError> {
        tracing::info!(source = %self.config.source, "starting run");

        let session = self.driver.open(&self.config.session).await?;
        let state = self.drive(&session, &cancel).await;
        session.close().await;

        let artifact = export(
            &state.records,
            &self.config.out_dir,
            self.config.source,
            Utc::now(),
        )?;

        for change in &state.structure_changes {
            tracing::warn!(%change, "SITE STRUCTURE CHANGED: selector tables need review");
        }
        tracing::info!(
            tally = %state.tally,
            stop = state.stop.as_str(),
            cancelled = state.cancelled,
            "run finished"
        );

        Ok(RunOutcome {
            records: state.records,
            tally: state.tally,
            stop: state.stop,
            structure_changes: state.structure_changes,
            cancelled: state.cancelled,
            artifact,
        })
    }

    async fn drive(&self, session: &D::Session, cancel: &CancellationToken) -> DriveState {
        let mut state = DriveState {
            records: Vec::new(),
            tally: Tally::new(),
            stop: StopReason::Exhausted,
            structure_changes: Vec::new(),
            cancelled: false,
        };

        let pacer = Pacer::new(self.config.pace.clone());
        let paginator = Paginator {
            retry: &self.config.retry,
            limit: self.config.max_pages,
            per_page_timeout: self.config.per_attempt_timeout,
            pacer: &pacer,
            cancel,
        };

        let crawl = match paginator.collect(session, &self.strategy).await {
            Ok(crawl) => crawl,
            Err(ScrapeError::Cancelled) => {
                state.cancelled = true;
                return state;
            }
            Err(e @ ScrapeError::StructureChanged { .. }) => {
                state.structure_changes.push(e.to_string());
                state.stop = StopReason::PageFailed;
                return state;
            }
            Err(e) => {
                tracing::warn!(error = %e, "listing index unavailable");
                state.stop = StopReason::PageFailed;
                return state;
            }
        };

        state.stop = crawl.stop;
        tracing::info!(
            listings = crawl.refs.len(),
            pages = crawl.pages_visited,
            stop = crawl.stop.as_str(),
            "pagination complete"
        );

        let matcher = self.strategy.payload_matcher();
        let matcher = matcher.as_ref();
        let pacer = &pacer;

        for reference in &crawl.refs {
            if cancel.is_cancelled() {
                state.cancelled = true;
                break;
            }
            state.tally.attempted += 1;

            let result = with_retry(&self.config.retry, cancel, || async move {
                pacer.wait().await;
                let page = session
                    .navigate(&reference.url, self.config.per_attempt_timeout, matcher)
                    .await?;
                let payloads = if matcher.is_some() {
                    page.payloads(self.config.payload_window).await
                } else {
                    Vec::new()
                };
                let html = page.html().await?;
                self.strategy.extract(reference, &PageView { html, payloads })
            })
            .await;

            match result {
                Ok(raw) => {
                    state.records.push(clean::normalize(raw));
                    state.tally.success();
                }
                Err(ScrapeError::Cancelled) => {
                    // Cut mid-flight; the listing was not truly attempted.
                    state.tally.attempted -= 1;
                    state.cancelled = true;
                    break;
                }
                Err(e @ ScrapeError::MissingField { .. }) => {
                    tracing::warn!(url = %reference.url, error = %e, "listing skipped");
                    state.tally.skip(SkipReason::MissingField);
                }
                Err(e @ ScrapeError::MalformedField { .. }) => {
                    tracing::warn!(url = %reference.url, error = %e, "listing skipped");
                    state.tally.skip(SkipReason::MalformedField);
                }
                Err(e @ ScrapeError::StructureChanged { .. }) => {
                    tracing::warn!(url = %reference.url, error = %e, "listing skipped");
                    state
                        .structure_changes
                        .push(format!("{}: {e}", reference.url));
                    state.tally.skip(SkipReason::StructureChanged);
                }
                Err(e @ ScrapeError::RetryExhausted { .. }) => {
                    tracing::warn!(url = %reference.url, error = %e, "listing lost");
                    state.tally.fail(SkipReason::RetryExhausted);
                }
                Err(e) => {
                    tracing::warn!(url = %reference.url, error = %e, "listing lost");
                    state.tally.fail(SkipReason::Navigation);
                }
            }
        }

        state
    }
}
