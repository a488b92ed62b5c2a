//! CDP network interception: capture the JSON API responses that back a
//! page when a site exposes richer data there than in its rendered HTML.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, GetResponseBodyParams, RequestId,
};
use futures::StreamExt;

use gavel_core::error::ScrapeError;
use gavel_core::record::{Payload, PayloadMatcher};

/// Consecutive quiet time after the last matching response before the
/// capture is considered settled.
const QUIET_PERIOD: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Records matching network responses for one page.
///
/// Attach before navigation so the earliest API calls are not missed. The
/// capture window closes with the page; dropping the tap stops the
/// listener task.
pub struct NetworkTap {
    hits: Arc<Mutex<Vec<(String, RequestId)>>>,
    last_hit: Arc<Mutex<Option<Instant>>>,
    listener: tokio::task::JoinHandle<()>,
}

impl NetworkTap {
    pub async fn attach(
        page: &chromiumoxide::Page,
        target_url: &str,
        matcher: PayloadMatcher,
    ) -> Result<Self, ScrapeError> {
        let mut events = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| ScrapeError::Navigation {
                url: target_url.to_string(),
                message: format!("attaching network listener: {e}"),
            })?;

        let hits: Arc<Mutex<Vec<(String, RequestId)>>> = Arc::new(Mutex::new(Vec::new()));
        let last_hit: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));

        let listener = {
            let hits = Arc::clone(&hits);
            let last_hit = Arc::clone(&last_hit);
            tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    if matcher.matches(&event.response.url) {
                        tracing::debug!(url = %event.response.url, "captured api response");
                        hits.lock()
                            .unwrap()
                            .push((event.response.url.clone(), event.request_id.clone()));
                        *last_hit.lock().unwrap() = Some(Instant::now());
                    }
                }
            })
        };

        Ok(Self {
            hits,
            last_hit,
            listener,
        })
    }

    /// Wait for the capture to settle (or `window` to elapse), then pull
    /// and parse the response bodies. An empty result is not an error:
    /// callers fall back to DOM extraction.
    pub async fn drain(&self, page: &chromiumoxide::Page, window: Duration) -> Vec<Payload> {
        let deadline = Instant::now() + window;
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let has_hits = !self.hits.lock().unwrap().is_empty();
            let quiet = self
                .last_hit
                .lock()
                .unwrap()
                .is_some_and(|t| t.elapsed() >= QUIET_PERIOD);
            if (has_hits && quiet) || Instant::now() >= deadline {
                break;
            }
        }

        let hits: Vec<(String, RequestId)> = {
            let mut guard = self.hits.lock().unwrap();
            guard.drain(..).collect()
        };

        let mut payloads = Vec::new();
        for (url, request_id) in hits {
            match page.execute(GetResponseBodyParams::new(request_id)).await {
                Ok(response) => {
                    if response.result.base64_encoded {
                        tracing::debug!(%url, "skipping non-text response body");
                        continue;
                    }
                    match serde_json::from_str(&response.result.body) {
                        Ok(body) => payloads.push(Payload { url, body }),
                        Err(e) => tracing::debug!(%url, error = %e, "response body is not JSON"),
                    }
                }
                Err(e) => tracing::debug!(%url, error = %e, "failed to read response body"),
            }
        }
        tracing::debug!(count = payloads.len(), "network capture drained");
        payloads
    }
}

impl Drop for NetworkTap {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
