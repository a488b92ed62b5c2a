use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::Mutex;

use gavel_core::config::SessionConfig;
use gavel_core::error::ScrapeError;
use gavel_core::record::{Payload, PayloadMatcher};
use gavel_core::traits::{Page, Session, SessionDriver};

use crate::intercept::NetworkTap;

/// Launches Chromium sessions via the Chrome DevTools Protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserDriver;

impl BrowserDriver {
    pub fn new() -> Self {
        Self
    }
}

impl SessionDriver for BrowserDriver {
    type Session = BrowserSession;

    async fn open(&self, config: &SessionConfig) -> Result<BrowserSession, ScrapeError> {
        BrowserSession::launch(config).await
    }
}

/// One Chromium browser context.
///
/// Each [`Session::navigate`] call opens a fresh tab, optionally wires up
/// the network interceptor before the load starts, and waits for the page
/// to render a body. `close` is idempotent: the browser process is taken
/// out of the slot on the first call and later calls are no-ops.
pub struct BrowserSession {
    browser: Mutex<Option<Browser>>,
}

impl BrowserSession {
    pub async fn launch(config: &SessionConfig) -> Result<Self, ScrapeError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        // Snap-packaged Chromium exposes a wrapper that rejects standard
        // Chrome CLI flags. Try to locate the real binary buried inside
        // the snap, falling back to any other Chrome/Chromium install.
        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        builder = builder.window_size(config.viewport.width, config.viewport.height);
        if config.headless {
            builder = builder.arg("--headless=new");
        }
        if let Some(ua) = &config.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }

        let browser_config = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .build()
            .map_err(|e| ScrapeError::SessionStart(format!("browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapeError::SessionStart(format!("failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection
        // to work; the stream ends when the browser goes away.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(Some(browser)),
        })
    }
}

impl Session for BrowserSession {
    type Page = BrowserPage;

    async fn navigate(
        &self,
        url: &str,
        timeout: Duration,
        capture: Option<&PayloadMatcher>,
    ) -> Result<BrowserPage, ScrapeError> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or_else(|| ScrapeError::Navigation {
            url: url.to_string(),
            message: "session already closed".to_string(),
        })?;

        let attempt = async {
            // Open the tab blank so the interceptor is listening before
            // the first request of the real navigation goes out.
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| nav_error(url, format!("failed to open tab: {e}")))?;

            let tap = match capture {
                Some(matcher) => Some(NetworkTap::attach(&page, url, matcher.clone()).await?),
                None => None,
            };

            page.goto(url)
                .await
                .map_err(|e| nav_error(url, format!("goto failed: {e}")))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| nav_error(url, format!("load did not settle: {e}")))?;

            // Minimal render signal: the page has produced a body.
            page.find_element("body")
                .await
                .map_err(|_| ScrapeError::EmptyPage {
                    url: url.to_string(),
                })?;

            Ok(BrowserPage {
                url: url.to_string(),
                page,
                tap,
            })
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::NavigationTimeout {
                url: url.to_string(),
                seconds: timeout.as_secs(),
            }),
        }
    }

    async fn close(&self) {
        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            if let Err(e) = browser.close().await {
                tracing::debug!(error = %e, "browser close");
            }
            let _ = browser.wait().await;
        }
    }
}

fn nav_error(url: &str, message: String) -> ScrapeError {
    ScrapeError::Navigation {
        url: url.to_string(),
        message,
    }
}

/// One open tab, plus its network tap when capture was requested.
pub struct BrowserPage {
    url: String,
    page: chromiumoxide::Page,
    tap: Option<NetworkTap>,
}

impl Page for BrowserPage {
    async fn html(&self) -> Result<String, ScrapeError> {
        self.page
            .content()
            .await
            .map_err(|e| nav_error(&self.url, format!("failed to read page content: {e}")))
    }

    async fn click(&self, selector: &str) -> Result<(), ScrapeError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| nav_error(&self.url, format!("element `{selector}`: {e}")))?;
        element
            .click()
            .await
            .map_err(|e| nav_error(&self.url, format!("click `{selector}`: {e}")))?;
        Ok(())
    }

    async fn payloads(&self, window: Duration) -> Vec<Payload> {
        match &self.tap {
            Some(tap) => tap.drain(&self.page, window).await,
            None => Vec::new(),
        }
    }
}

/// Tries to locate the real Chrome/Chromium binary.
///
/// On systems where Chromium is installed via snap, the wrapper at
/// `/snap/bin/chromium` strips unknown CLI flags and breaks headless mode,
/// so the real binary inside the snap is preferred. Returns `None` to let
/// `chromiumoxide` do its own lookup when nothing is found.
fn find_chrome_binary() -> Option<PathBuf> {
    // An explicit override always wins.
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    let candidates: &[&str] = &[
        // Snap (Ubuntu default)
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        // Flatpak
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        // Common apt / manual installs
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}
