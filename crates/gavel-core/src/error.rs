use thiserror::Error;

/// Error taxonomy for a scrape run.
///
/// Only [`SessionStart`](ScrapeError::SessionStart) and
/// [`ExportIo`](ScrapeError::ExportIo) are fatal to a run; everything else
/// degrades to skip-and-continue at the listing level.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The browser engine could not be launched (binary missing, resources).
    #[error("failed to start browser session: {0}")]
    SessionStart(String),

    /// Navigation did not complete within its per-step timeout.
    #[error("navigation to {url} timed out after {seconds}s")]
    NavigationTimeout { url: String, seconds: u64 },

    /// Navigation failed outright (connection reset, CDP error, bad URL).
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// A page rendered but carried none of the content we expected.
    #[error("page at {url} rendered no usable content")]
    EmptyPage { url: String },

    /// A required selector/path matched nothing. The listing is skipped.
    #[error("required field `{field}` not found")]
    MissingField { field: &'static str },

    /// A field matched but could not be parsed. Raw value kept for diagnosis.
    #[error("field `{field}` could not be parsed from {raw:?}")]
    MalformedField { field: &'static str, raw: String },

    /// A structural anchor locating the record block is absent, which
    /// usually means the site layout changed. Surfaced in the run summary.
    #[error("structural anchor `{anchor}` is missing; site layout may have changed")]
    StructureChanged { anchor: &'static str },

    /// All retry attempts for a step were consumed.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<ScrapeError>,
    },

    /// Writing the output artifact failed at the filesystem level.
    #[error("export failed: {0}")]
    ExportIo(String),

    /// The run was cancelled (signal or deadline).
    #[error("run cancelled")]
    Cancelled,
}

impl ScrapeError {
    /// True if retrying the same step could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScrapeError::NavigationTimeout { .. }
                | ScrapeError::Navigation { .. }
                | ScrapeError::EmptyPage { .. }
        )
    }

    /// True if the whole run cannot proceed past this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScrapeError::SessionStart(_) | ScrapeError::ExportIo(_)
        )
    }
}
