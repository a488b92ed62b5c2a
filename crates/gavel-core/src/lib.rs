pub mod clean;
pub mod config;
pub mod error;
pub mod export;
pub mod pace;
pub mod paginate;
pub mod record;
pub mod report;
pub mod retry;
pub mod run;
pub mod testutil;
pub mod traits;

pub use config::{PageLimit, RunConfig, SessionConfig, Viewport};
pub use error::ScrapeError;
pub use record::{ListingRef, Payload, PayloadMatcher, RawRecord, Record, Source, NOT_AVAILABLE};
pub use report::{RunOutcome, SkipReason, Tally};
pub use run::Orchestrator;
pub use traits::{Page, PageView, Session, SessionDriver, SiteStrategy};
