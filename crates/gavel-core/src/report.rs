use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::paginate::StopReason;
use crate::record::Record;

/// Why a listing did not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkipReason {
    MissingField,
    MalformedField,
    StructureChanged,
    RetryExhausted,
    Navigation,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingField => "missing field",
            SkipReason::MalformedField => "malformed field",
            SkipReason::StructureChanged => "structure changed",
            SkipReason::RetryExhausted => "retries exhausted",
            SkipReason::Navigation => "navigation failed",
        }
    }
}

/// Per-run counters. Every attempted listing increments exactly one of
/// succeeded, failed, or skipped.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    pub attempted: u32,
    pub succeeded: u32,
    /// Listings lost to navigation-level failures after retries.
    pub failed: u32,
    /// Listings dropped by extraction classification.
    pub skipped: u32,
    by_reason: BTreeMap<SkipReason, u32>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self) {
        self.succeeded += 1;
    }

    pub fn skip(&mut self, reason: SkipReason) {
        self.skipped += 1;
        *self.by_reason.entry(reason).or_insert(0) += 1;
    }

    pub fn fail(&mut self, reason: SkipReason) {
        self.failed += 1;
        *self.by_reason.entry(reason).or_insert(0) += 1;
    }

    /// Per-reason counts for failed and skipped listings, in stable order.
    pub fn reasons(&self) -> impl Iterator<Item = (SkipReason, u32)> + '_ {
        self.by_reason.iter().map(|(r, n)| (*r, *n))
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted={} succeeded={} failed={} skipped={}",
            self.attempted, self.succeeded, self.failed, self.skipped
        )?;
        for (reason, count) in self.reasons() {
            write!(f, " [{}: {}]", reason.as_str(), count)?;
        }
        Ok(())
    }
}

/// Everything a completed (or cancelled) run reports back.
#[derive(Debug)]
pub struct RunOutcome {
    /// Normalized records, in extraction order. The exported artifact
    /// re-sorts them; this order is not a contract.
    pub records: Vec<Record>,
    pub tally: Tally,
    pub stop: StopReason,
    /// Structure-change warnings collected during the run. Non-empty means
    /// a site layout likely changed and the selector tables need a look.
    pub structure_changes: Vec<String>,
    /// True when the run was cut short by a signal or deadline; records
    /// extracted before the cut are still exported.
    pub cancelled: bool,
    /// Path of the written artifact.
    pub artifact: PathBuf,
}
