use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel written for any field the source did not provide.
///
/// The exported artifact never contains an empty cell: a value is either
/// parsed or explicitly marked with this sentinel.
pub const NOT_AVAILABLE: &str = "N/A";

/// Marketplace a record was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Crexi,
    LoopNet,
    Rmi,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Crexi => "Crexi",
            Source::LoopNet => "LoopNet",
            Source::Rmi => "RMI",
        }
    }

    /// Lowercase stem used in artifact filenames.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Source::Crexi => "crexi",
            Source::LoopNet => "loopnet",
            Source::Rmi => "rmi",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crexi" => Ok(Source::Crexi),
            "loopnet" => Ok(Source::LoopNet),
            "rmi" => Ok(Source::Rmi),
            _ => Err(format!("unknown source: {s}")),
        }
    }
}

/// Handle to one listing-detail page, discovered during pagination and
/// consumed exactly once by extraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingRef {
    pub url: String,
}

impl ListingRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// One intercepted network response, body already parsed as JSON.
#[derive(Debug, Clone)]
pub struct Payload {
    pub url: String,
    pub body: serde_json::Value,
}

/// Substring predicate over response URLs, used to select which network
/// responses the interceptor should capture.
#[derive(Debug, Clone, Default)]
pub struct PayloadMatcher {
    substrings: Vec<String>,
}

impl PayloadMatcher {
    pub fn url_contains(fragment: impl Into<String>) -> Self {
        Self {
            substrings: vec![fragment.into()],
        }
    }

    pub fn or(mut self, fragment: impl Into<String>) -> Self {
        self.substrings.push(fragment.into());
        self
    }

    pub fn matches(&self, url: &str) -> bool {
        self.substrings.iter().any(|s| url.contains(s.as_str()))
    }
}

/// Raw, site-shaped record as produced by an extraction strategy.
///
/// Everything is a string here; the cleaner owns all format coercion and
/// is the only place that decides a value is unusable.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub property_name: String,
    pub address: String,
    pub bidding_starts: String,
    pub bidding_ends: String,
    pub starting_bid: String,
    pub property_type: String,
    pub year_built: String,
    pub brokers: Vec<String>,
    pub building_size: String,
    pub property_url: String,
    pub source: Source,
}

impl RawRecord {
    pub fn new(source: Source, property_url: impl Into<String>) -> Self {
        Self {
            property_name: String::new(),
            address: String::new(),
            bidding_starts: String::new(),
            bidding_ends: String::new(),
            starting_bid: String::new(),
            property_type: String::new(),
            year_built: String::new(),
            brokers: Vec::new(),
            building_size: String::new(),
            property_url: property_url.into(),
            source,
        }
    }
}

/// Canonical, normalized auction record. `property_url` is the identity key.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub property_name: String,
    pub address: String,
    pub bidding_starts: Option<DateTime<Utc>>,
    pub bidding_ends: Option<DateTime<Utc>>,
    pub starting_bid: Option<f64>,
    pub property_type: String,
    pub year_built: Option<u16>,
    pub broker1: String,
    pub broker2: String,
    pub broker3: String,
    pub building_size: String,
    pub property_url: String,
    pub source: Source,
}

/// Column order of the exported artifact. Stable: downstream consumers
/// key on this header.
pub const CSV_HEADER: [&str; 13] = [
    "propertyName",
    "address",
    "biddingStarts",
    "biddingEnds",
    "startingBid",
    "propertyType",
    "yearBuilt",
    "broker1",
    "broker2",
    "broker3",
    "buildingSize",
    "property_url",
    "source",
];

impl Record {
    /// Render as one CSV row in [`CSV_HEADER`] order. Absent values render
    /// as the [`NOT_AVAILABLE`] sentinel, never as an empty cell.
    pub fn to_row(&self) -> [String; 13] {
        [
            self.property_name.clone(),
            self.address.clone(),
            render_timestamp(self.bidding_starts),
            render_timestamp(self.bidding_ends),
            render_bid(self.starting_bid),
            self.property_type.clone(),
            self.year_built
                .map_or_else(|| NOT_AVAILABLE.to_string(), |y| y.to_string()),
            self.broker1.clone(),
            self.broker2.clone(),
            self.broker3.clone(),
            self.building_size.clone(),
            self.property_url.clone(),
            self.source.as_str().to_string(),
        ]
    }
}

fn render_timestamp(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(t) => t.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => NOT_AVAILABLE.to_string(),
    }
}

fn render_bid(bid: Option<f64>) -> String {
    match bid {
        Some(v) if v.fract() == 0.0 => format!("{}", v as i64),
        Some(v) => format!("{v}"),
        None => NOT_AVAILABLE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> Record {
        Record {
            property_name: "Riverside Plaza".into(),
            address: "293 Patriot Way, Rochester, NY 14624".into(),
            bidding_starts: Some(Utc.with_ymd_and_hms(2025, 10, 6, 16, 0, 0).unwrap()),
            bidding_ends: None,
            starting_bid: Some(250_000.0),
            property_type: "Office".into(),
            year_built: Some(1969),
            broker1: "Jane Doe".into(),
            broker2: NOT_AVAILABLE.into(),
            broker3: NOT_AVAILABLE.into(),
            building_size: "43750 SF".into(),
            property_url: "https://www.loopnet.com/Listing/1".into(),
            source: Source::LoopNet,
        }
    }

    #[test]
    fn source_roundtrip() {
        for source in [Source::Crexi, Source::LoopNet, Source::Rmi] {
            let parsed: Source = source.as_str().parse().unwrap();
            assert_eq!(parsed, source);
        }
    }

    #[test]
    fn row_matches_header_order() {
        let row = sample_record().to_row();
        assert_eq!(row.len(), CSV_HEADER.len());
        assert_eq!(row[0], "Riverside Plaza");
        assert_eq!(row[2], "2025-10-06T16:00:00Z");
        assert_eq!(row[3], NOT_AVAILABLE);
        assert_eq!(row[4], "250000");
        assert_eq!(row[12], "LoopNet");
    }

    #[test]
    fn no_cell_is_empty() {
        for cell in sample_record().to_row() {
            assert!(!cell.is_empty());
        }
    }

    #[test]
    fn matcher_accepts_any_listed_fragment() {
        let matcher = PayloadMatcher::url_contains("api.crexi.com").or("/assets/");
        assert!(matcher.matches("https://api.crexi.com/auctions/42"));
        assert!(matcher.matches("https://cdn.example.com/assets/42"));
        assert!(!matcher.matches("https://www.crexi.com/properties"));
    }
}
