//! Field normalization: raw site-shaped strings into the canonical record.
//!
//! `normalize` is total. An unparseable value degrades to the explicit
//! "not available" sentinel (or `None` for typed fields) and logs the raw
//! input; it never aborts a run.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::record::{RawRecord, Record, NOT_AVAILABLE};

/// Collapse internal whitespace runs and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleaned text, or the sentinel when nothing remains.
pub fn text_or_sentinel(text: &str) -> String {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        cleaned
    }
}

/// Parse a currency string to a numeric amount.
///
/// Strips symbols and whitespace, treats commas as thousands separators
/// unless the string reads as a European decimal-comma amount.
pub fn parse_currency(raw: &str) -> Option<f64> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if kept.is_empty() {
        return None;
    }

    let normalized = if kept.contains(',') && kept.contains('.') {
        kept.replace(',', "")
    } else if kept.contains(',') {
        let parts: Vec<&str> = kept.split(',').collect();
        if parts.len() == 2 && parts[1].len() <= 2 {
            kept.replace(',', ".")
        } else {
            kept.replace(',', "")
        }
    } else {
        kept
    };

    normalized.parse::<f64>().ok()
}

/// Datetime formats the marketplaces have been seen to emit, tried in
/// order after RFC 3339.
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %I:%M %p",
];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"];

/// Parse a timestamp from any of the source formats.
///
/// Tries RFC 3339, the .NET `/Date(millis±zone)/` literal, then the fixed
/// format lists. Naive datetimes are assumed UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(dt) = parse_net_date(trimmed) {
        return Some(dt);
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// Parse the .NET JSON date literal `/Date(1758556800000-0400)/`.
///
/// The millisecond value is already a UTC epoch offset; the trailing zone
/// is display metadata and does not shift the instant.
fn parse_net_date(raw: &str) -> Option<DateTime<Utc>> {
    let inner = raw.strip_prefix("/Date(")?.strip_suffix(")/")?;
    let digits_end = inner
        .char_indices()
        .skip(1)
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(inner.len(), |(i, _)| i);
    let millis: i64 = inner[..digits_end].parse().ok()?;

    if digits_end < inner.len() {
        // Validate the zone suffix even though it does not move the instant.
        DateTime::<FixedOffset>::parse_from_str(
            &format!("1970-01-01T00:00:00{}", &inner[digits_end..]),
            "%Y-%m-%dT%H:%M:%S%z",
        )
        .ok()?;
    }

    Utc.timestamp_millis_opt(millis).single()
}

/// Extract a plausible build year (1800..=2100).
pub fn parse_year(raw: &str) -> Option<u16> {
    let cleaned = clean_text(raw);
    // Values like "1969/2005" list original and renovation years.
    let first = cleaned.split(['/', '-']).next()?.trim();
    let year: u16 = first.parse().ok()?;
    (1800..=2100).contains(&year).then_some(year)
}

/// Render a building size unit-qualified. Numeric inputs come back as
/// `"{n} SF"`; anything already carrying text is cleaned and kept.
pub fn format_size(raw: &str) -> String {
    let cleaned = clean_text(raw);
    if cleaned.is_empty() {
        return NOT_AVAILABLE.to_string();
    }
    let digits: String = cleaned.chars().filter(char::is_ascii_digit).collect();
    if !digits.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
        return format!("{digits} SF");
    }
    cleaned
}

/// Coerce a raw record into the canonical schema. Total: every field ends
/// up populated with a parsed value, `None`, or the sentinel.
pub fn normalize(raw: RawRecord) -> Record {
    let bidding_starts = parse_field_timestamp("biddingStarts", &raw.bidding_starts);
    let bidding_ends = parse_field_timestamp("biddingEnds", &raw.bidding_ends);

    let starting_bid = match parse_currency(&raw.starting_bid) {
        Some(v) => Some(v),
        None => {
            if !raw.starting_bid.trim().is_empty() {
                tracing::warn!(raw = %raw.starting_bid, "unparseable starting bid");
            }
            None
        }
    };

    let year_built = match parse_year(&raw.year_built) {
        Some(y) => Some(y),
        None => {
            if !raw.year_built.trim().is_empty() {
                tracing::warn!(raw = %raw.year_built, "unparseable year built");
            }
            None
        }
    };

    let mut brokers = raw
        .brokers
        .iter()
        .map(|b| clean_text(b))
        .filter(|b| !b.is_empty())
        .take(3);

    Record {
        property_name: text_or_sentinel(&raw.property_name),
        address: text_or_sentinel(&raw.address),
        bidding_starts,
        bidding_ends,
        starting_bid,
        property_type: text_or_sentinel(&raw.property_type),
        year_built,
        broker1: brokers.next().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        broker2: brokers.next().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        broker3: brokers.next().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        building_size: format_size(&raw.building_size),
        property_url: raw.property_url,
        source: raw.source,
    }
}

fn parse_field_timestamp(field: &str, raw: &str) -> Option<DateTime<Utc>> {
    match parse_timestamp(raw) {
        Some(ts) => Some(ts),
        None => {
            if !raw.trim().is_empty() {
                tracing::warn!(%field, %raw, "unparseable timestamp");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Source;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(clean_text("  1290   Avenue of\n the  Americas "), "1290 Avenue of the Americas");
        assert_eq!(clean_text("   "), "");
        assert_eq!(text_or_sentinel("  "), NOT_AVAILABLE);
    }

    #[test]
    fn currency_parsing() {
        assert_eq!(parse_currency("$1,250,000"), Some(1_250_000.0));
        assert_eq!(parse_currency("250000.50"), Some(250_000.5));
        assert_eq!(parse_currency("899,99"), Some(899.99));
        assert_eq!(parse_currency("Contact broker"), None);
        assert_eq!(parse_currency(""), None);
    }

    #[test]
    fn rfc3339_roundtrips_same_instant() {
        let ts = parse_timestamp("2025-10-06T16:00:00Z").unwrap();
        assert_eq!(
            ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "2025-10-06T16:00:00Z"
        );
    }

    #[test]
    fn offset_timestamps_convert_to_utc() {
        let ts = parse_timestamp("2025-10-06T12:00:00-04:00").unwrap();
        assert_eq!(ts, parse_timestamp("2025-10-06T16:00:00Z").unwrap());
    }

    #[test]
    fn net_date_literal() {
        // 1758556800000 ms = 2025-09-22T16:00:00Z
        let ts = parse_timestamp("/Date(1758556800000-0400)/").unwrap();
        assert_eq!(
            ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "2025-09-22T16:00:00Z"
        );
        // No zone suffix is also legal.
        assert!(parse_timestamp("/Date(1758556800000)/").is_some());
        assert!(parse_timestamp("/Date(garbage)/").is_none());
    }

    #[test]
    fn naive_dates_assume_utc_midnight() {
        let ts = parse_timestamp("October 6, 2025").unwrap();
        assert_eq!(
            ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "2025-10-06T00:00:00Z"
        );
    }

    #[test]
    fn year_parsing() {
        assert_eq!(parse_year("1969"), Some(1969));
        assert_eq!(parse_year(" 1969/2005 "), Some(1969));
        assert_eq!(parse_year("unknown"), None);
        assert_eq!(parse_year("150"), None);
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size("43,750"), "43750 SF");
        assert_eq!(format_size("6000"), "6000 SF");
        assert_eq!(format_size("12 units on 3 acres"), "12 units on 3 acres");
        assert_eq!(format_size(""), NOT_AVAILABLE);
    }

    #[test]
    fn normalize_is_total_on_garbage() {
        let mut raw = RawRecord::new(Source::Crexi, "https://www.crexi.com/properties/42/x");
        raw.property_name = "  Gateway   Industrial Park ".into();
        raw.starting_bid = "call for pricing".into();
        raw.bidding_starts = "whenever".into();
        raw.year_built = "n/a".into();
        raw.brokers = vec!["  ".into(), "Jane  Doe".into()];

        let record = normalize(raw);
        assert_eq!(record.property_name, "Gateway Industrial Park");
        assert_eq!(record.address, NOT_AVAILABLE);
        assert_eq!(record.starting_bid, None);
        assert_eq!(record.bidding_starts, None);
        assert_eq!(record.year_built, None);
        assert_eq!(record.broker1, "Jane Doe");
        assert_eq!(record.broker2, NOT_AVAILABLE);
        assert_eq!(record.broker3, NOT_AVAILABLE);
        assert_eq!(record.building_size, NOT_AVAILABLE);
        for cell in record.to_row() {
            assert!(!cell.is_empty());
        }
    }
}
