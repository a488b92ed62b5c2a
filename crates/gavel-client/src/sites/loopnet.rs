//! LoopNet auction extraction.
//!
//! The index embeds its listing set as JSON-LD in a `listings-schema`
//! script tag and pages by URL suffix. Detail pages carry the auction
//! state in Angular constant scripts (.NET date literals included) next
//! to a `RealEstateListing` JSON-LD block.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use gavel_core::error::ScrapeError;
use gavel_core::paginate::PaginationMode;
use gavel_core::record::{ListingRef, RawRecord, Source};
use gavel_core::traits::{PageView, SiteStrategy};

use super::{clip, find_address, json_scalar};

const BASE_URL: &str = "https://www.loopnet.com/search/commercial-real-estate/usa/auctions/";

static SEL_SCHEMA: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script#listings-schema").expect("valid selector"));
static SEL_PAGING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".total-results-paging-digits").expect("valid selector"));
static SEL_PAGE_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[data-pg]").expect("valid selector"));
static SEL_SCRIPT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("valid selector"));
static SEL_LD_JSON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector")
});
static SEL_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static SEL_H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
static SEL_FACT_YEAR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"td[data-fact-type="YearBuiltRenovated"], td[data-fact-type="YearBuilt"]"#)
        .expect("valid selector")
});

static RE_PAGING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*-\s*(\d+)\s+of\s+([\d,]+)").expect("valid regex"));
static RE_SQFT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,3}(?:,\d{3})*)\s*square\s*foot").expect("valid regex")
});
static RE_FLOOR_SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""Floor Size"[^}]*"value":\s*"([^"]+)""#).expect("valid regex")
});
static RE_BUILT_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Built\s+in\s+(\d{4})").expect("valid regex"));

pub struct LoopNetStrategy {
    base_url: String,
}

impl LoopNetStrategy {
    pub fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
        }
    }

    /// Total index pages, from the "1-20 of 150" paging digits with the
    /// numbered page links as fallback. A page with neither paginates to
    /// itself only.
    fn total_pages(&self, doc: &Html) -> u32 {
        if let Some(digits) = doc.select(&SEL_PAGING).next() {
            let text = digits.text().collect::<String>();
            if let Some(caps) = RE_PAGING.captures(&text) {
                let first: u64 = caps[1].parse().unwrap_or(0);
                let last: u64 = caps[2].parse().unwrap_or(0);
                let total: u64 = caps[3].replace(',', "").parse().unwrap_or(0);
                let per_page = last.saturating_sub(first) + 1;
                if per_page > 0 && total > 0 {
                    return total.div_ceil(per_page) as u32;
                }
            }
        }

        doc.select(&SEL_PAGE_LINK)
            .filter_map(|a| a.value().attr("data-pg"))
            .filter_map(|pg| pg.parse::<u32>().ok())
            .max()
            .unwrap_or(1)
    }
}

impl Default for LoopNetStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteStrategy for LoopNetStrategy {
    fn source(&self) -> Source {
        Source::LoopNet
    }

    fn start_url(&self) -> String {
        self.base_url.clone()
    }

    fn pagination(&self) -> PaginationMode {
        PaginationMode::Index
    }

    fn listing_refs(&self, index_html: &str) -> Result<Vec<ListingRef>, ScrapeError> {
        let doc = Html::parse_document(index_html);

        let Some(script) = doc.select(&SEL_SCHEMA).next() else {
            return Err(ScrapeError::StructureChanged {
                anchor: "script#listings-schema",
            });
        };
        let json_text = script.text().collect::<String>();
        let schema: serde_json::Value =
            serde_json::from_str(json_text.trim()).map_err(|_| ScrapeError::MalformedField {
                field: "listings-schema",
                raw: clip(&json_text),
            })?;

        let refs = schema
            .pointer("/mainEntity/itemListElement")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("url").and_then(|u| u.as_str()))
                    .map(ListingRef::new)
                    .collect()
            })
            .unwrap_or_default();

        Ok(refs)
    }

    fn next_page_url(&self, index_html: &str, page_no: u32) -> Option<String> {
        let doc = Html::parse_document(index_html);
        let total = self.total_pages(&doc);
        (page_no < total).then(|| format!("{}{}/", self.base_url, page_no + 1))
    }

    fn extract(&self, reference: &ListingRef, view: &PageView) -> Result<RawRecord, ScrapeError> {
        let doc = Html::parse_document(&view.html);

        let auction = doc
            .select(&SEL_SCRIPT)
            .map(|s| s.text().collect::<String>())
            .find(|text| text.contains("auctionBannerState"))
            .and_then(|text| angular_constant(&text, "auctionBannerState"))
            .and_then(|state| state.get("Auction").cloned());

        let profile = doc
            .select(&SEL_SCRIPT)
            .map(|s| s.text().collect::<String>())
            .find(|text| text.contains("listingProfileState"))
            .and_then(|text| angular_constant(&text, "listingProfileState"));

        let listing_ld = doc
            .select(&SEL_LD_JSON)
            .filter_map(|s| {
                serde_json::from_str::<serde_json::Value>(&s.text().collect::<String>()).ok()
            })
            .find(|v| v.get("@type").and_then(|t| t.as_str()) == Some("RealEstateListing"));

        // Both record anchors gone at once reads as a redesign, not a
        // sparse listing.
        if auction.is_none() && listing_ld.is_none() {
            return Err(ScrapeError::StructureChanged {
                anchor: "auctionBannerState / RealEstateListing",
            });
        }

        let mut raw = RawRecord::new(Source::LoopNet, reference.url.clone());

        if let Some(ld) = &listing_ld {
            raw.property_name = json_scalar(ld.get("name"));
            if let Some(desc) = ld.get("description").and_then(|d| d.as_str()) {
                raw.address = find_address(desc).unwrap_or_default();
            }
            raw.brokers = ld
                .get("provider")
                .and_then(|p| p.as_array())
                .map(|providers| {
                    providers
                        .iter()
                        .filter(|p| {
                            p.get("@type").and_then(|t| t.as_str()) == Some("RealEstateAgent")
                        })
                        .map(|p| json_scalar(p.get("name")))
                        .filter(|name| !name.is_empty())
                        .take(3)
                        .collect()
                })
                .unwrap_or_default();
        }

        let title = doc
            .select(&SEL_TITLE)
            .next()
            .map(|t| t.text().collect::<String>())
            .unwrap_or_default();
        if raw.property_name.trim().is_empty() {
            raw.property_name = doc
                .select(&SEL_H1)
                .next()
                .map(|h| h.text().collect::<String>())
                .unwrap_or_else(|| title.clone());
        }
        if raw.address.trim().is_empty() {
            raw.address = find_address(&title)
                .or_else(|| find_address(&view.html))
                .unwrap_or_default();
        }

        if raw.property_name.trim().is_empty() && raw.address.trim().is_empty() {
            return Err(ScrapeError::MissingField {
                field: "propertyName",
            });
        }

        if let Some(auction) = &auction {
            // .NET /Date(...)/ literals pass through raw; the cleaner
            // owns that format.
            raw.bidding_starts = json_scalar(auction.get("StartTime"));
            raw.bidding_ends = json_scalar(auction.get("EndTime"));
            raw.starting_bid = json_scalar(auction.get("StartingBid"));
        }

        raw.property_type = json_scalar(profile.as_ref().and_then(|p| p.get("CategoryTitle")));

        raw.building_size = RE_SQFT
            .captures(&view.html)
            .map(|caps| caps[1].replace(',', ""))
            .or_else(|| {
                RE_FLOOR_SIZE.captures(&view.html).map(|caps| {
                    caps[1]
                        .chars()
                        .filter(|c| c.is_ascii_digit())
                        .collect::<String>()
                })
            })
            .unwrap_or_default();

        raw.year_built = RE_BUILT_IN
            .captures(&view.html)
            .map(|caps| caps[1].to_string())
            .or_else(|| {
                doc.select(&SEL_FACT_YEAR)
                    .next()
                    .map(|td| td.text().collect::<String>())
            })
            .unwrap_or_default();

        Ok(raw)
    }
}

/// Pull one named constant out of an Angular module script by matching
/// braces from the first `{` after the constant's name. Brace characters
/// inside string values are rare enough in these payloads not to matter,
/// matching the original extraction's tolerance.
fn angular_constant(script: &str, name: &str) -> Option<serde_json::Value> {
    let needle = format!("\"{name}\"");
    let start = script.find(&needle)?;
    let brace_start = script[start..].find('{')? + start;

    let mut depth = 0usize;
    for (i, c) in script[brace_start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&script[brace_start..=brace_start + i]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_core::clean::normalize;

    fn index_html(urls: &[&str], paging: &str) -> String {
        let items: Vec<String> = urls
            .iter()
            .map(|u| format!(r#"{{"url": "{u}"}}"#))
            .collect();
        format!(
            r#"<html><head>
            <script id="listings-schema" type="application/ld+json">
            {{"mainEntity": {{"itemListElement": [{}]}}}}
            </script></head>
            <body><div class="total-results-paging-digits">{paging}</div></body></html>"#,
            items.join(",")
        )
    }

    const DETAIL_HTML: &str = r#"<html>
    <head>
    <title>Former Rochester School | 293 Patriot Way, Rochester, NY 14624</title>
    <script>
    app.constant("auctionBannerState", {"Auction": {
        "StartingBid": 250000,
        "CurrentBid": 275000,
        "StartTime": "/Date(1758556800000-0400)/",
        "EndTime": "/Date(1758729600000-0400)/"
    }});
    </script>
    <script>
    app.constant("listingProfileState", {"CategoryTitle": "Office"});
    </script>
    <script type="application/ld+json">
    {"@type": "RealEstateListing",
     "name": "Former Rochester School Campus",
     "description": "Auction of 293 Patriot Way, Rochester, NY 14624, a 43,750 square foot campus.",
     "provider": [
        {"@type": "RealEstateAgent", "name": "Jane Doe"},
        {"@type": "Organization", "name": "Ten-X"},
        {"@type": "RealEstateAgent", "name": "John Smith"}
     ]}
    </script>
    </head>
    <body><h1>Former Rochester School Campus</h1><p>Built in 1969, offered at auction.</p></body>
    </html>"#;

    fn strategy() -> LoopNetStrategy {
        LoopNetStrategy::new()
    }

    #[test]
    fn index_refs_come_from_listings_schema() {
        let html = index_html(
            &[
                "https://www.loopnet.com/Listing/1",
                "https://www.loopnet.com/Listing/2",
            ],
            "1-20 of 150",
        );
        let refs = strategy().listing_refs(&html).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].url, "https://www.loopnet.com/Listing/1");
    }

    #[test]
    fn missing_schema_script_is_structure_changed() {
        let err = strategy()
            .listing_refs("<html><body>redesigned</body></html>")
            .unwrap_err();
        assert!(matches!(err, ScrapeError::StructureChanged { .. }));
    }

    #[test]
    fn unparseable_schema_is_malformed_field() {
        let html = r#"<html><script id="listings-schema">not json</script></html>"#;
        let err = strategy().listing_refs(html).unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::MalformedField { field: "listings-schema", .. }
        ));
    }

    #[test]
    fn next_page_follows_paging_digits() {
        let html = index_html(&["https://www.loopnet.com/Listing/1"], "1-20 of 150");
        // 150 results at 20 per page is 8 pages.
        let strategy = strategy();
        assert_eq!(
            strategy.next_page_url(&html, 1).unwrap(),
            format!("{BASE_URL}2/")
        );
        assert_eq!(
            strategy.next_page_url(&html, 7).unwrap(),
            format!("{BASE_URL}8/")
        );
        assert!(strategy.next_page_url(&html, 8).is_none());
    }

    #[test]
    fn single_page_index_has_no_next() {
        let html = index_html(&["https://www.loopnet.com/Listing/1"], "no pagination");
        assert!(strategy().next_page_url(&html, 1).is_none());
    }

    #[test]
    fn extract_maps_angular_state_and_ld_json() {
        let reference = ListingRef::new("https://www.loopnet.com/Listing/1");
        let raw = strategy()
            .extract(&reference, &PageView::dom_only(DETAIL_HTML))
            .unwrap();

        assert_eq!(raw.property_name, "Former Rochester School Campus");
        assert_eq!(raw.address, "293 Patriot Way, Rochester, NY 14624");
        assert_eq!(raw.bidding_starts, "/Date(1758556800000-0400)/");
        assert_eq!(raw.starting_bid, "250000");
        assert_eq!(raw.property_type, "Office");
        assert_eq!(raw.building_size, "43750");
        assert_eq!(raw.year_built, "1969");
        // Only RealEstateAgent providers count as brokers.
        assert_eq!(raw.brokers, vec!["Jane Doe", "John Smith"]);

        let record = normalize(raw);
        assert_eq!(
            record
                .bidding_starts
                .unwrap()
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "2025-09-22T16:00:00Z"
        );
        assert_eq!(record.starting_bid, Some(250_000.0));
        assert_eq!(record.building_size, "43750 SF");
    }

    #[test]
    fn extract_without_anchors_is_structure_changed() {
        let reference = ListingRef::new("https://www.loopnet.com/Listing/1");
        let err = strategy()
            .extract(
                &reference,
                &PageView::dom_only("<html><body><p>hello</p></body></html>"),
            )
            .unwrap_err();
        assert!(matches!(err, ScrapeError::StructureChanged { .. }));
    }

    #[test]
    fn extract_with_anchor_but_no_identity_is_missing_field() {
        // JSON-LD block exists but carries neither name nor address.
        let html = r#"<html><head><script type="application/ld+json">
            {"@type": "RealEstateListing"}
            </script><title></title></head><body></body></html>"#;
        let reference = ListingRef::new("https://www.loopnet.com/Listing/1");
        let err = strategy()
            .extract(&reference, &PageView::dom_only(html))
            .unwrap_err();
        assert!(matches!(err, ScrapeError::MissingField { .. }));
    }

    #[test]
    fn angular_constant_matches_nested_braces() {
        let script = r#"module.constant("auctionBannerState", {"Auction": {"StartingBid": 1, "Stats": {"Bidders": 4}}, "Flags": {}}); more();"#;
        let value = angular_constant(script, "auctionBannerState").unwrap();
        assert_eq!(value.pointer("/Auction/Stats/Bidders").unwrap(), 4);
        assert!(angular_constant(script, "otherConstant").is_none());
    }
}
