//! Crexi auction extraction.
//!
//! The index is a card grid with an explicit next-page control. Detail
//! pages are an Angular SPA whose rendered DOM is thin; the real data
//! arrives from three `api.crexi.com` endpoints per property, so
//! extraction prefers intercepted payloads and keeps a DOM fallback.

use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta};
use regex::Regex;
use scraper::{Html, Selector};

use gavel_core::error::ScrapeError;
use gavel_core::paginate::PaginationMode;
use gavel_core::record::{ListingRef, Payload, PayloadMatcher, RawRecord, Source};
use gavel_core::traits::{PageView, SiteStrategy};

use super::{absolutize, find_address, json_scalar};

const SITE_URL: &str = "https://www.crexi.com";
const AUCTIONS_URL: &str = "https://www.crexi.com/properties/Auctions?pageSize=60";

static SEL_CARD_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.cui-card-cover-link").expect("valid selector"));
static SEL_NEXT_PAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[data-cy="nextPage"]"#).expect("valid selector"));
static SEL_LD_JSON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector")
});
static SEL_H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));

static RE_PROPERTY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/properties/(\d+)(?:/|$)").expect("valid regex"));

pub struct CrexiStrategy {
    auctions_url: String,
}

impl CrexiStrategy {
    pub fn new() -> Self {
        Self {
            auctions_url: AUCTIONS_URL.to_string(),
        }
    }
}

impl Default for CrexiStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// Route the captured payloads for one property to their roles.
struct ApiBundle<'a> {
    asset: Option<&'a serde_json::Value>,
    auction: Option<&'a serde_json::Value>,
    brokers: Option<&'a serde_json::Value>,
}

fn triage<'a>(payloads: &'a [Payload], property_id: &str) -> ApiBundle<'a> {
    let mut bundle = ApiBundle {
        asset: None,
        auction: None,
        brokers: None,
    };
    for payload in payloads {
        if payload.url.contains(&format!("/assets/{property_id}/brokers")) {
            bundle.brokers = Some(&payload.body);
        } else if payload.url.contains(&format!("/auctions/{property_id}")) {
            bundle.auction = Some(&payload.body);
        } else if payload.url.contains(&format!("/assets/{property_id}")) {
            bundle.asset = Some(&payload.body);
        }
    }
    bundle
}

/// Auctions missing an advertised end default to start plus two days,
/// Crexi's standard bidding window.
fn default_end(starts: &str) -> String {
    DateTime::parse_from_rfc3339(starts)
        .ok()
        .and_then(|start| start.checked_add_signed(TimeDelta::days(2)))
        .map(|end| end.to_rfc3339())
        .unwrap_or_default()
}

impl SiteStrategy for CrexiStrategy {
    fn source(&self) -> Source {
        Source::Crexi
    }

    fn start_url(&self) -> String {
        self.auctions_url.clone()
    }

    fn pagination(&self) -> PaginationMode {
        PaginationMode::Index
    }

    fn payload_matcher(&self) -> Option<PayloadMatcher> {
        Some(PayloadMatcher::url_contains("api.crexi.com"))
    }

    fn listing_refs(&self, index_html: &str) -> Result<Vec<ListingRef>, ScrapeError> {
        let doc = Html::parse_document(index_html);
        Ok(doc
            .select(&SEL_CARD_LINK)
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| href.contains("/properties/"))
            .map(|href| ListingRef::new(absolutize(SITE_URL, href)))
            .collect())
    }

    fn next_page_url(&self, index_html: &str, _page_no: u32) -> Option<String> {
        let doc = Html::parse_document(index_html);
        let next = doc.select(&SEL_NEXT_PAGE).next()?;
        if next.value().attr("disabled").is_some() {
            return None;
        }
        next.value()
            .attr("href")
            .map(|href| absolutize(SITE_URL, href))
    }

    fn extract(&self, reference: &ListingRef, view: &PageView) -> Result<RawRecord, ScrapeError> {
        let property_id = RE_PROPERTY_ID
            .captures(&reference.url)
            .map(|caps| caps[1].to_string())
            .ok_or(ScrapeError::MalformedField {
                field: "property_url",
                raw: reference.url.clone(),
            })?;

        let bundle = triage(&view.payloads, &property_id);
        let mut raw = RawRecord::new(Source::Crexi, reference.url.clone());

        if bundle.auction.is_some() || bundle.asset.is_some() {
            if let Some(auction) = bundle.auction {
                raw.property_name = json_scalar(auction.get("propertyName"));
                raw.address = json_scalar(auction.get("propertyAddress"));
                raw.bidding_starts = json_scalar(auction.get("auctionStartsOn"));
                raw.bidding_ends = json_scalar(auction.get("auctionEndsOn"));
                raw.starting_bid = json_scalar(auction.get("startingBid"));
                if raw.bidding_ends.is_empty() && !raw.bidding_starts.is_empty() {
                    raw.bidding_ends = default_end(&raw.bidding_starts);
                }
            }
            if let Some(asset) = bundle.asset {
                raw.property_type = asset
                    .get("types")
                    .and_then(|t| t.as_array())
                    .map(|types| {
                        types
                            .iter()
                            .filter_map(|t| t.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                raw.year_built = json_scalar(asset.pointer("/details/Year Built"));
                raw.building_size = json_scalar(asset.pointer("/details/Square Footage"));
            }
            if let Some(brokers) = bundle.brokers.and_then(|b| b.as_array()) {
                raw.brokers = brokers
                    .iter()
                    .take(3)
                    .map(|b| {
                        format!(
                            "{} {}",
                            json_scalar(b.get("firstName")),
                            json_scalar(b.get("lastName"))
                        )
                        .trim()
                        .to_string()
                    })
                    .filter(|name| !name.is_empty())
                    .collect();
            }
        } else {
            // API capture came up empty; work the rendered DOM instead.
            let doc = Html::parse_document(&view.html);
            let listing_ld = doc
                .select(&SEL_LD_JSON)
                .filter_map(|s| {
                    serde_json::from_str::<serde_json::Value>(&s.text().collect::<String>()).ok()
                })
                .find(|v| v.get("@type").and_then(|t| t.as_str()) == Some("RealEstateListing"));
            let heading = doc
                .select(&SEL_H1)
                .next()
                .map(|h| h.text().collect::<String>());

            if listing_ld.is_none() && heading.is_none() {
                return Err(ScrapeError::StructureChanged {
                    anchor: "crexi auction api payload / ld+json",
                });
            }

            if let Some(ld) = &listing_ld {
                raw.property_name = json_scalar(ld.get("name"));
                if let Some(desc) = ld.get("description").and_then(|d| d.as_str()) {
                    raw.address = find_address(desc).unwrap_or_default();
                }
            }
            if raw.property_name.trim().is_empty() {
                raw.property_name = heading.unwrap_or_default();
            }
            if raw.address.trim().is_empty() {
                raw.address = find_address(&view.html).unwrap_or_default();
            }
        }

        if raw.property_name.trim().is_empty() && raw.address.trim().is_empty() {
            return Err(ScrapeError::MissingField {
                field: "propertyName",
            });
        }

        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_core::clean::normalize;

    const INDEX_HTML: &str = r#"<html><body>
        <a class="cui-card-cover-link" href="/properties/1810000/gateway-industrial"></a>
        <a class="cui-card-cover-link" href="/properties/1810001/main-street-retail"></a>
        <a class="cui-card-cover-link" href="/about-us"></a>
        <a data-cy="nextPage" href="/properties/Auctions?page=2&amp;pageSize=60">Next</a>
        </body></html>"#;

    fn auction_payload() -> Payload {
        Payload {
            url: "https://api.crexi.com/auctions/1810000".into(),
            body: serde_json::json!({
                "propertyName": "Gateway Industrial Park",
                "propertyAddress": "8801 Gateway Blvd, El Paso, TX 79904",
                "auctionStartsOn": "2025-10-06T16:00:00Z",
                "auctionEndsOn": "",
                "startingBid": 250000,
            }),
        }
    }

    fn asset_payload() -> Payload {
        Payload {
            url: "https://api.crexi.com/assets/1810000".into(),
            body: serde_json::json!({
                "types": ["Industrial", "Warehouse"],
                "details": {"Year Built": "1987", "Square Footage": "112,000"},
            }),
        }
    }

    fn brokers_payload() -> Payload {
        Payload {
            url: "https://api.crexi.com/assets/1810000/brokers".into(),
            body: serde_json::json!([
                {"firstName": "Jane", "lastName": "Doe"},
                {"firstName": "John", "lastName": "Smith"},
                {"firstName": "Ann", "lastName": "Lee"},
                {"firstName": "Extra", "lastName": "Broker"},
            ]),
        }
    }

    fn reference() -> ListingRef {
        ListingRef::new("https://www.crexi.com/properties/1810000/gateway-industrial")
    }

    #[test]
    fn index_refs_come_from_card_links() {
        let refs = CrexiStrategy::new().listing_refs(INDEX_HTML).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(
            refs[0].url,
            "https://www.crexi.com/properties/1810000/gateway-industrial"
        );
    }

    #[test]
    fn next_page_follows_enabled_control() {
        let next = CrexiStrategy::new().next_page_url(INDEX_HTML, 1).unwrap();
        assert_eq!(
            next,
            "https://www.crexi.com/properties/Auctions?page=2&pageSize=60"
        );

        let last_page = r#"<a data-cy="nextPage" disabled href="/x">Next</a>"#;
        assert!(CrexiStrategy::new().next_page_url(last_page, 5).is_none());
        assert!(CrexiStrategy::new().next_page_url("<html></html>", 5).is_none());
    }

    #[test]
    fn extract_prefers_api_payloads() {
        let view = PageView {
            html: "<html><body></body></html>".into(),
            payloads: vec![auction_payload(), asset_payload(), brokers_payload()],
        };
        let raw = CrexiStrategy::new().extract(&reference(), &view).unwrap();

        assert_eq!(raw.property_name, "Gateway Industrial Park");
        assert_eq!(raw.address, "8801 Gateway Blvd, El Paso, TX 79904");
        assert_eq!(raw.starting_bid, "250000");
        assert_eq!(raw.property_type, "Industrial, Warehouse");
        assert_eq!(raw.year_built, "1987");
        assert_eq!(raw.building_size, "112,000");
        assert_eq!(raw.brokers, vec!["Jane Doe", "John Smith", "Ann Lee"]);

        let record = normalize(raw);
        assert_eq!(record.starting_bid, Some(250_000.0));
        assert_eq!(record.building_size, "112000 SF");
        assert_eq!(record.year_built, Some(1987));
    }

    #[test]
    fn missing_end_defaults_to_start_plus_two_days() {
        let view = PageView {
            html: "<html><body></body></html>".into(),
            payloads: vec![auction_payload()],
        };
        let raw = CrexiStrategy::new().extract(&reference(), &view).unwrap();
        let record = normalize(raw);
        assert_eq!(
            record
                .bidding_ends
                .unwrap()
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "2025-10-08T16:00:00Z"
        );
    }

    #[test]
    fn dom_fallback_reads_heading_when_capture_is_empty() {
        let view = PageView::dom_only(
            r#"<html><body><h1>Main Street Retail</h1>
            <p>1 Main St, Springfield, IL 62701</p></body></html>"#,
        );
        let raw = CrexiStrategy::new().extract(&reference(), &view).unwrap();
        assert_eq!(raw.property_name, "Main Street Retail");
        assert_eq!(raw.address, "1 Main St, Springfield, IL 62701");
    }

    #[test]
    fn bare_page_without_payloads_is_structure_changed() {
        let view = PageView::dom_only("<html><body><div>spinner</div></body></html>");
        let err = CrexiStrategy::new().extract(&reference(), &view).unwrap_err();
        assert!(matches!(err, ScrapeError::StructureChanged { .. }));
    }

    #[test]
    fn payload_triage_keeps_brokers_separate_from_asset() {
        let payloads = vec![brokers_payload(), asset_payload(), auction_payload()];
        let bundle = triage(&payloads, "1810000");
        assert!(bundle.asset.is_some());
        assert!(bundle.auction.is_some());
        assert!(bundle.brokers.is_some());
        assert!(bundle.brokers.unwrap().is_array());
    }
}
