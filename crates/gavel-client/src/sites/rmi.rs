//! RMI Marketplace auction extraction.
//!
//! The search index grows through a load-more control rather than
//! numbered pages. Detail pages are backed by the marketplace API, so
//! extraction reads the intercepted detail payload and probes its
//! `asset_info` blocks for a building size, with a thin DOM fallback.

use std::sync::LazyLock;
use std::time::Duration;

use scraper::{Html, Selector};

use gavel_core::clean::parse_currency;
use gavel_core::error::ScrapeError;
use gavel_core::paginate::PaginationMode;
use gavel_core::record::{ListingRef, PayloadMatcher, RawRecord, Source};
use gavel_core::traits::{PageView, SiteStrategy};

use super::{absolutize, json_scalar};

const SITE_URL: &str = "https://rimarketplace.com";
const SEARCH_URL: &str = "https://rimarketplace.com/commercial/search/lt=auction";

static SEL_AUCTION_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/auction/"]"#).expect("valid selector"));
static SEL_H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
static SEL_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

/// Field names that carry a building size somewhere in `asset_info`.
const SIZE_KEYS: [&str; 8] = [
    "building_size",
    "buildingSize",
    "sqft",
    "sf",
    "grossLeasableArea",
    "gross_leasable_area",
    "totalArea",
    "total_area",
];

/// Gross-leasable-area fields on the `information` block, probed in order
/// when `asset_info` has nothing.
const GLA_KEYS: [&str; 5] = [
    "office_grossLeasableArea",
    "retail_grossLeasableArea",
    "industrial_grossLeasableArea",
    "multifamily_grossLeasableArea",
    "grossLeasableArea",
];

pub struct RmiStrategy {
    search_url: String,
}

impl RmiStrategy {
    pub fn new() -> Self {
        Self {
            search_url: SEARCH_URL.to_string(),
        }
    }
}

impl Default for RmiStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe the detail payload's `asset_info` entries for any size-like
/// field with a usable numeric value.
fn asset_info_size(asset_info: Option<&serde_json::Value>) -> Option<f64> {
    let items = asset_info?.as_array()?;
    for item in items {
        let Some(object) = item.as_object() else {
            continue;
        };
        for (key, value) in object {
            let key_matches = SIZE_KEYS
                .iter()
                .any(|k| key.to_lowercase().contains(&k.to_lowercase()));
            if !key_matches {
                continue;
            }
            if let Some(size) = parse_currency(&json_scalar(Some(value))) {
                if size > 0.0 {
                    return Some(size);
                }
            }
        }
    }
    None
}

impl SiteStrategy for RmiStrategy {
    fn source(&self) -> Source {
        Source::Rmi
    }

    fn start_url(&self) -> String {
        self.search_url.clone()
    }

    fn pagination(&self) -> PaginationMode {
        PaginationMode::Incremental {
            load_more: "button.load-more",
            poll_interval: Duration::from_secs(2),
            stagnation_polls: 3,
        }
    }

    fn payload_matcher(&self) -> Option<PayloadMatcher> {
        Some(PayloadMatcher::url_contains("api.rimarketplace.com"))
    }

    fn listing_refs(&self, index_html: &str) -> Result<Vec<ListingRef>, ScrapeError> {
        let doc = Html::parse_document(index_html);
        Ok(doc
            .select(&SEL_AUCTION_LINK)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| ListingRef::new(absolutize(SITE_URL, href)))
            .collect())
    }

    fn next_page_url(&self, _index_html: &str, _page_no: u32) -> Option<String> {
        None
    }

    fn extract(&self, reference: &ListingRef, view: &PageView) -> Result<RawRecord, ScrapeError> {
        let detail = view
            .payloads
            .iter()
            .find(|p| p.body.pointer("/data/propertyList/0/information").is_some());

        let mut raw = RawRecord::new(Source::Rmi, reference.url.clone());

        match detail {
            Some(payload) => {
                let info = payload
                    .body
                    .pointer("/data/propertyList/0/information")
                    .cloned()
                    .unwrap_or_default();

                raw.property_name = json_scalar(info.get("propertyName"));
                raw.address = [
                    json_scalar(info.get("propertyAddress")),
                    json_scalar(info.get("propertyCity")),
                    json_scalar(info.get("propertyState")),
                    json_scalar(info.get("propertyZip")),
                ]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");

                raw.bidding_starts = json_scalar(info.get("startBidding"));
                raw.bidding_ends = json_scalar(info.get("endBidding"));
                raw.starting_bid = json_scalar(info.get("start_bid"));
                raw.property_type = json_scalar(info.get("property_type_name"));
                raw.year_built = json_scalar(info.get("yearBuilt"));

                let size = asset_info_size(payload.body.pointer("/data/propertyList/0/asset_info"))
                    .or_else(|| {
                        GLA_KEYS.iter().find_map(|key| {
                            parse_currency(&json_scalar(info.get(*key))).filter(|v| *v > 0.0)
                        })
                    });
                if let Some(size) = size {
                    raw.building_size = format!("{}", size as u64);
                }

                raw.brokers = payload
                    .body
                    .pointer("/data/listedBrokers")
                    .and_then(|b| b.as_array())
                    .map(|brokers| {
                        brokers
                            .iter()
                            .take(3)
                            .map(|b| json_scalar(b.get("name")))
                            .filter(|name| !name.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();
            }
            None => {
                // No API payload in the capture window; the DOM carries
                // little, but a heading is enough to keep the listing.
                let doc = Html::parse_document(&view.html);
                let heading = doc
                    .select(&SEL_H1)
                    .next()
                    .or_else(|| doc.select(&SEL_TITLE).next())
                    .map(|e| e.text().collect::<String>());
                match heading {
                    Some(name) if !name.trim().is_empty() => raw.property_name = name,
                    _ => {
                        return Err(ScrapeError::StructureChanged {
                            anchor: "rmi auction detail api payload",
                        });
                    }
                }
            }
        }

        if raw.property_name.trim().is_empty() {
            return Err(ScrapeError::MissingField {
                field: "propertyName",
            });
        }

        Ok(raw)
    }
}
