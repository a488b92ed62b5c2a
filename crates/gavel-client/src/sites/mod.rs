//! Site-specific extraction strategies sharing one orchestration core.
//!
//! Each strategy maps one marketplace's DOM/JSON shapes to the canonical
//! raw record; all format coercion lives in the core cleaner.

mod crexi;
mod loopnet;
mod rmi;

pub use crexi::CrexiStrategy;
pub use loopnet::LoopNetStrategy;
pub use rmi::RmiStrategy;

use std::sync::LazyLock;

use regex::Regex;

/// US street address: "293 Patriot Way, Rochester, NY 14624".
static RE_US_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\s+[^,\n]+,\s*[^,\n]+,\s*[A-Z]{2}\s+\d{5}").expect("valid regex")
});

fn find_address(text: &str) -> Option<String> {
    RE_US_ADDRESS.find(text).map(|m| m.as_str().to_string())
}

/// Resolve `href` against `base`, passing absolute URLs through.
fn absolutize(base: &str, href: &str) -> String {
    url::Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Render a JSON scalar as the raw string the cleaner expects. Objects,
/// arrays, and null come back empty.
fn json_scalar(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Clip raw field context kept in error values to a sane length.
fn clip(raw: &str) -> String {
    const MAX: usize = 160;
    if raw.len() <= MAX {
        raw.to_string()
    } else {
        let mut end = MAX;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &raw[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_pattern_matches_us_format() {
        let text = "Auction for 293 Patriot Way, Rochester, NY 14624 ends soon";
        assert_eq!(
            find_address(text).unwrap(),
            "293 Patriot Way, Rochester, NY 14624"
        );
        assert!(find_address("no address here").is_none());
    }

    #[test]
    fn absolutize_joins_and_passes_through() {
        assert_eq!(
            absolutize("https://www.crexi.com", "/properties/42/foo"),
            "https://www.crexi.com/properties/42/foo"
        );
        assert_eq!(
            absolutize("https://www.crexi.com", "https://other.example/x"),
            "https://other.example/x"
        );
    }

    #[test]
    fn json_scalar_renders_strings_and_numbers() {
        let v = serde_json::json!({"s": "text", "n": 250000, "o": {"inner": 1}});
        assert_eq!(json_scalar(v.get("s")), "text");
        assert_eq!(json_scalar(v.get("n")), "250000");
        assert_eq!(json_scalar(v.get("o")), "");
        assert_eq!(json_scalar(v.get("missing")), "");
    }
}
