//! Instant-launch listing from the application-exposer service.
//!
//! The service returns promoted launches as JSON, either a bare array or an
//! object wrapping the array under `instant_launches`. Each launch becomes an
//! [`Item`] whose link points into the dashboard UI.

use crate::feed::item::{Item, ItemKind};
use crate::feed::parser::ParseResult;
use crate::util::{clean_text, push_segment};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
    Bare(Vec<LaunchRecord>),
    Wrapped { instant_launches: Vec<LaunchRecord> },
}

#[derive(Debug, Deserialize)]
struct LaunchRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    quick_launch_id: Option<String>,
    #[serde(default)]
    quick_launch_name: Option<String>,
    #[serde(default)]
    quick_launch_description: Option<String>,
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    added_on: Option<String>,
}

/// Parses the instant-launch listing.
///
/// Records without an `id` are skipped. Titles fall back from the quick
/// launch name to the app name to the quick launch id.
pub fn parse_instant_launches(bytes: &[u8], launch_url_base: &Url) -> Result<ParseResult> {
    let listing: Listing =
        serde_json::from_slice(bytes).context("instant launch listing is not valid JSON")?;
    let records = match listing {
        Listing::Bare(records) => records,
        Listing::Wrapped { instant_launches } => instant_launches,
    };

    let total = records.len();
    let mut items = Vec::with_capacity(total);

    for record in records {
        let Some(id) = record.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            tracing::debug!(?record, "Skipping instant launch without an id");
            continue;
        };
        let link = match push_segment(launch_url_base, id) {
            Ok(link) => link,
            Err(e) => {
                tracing::debug!(id, error = %e, "Skipping instant launch with unusable id");
                continue;
            }
        };

        let title = record
            .quick_launch_name
            .as_deref()
            .or(record.app_name.as_deref())
            .or(record.quick_launch_id.as_deref())
            .map(clean_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());
        let summary = record
            .quick_launch_description
            .as_deref()
            .map(clean_text)
            .unwrap_or_default();
        let published_at = record.added_on.as_deref().and_then(parse_timestamp);

        items.push(Item::new(
            Some(id),
            title,
            link.into(),
            published_at,
            summary,
            ItemKind::InstantLaunch,
        ));
    }

    let skipped = total - items.len();
    if total > 0 && items.is_empty() {
        bail!("all {} instant launches lacked a usable id", total);
    }

    Ok(ParseResult { items, skipped })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://de.example.org/instantlaunch").unwrap()
    }

    #[test]
    fn test_parse_bare_array() {
        let json = r#"[
            {"id": "il-1", "quick_launch_id": "ql-1", "quick_launch_name": "Jupyter Lab",
             "quick_launch_description": "Notebook", "added_on": "2024-05-01T00:00:00Z"},
            {"id": "il-2", "app_name": "RStudio"}
        ]"#;
        let result = parse_instant_launches(json.as_bytes(), &base()).unwrap();
        assert_eq!(result.skipped, 0);
        assert_eq!(result.items.len(), 2);

        let first = &result.items[0];
        assert_eq!(first.id, "il-1");
        assert_eq!(first.title, "Jupyter Lab");
        assert_eq!(first.summary, "Notebook");
        assert_eq!(first.link, "https://de.example.org/instantlaunch/il-1");
        assert_eq!(first.kind, ItemKind::InstantLaunch);
        assert!(first.published_at.is_some());

        assert_eq!(result.items[1].title, "RStudio");
        assert!(result.items[1].published_at.is_none());
    }

    #[test]
    fn test_parse_wrapped_object() {
        let json = r#"{"instant_launches": [{"id": "il-9", "quick_launch_id": "ql-9"}]}"#;
        let result = parse_instant_launches(json.as_bytes(), &base()).unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].title, "ql-9");
    }

    #[test]
    fn test_url_like_ids_stay_under_launch_base() {
        let json = r#"[{"id": "javascript:alert(1)"}, {"id": "urn:foo"}, {"id": "https://evil.example.com/x"}]"#;
        let result = parse_instant_launches(json.as_bytes(), &base()).unwrap();
        assert_eq!(result.items.len(), 3);
        for item in &result.items {
            assert!(
                item.link.starts_with("https://de.example.org/instantlaunch/"),
                "{} escaped the launch base",
                item.link
            );
        }
        assert_eq!(
            result.items[2].link,
            "https://de.example.org/instantlaunch/https:%2F%2Fevil.example.com%2Fx"
        );
    }

    #[test]
    fn test_records_without_id_are_skipped() {
        let json = r#"[{"id": "il-1"}, {"quick_launch_name": "orphan"}, {"id": "  "}]"#;
        let result = parse_instant_launches(json.as_bytes(), &base()).unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.skipped, 2);
    }

    #[test]
    fn test_all_records_invalid_is_an_error() {
        let json = r#"[{"quick_launch_name": "orphan"}]"#;
        assert!(parse_instant_launches(json.as_bytes(), &base()).is_err());
    }

    #[test]
    fn test_empty_listing_is_ok() {
        let result = parse_instant_launches(b"[]", &base()).unwrap();
        assert!(result.items.is_empty());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(parse_instant_launches(b"<html>", &base()).is_err());
    }
}
