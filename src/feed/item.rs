use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// Which dashboard feed an item belongs to.
///
/// Assigned by the owning feed at fetch time, never inferred from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    News,
    Event,
    Video,
    InstantLaunch,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::News => "news",
            ItemKind::Event => "event",
            ItemKind::Video => "video",
            ItemKind::InstantLaunch => "instant_launch",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized feed entry, shared by every feed kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub title: String,
    /// Absolute http(s) URL.
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    /// May be empty.
    pub summary: String,
    pub kind: ItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl Item {
    /// Build an item, deriving a stable id when the source supplies none.
    pub fn new(
        existing_id: Option<&str>,
        title: String,
        link: String,
        published_at: Option<DateTime<Utc>>,
        summary: String,
        kind: ItemKind,
    ) -> Self {
        let id = generate_id(existing_id, &link, &title, published_at);
        Self {
            id,
            title,
            link,
            published_at,
            summary,
            kind,
            thumbnail: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }
}

/// Newest first; items without a publication time go last.
pub fn newest_first(a: &Item, b: &Item) -> Ordering {
    match (a.published_at, b.published_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable sort so entries with equal timestamps keep their document order.
pub fn sort_newest_first(items: &mut [Item]) {
    items.sort_by(newest_first);
}

fn generate_id(
    existing: Option<&str>,
    link: &str,
    title: &str,
    published_at: Option<DateTime<Utc>>,
) -> String {
    if let Some(id) = existing {
        let trimmed = id.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        link,
        title,
        published_at.map(|p| p.timestamp().to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
