use crate::feed::item::{Item, ItemKind};
use crate::util::{clean_text, resolve_link, strip_markup};
use anyhow::{bail, Result};
use feed_rs::model::Entry;
use feed_rs::parser;
use url::Url;

/// Items recovered from one document plus the number of entries dropped
/// because they had no usable link.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub items: Vec<Item>,
    pub skipped: usize,
}

/// Parses an RSS, Atom, or JSON Feed document into items of `kind`.
///
/// Relative entry links are resolved against `base`. Entries without a
/// usable link are skipped; if the document had entries and every one of
/// them was skipped, the whole parse fails.
pub fn parse_syndication(bytes: &[u8], kind: ItemKind, base: Option<&Url>) -> Result<ParseResult> {
    let feed = parser::parse(bytes)?;
    collect(feed.entries, base, |entry, link| {
        let published = entry.published.or(entry.updated);
        let summary = entry
            .summary
            .as_ref()
            .map(|s| s.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
            .map(|s| strip_markup(&s))
            .unwrap_or_default();

        Item::new(
            Some(entry.id.as_str()),
            entry_title(entry),
            link,
            published,
            summary,
            kind,
        )
    })
}

/// Parses a video listing (an Atom document with `media:group` metadata).
///
/// Description and thumbnail come from the first media object when present.
pub fn parse_video_listing(bytes: &[u8], base: Option<&Url>) -> Result<ParseResult> {
    let feed = parser::parse(bytes)?;
    collect(feed.entries, base, |entry, link| {
        let media = entry.media.first();
        let summary = media
            .and_then(|m| m.description.as_ref())
            .map(|d| d.content.clone())
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
            .map(|s| clean_text(&s))
            .unwrap_or_default();
        let thumbnail = media
            .and_then(|m| m.thumbnails.first())
            .map(|t| t.image.uri.clone());

        Item::new(
            Some(entry.id.as_str()),
            entry_title(entry),
            link,
            entry.published.or(entry.updated),
            summary,
            ItemKind::Video,
        )
        .with_thumbnail(thumbnail)
    })
}

fn collect<F>(entries: Vec<Entry>, base: Option<&Url>, build: F) -> Result<ParseResult>
where
    F: Fn(&Entry, String) -> Item,
{
    let total = entries.len();
    let mut items = Vec::with_capacity(total);

    for entry in &entries {
        match entry_link(entry, base) {
            Some(link) => items.push(build(entry, link)),
            None => {
                tracing::debug!(entry_id = %entry.id, "Skipping entry without a usable link");
            }
        }
    }

    let skipped = total - items.len();
    if total > 0 && items.is_empty() {
        bail!("all {} entries lacked a usable link", total);
    }

    Ok(ParseResult { items, skipped })
}

/// Prefers the `alternate` link, falling back to the first link that resolves.
fn entry_link(entry: &Entry, base: Option<&Url>) -> Option<String> {
    let alternate = entry
        .links
        .iter()
        .filter(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"));
    let others = entry.links.iter();

    alternate
        .chain(others)
        .find_map(|l| resolve_link(&l.href, base).ok())
        .map(String::from)
}

fn entry_title(entry: &Entry) -> String {
    entry
        .title
        .as_ref()
        .map(|t| clean_text(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}
