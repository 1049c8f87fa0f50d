//! Item discovery
//!
//! Turns hrefs found on the timeline into items. An item's identifier is the
//! final path segment of its URL.

use chrono::{DateTime, Utc};
use url::Url;

/// One discovered feed entry, immutable once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Identifier extracted from the item URL
    pub id: String,

    /// Source URL the item was discovered at
    pub url: String,

    /// When the item was first seen
    pub discovered_at: DateTime<Utc>,
}

impl Item {
    pub fn new(id: String, url: String) -> Self {
        Self {
            id,
            url,
            discovered_at: Utc::now(),
        }
    }
}

/// Derives an item identifier from a discovered href
///
/// Returns the final non-empty path segment, or None when the href is not a
/// parseable URL or has no path.
pub fn item_id_from_url(href: &str) -> Option<String> {
    let parsed = Url::parse(href).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
