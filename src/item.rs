//! Item rows and the derived classifications hung off them.
//!
//! A scanned item is a post or comment attributed to a username. Stories gain
//! three derived sub-kinds from a case-insensitive title prefix (`Ask HN:`,
//! `Show HN:`, `Launch HN:`). Two more derivations feed the per-user side
//! tables: the URL host with a leading `www.` stripped, and the UTC
//! `YYYY-MM` month key of the item timestamp.

use chrono::DateTime;
use regex::Regex;
use std::sync::LazyLock;

static ASK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^Ask HN:").unwrap());
static SHOW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^Show HN:").unwrap());
static LAUNCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^Launch HN:").unwrap());

/// One row from a shard's `items` table, restricted to the scan columns.
///
/// Scan rows are always attributed: the shard scan filters on `by IS NOT
/// NULL`, so `by` is concrete here even though the column is nullable.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub id: i64,
    pub kind: String,
    pub time: Option<i64>,
    pub by: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: Option<f64>,
}

/// Type flags for one item, including the title-derived story sub-kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemClass {
    pub comment: bool,
    pub story: bool,
    pub ask: bool,
    pub show: bool,
    pub launch: bool,
    pub job: bool,
    pub poll: bool,
}

/// Classify an item by its `type` column and (for stories) title prefix.
#[must_use]
pub fn classify(kind: &str, title: Option<&str>) -> ItemClass {
    let story = kind == "story";
    let title = title.unwrap_or("");
    ItemClass {
        comment: kind == "comment",
        story,
        ask: story && ASK_RE.is_match(title),
        show: story && SHOW_RE.is_match(title),
        launch: story && LAUNCH_RE.is_match(title),
        job: kind == "job",
        poll: kind == "poll",
    }
}

/// Extract the host from a URL, with any leading `www.` stripped.
///
/// Returns `None` when the input has no recognizable absolute-URL shape or
/// an empty host. Ports are kept as part of the host.
#[must_use]
pub fn domain_from_url(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    let authority = rest.split(['/', '?', '#']).next()?;
    // Drop any userinfo before the host.
    let host = authority.rsplit('@').next()?;
    if host.is_empty() {
        return None;
    }
    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return None;
    }
    Some(host.to_string())
}

/// UTC `YYYY-MM` month key for an epoch-seconds timestamp.
///
/// A zero timestamp yields `None`: epoch-zero times are placeholder values
/// in the source data and never contribute a month.
#[must_use]
pub fn month_key(time: i64) -> Option<String> {
    if time == 0 {
        return None;
    }
    let dt = DateTime::from_timestamp(time, 0)?;
    Some(dt.format("%Y-%m").to_string())
}
