//! HTML extraction for the Downloads page listing.
//!
//! The only place in the crate that knows the page markup. Raw HTML goes in,
//! an ordered sequence of [`DownloadItem`]s comes out, so the session client
//! never depends on page structure directly and the selectors can be tested
//! offline against saved page fixtures.
//!
//! Selector map (Bitbucket Downloads page):
//! - `#uploaded-files .iterable-item` - one row per uploaded file
//! - `td.delete a` - delete link carrying `data-id` / `data-filename`
//! - `td.size`, `td.count` - human-readable size, download count
//! - `td.uploaded-by a` - uploader account name
//! - `time[datetime]` - machine-readable upload timestamp (RFC 3339)

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};

/// One row of the remote listing: a previously uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadItem {
    /// Identifier Bitbucket uses for deleting the file.
    pub id: String,
    /// File name.
    pub name: String,
    /// File size as shown on the page (e.g. `32 MB`), not parsed to bytes.
    pub size: String,
    /// Download count.
    pub count: u64,
    /// Uploader account name (can be a team account).
    pub uploader: String,
    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
}

static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector("#uploaded-files .iterable-item"));
static DELETE_LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("td.delete a"));
static SIZE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("td.size"));
static COUNT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("td.count"));
static UPLOADER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("td.uploaded-by a"));
static TIME_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("time"));

/// Parses a static CSS selector known to be valid.
#[allow(clippy::expect_used)]
fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// Extracts the uploaded-files listing from a Downloads page body.
///
/// Items are returned in the order rows appear on the page (the site's own
/// ordering, most recent first). An empty or missing table yields an empty
/// vector. Rows that lack the delete link or carry an unparseable timestamp
/// are skipped with a warning rather than failing the whole listing, since
/// the markup is version-fragile.
#[must_use]
pub fn parse_downloads_page(html: &str) -> Vec<DownloadItem> {
    let document = Html::parse_document(html);
    let items: Vec<DownloadItem> = document
        .select(&ROW_SELECTOR)
        .filter_map(extract_item)
        .collect();
    debug!(count = items.len(), "extracted listing rows");
    items
}

/// Extracts one `DownloadItem` from a listing row, or `None` if the row does
/// not match the expected markup.
fn extract_item(row: ElementRef<'_>) -> Option<DownloadItem> {
    let Some(delete_link) = row.select(&DELETE_LINK_SELECTOR).next() else {
        warn!("listing row has no delete link, skipping");
        return None;
    };
    let (Some(id), Some(name)) = (
        delete_link.value().attr("data-id"),
        delete_link.value().attr("data-filename"),
    ) else {
        warn!("delete link is missing data-id/data-filename, skipping row");
        return None;
    };

    let size = cell_text(row, &SIZE_SELECTOR);
    let count = parse_count(&cell_text(row, &COUNT_SELECTOR), name);
    let uploader = cell_text(row, &UPLOADER_SELECTOR);

    let Some(uploaded_at) = row
        .select(&TIME_SELECTOR)
        .next()
        .and_then(|time| time.value().attr("datetime"))
        .and_then(parse_datetime)
    else {
        warn!(name, "listing row has no parseable upload timestamp, skipping");
        return None;
    };

    Some(DownloadItem {
        id: id.to_string(),
        name: name.to_string(),
        size,
        count,
        uploader,
        uploaded_at,
    })
}

/// Collects the trimmed text of the first element matching `selector` in `row`.
fn cell_text(row: ElementRef<'_>, selector: &Selector) -> String {
    row.select(selector)
        .next()
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Parses a download count cell. An unparseable count degrades to zero: the
/// id and filename are the fields deletion depends on, so a cosmetic cell
/// must not drop the whole row.
fn parse_count(text: &str, name: &str) -> u64 {
    match text.parse::<u64>() {
        Ok(count) => count,
        Err(_) => {
            warn!(name, count = text, "unparseable download count, using 0");
            0
        }
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
