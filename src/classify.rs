//! URL noise filter.
//!
//! Decides whether a sitemap or page URL carries content that should not take
//! part in snapshot comparison: blog and archive sections, translated copies
//! of the site, and dated content from earlier years.

use chrono::{Datelike, NaiveDate};

/// Substrings that mark blog or archive content.
const NOISE_PATTERNS: &[&str] = &["blog", "archive"];

/// Locale path segments treated as translated duplicates. `en` is not listed.
const LOCALE_SEGMENTS: &[&str] = &[
    "/ar/", "/az/", "/be/", "/bg/", "/ca/", "/cs/", "/de/", "/es/", "/fa/", "/fr/", "/he/",
    "/hi/", "/hu/", "/hy/", "/id/", "/it/", "/ja/", "/ka/", "/kk/", "/nl/", "/pl/", "/pt/",
    "/ro/", "/ru/", "/sk/", "/sr/", "/th/", "/tk/", "/tr/", "/uk/", "/uz/", "/vi/", "/zh/",
    "/dk/", "/jp/",
];

/// Returns `true` when `url` should be excluded from snapshots.
///
/// `now` supplies the current year for the dated-content rule; it is never
/// read from the system clock here.
pub fn should_skip(url: &str, now: NaiveDate) -> bool {
    let lower = url.to_lowercase();

    if NOISE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return true;
    }

    if LOCALE_SEGMENTS.iter().any(|p| lower.contains(p)) {
        return true;
    }

    year_segments(url).any(|year| year < now.year())
}

/// Yields every `/YYYY/` segment of `url` as an integer.
///
/// A segment counts only when it sits between two slashes and is exactly
/// four ASCII digits.
fn year_segments(url: &str) -> impl Iterator<Item = i32> + '_ {
    let mut parts: Vec<&str> = url.split('/').collect();
    // The last piece has no closing slash.
    parts.pop();
    parts
        .into_iter()
        .skip(1)
        .filter(|s| s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|s| s.parse::<i32>().ok())
}
