//! Raw-to-canonical sitemap conversion.
//!
//! The fetcher produces a [`RawSitemap`] tree straight from remote XML or
//! text, with every field still a string. [`normalize`] filters that tree
//! through [`should_skip`](crate::classify::should_skip) and coerces each
//! page into the canonical [`Page`] shape that snapshots are compared on.
//!
//! The raw tree comes from an untrusted host, so the walk is bounded by
//! [`NormalizeLimits`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::classify::should_skip;
use crate::models::{ChangeFrequency, NewsStory, Page, SitemapKind, SitemapNode};

/// Priority assumed when a sitemap omits `<priority>` or gives garbage.
pub const DEFAULT_PRIORITY: f64 = 0.5;

/// Raw sitemap tree as delivered by a fetcher.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSitemap {
    Index {
        url: String,
        kind: SitemapKind,
        sub_sitemaps: Vec<RawSitemap>,
    },
    Pages {
        url: String,
        kind: SitemapKind,
        pages: Vec<RawPage>,
    },
    Invalid {
        url: String,
        reason: String,
    },
}

impl RawSitemap {
    pub fn url(&self) -> &str {
        match self {
            RawSitemap::Index { url, .. }
            | RawSitemap::Pages { url, .. }
            | RawSitemap::Invalid { url, .. } => url,
        }
    }
}

/// A `<url>` entry or text-sitemap line, fields verbatim.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPage {
    pub url: String,
    pub priority: Option<String>,
    pub last_modified: Option<String>,
    pub change_frequency: Option<String>,
    pub news_story: Option<RawNewsStory>,
}

/// `<news:news>` block, fields verbatim.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawNewsStory {
    pub title: String,
    pub publish_date: Option<String>,
    pub publication_name: Option<String>,
    pub publication_language: Option<String>,
    pub access: Option<String>,
    pub genres: Vec<String>,
    pub keywords: Vec<String>,
    pub stock_tickers: Vec<String>,
}

/// Bounds on the raw tree walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeLimits {
    /// Maximum nesting depth; the root is depth 0.
    pub max_depth: usize,
    /// Maximum number of fetched sitemap documents (index, XML or text
    /// nodes). The website root, the robots.txt index and invalid
    /// placeholders are not counted, matching the fetcher's budget.
    pub max_nodes: usize,
}

impl Default for NormalizeLimits {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_nodes: 5000,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("sitemap tree deeper than {limit} levels at {url}")]
    TooDeep { url: String, limit: usize },
    #[error("sitemap tree has more than {limit} nodes")]
    TooManyNodes { limit: usize },
}

/// Convert a raw tree into a canonical, filtered [`SitemapNode`].
///
/// A skipped root still yields a node (same variant and kind, no content) so
/// the site is recorded even when everything is filtered out. Page URLs are
/// trimmed and deduplicated across the whole tree: the first occurrence in
/// document order is kept.
pub fn normalize(
    raw: &RawSitemap,
    now: NaiveDate,
    limits: NormalizeLimits,
) -> Result<SitemapNode, NormalizeError> {
    if should_skip(raw.url(), now) {
        return Ok(empty_like(raw));
    }
    let mut walker = Walker {
        now,
        limits,
        visited: 0,
        seen_pages: HashSet::new(),
    };
    walker.node(raw, 0)
}

struct Walker {
    now: NaiveDate,
    limits: NormalizeLimits,
    visited: usize,
    seen_pages: HashSet<String>,
}

/// Whether `kind` stands for a document fetched from the site.
fn is_fetched_document(kind: SitemapKind) -> bool {
    matches!(
        kind,
        SitemapKind::XmlIndex | SitemapKind::XmlPages | SitemapKind::TextPages
    )
}

impl Walker {
    fn node(&mut self, raw: &RawSitemap, depth: usize) -> Result<SitemapNode, NormalizeError> {
        if depth > self.limits.max_depth {
            return Err(NormalizeError::TooDeep {
                url: raw.url().to_string(),
                limit: self.limits.max_depth,
            });
        }
        let counted = match raw {
            RawSitemap::Index { kind, .. } | RawSitemap::Pages { kind, .. } => {
                is_fetched_document(*kind)
            }
            RawSitemap::Invalid { .. } => false,
        };
        if counted {
            self.visited += 1;
            if self.visited > self.limits.max_nodes {
                return Err(NormalizeError::TooManyNodes {
                    limit: self.limits.max_nodes,
                });
            }
        }

        match raw {
            RawSitemap::Index {
                url,
                kind,
                sub_sitemaps,
            } => {
                let mut sitemaps = Vec::with_capacity(sub_sitemaps.len());
                for child in sub_sitemaps {
                    if should_skip(child.url(), self.now) {
                        continue;
                    }
                    sitemaps.push(self.node(child, depth + 1)?);
                }
                Ok(SitemapNode::Index {
                    url: url.clone(),
                    kind: *kind,
                    sitemaps,
                })
            }
            RawSitemap::Pages { url, kind, pages } => {
                let mut kept = Vec::with_capacity(pages.len());
                for page in pages {
                    let page_url = page.url.trim();
                    if page_url.is_empty() || should_skip(page_url, self.now) {
                        continue;
                    }
                    if !self.seen_pages.insert(page_url.to_string()) {
                        continue;
                    }
                    kept.push(convert_page(page_url, page));
                }
                Ok(SitemapNode::Leaf {
                    url: url.clone(),
                    kind: *kind,
                    pages: kept,
                })
            }
            RawSitemap::Invalid { .. } => Ok(empty_like(raw)),
        }
    }
}

fn empty_like(raw: &RawSitemap) -> SitemapNode {
    match raw {
        RawSitemap::Index { url, kind, .. } => SitemapNode::Index {
            url: url.clone(),
            kind: *kind,
            sitemaps: Vec::new(),
        },
        RawSitemap::Pages { url, kind, .. } => SitemapNode::Leaf {
            url: url.clone(),
            kind: *kind,
            pages: Vec::new(),
        },
        RawSitemap::Invalid { url, .. } => SitemapNode::Leaf {
            url: url.clone(),
            kind: SitemapKind::Invalid,
            pages: Vec::new(),
        },
    }
}

fn convert_page(url: &str, raw: &RawPage) -> Page {
    Page {
        url: url.to_string(),
        priority: Some(parse_priority(raw.priority.as_deref())),
        last_modified: raw.last_modified.as_deref().and_then(parse_last_modified),
        change_frequency: raw
            .change_frequency
            .as_deref()
            .and_then(ChangeFrequency::parse),
        news_story: raw.news_story.as_ref().map(|n| NewsStory {
            title: n.title.clone(),
            publish_date: n.publish_date.clone(),
            publication_name: n.publication_name.clone(),
            publication_language: n.publication_language.clone(),
            access: n.access.clone(),
            genres: n.genres.clone(),
            keywords: n.keywords.clone(),
            stock_tickers: n.stock_tickers.clone(),
        }),
    }
}

fn parse_priority(value: Option<&str>) -> f64 {
    match value.map(str::trim).and_then(|v| v.parse::<f64>().ok()) {
        Some(p) if p.is_finite() => p.clamp(0.0, 1.0),
        _ => DEFAULT_PRIORITY,
    }
}

/// Parse a W3C datetime into RFC 3339.
///
/// Values with an offset keep it. Values without one (`2025-01-02T10:30:00`,
/// `2025-01-02`, `2025-01`, `2025`) are taken as UTC, truncated forms at the
/// start of the period.
pub fn parse_last_modified(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false));
    }
    if let Some(date) = parse_w3c_date(value) {
        let dt = date.and_hms_opt(0, 0, 0)?.and_utc();
        return Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, false));
        }
    }
    // W3C allows minutes without seconds, e.g. 2025-01-02T10:30+01:00.
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::AutoSi, false),
        );
    }
    None
}

/// `YYYY-MM-DD`, `YYYY-MM` or `YYYY`.
fn parse_w3c_date(value: &str) -> Option<NaiveDate> {
    // %Y alone would accept signs and extra digits.
    let shape_ok = value
        .bytes()
        .enumerate()
        .all(|(i, b)| if i == 4 || i == 7 { b == b'-' } else { b.is_ascii_digit() });
    if !shape_ok {
        return None;
    }
    let full = match value.len() {
        10 => value.to_string(),
        7 => format!("{}-01", value),
        4 => format!("{}-01-01", value),
        _ => return None,
    };
    NaiveDate::parse_from_str(&full, "%Y-%m-%d").ok()
}
