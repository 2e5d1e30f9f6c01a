//! Core data models used throughout Sitemap Gazer.
//!
//! These types describe the canonical sitemap tree that is written to
//! `sitemap.json`, the pages inside it, and the diff written to `diff.json`.
//! Field declaration order is the serialization order, so reordering fields
//! changes the bytes on disk.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A monitored website, identified by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub url: String,
}

/// Sitemap `<changefreq>` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFrequency {
    /// Case-insensitive parse; unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" => Some(Self::Always),
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            "never" => Some(Self::Never),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Never => "never",
        }
    }
}

/// Google News sitemap extension attached to a page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewsStory {
    pub title: String,
    pub publish_date: Option<String>,
    pub publication_name: Option<String>,
    pub publication_language: Option<String>,
    pub access: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub stock_tickers: Vec<String>,
}

/// A single page entry of a leaf sitemap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub priority: Option<f64>,
    pub last_modified: Option<String>,
    pub change_frequency: Option<ChangeFrequency>,
    #[serde(default)]
    pub news_story: Option<NewsStory>,
}

/// What kind of sitemap a node was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SitemapKind {
    /// Synthetic root grouping everything discovered for a homepage.
    WebsiteIndex,
    /// The sitemaps declared in `robots.txt`.
    RobotsTxtIndex,
    /// An XML `<sitemapindex>`.
    XmlIndex,
    /// An XML `<urlset>`.
    XmlPages,
    /// A plain-text list of URLs.
    TextPages,
    /// A sitemap that could not be fetched or parsed.
    Invalid,
}

/// Canonical sitemap tree.
///
/// Index nodes hold nested sitemaps, leaf nodes hold pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum SitemapNode {
    Index {
        url: String,
        #[serde(rename = "type")]
        kind: SitemapKind,
        sitemaps: Vec<SitemapNode>,
    },
    Leaf {
        url: String,
        #[serde(rename = "type")]
        kind: SitemapKind,
        pages: Vec<Page>,
    },
}

impl SitemapNode {
    pub fn url(&self) -> &str {
        match self {
            SitemapNode::Index { url, .. } | SitemapNode::Leaf { url, .. } => url,
        }
    }

    pub fn kind(&self) -> SitemapKind {
        match self {
            SitemapNode::Index { kind, .. } | SitemapNode::Leaf { kind, .. } => *kind,
        }
    }

    /// All pages of the tree in depth-first, document order.
    pub fn pages(&self) -> Vec<&Page> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                SitemapNode::Leaf { pages, .. } => out.extend(pages.iter()),
                SitemapNode::Index { sitemaps, .. } => stack.extend(sitemaps.iter().rev()),
            }
        }
        out
    }
}

/// One timestamped capture of a site's normalized sitemap tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub site: Site,
    pub timestamp: NaiveDateTime,
    pub tree: SitemapNode,
}

/// Counts gathered while diffing. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
}

/// Pages judged added or changed between two snapshots.
///
/// Only `pages` is written to `diff.json`; the counters and removed URLs
/// exist for logging and summaries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Diff {
    pub pages: Vec<Page>,
    #[serde(skip)]
    pub stats: DiffStats,
    #[serde(skip)]
    pub removed: Vec<String>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str) -> Page {
        Page {
            url: url.to_string(),
            priority: Some(0.5),
            last_modified: None,
            change_frequency: None,
            news_story: None,
        }
    }

    #[test]
    fn test_pages_are_depth_first_in_order() {
        let tree = SitemapNode::Index {
            url: "https://x.com/".into(),
            kind: SitemapKind::WebsiteIndex,
            sitemaps: vec![
                SitemapNode::Leaf {
                    url: "https://x.com/a.xml".into(),
                    kind: SitemapKind::XmlPages,
                    pages: vec![page("https://x.com/1"), page("https://x.com/2")],
                },
                SitemapNode::Index {
                    url: "https://x.com/idx.xml".into(),
                    kind: SitemapKind::XmlIndex,
                    sitemaps: vec![SitemapNode::Leaf {
                        url: "https://x.com/b.xml".into(),
                        kind: SitemapKind::XmlPages,
                        pages: vec![page("https://x.com/3")],
                    }],
                },
                SitemapNode::Leaf {
                    url: "https://x.com/c.txt".into(),
                    kind: SitemapKind::TextPages,
                    pages: vec![page("https://x.com/4")],
                },
            ],
        };
        let urls: Vec<&str> = tree.pages().iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://x.com/1",
                "https://x.com/2",
                "https://x.com/3",
                "https://x.com/4"
            ]
        );
    }

    #[test]
    fn test_node_serialization_shape() {
        let tree = SitemapNode::Leaf {
            url: "https://x.com/s.xml".into(),
            kind: SitemapKind::XmlPages,
            pages: vec![Page {
                change_frequency: Some(ChangeFrequency::Weekly),
                ..page("https://x.com/1")
            }],
        };
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["node"], "leaf");
        assert_eq!(json["type"], "xml_pages");
        assert_eq!(json["pages"][0]["change_frequency"], "weekly");
        assert_eq!(json["pages"][0]["priority"], 0.5);
    }

    #[test]
    fn test_diff_serializes_pages_only() {
        let diff = Diff {
            pages: vec![page("https://x.com/1")],
            stats: DiffStats {
                added: 1,
                changed: 0,
                removed: 3,
            },
            removed: vec!["https://x.com/gone".into()],
        };
        let json = serde_json::to_value(&diff).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key("pages"));
    }

    #[test]
    fn test_change_frequency_parse() {
        assert_eq!(ChangeFrequency::parse(" Daily "), Some(ChangeFrequency::Daily));
        assert_eq!(ChangeFrequency::parse("sometimes"), None);
        assert_eq!(ChangeFrequency::Never.as_str(), "never");
    }
}
