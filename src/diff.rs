//! Snapshot comparison.
//!
//! Both trees are flattened into URL → [`Page`] maps. A page only in the
//! current tree is *added*, one only in the previous tree is *removed*, and
//! one in both whose compared fields differ is *changed*. The emitted
//! [`Diff::pages`] lists added and changed pages in the order they first
//! appear in the current tree; removals are counted but not emitted.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::models::{Diff, DiffStats, Page, SitemapNode};

/// What a diff against no previous snapshot contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstCrawlPolicy {
    /// The first crawl is a baseline: nothing to report.
    #[default]
    Empty,
    /// Every page of the first crawl is reported as added.
    AllAdded,
}

/// Page fields that participate in change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffField {
    LastModified,
    ChangeFrequency,
    Priority,
    NewsStory,
}

impl DiffField {
    pub fn default_set() -> Vec<DiffField> {
        vec![
            DiffField::LastModified,
            DiffField::ChangeFrequency,
            DiffField::Priority,
        ]
    }

    fn differs(&self, a: &Page, b: &Page) -> bool {
        match self {
            DiffField::LastModified => a.last_modified != b.last_modified,
            DiffField::ChangeFrequency => a.change_frequency != b.change_frequency,
            DiffField::Priority => a.priority != b.priority,
            DiffField::NewsStory => a.news_story != b.news_story,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    pub first_crawl: FirstCrawlPolicy,
    pub fields: Vec<DiffField>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            first_crawl: FirstCrawlPolicy::default(),
            fields: DiffField::default_set(),
        }
    }
}

/// Flatten a tree into its pages, first occurrence of each URL winning.
fn flatten(tree: &SitemapNode) -> Vec<&Page> {
    let mut seen = HashSet::new();
    tree.pages()
        .into_iter()
        .filter(|&p| seen.insert(p.url.as_str()))
        .collect()
}

/// Compare `current` against `previous`.
pub fn diff(previous: Option<&SitemapNode>, current: &SitemapNode, options: &DiffOptions) -> Diff {
    let current_pages = flatten(current);

    let previous = match previous {
        Some(tree) => tree,
        None => {
            return match options.first_crawl {
                FirstCrawlPolicy::Empty => Diff::default(),
                FirstCrawlPolicy::AllAdded => Diff {
                    stats: DiffStats {
                        added: current_pages.len(),
                        ..Default::default()
                    },
                    pages: current_pages.into_iter().cloned().collect(),
                    removed: Vec::new(),
                },
            };
        }
    };

    let previous_pages: HashMap<&str, &Page> = flatten(previous)
        .into_iter()
        .map(|p| (p.url.as_str(), p))
        .collect();

    let mut stats = DiffStats::default();
    let mut pages = Vec::new();
    for page in &current_pages {
        match previous_pages.get(page.url.as_str()) {
            None => {
                stats.added += 1;
                pages.push((*page).clone());
            }
            Some(old) if options.fields.iter().any(|f| f.differs(old, page)) => {
                stats.changed += 1;
                pages.push((*page).clone());
            }
            Some(_) => {}
        }
    }

    let current_urls: HashSet<&str> = current_pages.iter().map(|p| p.url.as_str()).collect();
    let removed: Vec<String> = flatten(previous)
        .into_iter()
        .filter(|p| !current_urls.contains(p.url.as_str()))
        .map(|p| p.url.clone())
        .collect();
    stats.removed = removed.len();

    Diff {
        pages,
        stats,
        removed,
    }
}
