//! Crawl pipeline orchestration.
//!
//! For each site: fetch → normalize → write snapshot → diff against the
//! newest readable earlier snapshot → write `diff.json` → retain only the new
//! snapshot. Sites are independent; they run concurrently up to
//! `crawl.concurrency`, and a failure in one site is recorded in the
//! [`CrawlReport`] without affecting the others.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::diff::{diff, DiffOptions};
use crate::fetch::SitemapFetcher;
use crate::models::{DiffStats, Site};
use crate::normalize::{normalize, NormalizeLimits};
use crate::retention::{retain_latest, RetentionOutcome};
use crate::store::{format_timestamp, now_timestamp, SnapshotStore};

/// What one successful site crawl produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSummary {
    pub snapshot: NaiveDateTime,
    /// The snapshot the diff was computed against.
    pub previous: Option<NaiveDateTime>,
    pub pages: usize,
    pub stats: DiffStats,
    pub retention: RetentionOutcome,
}

#[derive(Debug)]
pub struct SiteOutcome {
    pub site: String,
    pub result: Result<SiteSummary, String>,
}

/// Per-site results of a crawl run, in configuration order.
#[derive(Debug, Default)]
pub struct CrawlReport {
    pub outcomes: Vec<SiteOutcome>,
}

impl CrawlReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Settings shared by every site of a run.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub limits: NormalizeLimits,
    pub diff: DiffOptions,
    pub concurrency: usize,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limits: config.crawl.limits(),
            diff: config.diff.options(),
            concurrency: config.crawl.concurrency,
        }
    }
}

/// Run one crawl cycle for a single site, snapshotting at `timestamp`.
pub async fn crawl_site(
    site: &Site,
    fetcher: &dyn SitemapFetcher,
    store: &dyn SnapshotStore,
    settings: &CrawlSettings,
    timestamp: NaiveDateTime,
) -> Result<SiteSummary> {
    let candidates = store.list_snapshots(&site.name, None)?;

    let raw = fetcher
        .fetch_tree(&site.url)
        .await
        .with_context(|| format!("fetching sitemaps for {}", site.url))?;
    let tree = normalize(&raw, timestamp.date(), settings.limits)
        .with_context(|| format!("normalizing sitemaps for {}", site.name))?;

    let snapshot = store.write_at(site, timestamp, &tree)?;

    // Diff against the newest snapshot that can still be read.
    let previous = candidates
        .iter()
        .find_map(|prev| match store.read_snapshot(site, prev.timestamp) {
            Ok(snap) => Some(snap),
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::warn!(
                    site = %site.name,
                    snapshot = %prev.dir_name(),
                    error = %reason,
                    "previous snapshot unreadable, trying an older one"
                );
                None
            }
        });

    let changes = diff(
        previous.as_ref().map(|p| &p.tree),
        &snapshot.tree,
        &settings.diff,
    );
    store.write_diff(&site.name, snapshot.timestamp, &changes)?;

    let retention = retain_latest(store, &site.name)?;

    let summary = SiteSummary {
        snapshot: snapshot.timestamp,
        previous: previous.map(|p| p.timestamp),
        pages: snapshot.tree.pages().len(),
        stats: changes.stats,
        retention,
    };
    tracing::info!(
        site = %site.name,
        snapshot = %format_timestamp(&summary.snapshot),
        pages = summary.pages,
        added = summary.stats.added,
        changed = summary.stats.changed,
        removed = summary.stats.removed,
        pruned = summary.retention.removed,
        "site crawled"
    );
    Ok(summary)
}

/// Crawl every site in `sites` and collect the outcomes.
pub async fn run_crawl(
    sites: &[Site],
    fetcher: Arc<dyn SitemapFetcher>,
    store: Arc<dyn SnapshotStore>,
    settings: &CrawlSettings,
) -> CrawlReport {
    let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, site) in sites.iter().cloned().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let store = Arc::clone(&store);
        let settings = settings.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let result = crawl_site(
                &site,
                fetcher.as_ref(),
                store.as_ref(),
                &settings,
                now_timestamp(),
            )
            .await
            .map_err(|e| {
                let reason = format!("{:#}", e);
                tracing::warn!(site = %site.name, error = %reason, "site crawl failed");
                reason
            });
            (
                index,
                SiteOutcome {
                    site: site.name,
                    result,
                },
            )
        });
    }

    let mut slots: Vec<Option<SiteOutcome>> = sites.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => tracing::error!(error = %e, "crawl task panicked"),
        }
    }

    // A task that panicked left its slot empty.
    let outcomes = slots
        .into_iter()
        .zip(sites)
        .map(|(slot, site)| {
            slot.unwrap_or_else(|| SiteOutcome {
                site: site.name.clone(),
                result: Err("crawl task panicked".to_string()),
            })
        })
        .collect();

    CrawlReport { outcomes }
}

/// Print a crawl report on stdout.
pub fn print_crawl_report(report: &CrawlReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(s) => {
                println!("crawl {}", outcome.site);
                println!("  snapshot: {}", format_timestamp(&s.snapshot));
                match s.previous {
                    Some(prev) => println!("  previous: {}", format_timestamp(&prev)),
                    None => println!("  previous: none (first crawl)"),
                }
                println!("  pages: {}", s.pages);
                println!(
                    "  added: {}  changed: {}  removed: {}",
                    s.stats.added, s.stats.changed, s.stats.removed
                );
                println!("  old snapshots removed: {}", s.retention.removed);
                if !s.retention.failed.is_empty() {
                    println!("  old snapshots not removed: {}", s.retention.failed.len());
                }
            }
            Err(e) => {
                println!("crawl {}", outcome.site);
                println!("  error: {}", e);
            }
        }
    }
    println!(
        "{} site(s) crawled, {} failed",
        report.succeeded(),
        report.failed()
    );
}

/// Latest diff per site, for the `status` command.
///
/// A site with no snapshot or no readable diff has nothing to report.
pub fn latest_changes(config: &Config, store: &dyn SnapshotStore) -> Vec<(String, Vec<String>)> {
    config
        .sites
        .iter()
        .map(|site| {
            let urls = match store.latest(&site.name) {
                Ok(Some(latest)) => store
                    .read_diff(&site.name, latest.timestamp)
                    .map(|d| d.pages.into_iter().map(|p| p.url).collect())
                    .unwrap_or_default(),
                Ok(None) => Vec::new(),
                Err(e) => {
                    let reason = format!("{:#}", e);
                    tracing::warn!(site = %site.name, error = %reason, "cannot list snapshots");
                    Vec::new()
                }
            };
            (site.name.clone(), urls)
        })
        .collect()
}
