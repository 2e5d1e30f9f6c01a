//! Snapshot retention.
//!
//! After a crawl cycle only the newest snapshot of a site is kept.
//! Deletion is best-effort: a snapshot that cannot be removed is logged and
//! reported, and the remaining deletions still run.

use anyhow::Result;
use chrono::NaiveDateTime;
use std::path::Path;

use crate::store::fs::FsStore;
use crate::store::{format_timestamp, SnapshotStore};

/// Result of one [`retain_latest`] pass over a site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionOutcome {
    /// The snapshot that was kept, `None` when the site had none.
    pub kept: Option<NaiveDateTime>,
    /// Snapshots successfully deleted.
    pub removed: usize,
    /// Snapshots that could not be deleted, with the reason.
    pub failed: Vec<(NaiveDateTime, String)>,
}

/// Delete every snapshot of `site_name` except the newest.
///
/// Returns an error only if the snapshots cannot be listed at all.
pub fn retain_latest(store: &dyn SnapshotStore, site_name: &str) -> Result<RetentionOutcome> {
    let snapshots = store.list_snapshots(site_name, None)?;
    let mut outcome = RetentionOutcome::default();

    let mut iter = snapshots.into_iter();
    let newest = match iter.next() {
        Some(newest) => newest,
        None => return Ok(outcome),
    };
    outcome.kept = Some(newest.timestamp);

    for old in iter {
        match store.delete_snapshot(site_name, old.timestamp) {
            Ok(()) => {
                tracing::debug!(site = site_name, snapshot = %old.dir_name(), "removed snapshot");
                outcome.removed += 1;
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::warn!(
                    site = site_name,
                    snapshot = %old.dir_name(),
                    error = %reason,
                    "failed to remove snapshot"
                );
                outcome.failed.push((old.timestamp, reason));
            }
        }
    }

    Ok(outcome)
}

/// Retention results for one site directory during maintenance.
#[derive(Debug)]
pub struct SiteCleanup {
    pub site_name: String,
    pub result: Result<RetentionOutcome, String>,
}

/// Result of [`cleanup_data_dir`].
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub sites: Vec<SiteCleanup>,
}

impl CleanupReport {
    pub fn total_removed(&self) -> usize {
        self.sites
            .iter()
            .filter_map(|s| s.result.as_ref().ok())
            .map(|o| o.removed)
            .sum()
    }

    pub fn total_failed(&self) -> usize {
        self.sites
            .iter()
            .map(|s| match &s.result {
                Ok(o) => o.failed.len(),
                Err(_) => 1,
            })
            .sum()
    }
}

/// Apply [`retain_latest`] to every immediate subdirectory of `root`.
///
/// Each subdirectory is treated as a site. A site that cannot be processed
/// is recorded in the report and does not stop the others.
pub fn cleanup_data_dir(root: &Path) -> Result<CleanupReport> {
    let store = FsStore::new(root);
    let mut report = CleanupReport::default();
    for site_name in store.site_names()? {
        let result = retain_latest(&store, &site_name).map_err(|e| format!("{:#}", e));
        report.sites.push(SiteCleanup { site_name, result });
    }
    Ok(report)
}

/// Print a maintenance report the way `gazer cleanup` shows it.
pub fn print_cleanup_report(report: &CleanupReport) {
    for site in &report.sites {
        println!("Processing site: {}", site.site_name);
        match &site.result {
            Ok(outcome) => match outcome.kept {
                None => println!("  No valid timestamp directories found"),
                Some(kept) => {
                    println!("  Keeping: {}", format_timestamp(&kept));
                    println!("  Removed: {}", outcome.removed);
                    for (ts, err) in &outcome.failed {
                        println!("  Error removing {}: {}", format_timestamp(ts), err);
                    }
                }
            },
            Err(e) => println!("  Error: {}", e),
        }
    }
    println!();
    println!(
        "Cleanup complete. Removed {} old directories.",
        report.total_removed()
    );
}
