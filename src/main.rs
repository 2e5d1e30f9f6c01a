//! # Sitemap Gazer CLI (`gazer`)
//!
//! ## Usage
//!
//! ```bash
//! gazer --config ./config/gazer.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gazer crawl` | Snapshot, diff, and prune every configured site |
//! | `gazer snapshots <site>` | List a site's snapshots, newest first |
//! | `gazer status` | Show the pages in each site's latest diff |
//! | `gazer cleanup [dir]` | Keep only the newest snapshot of every site under `dir` |
//!
//! Logs go to stderr; set `RUST_LOG` (e.g. `RUST_LOG=sitemap_gazer=debug`)
//! to change verbosity.

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sitemap_gazer::config;
use sitemap_gazer::crawl::{self, CrawlSettings};
use sitemap_gazer::fetch::HttpFetcher;
use sitemap_gazer::retention;
use sitemap_gazer::store::fs::FsStore;
use sitemap_gazer::store::SnapshotStore;

/// Sitemap Gazer — snapshot website sitemaps and report what changed.
#[derive(Parser)]
#[command(
    name = "gazer",
    about = "Sitemap Gazer — snapshot website sitemaps and report what changed",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/gazer.toml`. Not needed by `cleanup`.
    #[arg(long, global = true, default_value = "./config/gazer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl configured sites.
    ///
    /// For each site: fetch the sitemap tree, write a new snapshot, diff it
    /// against the previous one, and delete older snapshots. A failing site
    /// is reported and the others still run.
    Crawl {
        /// Only crawl the site with this name.
        #[arg(long)]
        site: Option<String>,
    },

    /// List stored snapshots of a site, newest first.
    Snapshots {
        /// Site name as configured.
        site: String,

        /// Maximum number of snapshots to list.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the pages in each site's most recent diff.
    Status,

    /// Keep only the newest snapshot of every site directory.
    ///
    /// Every immediate subdirectory of DATA_DIR is treated as a site.
    /// Directories that are not timestamps are left alone. Deletion errors
    /// are reported and skipped.
    Cleanup {
        /// Root data directory.
        #[arg(default_value = "data")]
        data_dir: PathBuf,
    },
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,sitemap_gazer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    // Maintenance works on a bare directory, no config needed.
    if let Commands::Cleanup { data_dir } = &cli.command {
        if !data_dir.is_dir() {
            println!("Data directory {} does not exist", data_dir.display());
            return Ok(());
        }
        match retention::cleanup_data_dir(data_dir) {
            Ok(report) => retention::print_cleanup_report(&report),
            Err(e) => println!("Error reading {}: {:#}", data_dir.display(), e),
        }
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let store = FsStore::new(&cfg.output_dir);

    match cli.command {
        Commands::Crawl { site } => {
            let sites = match site {
                Some(name) => match cfg.site(&name) {
                    Some(site) => vec![site.clone()],
                    None => bail!("Unknown site: '{}'", name),
                },
                None => cfg.sites.clone(),
            };
            let fetcher = Arc::new(HttpFetcher::new(&cfg.crawl)?);
            let settings = CrawlSettings::from_config(&cfg);
            let report = crawl::run_crawl(&sites, fetcher, Arc::new(store), &settings).await;
            crawl::print_crawl_report(&report);
        }
        Commands::Snapshots { site, limit } => {
            let snapshots = store.list_snapshots(&site, limit)?;
            if snapshots.is_empty() {
                println!("No snapshots.");
            }
            for snapshot in snapshots {
                println!("{}", snapshot.dir_name());
            }
        }
        Commands::Status => {
            for (site, urls) in crawl::latest_changes(&cfg, &store) {
                println!("{}", site);
                if urls.is_empty() {
                    println!("  no changes");
                }
                for url in urls {
                    println!("  {}", url);
                }
            }
        }
        Commands::Cleanup { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
