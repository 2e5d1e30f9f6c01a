//! # Sitemap Gazer
//!
//! Watches website sitemaps over time. Each crawl captures a site's sitemap
//! tree, stores it as a timestamped snapshot, computes what changed since the
//! previous snapshot, and prunes older snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────┐   ┌───────────┐
//! │  Fetch   │──▶│ Normalize  │──▶│ Snapshot     │──▶│   Diff   │──▶│ Retention │
//! │ HTTP/XML │   │ + Classify │   │ Store (JSON) │   │          │   │           │
//! └──────────┘   └────────────┘   └──────────────┘   └──────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gazer crawl                   # snapshot and diff every configured site
//! gazer status                  # show the latest changes per site
//! gazer snapshots example.com   # list stored snapshots
//! gazer cleanup data            # keep only the newest snapshot per site
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`classify`] | URL noise filter |
//! | [`normalize`] | Raw tree → canonical snapshot tree |
//! | [`fetch`] | robots.txt / sitemap discovery and parsing |
//! | [`store`] | Snapshot storage (filesystem, in-memory) |
//! | [`diff`] | Snapshot comparison |
//! | [`retention`] | Keep-newest pruning and maintenance |
//! | [`crawl`] | Per-site pipeline and batch report |
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |

pub mod classify;
pub mod config;
pub mod crawl;
pub mod diff;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod retention;
pub mod store;
