use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn gazer_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("gazer");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let config_content = format!(
        r#"output_dir = "{}/data"

[[sites]]
name = "alpha.com"
url = "https://alpha.com/"

[[sites]]
name = "beta.com"
url = "https://beta.com/"
"#,
        root.display()
    );

    let config_path = config_dir.join("gazer.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run(args: &[&str]) -> (String, String, bool) {
    let binary = gazer_binary();
    let output = Command::new(&binary)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gazer binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_gazer(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let mut full = vec!["--config", config_path.to_str().unwrap()];
    full.extend_from_slice(args);
    run(&full)
}

/// Create a snapshot directory, optionally with a diff listing `pages`.
fn make_snapshot(data: &Path, site: &str, ts: &str, pages: Option<&[&str]>) {
    let dir = data.join(site).join(ts);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("sitemap.json"),
        r#"{"node":"index","url":"https://example.com/","type":"website_index","sitemaps":[]}"#,
    )
    .unwrap();
    if let Some(pages) = pages {
        let pages: Vec<serde_json::Value> = pages
            .iter()
            .map(|url| serde_json::json!({ "url": url, "priority": 0.5 }))
            .collect();
        fs::write(
            dir.join("diff.json"),
            serde_json::to_string_pretty(&serde_json::json!({ "pages": pages })).unwrap(),
        )
        .unwrap();
    }
}

#[test]
fn test_cleanup_keeps_newest_and_ignores_garbage() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    make_snapshot(&data, "x.com", "20250101_000000", None);
    make_snapshot(&data, "x.com", "20250102_000000", None);
    make_snapshot(&data, "x.com", "20250103_000000", None);
    fs::create_dir_all(data.join("x.com").join("notes")).unwrap();
    fs::create_dir_all(data.join("y.com").join("tmp")).unwrap();

    let (stdout, stderr, success) = run(&["cleanup", data.to_str().unwrap()]);
    assert!(success, "cleanup failed: {}", stderr);

    assert!(stdout.contains("Processing site: x.com"));
    assert!(stdout.contains("  Keeping: 20250103_000000"));
    assert!(stdout.contains("  Removed: 2"));
    assert!(stdout.contains("Processing site: y.com"));
    assert!(stdout.contains("  No valid timestamp directories found"));
    assert!(stdout.contains("Cleanup complete. Removed 2 old directories."));

    assert!(data.join("x.com").join("20250103_000000").is_dir());
    assert!(!data.join("x.com").join("20250101_000000").exists());
    assert!(!data.join("x.com").join("20250102_000000").exists());
    assert!(data.join("x.com").join("notes").is_dir());
    assert!(data.join("y.com").join("tmp").is_dir());
}

#[test]
fn test_cleanup_missing_directory_is_not_an_error() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope");

    let (stdout, _, success) = run(&["cleanup", missing.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("does not exist"));
}

#[test]
fn test_cleanup_does_not_need_config() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    make_snapshot(&data, "x.com", "20250101_000000", None);

    let (stdout, stderr, success) = run(&[
        "--config",
        "/nonexistent/gazer.toml",
        "cleanup",
        data.to_str().unwrap(),
    ]);
    assert!(success, "cleanup failed: {}", stderr);
    assert!(stdout.contains("Cleanup complete. Removed 0 old directories."));
}

#[test]
fn test_snapshots_newest_first_with_limit() {
    let (tmp, config) = setup_test_env();
    let data = tmp.path().join("data");
    make_snapshot(&data, "alpha.com", "20250101_000000", None);
    make_snapshot(&data, "alpha.com", "20250301_000000", None);
    make_snapshot(&data, "alpha.com", "20250201_000000", None);
    fs::create_dir_all(data.join("alpha.com").join("scratch")).unwrap();

    let (stdout, stderr, success) = run_gazer(&config, &["snapshots", "alpha.com"]);
    assert!(success, "snapshots failed: {}", stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec!["20250301_000000", "20250201_000000", "20250101_000000"]
    );

    let (stdout, _, success) = run_gazer(&config, &["snapshots", "alpha.com", "--limit", "1"]);
    assert!(success);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["20250301_000000"]);
}

#[test]
fn test_snapshots_unknown_site_is_empty() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_gazer(&config, &["snapshots", "gamma.com"]);
    assert!(success);
    assert!(stdout.contains("No snapshots."));
}

#[test]
fn test_status_reports_latest_diff() {
    let (tmp, config) = setup_test_env();
    let data = tmp.path().join("data");
    make_snapshot(
        &data,
        "alpha.com",
        "20250101_000000",
        Some(&["https://alpha.com/old"]),
    );
    make_snapshot(
        &data,
        "alpha.com",
        "20250102_000000",
        Some(&["https://alpha.com/b", "https://alpha.com/c"]),
    );
    // beta.com has a snapshot but no diff.json
    make_snapshot(&data, "beta.com", "20250102_000000", None);

    let (stdout, stderr, success) = run_gazer(&config, &["status"]);
    assert!(success, "status failed: {}", stderr);
    assert_eq!(
        stdout,
        "alpha.com\n  https://alpha.com/b\n  https://alpha.com/c\nbeta.com\n  no changes\n"
    );
}

#[test]
fn test_crawl_unknown_site_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_gazer(&config, &["crawl", "--site", "gamma.com"]);
    assert!(!success);
    assert!(stderr.contains("Unknown site"));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run(&["--config", "/nonexistent/gazer.toml", "status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("gazer.toml");
    fs::write(
        &config,
        r#"
[[sites]]
name = "../escape"
url = "https://example.com/"
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_gazer(&config, &["status"]);
    assert!(!success);
    assert!(stderr.contains("not a valid directory name") || stderr.contains("path separators"));
}
