//! End-to-end runs of the library against a fake hosting service.
//!
//! Every test points `RunRequest::api_base_url` at a wiremock server that
//! serves the JSON API, share pages and file bodies.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use mfbulk_core::download::RetryPolicy;
use mfbulk_core::{EngineEvent, EntryState, FilterRules, RunRequest, plan, run};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::mediafire::{
    FakeFile, hits, mount_broken_listing, mount_folder, mount_single_file, sha256_hex,
};
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

fn request(server: &MockServer, share_url: &str) -> RunRequest {
    let mut request = RunRequest::new(share_url);
    request.api_base_url = server.uri();
    request.retry_policy = RetryPolicy::immediate(2);
    request
}

fn not_cancelled() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

/// Relative paths of every regular file under `root`.
fn files_under(root: &Path) -> BTreeSet<PathBuf> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeSet<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                out.insert(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }
    let mut out = BTreeSet::new();
    walk(root, root, &mut out);
    out
}

async fn mount_nested_tree(server: &MockServer) -> Vec<FakeFile> {
    let a = FakeFile::new("qa", "a.txt", b"alpha");
    let b = FakeFile::new("qb", "b.txt", b"bravo bravo");
    let c = FakeFile::new("qc", "c.txt", b"charlie charlie charlie");
    mount_folder(server, "xyz789", "Root", &[a.clone()], &[("sub1", "Sub1")]).await;
    mount_folder(server, "sub1", "Sub1", &[b.clone()], &[("sub2", "Sub2")]).await;
    mount_folder(server, "sub2", "Sub2", &[c.clone()], &[]).await;
    vec![a, b, c]
}

#[tokio::test]
async fn test_single_file_link_lands_in_cwd() {
    let server = require_mock_server!();
    let file = FakeFile::new("abc123", "report.pdf", b"%PDF-1.7 fake body");
    mount_single_file(&server, &file).await;

    let cwd = TempDir::new().unwrap();
    let outcome = run(
        request(&server, "https://www.mediafire.com/file/abc123"),
        None,
        not_cancelled(),
        cwd.path(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.destination_root, cwd.path());
    assert_eq!(outcome.stats.completed, 1);
    assert_eq!(outcome.stats.failed, 0);
    assert_eq!(
        std::fs::read(cwd.path().join("report.pdf")).unwrap(),
        b"%PDF-1.7 fake body"
    );
}

#[tokio::test]
async fn test_nested_folder_mirrors_tree_under_default_dir() {
    let server = require_mock_server!();
    mount_nested_tree(&server).await;

    let cwd = TempDir::new().unwrap();
    let outcome = run(
        request(&server, "https://www.mediafire.com/folder/xyz789"),
        None,
        not_cancelled(),
        cwd.path(),
    )
    .await
    .unwrap();

    let root = cwd.path().join("TXAM-F");
    assert_eq!(outcome.destination_root, root);
    assert_eq!(outcome.stats.completed, 3);
    assert!(outcome.walk_failures.is_empty());

    let expected: BTreeSet<PathBuf> = [
        "Root/a.txt",
        "Root/Sub1/b.txt",
        "Root/Sub1/Sub2/c.txt",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect();
    assert_eq!(files_under(&root), expected);
}

#[tokio::test]
async fn test_rerun_skips_everything_without_network_transfers() {
    let server = require_mock_server!();
    let files = mount_nested_tree(&server).await;
    let cwd = TempDir::new().unwrap();
    let url = "https://www.mediafire.com/folder/xyz789";

    let first = run(request(&server, url), None, not_cancelled(), cwd.path())
        .await
        .unwrap();
    assert_eq!(first.stats.completed, 3);

    let second = run(request(&server, url), None, not_cancelled(), cwd.path())
        .await
        .unwrap();
    assert_eq!(second.stats.skipped, 3);
    assert_eq!(second.stats.completed, 0);
    assert_eq!(second.stats.bytes_transferred, 0);

    for file in &files {
        assert_eq!(hits(&server, &file.share_path()).await, 1, "{}", file.name);
        assert_eq!(hits(&server, &file.body_path()).await, 1, "{}", file.name);
    }
}

#[tokio::test]
async fn test_stale_file_is_replaced_after_verification() {
    let server = require_mock_server!();
    let file = FakeFile::new("q1", "data.bin", b"fresh content!");
    mount_folder(&server, "fold1", "Data", &[file.clone()], &[]).await;

    let cwd = TempDir::new().unwrap();
    let target = cwd.path().join("TXAM-F").join("Data").join("data.bin");
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    // Same length, different bytes: only the hash can tell.
    std::fs::write(&target, b"stale content!").unwrap();

    let outcome = run(
        request(&server, "https://www.mediafire.com/folder/fold1"),
        None,
        not_cancelled(),
        cwd.path(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.stats.completed, 1);
    assert_eq!(std::fs::read(&target).unwrap(), b"fresh content!");
}

#[tokio::test]
async fn test_failed_verification_keeps_old_file_intact() {
    let server = require_mock_server!();
    let file = FakeFile::new("q1", "data.bin", b"corrupted on the wire")
        .with_published_hash(Some(&sha256_hex(b"what the server promised")));
    mount_folder(&server, "fold1", "Data", &[file], &[]).await;

    let cwd = TempDir::new().unwrap();
    let dir = cwd.path().join("TXAM-F").join("Data");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("data.bin"), b"old copy").unwrap();

    let outcome = run(
        request(&server, "https://www.mediafire.com/folder/fold1"),
        None,
        not_cancelled(),
        cwd.path(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.retried, 1);
    assert_eq!(std::fs::read(dir.join("data.bin")).unwrap(), b"old copy");
    assert_eq!(
        files_under(&dir),
        BTreeSet::from([PathBuf::from("data.bin")]),
        "no temporary files may be left behind"
    );
}

/// Fails the first request for `file`'s body with `response`, then lets the
/// regular body mock answer. Must be mounted before the regular mocks.
async fn fail_body_once(server: &MockServer, file: &FakeFile, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(file.body_path()))
        .respond_with(response)
        .up_to_n_times(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_transient_server_error_recovers_on_retry() {
    let server = require_mock_server!();
    let file = FakeFile::new("q1", "flaky.bin", b"hello world");
    fail_body_once(&server, &file, ResponseTemplate::new(503)).await;
    mount_folder(&server, "fold1", "Data", std::slice::from_ref(&file), &[]).await;

    let cwd = TempDir::new().unwrap();
    let outcome = run(
        request(&server, "https://www.mediafire.com/folder/fold1"),
        None,
        not_cancelled(),
        cwd.path(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.stats.completed, 1);
    assert_eq!(outcome.stats.failed, 0);
    assert_eq!(outcome.stats.retried, 1);
    assert_eq!(hits(&server, &file.body_path()).await, 2);
    let dir = cwd.path().join("TXAM-F").join("Data");
    assert_eq!(std::fs::read(dir.join("flaky.bin")).unwrap(), b"hello world");
    assert_eq!(files_under(&dir), BTreeSet::from([PathBuf::from("flaky.bin")]));
}

#[tokio::test]
async fn test_rate_limited_download_waits_for_retry_after() {
    let server = require_mock_server!();
    let file = FakeFile::new("q1", "busy.bin", b"finally");
    fail_body_once(
        &server,
        &file,
        ResponseTemplate::new(429).insert_header("Retry-After", "1"),
    )
    .await;
    mount_folder(&server, "fold1", "Data", std::slice::from_ref(&file), &[]).await;

    let cwd = TempDir::new().unwrap();
    let started = Instant::now();
    let outcome = run(
        request(&server, "https://www.mediafire.com/folder/fold1"),
        None,
        not_cancelled(),
        cwd.path(),
    )
    .await
    .unwrap();

    // The policy itself has zero backoff, so any wait comes from the header.
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(outcome.stats.completed, 1);
    assert_eq!(outcome.stats.retried, 1);
    assert_eq!(
        std::fs::read(cwd.path().join("TXAM-F/Data/busy.bin")).unwrap(),
        b"finally"
    );
}

#[tokio::test]
async fn test_filter_excludes_before_resolution() {
    let server = require_mock_server!();
    let keep = FakeFile::new("k1", "keep.txt", b"keep");
    let pyc = FakeFile::new("k2", "module.PYC", b"bytecode");
    let ini = FakeFile::new("k3", "desktop.ini", b"[.ShellClassInfo]");
    let iso = FakeFile::new("k4", "disk.iso", b"iso");
    mount_folder(
        &server,
        "mixed",
        "Mixed",
        &[keep, pyc.clone(), ini.clone(), iso.clone()],
        &[],
    )
    .await;

    let cwd = TempDir::new().unwrap();
    let mut req = request(&server, "https://www.mediafire.com/folder/mixed");
    req.filter = FilterRules::default().with_extensions([".pyc", "ISO"]);
    let outcome = run(req, None, not_cancelled(), cwd.path()).await.unwrap();

    assert_eq!(outcome.stats.completed, 1);
    assert_eq!(outcome.stats.filtered, 3);
    assert_eq!(outcome.stats.found(), 4);
    for skipped in [&pyc, &ini, &iso] {
        assert_eq!(hits(&server, &skipped.share_path()).await, 0, "{}", skipped.name);
    }
    assert_eq!(
        files_under(&cwd.path().join("TXAM-F")),
        BTreeSet::from([PathBuf::from("Mixed/keep.txt")])
    );
}

#[tokio::test]
async fn test_concurrency_does_not_change_results() {
    let server = require_mock_server!();
    let files: Vec<FakeFile> = (0..50)
        .map(|i| FakeFile::new(&format!("f{i:02}"), &format!("file{i:02}.dat"), format!("payload {i}").as_bytes()))
        .collect();
    mount_folder(&server, "fifty", "Fifty", &files, &[]).await;

    let mut results = Vec::new();
    for concurrency in [1, 20] {
        let cwd = TempDir::new().unwrap();
        let mut req = request(&server, "https://www.mediafire.com/folder/fifty");
        req.concurrency = concurrency;
        let outcome = run(req, None, not_cancelled(), cwd.path()).await.unwrap();
        results.push((outcome.stats.completed, files_under(&outcome.destination_root)));
    }

    assert_eq!(results[0].0, 50);
    assert_eq!(results[0], results[1]);
}

#[tokio::test]
async fn test_one_permanent_failure_does_not_stop_the_rest() {
    let server = require_mock_server!();
    let mut files: Vec<FakeFile> = (0..10)
        .map(|i| FakeFile::new(&format!("p{i}"), &format!("part{i}.rar"), format!("part {i}").as_bytes()))
        .collect();
    files[4] = files[4].clone().removed();
    mount_folder(&server, "parts", "Parts", &files, &[]).await;

    let cwd = TempDir::new().unwrap();
    let outcome = run(
        request(&server, "https://www.mediafire.com/folder/parts"),
        None,
        not_cancelled(),
        cwd.path(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.stats.completed, 9);
    assert_eq!(outcome.stats.failed, 1);
    // Removed files are permanent: exactly one share page request.
    assert_eq!(hits(&server, &files[4].share_path()).await, 1);
}

#[tokio::test]
async fn test_unlistable_branch_is_reported_and_siblings_continue() {
    let server = require_mock_server!();
    let top = FakeFile::new("t1", "top.txt", b"top");
    let ok = FakeFile::new("o1", "ok.txt", b"ok");
    mount_folder(&server, "root1", "Root", &[top], &[("bad1", "Bad"), ("good1", "Good")]).await;
    mount_broken_listing(&server, "bad1").await;
    mount_folder(&server, "good1", "Good", &[ok], &[]).await;

    let cwd = TempDir::new().unwrap();
    let outcome = run(
        request(&server, "https://www.mediafire.com/folder/root1"),
        None,
        not_cancelled(),
        cwd.path(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.stats.completed, 2);
    assert_eq!(outcome.walk_failures.len(), 1);
    assert_eq!(outcome.walk_failures[0].folder_key, "bad1");
    assert_eq!(outcome.walk_failures[0].path, PathBuf::from("Root/Bad"));
}

#[tokio::test]
async fn test_missing_root_folder_is_fatal_and_downloads_nothing() {
    let server = require_mock_server!();
    mount_broken_listing(&server, "nope").await;

    let cwd = TempDir::new().unwrap();
    let err = run(
        request(&server, "https://www.mediafire.com/folder/nope"),
        None,
        not_cancelled(),
        cwd.path(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, mfbulk_core::RunError::Remote(_)), "got {err:?}");
    assert!(!cwd.path().join("TXAM-F").exists());
}

#[tokio::test]
async fn test_events_report_each_entry() {
    let server = require_mock_server!();
    mount_nested_tree(&server).await;

    let cwd = TempDir::new().unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let outcome = run(
        request(&server, "https://www.mediafire.com/folder/xyz789"),
        Some(tx),
        not_cancelled(),
        cwd.path(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.stats.completed, 3);

    let mut discovered = 0;
    let mut finished = 0;
    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::Discovered(_) => discovered += 1,
            EngineEvent::Progress(p) if matches!(p.state, EntryState::Finished(_)) => {
                finished += 1;
            }
            EngineEvent::Progress(_) => {}
        }
    }
    assert_eq!(discovered, 3);
    assert_eq!(finished, 3);
}

#[tokio::test]
async fn test_cancelled_run_schedules_nothing() {
    let server = require_mock_server!();
    let files = mount_nested_tree(&server).await;

    let cwd = TempDir::new().unwrap();
    let outcome = run(
        request(&server, "https://www.mediafire.com/folder/xyz789"),
        None,
        Arc::new(AtomicBool::new(true)),
        cwd.path(),
    )
    .await
    .unwrap();

    assert!(outcome.stats.interrupted);
    assert_eq!(outcome.stats.finished(), 0);
    for file in &files {
        assert_eq!(hits(&server, &file.body_path()).await, 0);
    }
}

#[tokio::test]
async fn test_plan_lists_manifest_without_touching_disk() {
    let server = require_mock_server!();
    mount_nested_tree(&server).await;

    let cwd = TempDir::new().unwrap();
    let mut req = request(&server, "https://www.mediafire.com/folder/xyz789");
    req.filter = FilterRules::default().with_names(["b.txt"]);
    let preview = plan(&req, cwd.path()).await.unwrap();

    let included: Vec<PathBuf> = preview
        .included
        .iter()
        .map(|e| e.relative_path.clone())
        .collect();
    assert_eq!(
        included,
        [PathBuf::from("Root/a.txt"), PathBuf::from("Root/Sub1/Sub2/c.txt")]
    );
    assert_eq!(preview.filtered.len(), 1);
    assert!(!cwd.path().join("TXAM-F").exists());
}

#[tokio::test]
async fn test_explicit_output_path_is_used_as_root() {
    let server = require_mock_server!();
    mount_nested_tree(&server).await;

    let cwd = TempDir::new().unwrap();
    let mut req = request(&server, "https://www.mediafire.com/folder/xyz789");
    req.output_path = Some("mirror/./out".to_string());
    let outcome = run(req, None, not_cancelled(), cwd.path()).await.unwrap();

    assert_eq!(outcome.destination_root, cwd.path().join("mirror").join("out"));
    assert!(outcome.destination_root.join("Root/Sub1/Sub2/c.txt").is_file());
}
