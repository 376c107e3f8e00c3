use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn pdfchat_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pdfchat"))
}

fn write_config(root: &Path) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/pdfchat.sqlite"

[chunking]
window_chars = 40
stride_chars = 20

[ingest]
root = "{root}/files"
include_globs = ["**/*.txt"]
"#,
        root = root.display(),
    );

    let config_path = config_dir.join("pdfchat.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("nested")).unwrap();
    fs::write(files_dir.join("alpha.txt"), "a".repeat(100)).unwrap();
    fs::write(files_dir.join("nested/beta.txt"), "b".repeat(30)).unwrap();
    fs::write(files_dir.join("ignored.md"), "not selected").unwrap();

    let config_path = write_config(&root);
    (tmp, config_path)
}

fn run_pdfchat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pdfchat_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pdfchat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_pdfchat(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/pdfchat.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_pdfchat(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_pdfchat(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_history_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_pdfchat(&config_path, &["init"]);
    let (stdout, stderr, success) = run_pdfchat(&config_path, &["history"]);
    assert!(success, "history failed: {}", stderr);
    assert!(stdout.contains("No chats."));

    let (stdout, _, success) = run_pdfchat(&config_path, &["history", "3"]);
    assert!(success);
    assert!(stdout.contains("No messages for chat 3."));
}

#[test]
fn test_ingest_dry_run_counts_chunks() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_pdfchat(&config_path, &["ingest", "--dry-run"]);
    assert!(success, "dry-run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents found: 2"));
    // 100 chars at window 40 / stride 20 → 4 chunks; 30 chars → 1 chunk
    assert!(stdout.contains("alpha.txt (4 chunks)"));
    assert!(stdout.contains("nested/beta.txt (1 chunks)"));
    assert!(stdout.contains("estimated chunks: 5"));
}

#[test]
fn test_ingest_root_override() {
    let (tmp, config_path) = setup_test_env();
    let other = tmp.path().join("other");
    fs::create_dir_all(&other).unwrap();
    fs::write(other.join("only.txt"), "hello").unwrap();

    let (stdout, _, success) = run_pdfchat(
        &config_path,
        &["ingest", "--dry-run", "--root", other.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("documents found: 1"));
    assert!(stdout.contains("only.txt (1 chunks)"));
}

#[test]
fn test_ingest_with_failed_documents_exits_nonzero() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_pdfchat(&config_path, &["ingest"]);
    assert!(!success, "ingest should fail: stdout={}", stdout);
    assert!(stdout.contains("documents failed: 2"), "stdout={}", stdout);
    assert!(stderr.contains("2 of 2 documents failed"), "stderr={}", stderr);
}

#[test]
fn test_ask_with_disabled_embeddings_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_pdfchat(&config_path, &["ask", "1", "What is X?"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr={}", stderr);

    // The failed turn left no history behind
    let (stdout, _, _) = run_pdfchat(&config_path, &["history"]);
    assert!(stdout.contains("No chats."));
}

#[test]
fn test_invalid_chunking_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path());
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("stride_chars = 20", "stride_chars = 80");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_pdfchat(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("stride_chars"), "stderr={}", stderr);
}
