//! Drives the `docqa` binary against a temporary database. Both model
//! providers are disabled, so nothing here touches the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docqa_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docqa"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("policy.txt"),
        "Vacation policy.\n\nEmployees receive 15 days of paid vacation per year.",
    )
    .unwrap();
    fs::write(files_dir.join("photo.png"), b"\x89PNG\r\n").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/docqa.sqlite"

[chunking]
chunk_size = 200
overlap = 20
tokenizer = "whitespace"

[embedding]
provider = "disabled"

[completion]
provider = "disabled"

[logging]
level = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("docqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_types_needs_no_config() {
    let output = Command::new(docqa_binary())
        .args(["--config", "/nonexistent/docqa.toml", "types"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("application/pdf"));
    assert!(stdout.contains(".docx"));
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_docqa(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("docqa.sqlite").exists());

    let (_, stderr, success) = run_docqa(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_empty_collection() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let (stdout, _, success) = run_docqa(&config_path, &["documents"]);
    assert!(success);
    assert!(stdout.contains("No documents."));

    let (stdout, _, success) = run_docqa(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   0"));
    assert!(stdout.contains("completed"));
}

#[test]
fn test_ask_without_documents() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_docqa(&config_path, &["ask", "how many vacation days?"]);
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.contains("no relevant information found"));
    assert!(stdout.contains("confidence: 0.00"));
}

#[test]
fn test_ingest_failure_is_recorded() {
    let (tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);
    let file = tmp.path().join("files").join("policy.txt");

    let (_, stderr, success) = run_docqa(&config_path, &["ingest", file.to_str().unwrap()]);
    assert!(!success, "ingest should fail with embeddings disabled");
    assert!(stderr.contains("Failed to ingest"), "stderr: {}", stderr);

    let (stdout, _, success) = run_docqa(&config_path, &["documents"]);
    assert!(success);
    assert!(stdout.contains("policy.txt"));
    assert!(stdout.contains("failed"));

    let (stdout, _, success) = run_docqa(&config_path, &["get", "1"]);
    assert!(success);
    assert!(stdout.contains("status:      failed"));
    assert!(stdout.contains("error:"));
    assert!(stdout.contains("chunks:      0"));
}

#[test]
fn test_unsupported_file_is_skipped() {
    let (tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);
    let file = tmp.path().join("files").join("photo.png");

    let (_, stderr, success) = run_docqa(&config_path, &["ingest", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("photo.png"), "stderr: {}", stderr);

    let (stdout, _, _) = run_docqa(&config_path, &["documents"]);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_missing_document() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let (_, stderr, success) = run_docqa(&config_path, &["get", "42"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);

    let (_, _, success) = run_docqa(&config_path, &["delete", "42"]);
    assert!(!success);
}

#[test]
fn test_out_of_range_chunk_size() {
    let (tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);
    let file = tmp.path().join("files").join("policy.txt");

    let (_, stderr, success) = run_docqa(
        &config_path,
        &["ingest", file.to_str().unwrap(), "--chunk-size", "5000"],
    );
    assert!(!success);
    assert!(
        stderr.contains("chunk size must be between 100 and 2000"),
        "stderr: {}",
        stderr
    );

    let (stdout, _, _) = run_docqa(&config_path, &["documents"]);
    assert!(stdout.contains("No documents."));
}
