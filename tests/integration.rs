use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn newsdesk_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_newsdesk"))
}

/// Write a config into a fresh temp dir. `embedding` is the body of the
/// `[embedding]` section.
fn setup_test_env(embedding: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/articles.sqlite"

[index]
path = "{root}/data/index.sqlite"
collection = "articles"

[embedding]
{embedding}

[generation]
provider = "ollama"
model = "qwen3:8b"
url = "http://127.0.0.1:9"
timeout_secs = 1

[retrieval]
k = 4
"#,
        root = root.display(),
        embedding = embedding,
    );

    let config_path = config_dir.join("newsdesk.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn unreachable_ollama() -> &'static str {
    r#"provider = "ollama"
model = "bge-m3"
dims = 4
url = "http://127.0.0.1:9"
max_retries = 0
timeout_secs = 1"#
}

fn write_articles(dir: &Path, lines: &[&str]) -> PathBuf {
    let path = dir.join("articles.jsonl");
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn run_newsdesk(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = newsdesk_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run newsdesk binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_databases() {
    let (tmp, config_path) = setup_test_env(r#"provider = "disabled""#);

    let (stdout, stderr, success) = run_newsdesk(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/articles.sqlite").exists());
    assert!(tmp.path().join("data/index.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env(r#"provider = "disabled""#);

    let (_, _, success1) = run_newsdesk(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_newsdesk(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_newsdesk(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn test_import_counts_malformed_lines() {
    let (tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    let input = write_articles(
        tmp.path(),
        &[
            r#"{"guid":"a","title":"Council vote","url":"https://example.org/a","text":"The council voted."}"#,
            "{broken",
            r#"{"guid":"b","title":"Bridge","text":"The bridge reopened."}"#,
        ],
    );

    let (stdout, stderr, success) =
        run_newsdesk(&config_path, &["import", input.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("imported: 2"), "got: {}", stdout);
    assert!(stdout.contains("malformed: 1"), "got: {}", stdout);
}

#[test]
fn test_index_rejects_invalid_records() {
    let (tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    let input = write_articles(
        tmp.path(),
        &[
            r#"{"guid":"a","title":"Empty","text":"   "}"#,
            r#"{"guid":"b","title":"No text"}"#,
        ],
    );
    run_newsdesk(&config_path, &["import", input.to_str().unwrap()]);

    let (stdout, stderr, success) = run_newsdesk(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("rejected: 2"), "got: {}", stdout);
    assert!(stdout.contains("updated: 0"));
    assert!(stdout.contains("failed: 0"));
}

#[test]
fn test_index_survives_unreachable_embedder() {
    let (tmp, config_path) = setup_test_env(unreachable_ollama());
    let input = write_articles(
        tmp.path(),
        &[
            r#"{"guid":"a","title":"One","text":"First article."}"#,
            r#"{"guid":"b","title":"Two","text":"Second article."}"#,
            r#"{"guid":"c","title":"Three","text":""}"#,
        ],
    );
    run_newsdesk(&config_path, &["import", input.to_str().unwrap()]);

    let (stdout, stderr, success) = run_newsdesk(&config_path, &["index"]);
    assert!(success, "index must not abort: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("failed: 2"), "got: {}", stdout);
    assert!(stdout.contains("rejected: 1"), "got: {}", stdout);
    assert!(stdout.contains("updated: 0"));
}

#[test]
fn test_index_limit() {
    let (tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    let input = write_articles(
        tmp.path(),
        &[
            r#"{"guid":"a","text":""}"#,
            r#"{"guid":"b","text":""}"#,
            r#"{"guid":"c","text":""}"#,
        ],
    );
    run_newsdesk(&config_path, &["import", input.to_str().unwrap()]);

    let (stdout, _, success) = run_newsdesk(&config_path, &["index", "--limit", "2"]);
    assert!(success);
    assert!(stdout.contains("articles: 2"), "got: {}", stdout);
}

#[test]
fn test_ask_empty_index_prints_sentinel() {
    let (_tmp, config_path) = setup_test_env(unreachable_ollama());
    run_newsdesk(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_newsdesk(&config_path, &["ask", "What did the council decide?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert_eq!(stdout.trim(), "No matching articles.");

    let (stdout, _, success) =
        run_newsdesk(&config_path, &["ask", "What happened?", "--stream", "-k", "2"]);
    assert!(success);
    assert_eq!(stdout.trim(), "No matching articles.");
}

#[test]
fn test_ask_reads_question_from_stdin() {
    let (_tmp, config_path) = setup_test_env(r#"provider = "disabled""#);

    let mut child = Command::new(newsdesk_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("ask")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"Is the bridge open?\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("Question:"), "no prompt when stdin is piped");
    assert_eq!(stdout.trim(), "No matching articles.");
}

#[test]
fn test_ask_rejects_empty_question_and_zero_k() {
    let (_tmp, config_path) = setup_test_env(r#"provider = "disabled""#);

    let (_, _, success) = run_newsdesk(&config_path, &["ask", "   "]);
    assert!(!success);

    let (_, _, success) = run_newsdesk(&config_path, &["ask", "question", "-k", "0"]);
    assert!(!success);
}

#[test]
fn test_status_reports_counts() {
    let (tmp, config_path) = setup_test_env(r#"provider = "disabled""#);
    let input = write_articles(
        tmp.path(),
        &[
            r#"{"guid":"a","text":"one"}"#,
            r#"{"guid":"b","text":"two"}"#,
        ],
    );
    run_newsdesk(&config_path, &["import", input.to_str().unwrap()]);

    let (stdout, stderr, success) = run_newsdesk(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Articles:    2"), "got: {}", stdout);
    assert!(stdout.contains("Indexed:     0"), "got: {}", stdout);
    assert!(stdout.contains("Metric:      cosine"));
}
