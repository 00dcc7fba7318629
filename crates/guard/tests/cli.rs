use assert_cmd::Command;
use fs2::FileExt;
use predicates::str::contains;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::tempdir;

const SUM_TOTAL: &str = "def sum_total(items):\n    total = 0\n    for item in items:\n        total += item\n    return total\n";

const RENAMED_TOTAL: &str = "def total(values):\n    acc = 0\n    for v in values:\n        acc += v\n    return acc\n";

#[allow(deprecated)]
fn dupgate(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dupgate").expect("binary");
    cmd.current_dir(workdir)
        .env_remove("RUST_LOG")
        .env("DUPGATE_EMBEDDING_MODE", "lexical")
        .env("DUPGATE_STORE_DIR", workdir.join("store"));
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

fn write_event(file_path: &str, content: &str) -> String {
    json!({
        "tool_name": "Write",
        "file_path": file_path,
        "proposed_content": content,
    })
    .to_string()
}

#[test]
fn index_then_check_blocks_renamed_copy() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::write(root.join("a.py"), SUM_TOTAL).unwrap();

    let indexed = stdout_json(dupgate(root).arg("index").arg("a.py"));
    assert_eq!(indexed["indexed"], 1);

    let event = write_event("b.py", RENAMED_TOTAL);
    let response = stdout_json(dupgate(root).arg("check").write_stdin(event.clone()));
    assert_eq!(response["decision"], "block");
    assert_eq!(response["findings"][0]["matched_origin"], "a.py:sum_total");

    let forgotten = stdout_json(dupgate(root).arg("forget").arg("a.py"));
    assert_eq!(forgotten["removed"], 1);

    let response = stdout_json(dupgate(root).arg("check").write_stdin(event));
    assert_eq!(response["decision"], "allow");
}

#[test]
fn sweep_drops_records_of_deleted_files() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::write(root.join("a.py"), SUM_TOTAL).unwrap();
    stdout_json(dupgate(root).arg("index").arg("a.py"));

    fs::remove_file(root.join("a.py")).unwrap();
    let swept = stdout_json(dupgate(root).arg("sweep"));
    assert_eq!(swept["removed"], 1);
}

#[test]
fn config_file_is_honored() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join(".dupgate")).unwrap();
    fs::write(
        root.join(".dupgate/config.toml"),
        "[guard]\nwrite_tools = [\"Create\"]\n",
    )
    .unwrap();

    let event = r#"{"tool_name":"Write","file_path":"b.py","proposed_content":"x = 1"}"#;
    let response = stdout_json(dupgate(root).arg("check").write_stdin(event));
    assert_eq!(response["decision"], "allow");
    assert_eq!(response["rationale"], "Write does not write code");
}

#[test]
fn invalid_event_fails_with_message() {
    let temp = tempdir().unwrap();
    dupgate(temp.path())
        .arg("check")
        .write_stdin("{not json")
        .assert()
        .failure()
        .stderr(contains("Invalid hook event JSON"));
}

#[test]
fn invalid_policy_override_fails() {
    let temp = tempdir().unwrap();
    dupgate(temp.path())
        .env("DUPGATE_UNAVAILABILITY_POLICY", "sometimes")
        .arg("sweep")
        .assert()
        .failure()
        .stderr(contains("DUPGATE_UNAVAILABILITY_POLICY"));
}

#[test]
fn corrupt_store_answers_through_policy() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("store")).unwrap();
    fs::write(root.join("store/code_fragments.json"), "{not json").unwrap();
    let event = write_event("b.py", RENAMED_TOTAL);

    let response = stdout_json(dupgate(root).arg("check").write_stdin(event.clone()));
    assert_eq!(response["decision"], "warn");
    let rationale = response["rationale"].as_str().unwrap();
    assert!(rationale.contains("corrupt collection file"), "{rationale}");

    let closed = stdout_json(
        dupgate(root)
            .env("DUPGATE_UNAVAILABILITY_POLICY", "fail_closed")
            .arg("check")
            .write_stdin(event),
    );
    assert_eq!(closed["decision"], "block");

    dupgate(root)
        .arg("sweep")
        .assert()
        .failure()
        .stderr(contains("corrupt collection file"));
}

#[test]
fn held_store_lock_does_not_stall_check() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("store")).unwrap();
    let lock = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(root.join("store/code_fragments.lock"))
        .unwrap();
    lock.lock_exclusive().unwrap();

    let start = Instant::now();
    let response = stdout_json(
        dupgate(root)
            .arg("check")
            .write_stdin(write_event("b.py", RENAMED_TOTAL)),
    );
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
    assert_eq!(response["decision"], "warn");
    let rationale = response["rationale"].as_str().unwrap();
    assert!(rationale.contains("timed out"), "{rationale}");
    lock.unlock().unwrap();
}
