//! End-to-end integration tests for the rbs-sig CLI.
//!
//! These tests exercise the full CLI workflow including:
//! - `rbs-sig check` - Validate signature files
//! - `rbs-sig format` - Rewrite signature files canonically
//! - `rbs-sig type` / `rbs-sig method-type` - Parse single snippets

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command for the rbs-sig binary.
fn rbs_sig() -> Command {
    let mut cmd = Command::cargo_bin("rbs-sig").unwrap();
    cmd.env_remove("RBS_SIG_INDENT").arg("--color").arg("never");
    cmd
}

/// Create a temporary signature file with the given content.
fn create_sig_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Sample signatures for testing
// ============================================================================

const CANONICAL_SIG: &str = "\
# A stack of elements.
class Stack[Elem] < Object
  include Enumerable[Elem]

  def push: (Elem item) -> self
  def pop: () -> Elem?
end
";

const MESSY_SIG: &str = "class  Stack[Elem]<Object\ninclude Enumerable[Elem]\n\ndef push:(Elem item)->self\ndef pop:()->Elem?\nend";

// Mixins are rejected inside interfaces.
const INVALID_SIG: &str = "interface _Each\n  include Enumerable\nend\n";

// ============================================================================
// Check command tests
// ============================================================================

#[test]
fn test_check_valid_file() {
    let dir = TempDir::new().unwrap();
    let path = create_sig_file(&dir, "stack.rbs", CANONICAL_SIG);

    rbs_sig()
        .arg("check")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("✓"));
}

#[test]
fn test_check_invalid_file() {
    let dir = TempDir::new().unwrap();
    let path = create_sig_file(&dir, "each.rbs", INVALID_SIG);

    rbs_sig()
        .arg("check")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "mixin is not allowed in interface declaration",
        ))
        .stderr(predicate::str::contains("each.rbs:2:3"))
        .stderr(predicate::str::contains("1 of 1 file(s) failed to parse"));
}

#[test]
fn test_check_missing_file() {
    rbs_sig()
        .arg("check")
        .arg("/nonexistent/path/sig.rbs")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_check_walks_directories() {
    let dir = TempDir::new().unwrap();
    create_sig_file(&dir, "lib/a.rbs", CANONICAL_SIG);
    create_sig_file(&dir, "lib/nested/b.rbs", "type id = Integer\n");
    create_sig_file(&dir, "lib/notes.txt", "not a signature {");

    rbs_sig()
        .arg("check")
        .arg(dir.path().join("lib"))
        .assert()
        .success()
        .stdout(predicate::str::contains("a.rbs"))
        .stdout(predicate::str::contains("b.rbs"))
        .stdout(predicate::str::contains("notes.txt").not());
}

#[test]
fn test_check_json_output() {
    let dir = TempDir::new().unwrap();
    let good = create_sig_file(&dir, "good.rbs", CANONICAL_SIG);
    let bad = create_sig_file(&dir, "bad.rbs", INVALID_SIG);

    let output = rbs_sig()
        .arg("check")
        .arg("--format")
        .arg("json")
        .arg(&good)
        .arg(&bad)
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["checked"], 2);
    assert_eq!(report["errors"], 1);
    assert_eq!(report["files"][0]["declarations"], 1);
    assert!(report["files"][0]["error"].is_null());

    let error = &report["files"][1]["error"];
    assert_eq!(error["token"], "include");
    assert_eq!(error["line"], 2);
    assert_eq!(error["column"], 2);
}

#[test]
fn test_check_requires_paths() {
    rbs_sig().arg("check").assert().failure();
}

// ============================================================================
// Format command tests
// ============================================================================

#[test]
fn test_format_check_mode_clean() {
    let dir = TempDir::new().unwrap();
    let path = create_sig_file(&dir, "stack.rbs", CANONICAL_SIG);

    rbs_sig()
        .arg("format")
        .arg("--check")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("✓"));
}

#[test]
fn test_format_check_mode_dirty() {
    let dir = TempDir::new().unwrap();
    let path = create_sig_file(&dir, "stack.rbs", MESSY_SIG);

    rbs_sig()
        .arg("format")
        .arg("--check")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("would be reformatted"));

    // --check never touches the file
    assert_eq!(fs::read_to_string(&path).unwrap(), MESSY_SIG);
}

#[test]
fn test_format_writes_file() {
    let dir = TempDir::new().unwrap();
    let path = create_sig_file(&dir, "stack.rbs", MESSY_SIG);

    rbs_sig()
        .arg("format")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("formatted"));

    let formatted = fs::read_to_string(&path).unwrap();
    assert_eq!(
        formatted,
        "class Stack[Elem] < Object\n  include Enumerable[Elem]\n\n  def push: (Elem item) -> self\n  def pop: () -> Elem?\nend\n"
    );
}

#[test]
fn test_format_unchanged_file() {
    let dir = TempDir::new().unwrap();
    let path = create_sig_file(&dir, "stack.rbs", CANONICAL_SIG);

    rbs_sig()
        .arg("format")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("(unchanged)"));
}

#[test]
fn test_format_indent_option() {
    let dir = TempDir::new().unwrap();
    let path = create_sig_file(&dir, "a.rbs", "module A\ndef a: () -> void\nend\n");

    rbs_sig()
        .arg("--indent")
        .arg("4")
        .arg("format")
        .arg(&path)
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "module A\n    def a: () -> void\nend\n"
    );
}

#[test]
fn test_format_indent_from_env() {
    let dir = TempDir::new().unwrap();
    let path = create_sig_file(&dir, "a.rbs", "module A\ndef a: () -> void\nend\n");

    rbs_sig()
        .env("RBS_SIG_INDENT", "1")
        .arg("format")
        .arg(&path)
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "module A\n def a: () -> void\nend\n"
    );
}

#[test]
fn test_format_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = create_sig_file(&dir, "each.rbs", INVALID_SIG);

    rbs_sig()
        .arg("format")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse"));

    assert_eq!(fs::read_to_string(&path).unwrap(), INVALID_SIG);
}

#[test]
fn test_format_no_files() {
    rbs_sig()
        .arg("format")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No files specified"));
}

// ============================================================================
// Type and method-type command tests
// ============================================================================

#[test]
fn test_type_prints_canonical_form() {
    rbs_sig()
        .arg("type")
        .arg("Array[ Integer|String ]?")
        .assert()
        .success()
        .stdout("Array[Integer | String]?\n");
}

#[test]
fn test_type_with_bound_variable() {
    rbs_sig()
        .arg("type")
        .arg("--var")
        .arg("T")
        .arg("Hash[T,T]")
        .assert()
        .success()
        .stdout("Hash[T, T]\n");
}

#[test]
fn test_type_error() {
    rbs_sig()
        .arg("type")
        .arg("{ a: Integer, a: String }")
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicated record key"))
        .stderr(predicate::str::contains("<input>"));
}

#[test]
fn test_method_type_prints_canonical_form() {
    rbs_sig()
        .arg("method-type")
        .arg("[T](T x,?k: Integer){(T)->void}->T")
        .assert()
        .success()
        .stdout("[T] (T x, ?k: Integer) { (T) -> void } -> T\n");
}

// ============================================================================
// Help and version tests
// ============================================================================

#[test]
fn test_help() {
    Command::cargo_bin("rbs-sig")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("format"))
        .stdout(predicate::str::contains("method-type"));
}

#[test]
fn test_version() {
    Command::cargo_bin("rbs-sig")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rbs-sig"));
}

// ============================================================================
// End-to-end workflow tests
// ============================================================================

#[test]
fn test_full_workflow() {
    let dir = TempDir::new().unwrap();
    let path = create_sig_file(&dir, "sig/stack.rbs", MESSY_SIG);

    // 1. Messy input still parses
    rbs_sig().arg("check").arg(&path).assert().success();

    // 2. Not yet canonical
    rbs_sig()
        .arg("format")
        .arg("--check")
        .arg(dir.path())
        .assert()
        .failure();

    // 3. Rewrite the whole directory
    rbs_sig().arg("format").arg(dir.path()).assert().success();

    // 4. Now canonical and still valid
    rbs_sig()
        .arg("format")
        .arg("--check")
        .arg(dir.path())
        .assert()
        .success();
    rbs_sig().arg("check").arg(&path).assert().success();
}
