use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_stream-schema");

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("failed to write test file");
    path
}

fn person_schema(dir: &TempDir) -> PathBuf {
    write(
        dir,
        "person.json",
        r#"{
  "type": "object",
  "required": ["name"],
  "properties": {
    "name": {"type": "string"},
    "age": {"type": "integer", "minimum": 0},
    "email": {"type": "string", "format": "email"}
  },
  "additionalProperties": false
}"#,
    )
}

fn run(args: &[&str]) -> Output {
    Command::new(BIN)
        .args(args)
        .output()
        .expect("failed to run stream-schema")
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

#[test]
fn check_reports_node_count() {
    let dir = TempDir::new().unwrap();
    let schema = person_schema(&dir);

    let output = run(&["check", arg(&schema)]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("4 node(s)"), "unexpected output: {stdout}");
}

#[test]
fn check_rejects_invalid_schema() {
    let dir = TempDir::new().unwrap();
    let schema = write(&dir, "bad.json", r#"{"type": "text"}"#);

    let output = run(&["check", arg(&schema)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid primitive type 'text'"), "{stderr}");
}

#[test]
fn check_accepts_yaml_schema() {
    let dir = TempDir::new().unwrap();
    let schema = write(
        &dir,
        "list.yaml",
        "type: array\nitems:\n  type: integer\nuniqueItems: true\n",
    );

    let output = run(&["check", arg(&schema)]);
    assert!(output.status.success());
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

#[test]
fn validate_succeeds_when_all_instances_conform() {
    let dir = TempDir::new().unwrap();
    let schema = person_schema(&dir);
    let a = write(&dir, "a.json", r#"{"name": "Ada", "age": 36}"#);
    let b = write(&dir, "b.yml", "name: Grace\nemail: grace@example.com\n");

    let output = run(&["validate", "--schema", arg(&schema), arg(&a), arg(&b)]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("a.json: valid"));
    assert!(stdout.contains("b.yml: valid"));
    assert!(stdout.contains("2 valid, 0 invalid, 0 error(s)"));
}

#[test]
fn validate_fails_on_nonconforming_instance() {
    let dir = TempDir::new().unwrap();
    let schema = person_schema(&dir);
    let good = write(&dir, "good.json", r#"{"name": "Ada"}"#);
    let bad = write(&dir, "bad.json", r#"{"name": "Ada", "nickname": "A"}"#);

    let output = run(&["validate", "--schema", arg(&schema), arg(&good), arg(&bad)]);
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bad.json: invalid"));
    assert!(stdout.contains("1 valid, 1 invalid"));
}

#[test]
fn validate_reports_malformed_and_missing_instances() {
    let dir = TempDir::new().unwrap();
    let schema = person_schema(&dir);
    let broken = write(&dir, "broken.json", r#"{"name": "#);
    let missing = dir.path().join("missing.json");

    let output = run(&[
        "validate",
        "--schema",
        arg(&schema),
        arg(&broken),
        arg(&missing),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken.json: error"));
    assert!(stderr.contains("missing.json: error"));
}

#[test]
fn validate_json_report() {
    let dir = TempDir::new().unwrap();
    let schema = person_schema(&dir);
    let a = write(&dir, "a.json", r#"{"name": "Ada"}"#);
    let b = write(&dir, "b.json", r#"{"age": -1}"#);

    let output = run(&[
        "validate",
        "--schema",
        arg(&schema),
        "--format",
        "json",
        arg(&a),
        arg(&b),
    ]);
    assert!(!output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("report should be JSON");
    assert_eq!(report["valid"], 1);
    assert_eq!(report["invalid"], 1);
    assert_eq!(report["errors"], 0);
    assert_eq!(report["instances"][0]["valid"], true);
    assert_eq!(report["instances"][1]["valid"], false);
}

#[test]
fn validate_config_disables_formats() {
    let dir = TempDir::new().unwrap();
    let schema = person_schema(&dir);
    let instance = write(&dir, "a.json", r#"{"name": "Ada", "email": "not-an-email"}"#);
    let config = write(
        &dir,
        "config.yml",
        "version: \"1.0\"\ncompile:\n  validate_formats: false\nvalidation:\n  jobs: 2\n",
    );

    let strict = run(&["validate", "--schema", arg(&schema), arg(&instance)]);
    assert!(!strict.status.success());

    let lenient = run(&[
        "validate",
        "--schema",
        arg(&schema),
        "--config",
        arg(&config),
        arg(&instance),
    ]);
    assert!(lenient.status.success());
}

#[test]
fn validate_rejects_zero_jobs() {
    let dir = TempDir::new().unwrap();
    let schema = person_schema(&dir);
    let instance = write(&dir, "a.json", r#"{"name": "Ada"}"#);

    let output = run(&[
        "validate",
        "--schema",
        arg(&schema),
        "--jobs",
        "0",
        arg(&instance),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--jobs must be at least 1"));
}

#[test]
fn validate_many_instances_in_parallel() {
    let dir = TempDir::new().unwrap();
    let schema = write(&dir, "n.json", r#"{"type": "integer", "multipleOf": 2}"#);
    let paths: Vec<PathBuf> = (0..16)
        .map(|n| write(&dir, &format!("{n}.json"), &(n * 2).to_string()))
        .collect();

    let mut args = vec!["validate", "--schema", arg(&schema), "--jobs", "4"];
    args.extend(paths.iter().map(|p| arg(p)));
    let output = run(&args);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("16 valid"));
}
