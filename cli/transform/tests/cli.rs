//! End-to-end tests for the sf-transform binary.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn sf_transform(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_sf-transform"))
        .args(args)
        .env_remove("SF_ENGINE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn test_pipes_records_through_stdin_and_stdout() {
    let output = sf_transform(
        &[
            "-e",
            "rhai",
            "-k",
            r#"fn keyTransform(k) { k + "123" }"#,
            "-v",
            "fn valueTransform(v) { v.qweqweq = 12312312; v }",
        ],
        r#"{"topic":"events","offset":7,"key":"abc","value":{"created_when":"2019-05-31T00:17:00.188Z"}}"#,
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        record,
        serde_json::json!({
            "topic": "events",
            "offset": 7,
            "key": "abc123",
            "value": {"created_when": "2019-05-31T00:17:00.188Z", "qweqweq": 12312312}
        })
    );
}

#[test]
fn test_dropped_records_exit_with_partial_failure() {
    let output = sf_transform(
        &[
            "-e",
            "jq",
            "--raw",
            "-v",
            "def valueTransform: .n += 1;",
            "--error-policy",
            "drop",
            "--stats",
        ],
        "{\"n\":1}\n[1,2]\n",
    );
    assert_eq!(output.status.code(), Some(4));

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.trim(), r#"{"n":2}"#);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Records failed:  1"), "{stderr}");
}

#[test]
fn test_unknown_engine_fails() {
    let output = sf_transform(&["-e", "esperanto", "--validate"], "");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("esperanto"));
}

#[test]
fn test_list_engines() {
    let output = sf_transform(&["--list-engines"], "");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for engine in ["rhai", "lua", "javascript", "starlark", "jq"] {
        assert!(stdout.lines().any(|line| line == engine), "{engine} missing");
    }
}
