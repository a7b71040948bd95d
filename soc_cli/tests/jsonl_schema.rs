use assert_cmd::prelude::*;
use rstest::rstest;
use std::process::Command;
use tempfile::tempdir;

mod common;
use common::{write_config, write_tables, write_trace};

/// Validate the JSON summary line of a completed simulation.
#[rstest]
fn json_summary_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), 2, 2);
    let tables = write_tables(dir.path());
    let trace = write_trace(dir.path(), 4);

    let mut cmd = Command::cargo_bin("soc").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("--tables")
        .arg(&tables)
        .arg("simulate")
        .arg("--trace")
        .arg(&trace);

    let out = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"cycles\""))
        .unwrap_or("")
        .to_string();
    assert!(!line.is_empty(), "no JSON summary line; stdout was: {stdout}");

    let v: serde_json::Value = serde_json::from_str(&line).expect("valid JSON");
    assert!(v.get("timestamp").and_then(|x| x.as_u64()).is_some());
    assert!(v.get("duration_ms").and_then(|x| x.as_u64()).is_some());
    assert_eq!(v.get("cycles").and_then(|x| x.as_u64()), Some(3));
    assert_eq!(v.get("stale_cycles").and_then(|x| x.as_u64()), Some(0));

    let soc = v.get("soc").and_then(|x| x.as_array()).expect("soc array");
    assert_eq!(soc.len(), 4);
    for s in soc {
        let s = s.as_f64().expect("numeric soc");
        assert!((0.0..=1.0).contains(&s));
    }
    assert_eq!(v.get("soc_variance").and_then(|x| x.as_array()).map(Vec::len), Some(4));
    assert!(v.get("mask").and_then(|x| x.as_u64()).is_some());
}

/// Errors in JSON mode are a single object on stdout with the exit code.
#[rstest]
fn json_error_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), 1, 1);

    let mut cmd = Command::cargo_bin("soc").unwrap();
    cmd.arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("--tables")
        .arg(dir.path().join("missing"))
        .arg("self-check");

    let out = cmd.assert().code(2).get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout.lines().last().unwrap_or("");
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert_eq!(v["reason"], "Config");
    assert_eq!(v["exit_code"], 2);
    assert!(v["message"].as_str().is_some_and(|m| m.contains("Invalid configuration")));
}
