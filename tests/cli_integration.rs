/// End-to-end tests of the vm-host binary
use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;
use vm_host::async_call::{encode_async_context, AsyncContext};
use vm_host::Address;

fn vm_host() -> Command {
    Command::cargo_bin("vm-host").unwrap()
}

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

#[test]
fn help_lists_subcommands() {
    vm_host()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check-config"))
        .stdout(predicate::str::contains("gas-schedule"))
        .stdout(predicate::str::contains("decode-async"));
}

#[test]
fn gas_schedule_prints_defaults_as_json() {
    let output = vm_host().arg("gas-schedule").output().unwrap();
    assert!(output.status.success());

    let schedule: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(schedule["BaseOperationCost"]["StorePerByte"], 10_000);
    assert!(schedule["HostApiCost"].is_object());
}

#[test]
fn gas_schedule_reads_overrides() {
    let file = config_file("[BaseOperationCost]\nStorePerByte = 7\n");
    let output = vm_host()
        .args(["gas-schedule", "--file"])
        .arg(file.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let schedule: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(schedule["BaseOperationCost"]["StorePerByte"], 7);
    assert_eq!(schedule["BaseOperationCost"]["ReleasePerByte"], 1_000);
}

#[test]
fn check_config_accepts_valid_file() {
    let file = config_file("max_call_depth = 4\nenable_gas_trace = true\n");
    vm_host()
        .arg("check-config")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("max_call_depth         = 4"));
}

#[test]
fn check_config_quiet_json_is_pure_json() {
    let file = config_file("max_instances = 3\n");
    let output = vm_host()
        .args(["--quiet", "check-config", "--format", "json"])
        .arg(file.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["max_instances"], 3);
    assert_eq!(config["protected_key_prefix"], "VMHOST");
}

#[test]
fn check_config_rejects_invalid_values() {
    let file = config_file("max_call_depth = 0\n");
    vm_host()
        .arg("check-config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_call_depth must be at least 1"));
}

#[test]
fn check_config_reports_missing_file() {
    vm_host()
        .args(["check-config", "/nonexistent/host.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/host.toml"));
}

#[test]
fn decode_async_prints_context() {
    let context = AsyncContext::new(Address([4; 32]), b"call".to_vec(), b"parent".to_vec());
    let encoded = hex::encode(encode_async_context(&context).unwrap());

    let output = vm_host().args(["decode-async", &encoded]).output().unwrap();
    assert!(output.status.success());

    let decoded: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(decoded["call_id"], serde_json::json!(b"call".to_vec()));
    assert_eq!(decoded["groups"], serde_json::json!([]));
}

#[test]
fn decode_async_rejects_garbage() {
    vm_host()
        .args(["decode-async", "zz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("value is not hex"));

    vm_host()
        .args(["decode-async", "0x0102"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("value is not an async context"));
}
