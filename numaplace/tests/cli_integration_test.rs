use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const TWO_NODE_HOST: &str = r#"
distances = [[10, 21], [21, 10]]

[[nodes]]
cpus = "0-1"
memory_mb = 1024

[[nodes]]
cpus = "2-3"
memory_mb = 1024
"#;

fn write_host(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("host.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn cli_help_works() {
    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("NUMA-aware vCPU placement planner"));
}

#[test]
fn cli_version_works() {
    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("numaplace"));
}

#[test]
fn plan_subcommand_help() {
    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.arg("plan")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("--vcpus"))
        .stdout(predicate::str::contains("--memory-mb"))
        .stdout(predicate::str::contains("--affinity"));
}

#[test]
fn validate_accepts_host_file() {
    let dir = TempDir::new().unwrap();
    let host = write_host(&dir, TWO_NODE_HOST);

    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.arg("validate")
        .arg("--host")
        .arg(&host)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 nodes, 4 CPUs"))
        .stdout(predicate::str::contains("node1: cpus 2-3, 1024 MiB free"))
        .stdout(predicate::str::contains("Host configuration is valid"));
}

#[test]
fn validate_rejects_mismatched_host_file() {
    let dir = TempDir::new().unwrap();
    let host = write_host(&dir, "distances = [[10]]\n[[nodes]]\ncpus = \"0\"\n[[nodes]]\ncpus = \"1\"\n");

    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.arg("validate")
        .arg("--host")
        .arg(&host)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid host or request: Configuration error"));
}

#[test]
fn validate_missing_file_fails() {
    let dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.arg("validate")
        .arg("--host")
        .arg(dir.path().join("missing.toml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error: IO error"));
}

#[test]
fn plan_rejects_bad_affinity_as_caller_error() {
    let dir = TempDir::new().unwrap();
    let host = write_host(&dir, TWO_NODE_HOST);

    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.args(["plan", "--vcpus", "1", "--affinity", "3-1", "--host"])
        .arg(&host)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid host or request"));
}

#[test]
fn plan_fits_on_one_node() {
    let dir = TempDir::new().unwrap();
    let host = write_host(&dir, TWO_NODE_HOST);

    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.args(["plan", "--vcpus", "2", "--memory-mb", "512", "--host"])
        .arg(&host)
        .assert()
        .success()
        .stdout(predicate::str::contains("CPUs: 0-1"))
        .stdout(predicate::str::contains("Nodes: node0"))
        .stdout(predicate::str::contains("NUMA-aware cost: worst=10"))
        .stdout(predicate::str::contains("Spread baseline: worst=21"));
}

#[test]
fn plan_respects_affinity() {
    let dir = TempDir::new().unwrap();
    let host = write_host(&dir, TWO_NODE_HOST);

    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.args(["plan", "--vcpus", "1", "--affinity", "3", "--host"])
        .arg(&host)
        .assert()
        .success()
        .stdout(predicate::str::contains("CPUs: 3"))
        .stdout(predicate::str::contains("Nodes: node1"));
}

#[test]
fn plan_without_fit_fails() {
    let dir = TempDir::new().unwrap();
    let host = write_host(&dir, TWO_NODE_HOST);

    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.args(["plan", "--vcpus", "5", "--host"])
        .arg(&host)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No NUMA placement fits"));
}

#[test]
fn plan_json_output() {
    let dir = TempDir::new().unwrap();
    let host = write_host(&dir, TWO_NODE_HOST);

    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    let output = cmd
        .args(["plan", "--vcpus", "2", "--memory-mb", "1536", "--json", "--host"])
        .arg(&host)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["placement"]["cpus"], "0,2");
    assert_eq!(value["placement"]["nodes"], serde_json::json!([0, 1]));
    assert_eq!(value["cost"]["worst"], 21);
}

#[test]
fn simulate_reports_fleet() {
    let dir = TempDir::new().unwrap();
    let host = write_host(&dir, TWO_NODE_HOST);

    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.args(["simulate", "--vms", "2", "--host"])
        .arg(&host)
        .assert()
        .success()
        .stdout(predicate::str::contains("Fleet of 2 VMs (2 vCPUs, 1024 MiB each)"))
        .stdout(predicate::str::contains("Placed: 2/2"))
        .stdout(predicate::str::contains("Non-regressing: yes"));
}

#[test]
fn simulate_json_lists_unplaced() {
    let dir = TempDir::new().unwrap();
    let host = write_host(&dir, TWO_NODE_HOST);

    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    let output = cmd
        .args(["simulate", "--vms", "3", "--vcpus", "1", "--memory-mb", "1024", "--json", "--host"])
        .arg(&host)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["vms"].as_array().unwrap().len(), 3);
    assert_eq!(value["unplaced"], serde_json::json!([2]));
}

#[test]
fn simulate_rejects_zero_vms() {
    let dir = TempDir::new().unwrap();
    let host = write_host(&dir, TWO_NODE_HOST);

    let mut cmd = Command::cargo_bin("numaplace").unwrap();
    cmd.args(["simulate", "--vms", "0", "--host"])
        .arg(&host)
        .assert()
        .failure();
}
