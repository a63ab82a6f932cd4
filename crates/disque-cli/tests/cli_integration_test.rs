//! CLI Integration Tests
//!
//! Runs the `disque` binary against in-process mock clusters.
//!
//! Test Scenarios:
//! 1. Argument validation and error exit codes
//! 2. Commands printing JSON to stdout
//! 3. Error replies surfacing on stderr
//! 4. The `mock` subcommand serving real clients
//!
//! All addresses use `127.0.0.1` with OS-assigned ports.

use std::process::Stdio;
use std::time::Duration;

use disque_client::{Client, ClientConfig};
use disque_mock::{MockCluster, MockOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

// ============================================================================
// Test Helpers
// ============================================================================

fn disque() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_disque"));
    command.env_remove("DISQUE_NODES").env_remove("DISQUE_AUTH");
    command
}

/// Runs the binary against `nodes` and returns (success, stdout, stderr).
async fn run(nodes: &str, args: &[&str]) -> (bool, String, String) {
    let output = disque()
        .arg("--nodes")
        .arg(nodes)
        .args(args)
        .output()
        .await
        .unwrap();
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).trim().to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

async fn cluster() -> (MockCluster, String) {
    let cluster = MockCluster::start(MockOptions::default()).await.unwrap();
    let nodes = cluster.addresses().join(",");
    (cluster, nodes)
}

// ============================================================================
// Argument Validation Tests
// ============================================================================

#[tokio::test]
async fn test_requires_subcommand() {
    let output = disque().output().await.unwrap();
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_invalid_node_address() {
    let (success, _, stderr) = run("not-an-address", &["ping"]).await;
    assert!(!success);
    assert!(stderr.contains("Invalid configuration"), "{}", stderr);
}

#[tokio::test]
async fn test_unreachable_node() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let (success, _, stderr) = run(&addr, &["ping"]).await;
    assert!(!success);
    assert!(stderr.contains("Failed to connect"), "{}", stderr);
}

// ============================================================================
// Command Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_ping_prints_json() {
    let (_cluster, nodes) = cluster().await;
    let (success, stdout, _) = run(&nodes, &["ping"]).await;
    assert!(success);
    assert_eq!(stdout, "\"PONG\"");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_info_prints_object() {
    let (_cluster, nodes) = cluster().await;
    let (success, stdout, _) = run(&nodes, &["info"]).await;
    assert!(success);

    let info: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(info["loading"], "0");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_addjob_getjob_ackjob() {
    let (cluster, nodes) = cluster().await;

    let (success, stdout, _) = run(&nodes, &["addjob", "emails", "hello"]).await;
    assert!(success);
    let id: String = serde_json::from_str(&stdout).unwrap();
    assert!(id.starts_with(&format!("D-{}-", cluster.prefix(0))));
    assert_eq!(cluster.registered_jobs(0).await, 1);

    let (success, stdout, _) = run(&nodes, &["getjob", "emails", "--nohang"]).await;
    assert!(success);
    let jobs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(jobs[0]["id"], id.as_str());
    assert_eq!(jobs[0]["body"], "hello");

    let (success, stdout, _) = run(&nodes, &["ackjob", id.as_str()]).await;
    assert!(success);
    assert_eq!(stdout, "1");
    assert_eq!(cluster.registered_jobs(0).await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_addjob_over_maxlen_fails() {
    let (_cluster, nodes) = cluster().await;
    run(&nodes, &["addjob", "q", "one"]).await;

    let (success, _, stderr) = run(&nodes, &["addjob", "q", "two", "--maxlen", "1"]).await;
    assert!(!success);
    assert!(stderr.contains("MAXLEN"), "{}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_prints_raw_reply_without_logs() {
    let (_cluster, nodes) = cluster().await;
    let (success, stdout, stderr) = run(&nodes, &["call", "HELLO"]).await;
    assert!(success);
    assert!(stderr.is_empty(), "{}", stderr);

    let hello: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(hello[0], 1);
    assert_eq!(hello.as_array().unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_unknown_command_fails() {
    let (_cluster, nodes) = cluster().await;
    let (success, _, stderr) = run(&nodes, &["call", "FOOBAR"]).await;
    assert!(!success);
    assert!(stderr.contains("unknown command"), "{}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_auth_from_environment() {
    let cluster = MockCluster::start(MockOptions::default().with_nodes(1).with_auth("foobar"))
        .await
        .unwrap();

    let output = disque()
        .env("DISQUE_NODES", cluster.address(0))
        .env("DISQUE_AUTH", "foobar")
        .arg("ping")
        .output()
        .await
        .unwrap();
    assert!(output.status.success());
    assert_eq!(cluster.auth_attempts(0).await, vec!["foobar"]);
}

// ============================================================================
// Mock Subcommand
// ============================================================================

#[tokio::test]
async fn test_mock_serves_clients() {
    let mut child = disque()
        .args(["mock", "--count", "2"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let stdout = child.stdout.take().unwrap();
    let mut lines = BufReader::new(stdout).lines();
    let nodes = tokio::time::timeout(Duration::from_secs(10), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(nodes.split(',').count(), 2);

    let client = Client::connect(ClientConfig::parse(&nodes)).await.unwrap();
    assert_eq!(client.ping().await.unwrap(), "PONG");
    assert_eq!(client.hello().await.unwrap().nodes.len(), 2);
    client.quit().await;

    child.kill().await.unwrap();
}
