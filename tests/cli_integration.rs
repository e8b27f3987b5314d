// Integration tests for CLI commands
// These run the built binary against temp config files and a scrubbed
// environment, so no ledger or service is needed.

use duet::ledger::codec::encode_snapshot;
use duet::types::{Address, ConversationId, MessageEnvelope};
use std::io::Write;
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

fn duet(home: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_duet"));
    command
        .env_clear()
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"));
    command
}

#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    let output = duet(&home).arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Operator CLI for the Duet messaging client"));
    assert!(stdout.contains("status"));
    assert!(stdout.contains("decode-snapshot"));
    assert!(stdout.contains("version"));
}

#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    let output = duet(&home).arg("version").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("duet {}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_cli_status_unconfigured_environment() {
    let home = TempDir::new().unwrap();
    let output = duet(&home)
        .arg("status")
        .env("WALLET_ADDRESS", "0xabc")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Source: environment"));
    assert!(stdout.contains("Unconfigured"));
    assert!(stdout.contains("DUET_PACKAGE_ID"));
    assert!(!stdout.contains("DUET_SELF_ADDRESS"));
}

#[test]
fn test_cli_status_configured_environment() {
    let home = TempDir::new().unwrap();
    let output = duet(&home)
        .arg("status")
        .env("DUET_PACKAGE_ID", "0xpkg")
        .env("MESSAGING_REGISTRY_ID", "0xreg")
        .env("DUET_NETWORK", "testnet")
        .env("DUET_SELF_ADDRESS", "0xabc")
        .env("DUET_BLOB_ENDPOINT", "https://publisher.example/v1/blobs")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configured"));
    assert!(stdout.contains("Registry: 0xreg"));
    assert!(stdout.contains("Blob store: https://publisher.example/v1/blobs"));
}

#[test]
fn test_cli_status_from_config_file() {
    let home = TempDir::new().unwrap();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[ledger]
package_id = "0xpkg"
module_name = "chat"
registry_id = "0xreg"
network = "devnet"
self_address = "0xabc"

[policy]
base_url = "https://policy.example"
"#
    )
    .unwrap();

    let output = duet(&home)
        .args(["status", "--config"])
        .arg(file.path())
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Network: devnet"));
    assert!(stdout.contains("Module: chat"));
    assert!(stdout.contains("Policy service: https://policy.example"));
}

#[test]
fn test_cli_status_bad_config_file_fails() {
    let home = TempDir::new().unwrap();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "this is not toml = = =").unwrap();

    let output = duet(&home)
        .args(["status", "--config"])
        .arg(file.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse config file"));
}

#[test]
fn test_cli_decode_snapshot() {
    let home = TempDir::new().unwrap();
    let envelope = MessageEnvelope {
        conversation_id: ConversationId::new("0xc0"),
        sequence: 12,
        sender: Address::new("0xabc"),
        recipient: Address::new("0xdef"),
        ciphertext: vec![0xde, 0xad],
        meta: vec![],
        policy_id: b"policy".to_vec(),
        attachment: Some("blob-1".to_string()),
        created_at: 1_700_000_000_000,
        read_at: None,
        ciphertext_digest: vec![],
        meta_digest: vec![],
    };
    let hex_bytes = hex::encode(encode_snapshot(&envelope).unwrap());

    let output = duet(&home)
        .args(["decode-snapshot", "--conversation", "0xc0", "--hex", &hex_bytes])
        .output()
        .unwrap();

    assert!(output.status.success());
    let decoded: MessageEnvelope = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(decoded, envelope);
}

#[test]
fn test_cli_decode_snapshot_rejects_garbage() {
    let home = TempDir::new().unwrap();
    let output = duet(&home)
        .args(["decode-snapshot", "--conversation", "0xc0", "--hex", "0x07"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error"));
}
