//! End-to-end tests for the `esp` binary

use assert_cmd::Command;
use mockito::{Matcher, Server};
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

fn esp() -> Command {
    let mut cmd = Command::cargo_bin("esp").unwrap();
    cmd.env_remove("ESP_RPC_URL")
        .env_remove("ESP_REGISTRY")
        .env_remove("ESP_BLOCK");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_encode_reports_length() {
    esp()
        .args(["encode", "slot 4 follow offset 1 read", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"length\":9"));
}

#[test]
fn test_decode_prints_text() {
    esp()
        .args(["decode", "0x040104060701", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("slot 4 follow read"));
}

#[test]
fn test_decode_rejects_unknown_opcode() {
    esp()
        .args(["decode", "0xee"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_demo_json() {
    let output = esp().args(["demo", "--format", "json"]).output().unwrap();
    assert!(output.status.success());

    let report = stdout_json(&output);
    let owners: Vec<String> = report["owners"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o.as_str().unwrap().to_lowercase())
        .collect();
    assert_eq!(
        owners,
        vec![
            "0x51050ec063d393217b436747617ad1c2285aeeee",
            "0xd8da6bf26964af9d7eed9e03e53415d37aa96045",
        ]
    );
    assert_eq!(report["expired"], json!([true, false]));
    assert_eq!(report["program_lengths"]["program_getOwner_A"], 5);
    assert_eq!(report["program_lengths"]["program_getOwner_B"], 9);
}

#[test]
fn test_demo_toml_to_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.toml");

    esp()
        .args(["demo", "--format", "toml", "--output"])
        .arg(&path)
        .assert()
        .success();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("expired"));
    assert!(content.contains("program_getOwner_A = 5"));
}

#[test]
fn test_resolve_without_endpoint_fails() {
    esp()
        .args([
            "resolve",
            "--target",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "--id",
            "1",
            "--registry",
            "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no RPC endpoint"));
}

#[test]
fn test_eval_against_mocked_node() {
    let mut server = Server::new();
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_getStorageAt" })))
        .with_header("content-type", "application/json")
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x2a" }).to_string())
        .create();
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_getProof" })))
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": {
                    "address": "0x1111111111111111111111111111111111111111",
                    "storageHash": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
                    "accountProof": ["0xf90211"],
                    "storageProof": [
                        { "key": "0x3", "value": "0x2a", "proof": ["0xe2a0"] }
                    ]
                }
            })
            .to_string(),
        )
        .create();

    let output = esp()
        .args([
            "eval",
            "push 0x1111111111111111111111111111111111111111 target slot 3 read output 0",
            "--outputs",
            "1",
            "--block",
            "12",
            "--format",
            "json",
            "--rpc",
        ])
        .arg(server.url())
        .output()
        .unwrap();
    assert!(output.status.success());

    let result = stdout_json(&output);
    assert_eq!(result["block"], 12);
    assert_eq!(
        result["outputs"][0],
        "0x000000000000000000000000000000000000000000000000000000000000002a"
    );
    assert_eq!(result["proofs"][0]["nodes"], 2);
}

#[test]
fn test_eval_uses_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("esp.toml");
    // nothing listens on port 1
    fs::write(&path, "rpc_url = \"http://127.0.0.1:1\"\nblock = 1\n").unwrap();

    esp()
        .args(["eval", "slot 0 read output 0", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("RPC request failed"));
}
