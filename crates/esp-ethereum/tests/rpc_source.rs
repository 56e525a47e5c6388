//! JSON-RPC storage source against a mocked node

use alloy_primitives::{Address, U256};
use esp_core::{EspError, Request};
use esp_ethereum::{Prover, RpcStorageSource, StorageSource};
use mockito::{Matcher, Server};
use serde_json::json;

fn rpc_result(result: serde_json::Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
}

#[tokio::test]
async fn test_latest_pins_block_number() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_blockNumber" })))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!("0x1b4")))
        .create_async()
        .await;

    let source = RpcStorageSource::latest(server.url()).await.unwrap();
    assert_eq!(source.block(), 436);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_storage_at_uses_pinned_block() {
    let mut server = Server::new_async().await;
    let target = Address::repeat_byte(0x42);
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "method": "eth_getStorageAt",
            "params": [target, "0x4", "0x10"],
        })))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!(
            "0x000000000000000000000000000000000000000000000000000000000000002a"
        )))
        .create_async()
        .await;

    let source = RpcStorageSource::new(server.url(), 16);
    let word = source.storage_at(target, U256::from(4)).await.unwrap();
    assert_eq!(U256::from_be_bytes(word.0), U256::from(42));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_node_error_is_reported() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/")
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "missing trie node" }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let source = RpcStorageSource::new(server.url(), 1);
    let err = source
        .storage_at(Address::ZERO, U256::ZERO)
        .await
        .unwrap_err();
    match err {
        EspError::Rpc { code, message } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "missing trie node");
        }
        other => panic!("Expected RPC error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_request_over_rpc_fetches_proofs() {
    let mut server = Server::new_async().await;
    let target = Address::repeat_byte(0x11);

    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_getStorageAt" })))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!("0x7")))
        .create_async()
        .await;

    let proof_mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_getProof" })))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(json!({
            "address": target,
            "balance": "0x0",
            "codeHash": "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470",
            "nonce": "0x1",
            "storageHash": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
            "accountProof": ["0xf90211", "0xf851"],
            "storageProof": [
                { "key": "0x0000000000000000000000000000000000000000000000000000000000000003", "value": "0x7", "proof": ["0xe2a0"] }
            ]
        })))
        .expect(1)
        .create_async()
        .await;

    let prover = Prover::new(RpcStorageSource::new(server.url(), 100));
    let request = Request::new(1).set_target(target).set_slot(3).read().set_output(0);
    let state = prover.eval_request(&request).await.unwrap();

    let outputs = state.resolve_outputs().unwrap();
    assert_eq!(U256::from_be_slice(&outputs[0]), U256::from(7));
    assert_eq!(state.proofs().len(), 1);
    assert_eq!(state.proofs()[0].node_count(), 3);
    assert_eq!(state.proofs()[0].value_of(U256::from(3)), Some(U256::from(7)));
    proof_mock.assert_async().await;
}
