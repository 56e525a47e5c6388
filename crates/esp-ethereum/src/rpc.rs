//! Ethereum storage source backed by a JSON-RPC node
//!
//! Reads storage with `eth_getStorageAt` and fetches proofs with
//! `eth_getProof`, always at the block the source was pinned to.

use crate::source::{AccountProof, StorageSource};
use alloy_primitives::{Address, B256, U256, U64};
use async_trait::async_trait;
use esp_core::EspError;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Errors local to the JSON-RPC transport
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("RPC request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node returned error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("no result in RPC response for {0}")]
    MissingResult(String),

    #[error("invalid RPC response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

impl From<RpcError> for EspError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Node { code, message } => EspError::Rpc { code, message },
            RpcError::InvalidResponse(e) => EspError::Serialization(e.to_string()),
            other => EspError::Network(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Storage source using a node's JSON-RPC endpoint
///
/// # Configuration
///
/// - `rpc_url`: The HTTP(S) endpoint of an Ethereum node
/// - `block`: The block every read and proof is taken at
///
/// # Usage
///
/// ```rust,ignore
/// use esp_ethereum::RpcStorageSource;
///
/// // pin to the current head
/// let source = RpcStorageSource::latest("http://localhost:8545").await?;
/// // or to a known block
/// let source = RpcStorageSource::new("http://localhost:8545", 19_000_000);
/// ```
///
/// # Network Requirements
///
/// Requires a node that serves `eth_getProof` for the pinned block. Archive
/// nodes serve any block; full nodes typically only recent ones.
#[derive(Debug)]
pub struct RpcStorageSource {
    client: reqwest::Client,
    rpc_url: String,
    block: u64,
    next_id: AtomicU64,
}

impl RpcStorageSource {
    pub fn new(rpc_url: impl Into<String>, block: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            block,
            next_id: AtomicU64::new(1),
        }
    }

    /// Pin a source to the node's latest block
    pub async fn latest(rpc_url: impl Into<String>) -> Result<Self, EspError> {
        let mut source = Self::new(rpc_url, 0);
        let block: U64 = source.call("eth_blockNumber", json!([])).await?;
        source.block = block.to::<u64>();
        debug!("pinned {} at block {}", source.rpc_url, source.block);
        Ok(source)
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn block(&self) -> u64 {
        self.block
    }

    fn block_tag(&self) -> String {
        format!("0x{:x}", self.block)
    }

    /// Issue one JSON-RPC call and deserialize its result
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        trace!("rpc {} {}", method, request["params"]);

        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(RpcError::Node {
                code: err.code,
                message: err.message,
            });
        }

        let result = response
            .result
            .ok_or_else(|| RpcError::MissingResult(method.to_string()))?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Parse a storage word, left-padding short hex quantities
fn parse_storage_word(value: &str) -> Result<B256, EspError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.len() > 64 {
        return Err(EspError::Serialization(format!(
            "storage word longer than 32 bytes: {}",
            value
        )));
    }
    let padded = format!("{:0>64}", digits);
    let mut word = [0u8; 32];
    hex::decode_to_slice(&padded, &mut word)?;
    Ok(B256::from(word))
}

#[async_trait]
impl StorageSource for RpcStorageSource {
    async fn storage_at(&self, target: Address, slot: U256) -> Result<B256, EspError> {
        let value: String = self
            .call(
                "eth_getStorageAt",
                json!([target, format!("{:#x}", slot), self.block_tag()]),
            )
            .await?;
        parse_storage_word(&value)
    }

    async fn prove(&self, target: Address, slots: &[U256]) -> Result<AccountProof, EspError> {
        let keys: Vec<String> = slots
            .iter()
            .map(|slot| format!("0x{}", hex::encode(slot.to_be_bytes::<32>())))
            .collect();
        debug!("eth_getProof {} for {} slots", target, keys.len());
        let proof: AccountProof = self
            .call("eth_getProof", json!([target, keys, self.block_tag()]))
            .await?;
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_creation() {
        let source = RpcStorageSource::new("http://localhost:8545", 0x10);
        assert_eq!(source.rpc_url(), "http://localhost:8545");
        assert_eq!(source.block(), 16);
        assert_eq!(source.block_tag(), "0x10");
    }

    #[test]
    fn test_parse_storage_word() {
        let full = parse_storage_word(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(U256::from_be_bytes(full.0), U256::from(1));

        // some nodes return minimal quantities
        let short = parse_storage_word("0x1").unwrap();
        assert_eq!(short, full);

        assert_eq!(parse_storage_word("0x").unwrap(), B256::ZERO);
        assert!(parse_storage_word("0xzz").is_err());
        assert!(parse_storage_word(&format!("0x{}", "1".repeat(65))).is_err());
    }

    #[test]
    fn test_rpc_error_mapping() {
        let err: EspError = RpcError::Node {
            code: -32000,
            message: "header not found".to_string(),
        }
        .into();
        assert!(matches!(err, EspError::Rpc { code: -32000, .. }));

        let err: EspError = RpcError::MissingResult("eth_getProof".to_string()).into();
        assert!(matches!(err, EspError::Network(_)));
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let source = RpcStorageSource::new("http://127.0.0.1:1", 0);
        let result = source.storage_at(Address::ZERO, U256::ZERO).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("RPC request failed"));
    }
}
