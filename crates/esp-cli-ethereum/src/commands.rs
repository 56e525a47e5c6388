//! Command implementations for the `esp` binary
//!
//! Each command returns a JSON value; rendering and output destination are
//! handled by the caller through `esp-cli-core`.

use alloy_primitives::{Address, Bytes, U256};
use anyhow::{Context, Result};
use esp_cli_core::EspConfig;
use esp_core::{Program, Request};
use esp_ethereum::{
    abi::{decode_address, decode_flag, parse_address, parse_uint},
    demo::Demo,
    EvalState, Fragment, FragmentResolver, Prover, RpcStorageSource,
};
use serde_json::{json, Value};
use tracing::info;

/// Run the in-memory registry demo
pub async fn cmd_demo() -> Result<Value> {
    let demo = Demo::setup()?;
    let report = demo.run().await?;

    info!(
        "owners {:?}, expired {:?}",
        report.owners, report.expired
    );
    Ok(serde_json::to_value(&report)?)
}

/// Encode program text, as a request when `outputs` is given
pub fn cmd_encode(text: &str, outputs: Option<u8>) -> Result<Value> {
    let program: Program = text.parse().context("failed to parse program")?;

    let (kind, bytes) = match outputs {
        Some(outputs) => ("request", Request::with_program(outputs, program.clone()).encode()?),
        None => ("program", program.encode()?),
    };

    Ok(json!({
        "kind": kind,
        "program": program.to_string(),
        "hex": format!("0x{}", hex::encode(&bytes)),
        "length": bytes.len(),
    }))
}

/// Decode program bytes, or request bytes with `as_request`
pub fn cmd_decode(encoded: &str, as_request: bool) -> Result<Value> {
    let raw = encoded.trim();
    let bytes = hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).context("input is not hex")?;

    let (outputs, program) = if as_request {
        let request = Request::decode(&bytes)?;
        (Some(request.outputs), request.program)
    } else {
        (None, Program::decode(&bytes)?)
    };

    let mut result = json!({
        "program": program.to_string(),
        "ops": serde_json::to_value(&program.ops)?,
        "length": bytes.len(),
    });
    if let Some(outputs) = outputs {
        result["outputs"] = json!(outputs);
    }
    Ok(result)
}

/// Pin a JSON-RPC source to the configured block, or the node's latest
async fn open_source(config: &EspConfig) -> Result<RpcStorageSource> {
    let url = config.require_rpc_url()?;
    let source = match config.block {
        Some(block) => RpcStorageSource::new(url, block),
        None => RpcStorageSource::latest(url)
            .await
            .with_context(|| format!("failed to fetch latest block from {}", url))?,
    };
    info!("using {} at block {}", source.rpc_url(), source.block());
    Ok(source)
}

/// Summary of the proofs attached to an evaluation
fn proof_summary(state: &EvalState) -> Value {
    let proofs: Vec<Value> = state
        .proofs()
        .iter()
        .map(|proof| {
            let slots: Vec<Value> = proof
                .storage_proof
                .iter()
                .map(|entry| {
                    json!({
                        "slot": format!("{:#x}", entry.key),
                        "value": format!("{:#x}", entry.value),
                    })
                })
                .collect();
            json!({
                "address": proof.address,
                "storage_hash": proof.storage_hash,
                "nodes": proof.node_count(),
                "slots": slots,
            })
        })
        .collect();
    Value::Array(proofs)
}

fn output_hex(output: &Bytes) -> String {
    format!("0x{}", hex::encode(output))
}

/// Resolve a registry fragment of record `id` on `target` against a node
pub async fn cmd_resolve(config: &EspConfig, target: &str, id: &str, fragment: &str) -> Result<Value> {
    let target: Address = parse_address(target)?;
    let id: U256 = parse_uint(id)?;
    let fragment: Fragment = fragment.parse()?;
    let registry = config.require_registry()?;

    let source = open_source(config).await?;
    let block = source.block();
    let resolver = FragmentResolver::new(Prover::new(source).with_limits(config.limits), registry);

    let state = resolver.resolve(target, id, fragment).await?;
    let outputs = state.resolve_outputs()?;
    let value = match fragment {
        Fragment::GetOwner => json!(decode_address(&outputs[0])?),
        Fragment::IsExpired => json!(decode_flag(&outputs[0])?),
    };

    Ok(json!({
        "registry": registry,
        "target": target,
        "id": id.to_string(),
        "fragment": fragment.to_string(),
        "block": block,
        "value": value,
        "raw": output_hex(&outputs[0]),
        "reads": state.read_count(),
        "proofs": proof_summary(&state),
    }))
}

/// Evaluate an arbitrary request against a node
pub async fn cmd_eval(config: &EspConfig, text: &str, outputs: u8) -> Result<Value> {
    let program: Program = text.parse().context("failed to parse program")?;
    let request = Request::with_program(outputs, program);

    let source = open_source(config).await?;
    let block = source.block();
    let prover = Prover::new(source).with_limits(config.limits);
    let state = prover.eval_request(&request).await?;

    let outputs: Vec<Value> = state
        .outputs()
        .iter()
        .map(|output| match output {
            Some(bytes) => json!(output_hex(bytes)),
            None => json!("unset"),
        })
        .collect();
    let leftover: Vec<String> = state.leftover_stack().iter().map(output_hex).collect();

    Ok(json!({
        "block": block,
        "outputs": outputs,
        "leftover_stack": leftover,
        "reads": state.read_count(),
        "proofs": proof_summary(&state),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_program() {
        let result = cmd_encode("slot 4 follow offset 1 read", None).unwrap();
        assert_eq!(result["kind"], "program");
        assert_eq!(result["length"], 9);
        assert_eq!(result["program"], "slot 4 follow offset 1 read");
    }

    #[test]
    fn test_encode_request_adds_output_count() {
        let result = cmd_encode("slot 0 follow read", Some(2)).unwrap();
        assert_eq!(result["kind"], "request");
        assert_eq!(result["length"], 6);
        assert!(result["hex"].as_str().unwrap().starts_with("0x02"));
    }

    #[test]
    fn test_encode_rejects_unknown_op() {
        assert!(cmd_encode("slot 0 jump", None).is_err());
    }

    #[test]
    fn test_decode_reverses_encode() {
        let encoded = cmd_encode("slot 1 follow read", None).unwrap();
        let decoded = cmd_decode(encoded["hex"].as_str().unwrap(), false).unwrap();
        assert_eq!(decoded["program"], "slot 1 follow read");
        assert_eq!(decoded["ops"].as_array().unwrap().len(), 3);
        assert!(decoded.get("outputs").is_none());
    }

    #[test]
    fn test_decode_request() {
        let decoded = cmd_decode("0x010a00", true).unwrap();
        assert_eq!(decoded["outputs"], 1);
        assert_eq!(decoded["program"], "output 0");
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(cmd_decode("0xzz", false).is_err());
        assert!(cmd_decode("0xff", false).is_err());
    }

    #[tokio::test]
    async fn test_demo_values() {
        let result = cmd_demo().await.unwrap();
        assert_eq!(result["expired"], json!([true, false]));
        assert_eq!(result["program_lengths"]["program_getOwner_B"], 9);
    }

    #[tokio::test]
    async fn test_resolve_needs_registry() {
        let config = EspConfig {
            rpc_url: Some("http://127.0.0.1:1".to_string()),
            ..Default::default()
        };
        let err = cmd_resolve(
            &config,
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "1",
            "owner",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("registry"));
    }
}
