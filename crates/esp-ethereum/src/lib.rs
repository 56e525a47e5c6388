//! Ethereum evaluation of storage read programs
//!
//! This crate runs `esp-core` programs against Ethereum contract storage:
//! Solidity slot derivation, storage sources (in memory or over JSON-RPC),
//! the evaluation machine with proof acquisition, and registry-indirect
//! resolution where the program for a target is itself read from storage.

pub mod abi;
pub mod demo;
mod machine;
mod memory;
pub mod registry;
mod rpc;
pub mod slots;
mod source;

pub use machine::{EvalState, MachineLimits, Prover};
pub use memory::MemoryStorage;
pub use registry::{fragment_request, Fragment, FragmentResolver};
pub use rpc::{RpcError, RpcStorageSource};
pub use source::{AccountProof, StorageProof, StorageSource};
