//! Storage sources
//!
//! A [`StorageSource`] is anything the machine can read contract storage
//! from and, afterwards, ask for EIP-1186 proofs of the slots it touched.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use esp_core::EspError;
use serde::{Deserialize, Serialize};

/// Trait for reading contract storage and fetching storage proofs
///
/// Implementations are pinned to a single state (one block for a node,
/// the current contents for an in-memory store) so that every read of one
/// evaluation sees the same storage.
///
/// # Examples
///
/// ```rust,ignore
/// use esp_ethereum::{RpcStorageSource, StorageSource};
///
/// let source = RpcStorageSource::latest("http://localhost:8545").await?;
/// let word = source.storage_at(contract, U256::ZERO).await?;
/// let proof = source.prove(contract, &[U256::ZERO]).await?;
/// ```
#[async_trait]
pub trait StorageSource: Send + Sync {
    /// Read one storage word of `target`
    async fn storage_at(&self, target: Address, slot: U256) -> Result<B256, EspError>;

    /// Fetch the account and storage proof of `target` for the given slots
    async fn prove(&self, target: Address, slots: &[U256]) -> Result<AccountProof, EspError>;
}

#[async_trait]
impl<S: StorageSource + ?Sized> StorageSource for &S {
    async fn storage_at(&self, target: Address, slot: U256) -> Result<B256, EspError> {
        (**self).storage_at(target, slot).await
    }

    async fn prove(&self, target: Address, slots: &[U256]) -> Result<AccountProof, EspError> {
        (**self).prove(target, slots).await
    }
}

/// Account proof with storage proofs, as returned by `eth_getProof`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProof {
    pub address: Address,
    #[serde(default)]
    pub storage_hash: B256,
    #[serde(default)]
    pub account_proof: Vec<Bytes>,
    pub storage_proof: Vec<StorageProof>,
}

/// A single storage slot proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProof {
    /// Storage slot
    pub key: U256,
    /// Value stored at the slot
    pub value: U256,
    /// Trie nodes from the storage root to the slot
    pub proof: Vec<Bytes>,
}

impl AccountProof {
    /// Total number of trie nodes carried by this proof
    pub fn node_count(&self) -> usize {
        self.account_proof.len()
            + self
                .storage_proof
                .iter()
                .map(|p| p.proof.len())
                .sum::<usize>()
    }

    /// Value proven for `slot`, if the proof covers it
    pub fn value_of(&self, slot: U256) -> Option<U256> {
        self.storage_proof
            .iter()
            .find(|p| p.key == slot)
            .map(|p| p.value)
    }
}
