//! In-memory contract storage
//!
//! [`MemoryStorage`] stands in for a disposable local chain: contracts are
//! "deployed" by allocating an address and their storage is written slot by
//! slot, exactly where the Solidity compiler would put it.

use crate::{
    slots::{
        decode_bytes_header, dynamic_data_slot, encode_bytes_storage, keccak256, words_for,
        BytesHeader,
    },
    source::{AccountProof, StorageProof, StorageSource},
};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use esp_core::EspError;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// Contract storage held in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    accounts: HashMap<Address, BTreeMap<U256, B256>>,
    nonce: u64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh contract address with empty storage
    ///
    /// Addresses are derived from a counter, so the same sequence of
    /// deployments always yields the same addresses.
    pub fn deploy(&mut self) -> Address {
        let mut seed = b"esp-memory-deploy".to_vec();
        seed.extend_from_slice(&self.nonce.to_be_bytes());
        self.nonce += 1;

        let address = Address::from_word(keccak256(&seed));
        self.accounts.entry(address).or_default();
        address
    }

    /// Whether `address` was deployed
    pub fn contains(&self, address: Address) -> bool {
        self.accounts.contains_key(&address)
    }

    /// Write one storage word; zero words delete the slot
    pub fn store(&mut self, address: Address, slot: U256, value: B256) {
        trace!("store {} [{}] = {}", address, slot, value);
        let account = self.accounts.entry(address).or_default();
        if value.is_zero() {
            account.remove(&slot);
        } else {
            account.insert(slot, value);
        }
    }

    pub fn store_uint(&mut self, address: Address, slot: U256, value: U256) {
        self.store(address, slot, B256::from(value.to_be_bytes::<32>()));
    }

    pub fn store_address(&mut self, address: Address, slot: U256, value: Address) {
        self.store(address, slot, value.into_word());
    }

    /// Write a Solidity `bytes` value, clearing any words of a longer previous value
    pub fn store_bytes(&mut self, address: Address, slot: U256, data: &[u8]) {
        let previous = self.load(address, slot);
        if let Ok(BytesHeader::External { len }) = decode_bytes_header(previous) {
            let base = dynamic_data_slot(slot);
            for i in 0..words_for(len) {
                self.store(address, base + U256::from(i), B256::ZERO);
            }
        }
        for (slot, word) in encode_bytes_storage(slot, data) {
            self.store(address, slot, word);
        }
    }

    /// Read one storage word, zero if never written
    pub fn load(&self, address: Address, slot: U256) -> B256 {
        self.accounts
            .get(&address)
            .and_then(|account| account.get(&slot))
            .copied()
            .unwrap_or(B256::ZERO)
    }

    /// Number of non-zero slots held for `address`
    pub fn slot_count(&self, address: Address) -> usize {
        self.accounts.get(&address).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl StorageSource for MemoryStorage {
    async fn storage_at(&self, target: Address, slot: U256) -> Result<B256, EspError> {
        Ok(self.load(target, slot))
    }

    /// Proofs from memory carry values but no trie nodes
    async fn prove(&self, target: Address, slots: &[U256]) -> Result<AccountProof, EspError> {
        Ok(AccountProof {
            address: target,
            storage_hash: B256::ZERO,
            account_proof: Vec::new(),
            storage_proof: slots
                .iter()
                .map(|slot| StorageProof {
                    key: *slot,
                    value: U256::from_be_bytes(self.load(target, *slot).0),
                    proof: Vec::new(),
                })
                .collect(),
        })
    }
}
