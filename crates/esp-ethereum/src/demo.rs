//! Two differently laid out contracts behind one registry
//!
//! Both contracts record an owner and an expiration per id, but store them in
//! different places:
//!
//! ```solidity
//! contract A {
//!     mapping (uint256 => address) _owners; // slot 0
//!     mapping (uint256 => uint256) _exps;   // slot 1
//! }
//!
//! contract B {
//!     uint256[4] pad;                        // slots 0..3
//!     struct R { uint256 exp; address owner; }
//!     mapping (uint256 => R) _records;       // slot 4
//! }
//! ```
//!
//! The registry holds one `getOwner` and one `isExpired` program per
//! contract, and a single generic request shape reads either contract.

use crate::{
    machine::Prover,
    memory::MemoryStorage,
    registry::{FragmentResolver, FRAGMENTS_SLOT},
    slots::derive_mapping_key,
};
use alloy_primitives::{address, Address, U256};
use esp_core::{EspError, Program};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Owner recorded on contract A for id 1
pub const OWNER_A: Address = address!("51050ec063d393217B436747617aD1C2285Aeeee");
/// Owner recorded on contract B for id 2
pub const OWNER_B: Address = address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045");

/// The `getOwner` and `isExpired` programs of one contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPrograms {
    pub get_owner: Program,
    pub is_expired: Program,
}

impl FieldPrograms {
    pub fn encode(&self) -> Result<(Vec<u8>, Vec<u8>), EspError> {
        Ok((self.get_owner.encode()?, self.is_expired.encode()?))
    }
}

/// Registry of per-target programs
#[derive(Debug, Clone, Copy)]
pub struct RegistryContract {
    pub address: Address,
}

impl RegistryContract {
    pub fn deploy(storage: &mut MemoryStorage) -> Self {
        Self {
            address: storage.deploy(),
        }
    }

    /// `set(address a, bytes getOwner, bytes isExpired)`
    pub fn set(&self, storage: &mut MemoryStorage, target: Address, get_owner: &[u8], is_expired: &[u8]) {
        let record = derive_mapping_key(target.as_slice(), U256::from(FRAGMENTS_SLOT));
        storage.store_bytes(self.address, record, get_owner);
        storage.store_bytes(self.address, record + U256::from(1), is_expired);
    }

    /// Encode and register both programs of `target`
    pub fn register(
        &self,
        storage: &mut MemoryStorage,
        target: Address,
        programs: &FieldPrograms,
    ) -> Result<(), EspError> {
        let (get_owner, is_expired) = programs.encode()?;
        self.set(storage, target, &get_owner, &is_expired);
        Ok(())
    }
}

/// Contract with one mapping per field
#[derive(Debug, Clone, Copy)]
pub struct ContractA {
    pub address: Address,
}

impl ContractA {
    pub const OWNERS_SLOT: u64 = 0;
    pub const EXPS_SLOT: u64 = 1;

    pub fn deploy(storage: &mut MemoryStorage) -> Self {
        Self {
            address: storage.deploy(),
        }
    }

    /// `set(uint256 id, address owner, uint256 exp)`
    pub fn set(&self, storage: &mut MemoryStorage, id: U256, owner: Address, exp: U256) {
        let id_word = id.to_be_bytes::<32>();
        storage.store_address(
            self.address,
            derive_mapping_key(&id_word, U256::from(Self::OWNERS_SLOT)),
            owner,
        );
        storage.store_uint(
            self.address,
            derive_mapping_key(&id_word, U256::from(Self::EXPS_SLOT)),
            exp,
        );
    }

    pub fn programs() -> FieldPrograms {
        FieldPrograms {
            get_owner: Program::new().set_slot(Self::OWNERS_SLOT).follow().read(),
            // no comparisons or block.timestamp yet: the raw expiration is the flag
            is_expired: Program::new().set_slot(Self::EXPS_SLOT).follow().read(),
        }
    }
}

/// Contract with one mapping of records, after four padding slots
#[derive(Debug, Clone, Copy)]
pub struct ContractB {
    pub address: Address,
}

impl ContractB {
    pub const RECORDS_SLOT: u64 = 4;
    pub const EXP_FIELD: u64 = 0;
    pub const OWNER_FIELD: u64 = 1;

    pub fn deploy(storage: &mut MemoryStorage) -> Self {
        Self {
            address: storage.deploy(),
        }
    }

    /// `set(uint256 id, address owner, uint256 exp)`
    pub fn set(&self, storage: &mut MemoryStorage, id: U256, owner: Address, exp: U256) {
        let record = derive_mapping_key(&id.to_be_bytes::<32>(), U256::from(Self::RECORDS_SLOT));
        storage.store_uint(self.address, record + U256::from(Self::EXP_FIELD), exp);
        storage.store_address(self.address, record + U256::from(Self::OWNER_FIELD), owner);
    }

    pub fn programs() -> FieldPrograms {
        FieldPrograms {
            get_owner: Program::new()
                .set_slot(Self::RECORDS_SLOT)
                .follow()
                .offset(Self::OWNER_FIELD)
                .read(),
            is_expired: Program::new().set_slot(Self::RECORDS_SLOT).follow().read(),
        }
    }
}

/// Everything deployed and populated for the demo
pub struct Demo {
    pub storage: MemoryStorage,
    pub registry: RegistryContract,
    pub contract_a: ContractA,
    pub contract_b: ContractB,
}

/// What the demo resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoReport {
    pub registry: Address,
    pub contract_a: Address,
    pub contract_b: Address,
    /// Owners of A #1 and B #2
    pub owners: Vec<Address>,
    /// Expiration flags of A #1 and B #2
    pub expired: Vec<bool>,
    /// Encoded program sizes in bytes
    pub program_lengths: BTreeMap<String, usize>,
}

impl Demo {
    /// Deploy the three contracts, register the programs and write one record each
    pub fn setup() -> Result<Self, EspError> {
        let mut storage = MemoryStorage::new();
        let registry = RegistryContract::deploy(&mut storage);
        let contract_a = ContractA::deploy(&mut storage);
        let contract_b = ContractB::deploy(&mut storage);

        registry.register(&mut storage, contract_a.address, &ContractA::programs())?;
        registry.register(&mut storage, contract_b.address, &ContractB::programs())?;

        contract_a.set(&mut storage, U256::from(1), OWNER_A, U256::from(1));
        contract_b.set(&mut storage, U256::from(2), OWNER_B, U256::ZERO);

        info!(
            "demo deployed: registry {}, A {}, B {}",
            registry.address, contract_a.address, contract_b.address
        );
        Ok(Self {
            storage,
            registry,
            contract_a,
            contract_b,
        })
    }

    /// A resolver over the demo storage
    pub fn resolver(&self) -> FragmentResolver<&MemoryStorage> {
        FragmentResolver::new(Prover::new(&self.storage), self.registry.address)
    }

    /// Encoded sizes of the four programs
    pub fn program_lengths() -> Result<BTreeMap<String, usize>, EspError> {
        let a = ContractA::programs();
        let b = ContractB::programs();
        let mut lengths = BTreeMap::new();
        lengths.insert("program_getOwner_A".to_string(), a.get_owner.encoded_len()?);
        lengths.insert("program_getOwner_B".to_string(), b.get_owner.encoded_len()?);
        lengths.insert("program_isExpired_A".to_string(), a.is_expired.encoded_len()?);
        lengths.insert("program_isExpired_B".to_string(), b.is_expired.encoded_len()?);
        Ok(lengths)
    }

    /// Resolve both owners and both expirations through the registry
    pub async fn run(&self) -> Result<DemoReport, EspError> {
        let resolver = self.resolver();
        let a = self.contract_a.address;
        let b = self.contract_b.address;

        let owners = vec![
            resolver.read_owner(a, U256::from(1)).await?,
            resolver.read_owner(b, U256::from(2)).await?,
        ];
        let expired = vec![
            resolver.is_expired(a, U256::from(1)).await?,
            resolver.is_expired(b, U256::from(2)).await?,
        ];

        Ok(DemoReport {
            registry: self.registry.address,
            contract_a: a,
            contract_b: b,
            owners,
            expired,
            program_lengths: Self::program_lengths()?,
        })
    }
}
