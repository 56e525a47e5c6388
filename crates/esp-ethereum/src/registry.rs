//! Registry-indirect resolution
//!
//! The registry contract stores, for every target contract, the encoded
//! programs that read that target's fields:
//!
//! ```solidity
//! struct F { bytes getOwner; bytes isExpired; }
//! mapping (address => F) fragments; // slot 0
//! ```
//!
//! Resolving a field is a two-level request: read the program for the target
//! out of the registry, then run it against the target with the lookup key
//! still on the stack. The registry is trusted to hold programs that match
//! each target's layout; nothing here can check that.

use crate::{
    abi::{decode_address, decode_flag},
    machine::{EvalState, Prover},
    source::StorageSource,
};
use alloy_primitives::{Address, U256};
use esp_core::{EspError, Request};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::info;

/// Slot of the registry's `fragments` mapping
pub const FRAGMENTS_SLOT: u64 = 0;

/// A field program stored per target in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fragment {
    /// `getOwner`, decodes to an address
    GetOwner,
    /// `isExpired`, decodes to a flag
    IsExpired,
}

impl Fragment {
    /// Position of this program inside the registry record
    pub fn field_offset(&self) -> u64 {
        match self {
            Fragment::GetOwner => 0,
            Fragment::IsExpired => 1,
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::GetOwner => write!(f, "owner"),
            Fragment::IsExpired => write!(f, "expired"),
        }
    }
}

impl FromStr for Fragment {
    type Err = EspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" | "getOwner" | "get_owner" => Ok(Fragment::GetOwner),
            "expired" | "isExpired" | "is_expired" => Ok(Fragment::IsExpired),
            other => Err(EspError::Encoding(format!(
                "unknown fragment '{}', expected owner or expired",
                other
            ))),
        }
    }
}

/// Build the request that resolves `fragment` of record `id` on `target`
///
/// 1. push `id`, the argument of the stored program
/// 2. switch to the registry and read the program stored for `target`
/// 3. switch to `target` and run the program with proofs acquired
/// 4. expose the result as output 0
pub fn fragment_request(registry: Address, target: Address, id: U256, fragment: Fragment) -> Request {
    let request = Request::new(1)
        .push_uint(id)
        .set_target(registry)
        .set_slot(FRAGMENTS_SLOT)
        .push_address(target)
        .follow();

    let request = match fragment.field_offset() {
        0 => request,
        offset => request.offset(offset),
    };

    request
        .read_bytes()
        .set_target(target)
        .eval(true)
        .set_output(0)
}

/// Resolves target fields through a registry
pub struct FragmentResolver<S> {
    prover: Prover<S>,
    registry: Address,
}

impl<S: StorageSource> FragmentResolver<S> {
    pub fn new(prover: Prover<S>, registry: Address) -> Self {
        Self { prover, registry }
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    pub fn prover(&self) -> &Prover<S> {
        &self.prover
    }

    /// Evaluate the fragment request and return the full state, proofs included
    pub async fn resolve(
        &self,
        target: Address,
        id: U256,
        fragment: Fragment,
    ) -> Result<EvalState, EspError> {
        info!("resolving {} of {} #{} via {}", fragment, target, id, self.registry);
        let request = fragment_request(self.registry, target, id, fragment);
        self.prover.eval_request(&request).await
    }

    /// Owner of record `id` on `target`
    pub async fn read_owner(&self, target: Address, id: U256) -> Result<Address, EspError> {
        let state = self.resolve(target, id, Fragment::GetOwner).await?;
        let outputs = state.resolve_outputs()?;
        decode_address(&outputs[0])
    }

    /// Whether record `id` on `target` is expired
    pub async fn is_expired(&self, target: Address, id: U256) -> Result<bool, EspError> {
        let state = self.resolve(target, id, Fragment::IsExpired).await?;
        let outputs = state.resolve_outputs()?;
        decode_flag(&outputs[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esp_core::Op;

    #[test]
    fn test_fragment_request_shape() {
        let registry = Address::repeat_byte(0x01);
        let target = Address::repeat_byte(0x02);

        let owner = fragment_request(registry, target, U256::from(1), Fragment::GetOwner);
        let expired = fragment_request(registry, target, U256::from(1), Fragment::IsExpired);

        assert_eq!(owner.outputs, 1);
        assert!(!owner.program.ops.iter().any(|op| matches!(op, Op::Offset(_))));
        assert!(expired
            .program
            .ops
            .contains(&Op::Offset(U256::from(1))));
        assert_eq!(owner.program.ops.last(), Some(&Op::SetOutput(0)));
        assert!(owner.program.ops.contains(&Op::Eval { acquire: true }));
        assert_eq!(
            owner.program.to_string(),
            format!(
                "push 1 push {:#x} target slot 0 push {:#x} follow readbytes push {:#x} target eval acquire output 0",
                U256::from_be_bytes(registry.into_word().0),
                U256::from_be_bytes(target.into_word().0),
                U256::from_be_bytes(target.into_word().0),
            )
        );
    }

    #[test]
    fn test_fragment_parsing() {
        assert_eq!("owner".parse::<Fragment>().unwrap(), Fragment::GetOwner);
        assert_eq!("isExpired".parse::<Fragment>().unwrap(), Fragment::IsExpired);
        assert!("balance".parse::<Fragment>().is_err());
        assert_eq!(Fragment::IsExpired.to_string(), "expired");
    }
}
