//! ABI helpers for program outputs
//!
//! Outputs are raw storage words, which for value types are already their
//! ABI encoding. Decoding goes through `alloy-sol-types` so that dirty high
//! bytes in an address word are rejected instead of silently truncated.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolValue;
use esp_core::EspError;

/// Decode an output word as an `address`
pub fn decode_address(output: &Bytes) -> Result<Address, EspError> {
    Address::abi_decode(output, true)
        .map_err(|e| EspError::Serialization(format!("output is not an address: {}", e)))
}

/// Decode an output word as a `uint256`
pub fn decode_uint(output: &Bytes) -> Result<U256, EspError> {
    U256::abi_decode(output, true)
        .map_err(|e| EspError::Serialization(format!("output is not a uint256: {}", e)))
}

/// Interpret an output word as a flag: any non-zero value is `true`
pub fn decode_flag(output: &Bytes) -> Result<bool, EspError> {
    decode_uint(output).map(|value| !value.is_zero())
}

/// Convert hex string to Address
pub fn parse_address(addr_str: &str) -> Result<Address, EspError> {
    addr_str
        .trim()
        .parse()
        .map_err(|e| EspError::InvalidAddress(format!("{}: {}", addr_str, e)))
}

/// Convert a decimal or `0x` hex string to U256
pub fn parse_uint(value: &str) -> Result<U256, EspError> {
    esp_core::parse_word(value.trim())
}
