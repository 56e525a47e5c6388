//! Solidity storage slot derivation
//!
//! This module implements the storage layout rules the machine relies on:
//! mapping entries live at `keccak256(key . slot)` and the payload of a long
//! `bytes` value lives at `keccak256(slot)`.
//!
//! # `bytes` encoding
//!
//! A `bytes` value shorter than 32 bytes is stored inline: the data is
//! left-aligned in the slot and the lowest byte holds `len * 2`. Longer values
//! store `len * 2 + 1` in the slot and the data in consecutive slots starting
//! at `keccak256(slot)`.

use alloy_primitives::{B256, U256};
use esp_core::EspError;
use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash
pub fn keccak256(data: &[u8]) -> B256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    B256::from(output)
}

/// Derives the storage slot of a mapping entry: `keccak256(pad32(key) . slot)`
///
/// Keys of up to 32 bytes are left-padded (value types). Longer keys are
/// hashed as-is, the way Solidity treats `bytes` and `string` keys.
pub fn derive_mapping_key(key: &[u8], slot: U256) -> U256 {
    let mut data = Vec::with_capacity(64);

    if key.len() <= 32 {
        let mut padded_key = [0u8; 32];
        padded_key[32 - key.len()..].copy_from_slice(key);
        data.extend_from_slice(&padded_key);
    } else {
        data.extend_from_slice(key);
    }

    data.extend_from_slice(&slot.to_be_bytes::<32>());
    U256::from_be_bytes(keccak256(&data).0)
}

/// First slot of the out-of-line data of a dynamic value stored at `slot`
pub fn dynamic_data_slot(slot: U256) -> U256 {
    U256::from_be_bytes(keccak256(&slot.to_be_bytes::<32>()).0)
}

/// Number of 32-byte words needed to hold `len` bytes
pub fn words_for(len: usize) -> usize {
    len.div_ceil(32)
}

/// Decoded header slot of a Solidity `bytes` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesHeader {
    /// Data lives in the header slot itself
    Inline { len: usize },
    /// Data lives at `keccak256(slot)` onwards
    External { len: usize },
}

impl BytesHeader {
    pub fn len(&self) -> usize {
        match self {
            BytesHeader::Inline { len } | BytesHeader::External { len } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interpret the header word of a `bytes` value
///
/// # Errors
///
/// - `EspError::InvalidProgram` - the word is not a valid `bytes` header
///   (inline length over 31, a long-form length under 32, or a long length
///   that does not fit in `usize`)
pub fn decode_bytes_header(word: B256) -> Result<BytesHeader, EspError> {
    let value = U256::from_be_bytes(word.0);
    if value.bit(0) {
        let len: usize = ((value - U256::from(1u8)) >> 1usize)
            .try_into()
            .map_err(|_| EspError::InvalidProgram(format!("bytes length {} too large", value)))?;
        if len < 32 {
            return Err(EspError::InvalidProgram(format!(
                "long-form bytes header {} with short length {}",
                word, len
            )));
        }
        Ok(BytesHeader::External { len })
    } else {
        let len = (word.0[31] >> 1) as usize;
        if len > 31 || word.0[len..31].iter().any(|b| *b != 0) {
            return Err(EspError::InvalidProgram(format!(
                "malformed inline bytes header {}",
                word
            )));
        }
        Ok(BytesHeader::Inline { len })
    }
}

/// Storage writes that store `data` as a Solidity `bytes` value at `slot`
///
/// Returns `(slot, word)` pairs, header first.
pub fn encode_bytes_storage(slot: U256, data: &[u8]) -> Vec<(U256, B256)> {
    if data.len() < 32 {
        let mut word = [0u8; 32];
        word[..data.len()].copy_from_slice(data);
        word[31] = (data.len() * 2) as u8;
        return vec![(slot, B256::from(word))];
    }

    let header = U256::from(data.len()) * U256::from(2u8) + U256::from(1u8);
    let mut writes = Vec::with_capacity(1 + words_for(data.len()));
    writes.push((slot, B256::from(header.to_be_bytes::<32>())));

    let base = dynamic_data_slot(slot);
    for (i, chunk) in data.chunks(32).enumerate() {
        let mut word = [0u8; 32];
        word[..chunk.len()].copy_from_slice(chunk);
        writes.push((base + U256::from(i), B256::from(word)));
    }
    writes
}
