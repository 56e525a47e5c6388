//! Storage read programs
//!
//! A [`Program`] is an ordered list of [`Op`]s that walks a contract's
//! storage: pick a target, position a slot, follow mapping keys, read words or
//! dynamic `bytes`, and evaluate nested programs fetched from storage. Programs
//! serialize to a compact byte form so they can be stored on-chain verbatim.
//!
//! # Wire format
//!
//! Every op is a single opcode byte followed by its operands. Words are
//! encoded as a length byte plus their minimal big-endian bytes, so small slot
//! numbers cost one or two bytes.
//!
//! ```text
//! 0x01 PUSH_WORD   len:u8  word[len]
//! 0x02 PUSH_BYTES  len:u16 data[len]
//! 0x03 TARGET
//! 0x04 SET_SLOT    len:u8  word[len]
//! 0x05 OFFSET      len:u8  word[len]
//! 0x06 FOLLOW
//! 0x07 READ        count:u8
//! 0x08 READ_BYTES
//! 0x09 EVAL        flags:u8
//! 0x0a SET_OUTPUT  index:u8
//! ```

use crate::EspError;
use alloc::{format, vec::Vec};
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

pub const OP_PUSH_WORD: u8 = 0x01;
pub const OP_PUSH_BYTES: u8 = 0x02;
pub const OP_TARGET: u8 = 0x03;
pub const OP_SET_SLOT: u8 = 0x04;
pub const OP_OFFSET: u8 = 0x05;
pub const OP_FOLLOW: u8 = 0x06;
pub const OP_READ: u8 = 0x07;
pub const OP_READ_BYTES: u8 = 0x08;
pub const OP_EVAL: u8 = 0x09;
pub const OP_SET_OUTPUT: u8 = 0x0a;

/// Eval flag: reads made by the evaluated program join the proof set
pub const EVAL_FLAG_ACQUIRE: u8 = 0x01;

/// A single storage traversal command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// Push a 32-byte word onto the stack
    PushWord(U256),
    /// Push raw bytes onto the stack
    PushBytes(Bytes),
    /// Pop an address and make it the current target (slot resets to zero)
    Target,
    /// Replace the current slot
    SetSlot(U256),
    /// Add to the current slot
    Offset(U256),
    /// Pop a mapping key and move to `keccak256(key . slot)`
    Follow,
    /// Push `count` consecutive words starting at the current slot
    Read(u8),
    /// Push the Solidity `bytes` value stored at the current slot
    ReadBytes,
    /// Pop program bytes and run them against the current target
    Eval { acquire: bool },
    /// Pop the top of the stack into the given output
    SetOutput(u8),
}

impl Op {
    /// The opcode byte for this op
    pub fn opcode(&self) -> u8 {
        match self {
            Op::PushWord(_) => OP_PUSH_WORD,
            Op::PushBytes(_) => OP_PUSH_BYTES,
            Op::Target => OP_TARGET,
            Op::SetSlot(_) => OP_SET_SLOT,
            Op::Offset(_) => OP_OFFSET,
            Op::Follow => OP_FOLLOW,
            Op::Read(_) => OP_READ,
            Op::ReadBytes => OP_READ_BYTES,
            Op::Eval { .. } => OP_EVAL,
            Op::SetOutput(_) => OP_SET_OUTPUT,
        }
    }

    /// Append the encoded op to `out`
    ///
    /// Fails for `PushBytes` payloads longer than `u16::MAX` and for reads
    /// of zero slots, which `decode` would reject.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EspError> {
        out.push(self.opcode());
        match self {
            Op::PushWord(word) | Op::SetSlot(word) | Op::Offset(word) => {
                let bytes = word.to_be_bytes::<32>();
                let trimmed = trim_word(&bytes);
                out.push(trimmed.len() as u8);
                out.extend_from_slice(trimmed);
            }
            Op::PushBytes(data) => {
                let len = u16::try_from(data.len()).map_err(|_| {
                    EspError::Encoding(format!(
                        "pushed bytes too long: {} > {}",
                        data.len(),
                        u16::MAX
                    ))
                })?;
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(data);
            }
            Op::Read(0) => {
                return Err(EspError::InvalidProgram("read of zero slots".into()));
            }
            Op::Read(count) => out.push(*count),
            Op::Eval { acquire } => out.push(if *acquire { EVAL_FLAG_ACQUIRE } else { 0 }),
            Op::SetOutput(index) => out.push(*index),
            Op::Target | Op::Follow | Op::ReadBytes => {}
        }
        Ok(())
    }
}

/// Strip leading zero bytes from a big-endian word
fn trim_word(bytes: &[u8; 32]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(32);
    &bytes[start..]
}

/// An ordered sequence of storage traversal ops
///
/// # Examples
///
/// ```rust
/// use esp_core::Program;
///
/// // owner field of `mapping(uint256 => R)` at slot 4, where owner is R's second slot
/// let program = Program::new().set_slot(4).follow().offset(1).read();
/// assert_eq!(program.encode().unwrap().len(), 9);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub ops: Vec<Op>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ops(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Append an arbitrary op
    pub fn op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn push_u64(self, value: u64) -> Self {
        self.op(Op::PushWord(U256::from(value)))
    }

    pub fn push_uint(self, value: U256) -> Self {
        self.op(Op::PushWord(value))
    }

    /// Push an address as a left-padded word
    pub fn push_address(self, address: Address) -> Self {
        self.op(Op::PushWord(U256::from_be_bytes(address.into_word().0)))
    }

    pub fn push_bytes(self, data: impl Into<Bytes>) -> Self {
        self.op(Op::PushBytes(data.into()))
    }

    /// Push a program so a later `eval` can run it
    pub fn push_program(self, program: &Program) -> Result<Self, EspError> {
        let encoded = program.encode()?;
        Ok(self.push_bytes(encoded))
    }

    pub fn target(self) -> Self {
        self.op(Op::Target)
    }

    /// Push `address` and make it the current target
    pub fn set_target(self, address: Address) -> Self {
        self.push_address(address).target()
    }

    pub fn set_slot(self, slot: u64) -> Self {
        self.op(Op::SetSlot(U256::from(slot)))
    }

    pub fn set_slot_uint(self, slot: U256) -> Self {
        self.op(Op::SetSlot(slot))
    }

    pub fn offset(self, delta: u64) -> Self {
        self.op(Op::Offset(U256::from(delta)))
    }

    pub fn follow(self) -> Self {
        self.op(Op::Follow)
    }

    pub fn read(self) -> Self {
        self.op(Op::Read(1))
    }

    pub fn read_slots(self, count: u8) -> Self {
        self.op(Op::Read(count))
    }

    pub fn read_bytes(self) -> Self {
        self.op(Op::ReadBytes)
    }

    pub fn eval(self, acquire: bool) -> Self {
        self.op(Op::Eval { acquire })
    }

    pub fn set_output(self, index: u8) -> Self {
        self.op(Op::SetOutput(index))
    }

    /// Encode the program into its byte form
    pub fn encode(&self) -> Result<Vec<u8>, EspError> {
        let mut out = Vec::new();
        for op in &self.ops {
            op.encode_into(&mut out)?;
        }
        Ok(out)
    }

    /// Length in bytes of the encoded program
    pub fn encoded_len(&self) -> Result<usize, EspError> {
        self.encode().map(|bytes| bytes.len())
    }

    /// Decode a program from its byte form
    ///
    /// # Errors
    ///
    /// - `EspError::UnknownOpcode` - a byte that is not an opcode
    /// - `EspError::Truncated` - operands run past the end of the input
    /// - `EspError::InvalidProgram` - words wider than 32 bytes, zero read
    ///   counts or unknown eval flags
    pub fn decode(bytes: &[u8]) -> Result<Self, EspError> {
        let mut reader = Reader { bytes, pos: 0 };
        let mut ops = Vec::new();

        while !reader.is_done() {
            let position = reader.pos;
            let opcode = reader.byte()?;
            let op = match opcode {
                OP_PUSH_WORD => Op::PushWord(reader.word()?),
                OP_PUSH_BYTES => {
                    let len = u16::from_be_bytes([reader.byte()?, reader.byte()?]) as usize;
                    Op::PushBytes(Bytes::copy_from_slice(reader.take(len)?))
                }
                OP_TARGET => Op::Target,
                OP_SET_SLOT => Op::SetSlot(reader.word()?),
                OP_OFFSET => Op::Offset(reader.word()?),
                OP_FOLLOW => Op::Follow,
                OP_READ => {
                    let count = reader.byte()?;
                    if count == 0 {
                        return Err(EspError::InvalidProgram(format!(
                            "read of zero slots at byte {}",
                            position
                        )));
                    }
                    Op::Read(count)
                }
                OP_READ_BYTES => Op::ReadBytes,
                OP_EVAL => {
                    let flags = reader.byte()?;
                    if flags & !EVAL_FLAG_ACQUIRE != 0 {
                        return Err(EspError::InvalidProgram(format!(
                            "unknown eval flags 0x{:02x} at byte {}",
                            flags, position
                        )));
                    }
                    Op::Eval {
                        acquire: flags & EVAL_FLAG_ACQUIRE != 0,
                    }
                }
                OP_SET_OUTPUT => Op::SetOutput(reader.byte()?),
                other => {
                    return Err(EspError::UnknownOpcode {
                        opcode: other,
                        position,
                    })
                }
            };
            ops.push(op);
        }

        Ok(Self { ops })
    }
}

impl From<Vec<Op>> for Program {
    fn from(ops: Vec<Op>) -> Self {
        Self { ops }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn is_done(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn byte(&mut self) -> Result<u8, EspError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or(EspError::Truncated { position: self.pos })?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], EspError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(EspError::Truncated { position: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn word(&mut self) -> Result<U256, EspError> {
        let len = self.byte()? as usize;
        if len > 32 {
            return Err(EspError::InvalidProgram(format!(
                "word of {} bytes at byte {}",
                len,
                self.pos - 1
            )));
        }
        Ok(U256::from_be_slice(self.take(len)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloy_primitives::address;

    #[test]
    fn test_demo_program_lengths() {
        let owner_a = Program::new().set_slot(0).follow().read();
        let expired_a = Program::new().set_slot(1).follow().read();
        let owner_b = Program::new().set_slot(4).follow().offset(1).read();
        let expired_b = Program::new().set_slot(4).follow().read();

        assert_eq!(owner_a.encoded_len().unwrap(), 5);
        assert_eq!(expired_a.encoded_len().unwrap(), 6);
        assert_eq!(owner_b.encoded_len().unwrap(), 9);
        assert_eq!(expired_b.encoded_len().unwrap(), 6);
    }

    #[test]
    fn test_encoding_layout() {
        let program = Program::new().set_slot(4).follow().offset(1).read();
        assert_eq!(
            program.encode().unwrap(),
            vec![OP_SET_SLOT, 1, 4, OP_FOLLOW, OP_OFFSET, 1, 1, OP_READ, 1]
        );

        // slot zero encodes as an empty word
        let program = Program::new().set_slot(0);
        assert_eq!(program.encode().unwrap(), vec![OP_SET_SLOT, 0]);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let inner = Program::new().set_slot(1).follow().read();
        let program = Program::new()
            .push_u64(7)
            .set_target(address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045"))
            .push_program(&inner)
            .unwrap()
            .eval(true)
            .read_slots(3)
            .read_bytes()
            .set_output(2);

        let encoded = program.encode().unwrap();
        assert_eq!(Program::decode(&encoded).unwrap(), program);
    }

    #[test]
    fn test_push_address_is_left_padded() {
        let addr = address!("51050ec063d393217B436747617aD1C2285Aeeee");
        let program = Program::new().push_address(addr);
        match &program.ops[0] {
            Op::PushWord(word) => {
                let bytes = word.to_be_bytes::<32>();
                assert_eq!(&bytes[..12], &[0u8; 12]);
                assert_eq!(&bytes[12..], addr.as_slice());
            }
            other => panic!("Expected push word, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let err = Program::decode(&[OP_FOLLOW, 0xff]).unwrap_err();
        match err {
            EspError::UnknownOpcode { opcode, position } => {
                assert_eq!(opcode, 0xff);
                assert_eq!(position, 1);
            }
            other => panic!("Expected unknown opcode, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_truncated() {
        // SET_SLOT claims two bytes but only one follows
        assert!(matches!(
            Program::decode(&[OP_SET_SLOT, 2, 4]),
            Err(EspError::Truncated { .. })
        ));
        // PUSH_BYTES length is cut short
        assert!(matches!(
            Program::decode(&[OP_PUSH_BYTES, 0]),
            Err(EspError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_operands() {
        assert!(matches!(
            Program::decode(&[OP_READ, 0]),
            Err(EspError::InvalidProgram(_))
        ));
        assert!(matches!(
            Program::decode(&[OP_EVAL, 0x02]),
            Err(EspError::InvalidProgram(_))
        ));
        let mut wide = vec![OP_PUSH_WORD, 33];
        wide.extend_from_slice(&[1u8; 33]);
        assert!(matches!(
            Program::decode(&wide),
            Err(EspError::InvalidProgram(_))
        ));
    }

    #[test]
    fn test_encode_rejects_zero_read() {
        assert!(matches!(
            Program::new().set_slot(1).read_slots(0).encode(),
            Err(EspError::InvalidProgram(_))
        ));
        assert!(Program::new().read_slots(0).encoded_len().is_err());
        assert_eq!(Program::new().read_slots(1).encode().unwrap(), vec![OP_READ, 1]);
    }

    #[test]
    fn test_empty_program() {
        let program = Program::decode(&[]).unwrap();
        assert!(program.is_empty());
        assert_eq!(program.encode().unwrap(), Vec::<u8>::new());
    }

    proptest::proptest! {
        #[test]
        fn test_decode_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(proptest::num::u8::ANY, 0..64)) {
            if let Ok(program) = Program::decode(&bytes) {
                // anything that decodes must re-encode to something decodable
                let encoded = program.encode().unwrap();
                proptest::prop_assert_eq!(Program::decode(&encoded).unwrap(), program);
            }
        }
    }
}
