//! Evaluation requests
//!
//! A [`Request`] is a root program plus the number of outputs it promises to
//! fill. Its byte form is the output count followed by the encoded program.

use crate::{EspError, Op, Program};
use alloc::vec::Vec;
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Number of outputs the program must set
    pub outputs: u8,
    /// Root program
    pub program: Program,
}

impl Request {
    pub fn new(outputs: u8) -> Self {
        Self {
            outputs,
            program: Program::new(),
        }
    }

    pub fn with_program(outputs: u8, program: Program) -> Self {
        Self { outputs, program }
    }

    fn map(mut self, f: impl FnOnce(Program) -> Program) -> Self {
        self.program = f(core::mem::take(&mut self.program));
        self
    }

    pub fn op(self, op: Op) -> Self {
        self.map(|p| p.op(op))
    }

    pub fn push_u64(self, value: u64) -> Self {
        self.map(|p| p.push_u64(value))
    }

    pub fn push_uint(self, value: U256) -> Self {
        self.map(|p| p.push_uint(value))
    }

    pub fn push_address(self, address: Address) -> Self {
        self.map(|p| p.push_address(address))
    }

    pub fn push_bytes(self, data: impl Into<Bytes>) -> Self {
        self.map(|p| p.push_bytes(data))
    }

    /// Push an encoded program, ready for `eval`
    pub fn push_program(mut self, program: &Program) -> Result<Self, EspError> {
        self.program = core::mem::take(&mut self.program).push_program(program)?;
        Ok(self)
    }

    pub fn target(self) -> Self {
        self.map(Program::target)
    }

    pub fn set_target(self, address: Address) -> Self {
        self.map(|p| p.set_target(address))
    }

    pub fn set_slot(self, slot: u64) -> Self {
        self.map(|p| p.set_slot(slot))
    }

    pub fn set_slot_uint(self, slot: U256) -> Self {
        self.map(|p| p.set_slot_uint(slot))
    }

    pub fn offset(self, delta: u64) -> Self {
        self.map(|p| p.offset(delta))
    }

    pub fn follow(self) -> Self {
        self.map(Program::follow)
    }

    pub fn read(self) -> Self {
        self.map(Program::read)
    }

    pub fn read_slots(self, count: u8) -> Self {
        self.map(|p| p.read_slots(count))
    }

    pub fn read_bytes(self) -> Self {
        self.map(Program::read_bytes)
    }

    pub fn eval(self, acquire: bool) -> Self {
        self.map(|p| p.eval(acquire))
    }

    pub fn set_output(self, index: u8) -> Self {
        self.map(|p| p.set_output(index))
    }

    pub fn encode(&self) -> Result<Vec<u8>, EspError> {
        let mut out = Vec::with_capacity(1);
        out.push(self.outputs);
        out.extend(self.program.encode()?);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EspError> {
        let (outputs, rest) = bytes
            .split_first()
            .ok_or(EspError::Truncated { position: 0 })?;
        Ok(Self {
            outputs: *outputs,
            program: Program::decode(rest)?,
        })
    }
}
