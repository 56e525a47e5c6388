//! Storage program evaluation
//!
//! The [`Prover`] runs a [`Request`] against a [`StorageSource`]. All frames
//! share one value stack; each frame has its own target and slot. `Eval`
//! pops program bytes and pushes a child frame that starts at the parent's
//! target with slot zero, which is how a program fetched from one contract is
//! run against another.
//!
//! Every slot read by an acquiring frame is recorded. Once the root program
//! finishes, [`Prover::eval_request`] asks the source for proofs of exactly
//! those slots, grouped per target.

use crate::{
    slots::{decode_bytes_header, derive_mapping_key, dynamic_data_slot, words_for, BytesHeader},
    source::{AccountProof, StorageSource},
};
use alloy_primitives::{Address, Bytes, B256, U256};
use esp_core::{EspError, Op, Program, Request};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Bounds on a single evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineLimits {
    /// Maximum number of nested frames, root included
    pub max_depth: usize,
    /// Maximum number of values on the stack
    pub max_stack: usize,
    /// Maximum number of storage slots read across all frames
    pub max_read_slots: usize,
}

impl Default for MachineLimits {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_stack: 256,
            max_read_slots: 1024,
        }
    }
}

/// Result of evaluating a request
#[derive(Debug, Clone, Default)]
pub struct EvalState {
    outputs: Vec<Option<Bytes>>,
    acquired: BTreeMap<Address, BTreeSet<U256>>,
    proofs: Vec<AccountProof>,
    read_count: usize,
    stack: Vec<Bytes>,
}

impl EvalState {
    /// Outputs as set by the program; `None` where never set
    pub fn outputs(&self) -> &[Option<Bytes>] {
        &self.outputs
    }

    /// All outputs, failing on the first one the program did not set
    pub fn resolve_outputs(&self) -> Result<Vec<Bytes>, EspError> {
        self.outputs
            .iter()
            .enumerate()
            .map(|(i, output)| output.clone().ok_or(EspError::MissingOutput(i)))
            .collect()
    }

    /// Slots read by acquiring frames, per target
    pub fn acquired_slots(&self) -> &BTreeMap<Address, BTreeSet<U256>> {
        &self.acquired
    }

    /// Proofs of the acquired slots (empty until proofs are acquired)
    pub fn proofs(&self) -> &[AccountProof] {
        &self.proofs
    }

    /// Total number of storage reads, acquired or not
    pub fn read_count(&self) -> usize {
        self.read_count
    }

    /// Values left on the stack when the program finished
    pub fn leftover_stack(&self) -> &[Bytes] {
        &self.stack
    }
}

struct Frame {
    ops: Vec<Op>,
    pc: usize,
    target: Address,
    slot: U256,
    acquire: bool,
}

/// Evaluates storage programs against a storage source
///
/// # Examples
///
/// ```rust,ignore
/// use esp_core::Request;
/// use esp_ethereum::{MemoryStorage, Prover};
///
/// let prover = Prover::new(storage);
/// let request = Request::new(1).set_target(contract).set_slot(0).read().set_output(0);
/// let state = prover.eval_request(&request).await?;
/// let outputs = state.resolve_outputs()?;
/// ```
pub struct Prover<S> {
    source: S,
    limits: MachineLimits,
}

impl<S: StorageSource> Prover<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            limits: MachineLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: MachineLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn limits(&self) -> &MachineLimits {
        &self.limits
    }

    /// Evaluate a request and acquire proofs for every recorded read
    pub async fn eval_request(&self, request: &Request) -> Result<EvalState, EspError> {
        let mut state = self.eval_program(&request.program, request.outputs).await?;

        for (target, slots) in &state.acquired {
            let slots: Vec<U256> = slots.iter().copied().collect();
            let proof = self.source.prove(*target, &slots).await?;
            state.proofs.push(proof);
        }

        debug!(
            "request done: {} reads, {} proofs over {} targets",
            state.read_count,
            state.proofs.len(),
            state.acquired.len()
        );
        Ok(state)
    }

    /// Evaluate a program without fetching proofs
    pub async fn eval_program(&self, program: &Program, outputs: u8) -> Result<EvalState, EspError> {
        let mut state = EvalState {
            outputs: vec![None; outputs as usize],
            ..EvalState::default()
        };
        let mut frames = vec![Frame {
            ops: program.ops.clone(),
            pc: 0,
            target: Address::ZERO,
            slot: U256::ZERO,
            acquire: true,
        }];

        debug!("evaluating {} ops with {} outputs", program.len(), outputs);

        loop {
            let depth = frames.len();
            let Some(frame) = frames.last_mut() else {
                break;
            };
            let Some(op) = frame.ops.get(frame.pc).cloned() else {
                frames.pop();
                continue;
            };
            frame.pc += 1;
            trace!("depth {} pc {}: {}", depth, frame.pc - 1, op);

            match op {
                Op::PushWord(word) => {
                    self.push(&mut state, Bytes::from(word.to_be_bytes::<32>().to_vec()))?;
                }
                Op::PushBytes(data) => self.push(&mut state, data)?,
                Op::Target => {
                    let value = pop(&mut state)?;
                    frame.target = to_address(&value)?;
                    frame.slot = U256::ZERO;
                }
                Op::SetSlot(slot) => frame.slot = slot,
                Op::Offset(delta) => frame.slot = frame.slot.wrapping_add(delta),
                Op::Follow => {
                    let key = pop(&mut state)?;
                    frame.slot = derive_mapping_key(&key, frame.slot);
                }
                Op::Read(count) => {
                    let (target, slot, acquire) = (frame.target, frame.slot, frame.acquire);
                    let mut data = Vec::with_capacity(count as usize * 32);
                    for i in 0..count {
                        let word = self
                            .read(&mut state, target, slot.wrapping_add(U256::from(i)), acquire)
                            .await?;
                        data.extend_from_slice(word.as_slice());
                    }
                    self.push(&mut state, Bytes::from(data))?;
                }
                Op::ReadBytes => {
                    let (target, slot, acquire) = (frame.target, frame.slot, frame.acquire);
                    let data = self.read_bytes(&mut state, target, slot, acquire).await?;
                    self.push(&mut state, data)?;
                }
                Op::Eval { acquire } => {
                    let code = pop(&mut state)?;
                    let child = Program::decode(&code)?;
                    let target = frame.target;
                    if depth >= self.limits.max_depth {
                        return Err(EspError::LimitExceeded(format!(
                            "eval depth {} exceeds {}",
                            depth + 1,
                            self.limits.max_depth
                        )));
                    }
                    debug!("eval {} ops against {} (acquire: {})", child.len(), target, acquire);
                    frames.push(Frame {
                        ops: child.ops,
                        pc: 0,
                        target,
                        slot: U256::ZERO,
                        acquire,
                    });
                }
                Op::SetOutput(index) => {
                    let index = index as usize;
                    let outputs = state.outputs.len();
                    if index >= outputs {
                        return Err(EspError::OutputIndex { index, outputs });
                    }
                    let value = pop(&mut state)?;
                    state.outputs[index] = Some(value);
                }
            }
        }

        Ok(state)
    }

    fn push(&self, state: &mut EvalState, value: Bytes) -> Result<(), EspError> {
        if state.stack.len() >= self.limits.max_stack {
            return Err(EspError::LimitExceeded(format!(
                "stack exceeds {} values",
                self.limits.max_stack
            )));
        }
        state.stack.push(value);
        Ok(())
    }

    async fn read(
        &self,
        state: &mut EvalState,
        target: Address,
        slot: U256,
        acquire: bool,
    ) -> Result<B256, EspError> {
        if state.read_count >= self.limits.max_read_slots {
            return Err(EspError::LimitExceeded(format!(
                "more than {} storage reads",
                self.limits.max_read_slots
            )));
        }
        state.read_count += 1;
        if acquire {
            state.acquired.entry(target).or_default().insert(slot);
        }
        self.source.storage_at(target, slot).await
    }

    async fn read_bytes(
        &self,
        state: &mut EvalState,
        target: Address,
        slot: U256,
        acquire: bool,
    ) -> Result<Bytes, EspError> {
        let header_word = self.read(state, target, slot, acquire).await?;
        match decode_bytes_header(header_word)? {
            BytesHeader::Inline { len } => Ok(Bytes::copy_from_slice(&header_word[..len])),
            BytesHeader::External { len } => {
                let words = words_for(len);
                if state.read_count + words > self.limits.max_read_slots {
                    return Err(EspError::LimitExceeded(format!(
                        "bytes of length {} at {} need {} reads",
                        len, slot, words
                    )));
                }
                let base = dynamic_data_slot(slot);
                let mut data = Vec::with_capacity(words * 32);
                for i in 0..words {
                    let word = self
                        .read(state, target, base.wrapping_add(U256::from(i)), acquire)
                        .await?;
                    data.extend_from_slice(word.as_slice());
                }
                data.truncate(len);
                Ok(Bytes::from(data))
            }
        }
    }
}

fn pop(state: &mut EvalState) -> Result<Bytes, EspError> {
    state.stack.pop().ok_or(EspError::StackUnderflow)
}

/// Interpret a stack value as an address (right-aligned, at most 32 bytes)
fn to_address(value: &[u8]) -> Result<Address, EspError> {
    if value.len() > 32 {
        return Err(EspError::InvalidAddress(format!(
            "{} bytes is not an address",
            value.len()
        )));
    }
    let mut word = [0u8; 32];
    word[32 - value.len()..].copy_from_slice(value);
    if word[..12].iter().any(|b| *b != 0) {
        return Err(EspError::InvalidAddress(format!("0x{}", hex::encode(value))));
    }
    Ok(Address::from_slice(&word[12..]))
}
