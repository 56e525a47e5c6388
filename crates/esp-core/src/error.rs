//! Error types for esp-core
//!
//! This module defines the error type shared by program encoding, evaluation
//! and the storage sources that feed the evaluator.

#[cfg(feature = "std")]
use alloc::boxed::Box;
use alloc::string::String;

/// Errors that can occur while encoding, decoding or evaluating storage programs
#[derive(Debug)]
pub enum EspError {
    /// Program bytes or text could not be encoded or parsed
    Encoding(String),
    /// An opcode byte that no op maps to
    UnknownOpcode { opcode: u8, position: usize },
    /// The program ended in the middle of an op's operands
    Truncated { position: usize },
    /// The program is well-formed but cannot run (bad operand, bad flag)
    InvalidProgram(String),
    /// An op needed a value but the stack was empty
    StackUnderflow,
    /// A value used as a target does not fit in 20 bytes
    InvalidAddress(String),
    /// `SetOutput` referenced an output the request did not declare
    OutputIndex { index: usize, outputs: usize },
    /// An output was never set by the program
    MissingOutput(usize),
    /// A machine limit (depth, stack, reads) was exceeded
    LimitExceeded(String),
    /// Transport failure talking to a node
    Network(String),
    /// The node answered with a JSON-RPC error object
    Rpc { code: i64, message: String },
    /// Serialization error with error details
    Serialization(String),
    /// IO error (only available with std feature)
    #[cfg(feature = "std")]
    Io(Box<dyn std::error::Error + Send + Sync>),
}

impl core::fmt::Display for EspError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EspError::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            EspError::UnknownOpcode { opcode, position } => {
                write!(f, "Unknown opcode 0x{:02x} at byte {}", opcode, position)
            }
            EspError::Truncated { position } => {
                write!(f, "Program truncated at byte {}", position)
            }
            EspError::InvalidProgram(msg) => write!(f, "Invalid program: {}", msg),
            EspError::StackUnderflow => write!(f, "Stack underflow"),
            EspError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            EspError::OutputIndex { index, outputs } => write!(
                f,
                "Output index {} out of range ({} outputs declared)",
                index, outputs
            ),
            EspError::MissingOutput(index) => write!(f, "Output {} was never set", index),
            EspError::LimitExceeded(msg) => write!(f, "Limit exceeded: {}", msg),
            EspError::Network(msg) => write!(f, "Network error: {}", msg),
            EspError::Rpc { code, message } => write!(f, "RPC error {}: {}", code, message),
            EspError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            #[cfg(feature = "std")]
            EspError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EspError {}

#[cfg(feature = "std")]
impl From<std::io::Error> for EspError {
    fn from(err: std::io::Error) -> Self {
        EspError::Io(Box::new(err))
    }
}

impl From<hex::FromHexError> for EspError {
    fn from(err: hex::FromHexError) -> Self {
        EspError::Encoding(alloc::format!("invalid hex: {}", err))
    }
}
