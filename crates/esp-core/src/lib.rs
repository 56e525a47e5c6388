//! Core types for registry-resolved storage read programs
//!
//! This crate provides the chain-facing vocabulary shared by every other
//! crate in the workspace: storage traversal [`Op`]s, the [`Program`] builder
//! with its compact byte encoding and text form, and [`Request`]s that wrap a
//! root program with its declared outputs.
//!
//! # Features
//!
//! - **no_std compatible**: programs can be encoded and decoded without std
//! - **Deterministic**: the same command sequence always encodes to the same bytes
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! esp-core = { version = "0.1", default-features = false }
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// Module declarations
pub mod error;
pub mod program;
pub mod request;
pub mod text;

// Re-export all public types for convenience
pub use error::EspError;
pub use program::{Op, Program};
pub use request::Request;
pub use text::parse_word;
