//! Storage programs resolved through an on-chain registry
//!
//! Umbrella crate for the demos. Program types live in [`core`]; the
//! Ethereum machine, storage sources and registry resolution in
//! [`ethereum`] (behind the `ethereum` feature).

pub use esp_core as core;

#[cfg(feature = "ethereum")]
pub use esp_ethereum as ethereum;
