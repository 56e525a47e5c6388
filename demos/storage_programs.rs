//! Registry-resolved storage programs, end to end
//!
//! Deploys a registry and two contracts that store the same data in
//! different layouts, registers one `getOwner` and one `isExpired` program
//! per contract, then reads both contracts through the same request shape.
//!
//! Run with `cargo run --example storage_programs --features demos`.

use alloy_primitives::U256;
use anyhow::Result;
use esp::core::Program;
use esp::ethereum::{demo::Demo, Fragment};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let demo = Demo::setup()?;
    info!("registry at {}", demo.registry.address);

    let report = demo.run().await?;

    println!("[owners]");
    for owner in &report.owners {
        println!("  {}", owner);
    }
    println!("[expired]");
    for expired in &report.expired {
        println!("  {}", expired);
    }
    println!("[program lengths]");
    for (name, length) in &report.program_lengths {
        println!("  {} = {}", name, length);
    }

    // the request that was evaluated for B's owner, and what it proved
    let resolver = demo.resolver();
    let state = resolver
        .resolve(demo.contract_b.address, U256::from(2), Fragment::GetOwner)
        .await?;
    let request = esp::ethereum::fragment_request(
        demo.registry.address,
        demo.contract_b.address,
        U256::from(2),
        Fragment::GetOwner,
    );
    println!("[request]");
    println!("  {}", request.program);
    println!("  {} bytes", request.encode()?.len());
    println!("[proofs]");
    for (target, slots) in state.acquired_slots() {
        println!("  {} : {} slots", target, slots.len());
    }

    let text: Program = "slot 4 follow offset 1 read".parse()?;
    println!("[B getOwner] {} = 0x{}", text, hex::encode(text.encode()?));
    Ok(())
}

