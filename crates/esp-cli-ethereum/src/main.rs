//! Ethereum CLI for storage programs
//!
//! Encodes and decodes programs, evaluates requests against a node with
//! proofs of every acquired slot, resolves registry fragments, and runs the
//! in-memory demo.

use anyhow::Result;
use clap::{Parser, Subcommand};
use esp_cli_core::{init_tracing, CliUtils, CommonArgs, EspConfig};
use esp_ethereum::abi::parse_address;
use std::process;

mod commands;

/// Command line arguments
#[derive(Parser)]
#[command(name = "esp")]
#[command(about = "Registry-resolved storage programs for Ethereum")]
#[command(version)]
struct EspArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: EspCommand,
}

#[derive(Subcommand)]
enum EspCommand {
    /// Resolve owners and expirations of two differently laid out contracts in memory
    Demo,

    /// Encode program text to bytes
    Encode {
        /// Program text, e.g. "slot 4 follow offset 1 read"
        program: String,
        /// Encode as a request declaring this many outputs
        #[arg(long)]
        outputs: Option<u8>,
    },

    /// Decode program bytes to text
    Decode {
        /// Hex encoded program
        hex: String,
        /// Input is a request (leading output count byte)
        #[arg(long)]
        request: bool,
    },

    /// Resolve a field of a record through the registry
    Resolve {
        /// Contract holding the record
        #[arg(long)]
        target: String,
        /// Record id (decimal or 0x hex)
        #[arg(long)]
        id: String,
        /// Field to resolve: owner or expired
        #[arg(long, default_value = "owner")]
        fragment: String,
        /// RPC endpoint
        #[arg(long)]
        rpc: Option<String>,
        /// Registry contract address
        #[arg(long)]
        registry: Option<String>,
        /// Block number (latest if not specified)
        #[arg(long)]
        block: Option<u64>,
    },

    /// Evaluate a request against a node
    Eval {
        /// Program text
        program: String,
        /// Number of outputs the request declares
        #[arg(long, default_value_t = 1)]
        outputs: u8,
        /// RPC endpoint
        #[arg(long)]
        rpc: Option<String>,
        /// Block number (latest if not specified)
        #[arg(long)]
        block: Option<u64>,
    },
}

async fn handle_command(args: EspArgs) -> Result<()> {
    init_tracing(args.common.verbose)?;

    let result = match args.command {
        EspCommand::Demo => commands::cmd_demo().await?,

        EspCommand::Encode { program, outputs } => commands::cmd_encode(&program, outputs)?,

        EspCommand::Decode { hex, request } => commands::cmd_decode(&hex, request)?,

        EspCommand::Resolve {
            target,
            id,
            fragment,
            rpc,
            registry,
            block,
        } => {
            let registry = registry.as_deref().map(parse_address).transpose()?;
            let config =
                EspConfig::load(args.common.config.as_deref())?.merge_args(rpc, registry, block);
            commands::cmd_resolve(&config, &target, &id, &fragment).await?
        }

        EspCommand::Eval {
            program,
            outputs,
            rpc,
            block,
        } => {
            let config = EspConfig::load(args.common.config.as_deref())?.merge_args(rpc, None, block);
            commands::cmd_eval(&config, &program, outputs).await?
        }
    };

    let output = CliUtils::format_json(&result, &args.common.format)?;
    CliUtils::write_output(&output, args.common.output.as_deref())?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = EspArgs::parse();

    if let Err(e) = handle_command(args).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
