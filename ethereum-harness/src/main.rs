// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Compiles the contracts, connects to a configured network and lists its accounts.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ethereum_harness::{
    compiler::SolidityCompiler,
    config::{HarnessConfig, Import as _},
    Network,
};

/// Ethereum development harness
#[derive(Parser, Debug)]
#[command(name = "ethereum-harness")]
struct Options {
    /// Name of the network of the configuration file to use
    #[arg(long)]
    network: Option<String>,

    /// Log the gas used by every transaction
    #[arg(long)]
    gas: bool,

    /// Path of the configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Directory containing the Solidity sources
    #[arg(long, default_value = "contracts")]
    contracts: PathBuf,

    /// Private keys of additional accounts to sign for locally
    #[arg(long = "private-key")]
    private_keys: Vec<String>,
}

fn main() -> Result<()> {
    let options = Options::parse();
    ethereum_harness::tracing::init("ethereum-harness");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(options.run())
}

impl Options {
    async fn run(&self) -> Result<()> {
        let config = HarnessConfig::read(&self.config)?;
        // Fail on an unknown network before compiling anything.
        config.network(self.network.as_deref())?;

        let compiler = SolidityCompiler::new(&config.solc);
        let registry = compiler.compile_directory(&self.contracts).await?;
        tracing::info!("Compiled {} contract(s)", registry.len());

        let mut network =
            Network::connect(&config, self.network.as_deref(), registry, self.gas).await?;
        for key in &self.private_keys {
            network.add_account(key).await?;
        }
        for (index, account) in network.accounts().iter().enumerate() {
            let balance = account.balance().await?;
            println!("{index}: {account} ({balance} wei)");
        }
        Ok(())
    }
}
