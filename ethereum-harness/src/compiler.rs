// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Discovery and compilation of the Solidity sources with an external `solc`.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy::{json_abi::JsonAbi, primitives::hex};
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::info;
use walkdir::WalkDir;

use crate::{
    artifact::ArtifactRegistry, command::CommandExt, common::EthereumServiceError,
    config::CompilerConfig,
};

#[cfg(test)]
#[path = "unit_tests/compiler_tests.rs"]
mod compiler_tests;

/// Lists the `.sol` files below `directory`, sorted by path.
pub fn discover_sources(directory: &Path) -> Result<Vec<PathBuf>, EthereumServiceError> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(directory) {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "sol") {
            sources.push(path.to_path_buf());
        }
    }
    if sources.is_empty() {
        return Err(EthereumServiceError::NoSourceFiles(directory.to_path_buf()));
    }
    sources.sort();
    Ok(sources)
}

#[derive(Deserialize)]
struct CombinedOutput {
    contracts: BTreeMap<String, CombinedContract>,
}

#[derive(Deserialize)]
struct CombinedContract {
    /// Either the ABI itself or, for older compilers, its JSON text.
    abi: Value,
    #[serde(default)]
    bin: String,
}

/// Builds the registry from the output of `solc --combined-json abi,bin`.
pub fn parse_combined_json(output: &str) -> Result<ArtifactRegistry, EthereumServiceError> {
    let output: CombinedOutput = serde_json::from_str(output)?;
    let mut entries = Vec::new();
    for (key, contract) in output.contracts {
        let abi = match contract.abi {
            Value::String(text) => serde_json::from_str::<JsonAbi>(&text)?,
            value => serde_json::from_value::<JsonAbi>(value)?,
        };
        let bytecode = hex::decode(contract.bin.trim())?;
        entries.push((key, abi, bytecode.into()));
    }
    Ok(ArtifactRegistry::new(entries))
}

/// Runs the Solidity compiler.
#[derive(Clone, Debug)]
pub struct SolidityCompiler {
    binary: String,
    optimize: bool,
}

impl SolidityCompiler {
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            optimize: config.optimize,
        }
    }

    /// Compiles every source below `directory`.
    pub async fn compile_directory(
        &self,
        directory: &Path,
    ) -> Result<ArtifactRegistry, EthereumServiceError> {
        let sources = discover_sources(directory)?;
        self.compile(&sources).await
    }

    pub async fn compile(
        &self,
        sources: &[PathBuf],
    ) -> Result<ArtifactRegistry, EthereumServiceError> {
        info!("Compiling {} contract source(s)...", sources.len());
        let mut command = Command::new(&self.binary);
        command.args(["--combined-json", "abi,bin"]);
        if self.optimize {
            command.arg("--optimize");
        }
        command.args(sources);
        let output = command
            .spawn_and_wait_for_stdout()
            .await
            .map_err(|error| EthereumServiceError::CompilerFailed(format!("{error:#}")))?;
        parse_combined_json(&output)
    }
}
