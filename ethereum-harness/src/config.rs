// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::BTreeMap, fs, path::Path, time::Duration};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::common::EthereumServiceError;

#[cfg(test)]
#[path = "unit_tests/config_tests.rs"]
mod config_tests;

/// The network used when none is selected.
pub const DEFAULT_NETWORK: &str = "development";

pub trait Import: DeserializeOwned {
    fn read(path: &Path) -> Result<Self, EthereumServiceError> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(data.as_slice())?)
    }
}

/// How to reach one network.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// The RPC endpoint.
    pub host: String,
    /// A command line starting a local test node before connecting.
    #[serde(rename = "test-rpc", default, skip_serializing_if = "Option::is_none")]
    pub test_rpc: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompilerConfig {
    #[serde(default)]
    pub optimize: bool,
    #[serde(default = "default_solc_binary")]
    pub binary: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            optimize: false,
            binary: default_solc_binary(),
        }
    }
}

fn default_solc_binary() -> String {
    "solc".to_string()
}

/// How receipts are awaited.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiptConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_timeout_secs() -> u64 {
    120
}

/// The content of the configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HarnessConfig {
    pub networks: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    pub solc: CompilerConfig,
    #[serde(default)]
    pub receipts: ReceiptConfig,
}

impl Import for HarnessConfig {}

impl HarnessConfig {
    /// Selects a network by name, or the default one.
    pub fn network<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a NetworkConfig), EthereumServiceError> {
        let name = name.unwrap_or(DEFAULT_NETWORK);
        let network = self
            .networks
            .get(name)
            .ok_or_else(|| EthereumServiceError::UnknownNetwork(name.to_string()))?;
        Ok((name, network))
    }

    pub fn options(&self, report_gas: bool) -> NetworkOptions {
        NetworkOptions {
            report_gas,
            poll_interval: Duration::from_millis(self.receipts.poll_interval_ms),
            receipt_timeout: Duration::from_secs(self.receipts.timeout_secs),
        }
    }
}

/// Settings shared by every account and contract of a network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkOptions {
    /// Log the gas used by each transaction.
    pub report_gas: bool,
    pub poll_interval: Duration,
    pub receipt_timeout: Duration,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        HarnessConfig::default().options(false)
    }
}
