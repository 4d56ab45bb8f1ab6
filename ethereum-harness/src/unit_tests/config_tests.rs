// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::io::Write as _;

use assert_matches::assert_matches;

use super::*;

const CONFIG: &str = r#"{
    "networks": {
        "development": {
            "host": "http://127.0.0.1:8545",
            "test-rpc": "anvil --port 8545"
        },
        "staging": {
            "host": "http://staging.example:8545"
        }
    },
    "solc": {
        "optimize": true
    }
}"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_read_config() {
    let file = write_config(CONFIG);
    let config = HarnessConfig::read(file.path()).unwrap();
    assert_eq!(config.networks.len(), 2);
    assert_eq!(
        config.networks["development"].test_rpc.as_deref(),
        Some("anvil --port 8545")
    );
    assert_eq!(config.networks["staging"].test_rpc, None);
    assert!(config.solc.optimize);
    assert_eq!(config.solc.binary, "solc");
    assert_eq!(config.receipts, ReceiptConfig::default());
}

#[test]
fn test_select_network() {
    let config = HarnessConfig::read(write_config(CONFIG).path()).unwrap();
    let (name, network) = config.network(None).unwrap();
    assert_eq!(name, DEFAULT_NETWORK);
    assert_eq!(network.host, "http://127.0.0.1:8545");
    let (name, network) = config.network(Some("staging")).unwrap();
    assert_eq!(name, "staging");
    assert_eq!(network.host, "http://staging.example:8545");
    assert_matches!(
        config.network(Some("mainnet")),
        Err(EthereumServiceError::UnknownNetwork(name)) if name == "mainnet"
    );
}

#[test]
fn test_missing_default_network() {
    let config = HarnessConfig::default();
    assert_matches!(
        config.network(None),
        Err(EthereumServiceError::UnknownNetwork(name)) if name == "development"
    );
}

#[test]
fn test_read_errors() {
    let directory = tempfile::tempdir().unwrap();
    assert_matches!(
        HarnessConfig::read(&directory.path().join("config.json")),
        Err(EthereumServiceError::IoError(_))
    );
    assert_matches!(
        HarnessConfig::read(write_config("{\"solc\": {}}").path()),
        Err(EthereumServiceError::JsonError(_))
    );
}

#[test]
fn test_network_options() {
    let file = write_config(
        r#"{"networks": {}, "receipts": {"poll_interval_ms": 5, "timeout_secs": 3}}"#,
    );
    let config = HarnessConfig::read(file.path()).unwrap();
    let options = config.options(true);
    assert!(options.report_gas);
    assert_eq!(options.poll_interval, Duration::from_millis(5));
    assert_eq!(options.receipt_timeout, Duration::from_secs(3));
    assert!(!NetworkOptions::default().report_gas);
}
