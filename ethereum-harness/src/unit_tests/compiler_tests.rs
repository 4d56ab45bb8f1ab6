// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fs;

use assert_matches::assert_matches;

use super::*;
use crate::artifact::{InterfaceIndex, Mutability};

const BALANCE_OF: &str = r#"{
    "type": "function",
    "name": "balanceOf",
    "inputs": [{"name": "owner", "type": "address", "internalType": "address"}],
    "outputs": [{"name": "", "type": "uint256", "internalType": "uint256"}],
    "stateMutability": "view"
}"#;

#[test]
fn test_discover_sources_recursively() {
    let directory = tempfile::tempdir().unwrap();
    let root = directory.path();
    fs::create_dir_all(root.join("lib")).unwrap();
    fs::write(root.join("Token.sol"), "contract Token {}").unwrap();
    fs::write(root.join("lib/Math.sol"), "library Math {}").unwrap();
    fs::write(root.join("README.md"), "notes").unwrap();

    let sources = discover_sources(root).unwrap();
    assert_eq!(sources, [root.join("Token.sol"), root.join("lib/Math.sol")]);
}

#[test]
fn test_discover_sources_without_contracts() {
    let directory = tempfile::tempdir().unwrap();
    fs::write(directory.path().join("notes.txt"), "").unwrap();
    assert_matches!(
        discover_sources(directory.path()),
        Err(EthereumServiceError::NoSourceFiles(path)) if path == directory.path()
    );
    assert_matches!(
        discover_sources(&directory.path().join("missing")),
        Err(EthereumServiceError::IoError(_))
    );
}

#[test]
fn test_parse_combined_json_with_inline_abi() {
    let output = format!(
        r#"{{
            "contracts": {{
                "contracts/Token.sol:Token": {{"abi": [{BALANCE_OF}], "bin": "6080604052"}}
            }},
            "version": "0.8.26+commit.8a97fa7a.Linux.g++"
        }}"#
    );
    let registry = parse_combined_json(&output).unwrap();
    let artifact = registry.resolve("Token").unwrap();
    assert_eq!(artifact.bytecode[..], [0x60, 0x80, 0x60, 0x40, 0x52]);
    let index = InterfaceIndex::new(&artifact.abi);
    assert_eq!(index.get("balanceOf"), Some(Mutability::Read));
}

#[test]
fn test_parse_combined_json_with_abi_as_text() {
    let abi = serde_json::to_string(&format!("[{BALANCE_OF}]")).unwrap();
    let output = format!(
        r#"{{
            "contracts": {{
                "contracts/IToken.sol:IToken": {{"abi": {abi}, "bin": ""}},
                "contracts/Token.sol:Token": {{"abi": {abi}, "bin": "0x6001"}}
            }}
        }}"#
    );
    let registry = parse_combined_json(&output).unwrap();
    assert_eq!(registry.len(), 2);
    assert!(registry.resolve("IToken").unwrap().bytecode.is_empty());
    assert_eq!(registry.resolve("Token").unwrap().bytecode[..], [0x60, 0x01]);
    assert!(registry
        .resolve("Token")
        .unwrap()
        .abi
        .function("balanceOf")
        .is_some());
}

#[test]
fn test_parse_combined_json_errors() {
    assert_matches!(
        parse_combined_json("not json"),
        Err(EthereumServiceError::JsonError(_))
    );
    assert_matches!(
        parse_combined_json(r#"{"contracts": {"A.sol:A": {"abi": [], "bin": "zz"}}}"#),
        Err(EthereumServiceError::FromHexError(_))
    );
}

#[test_log::test(tokio::test)]
async fn test_missing_compiler() {
    let directory = tempfile::tempdir().unwrap();
    fs::write(directory.path().join("Token.sol"), "contract Token {}").unwrap();
    let compiler = SolidityCompiler::new(&CompilerConfig {
        optimize: true,
        binary: directory.path().join("no-solc").display().to_string(),
    });
    assert_matches!(
        compiler.compile_directory(directory.path()).await,
        Err(EthereumServiceError::CompilerFailed(_))
    );
}
