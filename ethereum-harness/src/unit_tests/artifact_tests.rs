// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use alloy::{json_abi::JsonAbi, primitives::Bytes};
use assert_matches::assert_matches;

use super::*;
use crate::test_utils::TokenContract;

fn entry(key: &str, code: &[u8]) -> (String, JsonAbi, Bytes) {
    (key.to_string(), JsonAbi::new(), Bytes::copy_from_slice(code))
}

#[test]
fn test_simple_name() {
    assert_eq!(simple_name("contracts/Token.sol:Token"), "Token");
    assert_eq!(simple_name("contracts/lib/SafeMath"), "SafeMath");
    assert_eq!(simple_name("Token"), "Token");
}

#[test]
fn test_resolve_by_simple_name() {
    let registry = ArtifactRegistry::new([
        entry("contracts/Vault.sol:Vault", &[1]),
        TokenContract::artifact_entry(),
    ]);
    assert_eq!(registry.len(), 2);
    let artifact = registry.resolve("Token").unwrap();
    assert_eq!(artifact.name, "Token");
    assert_eq!(artifact.bytecode, TokenContract::bytecode());
    assert_eq!(registry.resolve("Vault").unwrap().bytecode[..], [1]);
}

#[test]
fn test_resolve_requires_exact_name() {
    let registry = ArtifactRegistry::new([entry("contracts/MyToken.sol:MyToken", &[1])]);
    assert_matches!(
        registry.resolve("Token"),
        Err(EthereumServiceError::ArtifactNotFound(name)) if name == "Token"
    );
    assert_matches!(
        ArtifactRegistry::default().resolve("MyToken"),
        Err(EthereumServiceError::ArtifactNotFound(_))
    );
}

#[test_log::test]
fn test_resolve_duplicate_uses_first_in_order() {
    let registry = ArtifactRegistry::new([
        entry("contracts/a/Token.sol:Token", &[1]),
        entry("contracts/b/Token.sol:Token", &[2]),
    ]);
    assert_eq!(registry.resolve("Token").unwrap().bytecode[..], [1]);
    assert_eq!(
        registry.keys().collect::<Vec<_>>(),
        ["contracts/a/Token.sol:Token", "contracts/b/Token.sol:Token"]
    );
}

#[test]
fn test_interface_index() {
    let index = InterfaceIndex::new(&TokenContract::abi());
    assert_eq!(index.get("balanceOf"), Some(Mutability::Read));
    assert_eq!(index.get("name"), Some(Mutability::Read));
    assert_eq!(index.get("ping"), Some(Mutability::Read));
    assert_eq!(index.get("transfer"), Some(Mutability::Write));
    assert_eq!(index.get("deposit"), Some(Mutability::Write));
    assert_eq!(index.get("touch"), Some(Mutability::Write));
    // Only functions are indexed.
    assert!(!index.contains("Transfer"));
    assert!(!index.contains("InsufficientBalance"));
    assert!(!index.contains("constructor"));
    assert_eq!(
        index.names().collect::<Vec<_>>(),
        [
            "balanceOf",
            "blob",
            "deposit",
            "digest",
            "history",
            "name",
            "ping",
            "supply",
            "touch",
            "transfer"
        ]
    );
}
