// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use assert_matches::assert_matches;

use super::*;
use crate::{
    config::NetworkConfig,
    test_utils::{mock_network, test_options, token_registry, MockNode, TEST_PRIVATE_KEY},
};

#[test_log::test(tokio::test)]
async fn test_node_accounts_are_delegated() {
    let (node, network) = mock_network(3).await;
    let addresses = node.get_accounts().await.unwrap();
    assert_eq!(
        network
            .accounts()
            .iter()
            .map(|signer| signer.address())
            .collect::<Vec<_>>(),
        addresses
    );
    assert!(network.accounts().iter().all(|signer| !signer.is_local()));
    assert_eq!(network.account(2).unwrap().address(), addresses[2]);
    assert!(network.account(3).is_none());
}

#[test_log::test(tokio::test)]
async fn test_add_account() {
    let (_node, mut network) = mock_network(1).await;
    let signer = network
        .add_account(&format!(" {TEST_PRIVATE_KEY}\n"))
        .await
        .unwrap();
    assert!(signer.is_local());
    assert_eq!(network.accounts().len(), 2);
    assert_eq!(network.account(1).unwrap().address(), signer.address());
    assert_matches!(
        network.add_account("0x1234").await,
        Err(EthereumServiceError::LocalSignerError(_))
    );
    assert_eq!(network.accounts().len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_contract_requires_an_artifact() {
    let (_node, network) = mock_network(1).await;
    assert_matches!(
        network.contract("Vault", Address::ZERO, None),
        Err(EthereumServiceError::ArtifactNotFound(name)) if name == "Vault"
    );
    let binding = network
        .contract("Token", Address::repeat_byte(1), network.account(0))
        .unwrap();
    assert_eq!(binding.name(), "Token");
    assert_eq!(
        binding.owner().unwrap().address(),
        network.accounts()[0].address()
    );
}

#[test_log::test(tokio::test)]
async fn test_account_book_prefers_local_signers() {
    let node = Arc::new(MockNode::new(0));
    let mut network = Network::new(node, token_registry(), test_options())
        .await
        .unwrap();
    let local = network.add_account(TEST_PRIVATE_KEY).await.unwrap();
    let delegated = Signer::delegated(local.address(), network.context.clone());
    network.context.accounts.register(&delegated).await;

    let found = network.context.accounts.find(local.address()).await.unwrap();
    assert!(found.is_local());
    assert!(network
        .context
        .accounts
        .find(Address::repeat_byte(0x42))
        .await
        .is_none());
}

#[test_log::test(tokio::test)]
async fn test_account_book_forgets_dropped_signers() {
    let (_node, network) = mock_network(0).await;
    let address = Address::repeat_byte(0x77);
    let signer = Signer::delegated(address, network.context.clone());
    network.context.accounts.register(&signer).await;
    assert!(network.context.accounts.find(address).await.is_some());
    drop(signer);
    assert!(network.context.accounts.find(address).await.is_none());
}

#[test_log::test(tokio::test)]
async fn test_connect_to_unknown_network() {
    let config = HarnessConfig::default();
    let error = Network::connect(&config, Some("mainnet"), token_registry(), false)
        .await
        .err()
        .unwrap();
    assert_matches!(
        error.downcast_ref::<EthereumServiceError>(),
        Some(EthereumServiceError::UnknownNetwork(name)) if name == "mainnet"
    );
}

#[test_log::test(tokio::test)]
async fn test_connect_with_empty_test_node_command() {
    let config = HarnessConfig {
        networks: BTreeMap::from([(
            "development".to_string(),
            NetworkConfig {
                host: "http://127.0.0.1:1".to_string(),
                test_rpc: Some("   ".to_string()),
            },
        )]),
        ..HarnessConfig::default()
    };
    let error = Network::connect(&config, None, token_registry(), false)
        .await
        .err()
        .unwrap();
    assert!(error.to_string().contains("empty test node command"));
}
