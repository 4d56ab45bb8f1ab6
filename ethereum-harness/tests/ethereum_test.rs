// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use alloy::{
    network::TransactionBuilder as _, primitives::U256, rpc::types::eth::TransactionRequest,
};
use assert_matches::assert_matches;
use ethereum_harness::{
    artifact::ArtifactRegistry,
    config::{HarnessConfig, NetworkConfig},
    test_utils::{mock_network, INITIAL_BALANCE, TEST_KEY_ADDRESS, TEST_PRIVATE_KEY},
    EthereumServiceError, Invocation, Network, Outcome, TxOptions,
};
use serde_json::json;

#[test_log::test(tokio::test)]
async fn test_token_scenario() -> anyhow::Result<()> {
    let (_node, network) = mock_network(2).await;
    let (owner, other) = (&network.accounts()[0], &network.accounts()[1]);
    let owner_arg = json!(owner.to_string());
    let other_arg = json!(other.to_string());

    let token = owner.deploy("Token", vec![json!(1000)]).await?;
    assert_eq!(token.call("balanceOf", vec![owner_arg.clone()]).await?, json!(1000));

    let invocation = token
        .invoke("transfer", vec![other_arg.clone(), json!(100)])
        .await?;
    assert_matches!(invocation, Invocation::Transaction(_));
    assert_eq!(token.call("balanceOf", vec![owner_arg]).await?, json!(900));
    assert_eq!(token.call("balanceOf", vec![other_arg.clone()]).await?, json!(100));

    let attached = network.contract("Token", token.address(), Some(other))?;
    assert!(attached.reverts("transfer", vec![other_arg, json!(101)]).await?);
    assert_eq!(owner.deployment("Token").await.unwrap().address(), token.address());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_locally_signed_transfer() -> anyhow::Result<()> {
    let (node, mut network) = mock_network(1).await;
    let recipient = network.accounts()[0].clone();
    let signer = network.add_account(TEST_PRIVATE_KEY).await?;
    assert_eq!(signer.to_string(), TEST_KEY_ADDRESS);
    node.fund(signer.address(), U256::from(1_000_000));

    signer.transfer(recipient.address(), U256::from(250), None).await?;
    assert_eq!(signer.balance().await?, U256::from(999_750));
    assert_eq!(
        recipient.balance().await?,
        U256::from(INITIAL_BALANCE) + U256::from(250)
    );
    assert_eq!(signer.nonce().await?, 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_failures_as_values() -> anyhow::Result<()> {
    let (_node, network) = mock_network(2).await;
    let owner = &network.accounts()[0];
    let token = owner.deploy("Token", vec![json!(10)]).await?;
    let other_arg = json!(network.accounts()[1].to_string());

    assert_matches!(
        token.try_invoke("transfer", vec![other_arg.clone(), json!(11)]).await?,
        Outcome::Reverted(_)
    );
    assert_matches!(
        token.try_invoke("transfer", vec![other_arg, json!(10)]).await?,
        Outcome::Success(Invocation::Transaction(_))
    );
    assert_matches!(
        token.call("missing", vec![]).await,
        Err(EthereumServiceError::MemberNotFound { .. })
    );
    Ok(())
}

#[ignore = "requires `anvil` on the path"]
#[test_log::test(tokio::test)]
async fn test_anvil_accounts() -> anyhow::Result<()> {
    let config = HarnessConfig {
        networks: BTreeMap::from([(
            "development".to_string(),
            NetworkConfig {
                host: "http://127.0.0.1:8545".to_string(),
                test_rpc: Some("anvil --port 8545".to_string()),
            },
        )]),
        ..HarnessConfig::default()
    };
    let network = Network::connect(&config, None, ArtifactRegistry::default(), false).await?;
    assert_eq!(network.accounts().len(), 10);
    let (sender, recipient) = (&network.accounts()[0], &network.accounts()[1]);
    let before = recipient.balance().await?;
    let request = TransactionRequest::default()
        .with_to(recipient.address())
        .with_value(U256::from(1));
    let receipt = sender.execute(request, &TxOptions::default()).await?;
    assert!(receipt.status);
    assert_eq!(receipt.gas_used, 21_000);
    assert_eq!(recipient.balance().await?, before + U256::from(1));
    Ok(())
}
