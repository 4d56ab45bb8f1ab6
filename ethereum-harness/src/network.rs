// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The entry point of the harness: a connection to a node with its accounts and
//! compiled contracts.

use std::sync::{Arc, Weak};

use alloy::primitives::Address;
use async_lock::RwLock;
use tracing::{debug, info};

use crate::{
    artifact::ArtifactRegistry,
    client::EthereumTransport,
    common::EthereumServiceError,
    config::{HarnessConfig, NetworkOptions},
    contract::ContractBinding,
    node::{TestNode, TestNodeGuard},
    provider::EthereumClient,
    signer::Signer,
};

#[cfg(test)]
#[path = "unit_tests/network_tests.rs"]
mod network_tests;

/// The accounts known to a network, used to resolve the `from` option of a
/// transaction. Only weak references are kept: the accounts are owned by the
/// [`Network`].
#[derive(Default)]
pub struct AccountBook {
    signers: RwLock<Vec<Weak<Signer>>>,
}

impl AccountBook {
    pub async fn register(&self, signer: &Arc<Signer>) {
        self.signers.write().await.push(Arc::downgrade(signer));
    }

    /// Finds the signer of `address`. Local signers take precedence since they
    /// are registered explicitly.
    pub async fn find(&self, address: Address) -> Option<Arc<Signer>> {
        let signers = self.signers.read().await;
        let mut candidates = signers
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|signer| signer.address() == address)
            .collect::<Vec<_>>();
        candidates.sort_by_key(|signer| !signer.is_local());
        candidates.into_iter().next()
    }
}

/// What the accounts and contracts of a network share.
pub struct NetworkContext {
    pub transport: Arc<dyn EthereumTransport>,
    pub registry: ArtifactRegistry,
    pub options: NetworkOptions,
    pub accounts: AccountBook,
}

/// A connection to a node.
pub struct Network {
    context: Arc<NetworkContext>,
    accounts: Vec<Arc<Signer>>,
    /// Declared last so that the node is stopped after everything else is dropped.
    _node: Option<TestNodeGuard>,
}

impl Network {
    /// Builds a network on top of `transport`. The accounts held by the node
    /// become delegated signers.
    pub async fn new(
        transport: Arc<dyn EthereumTransport>,
        registry: ArtifactRegistry,
        options: NetworkOptions,
    ) -> Result<Self, EthereumServiceError> {
        let context = Arc::new(NetworkContext {
            transport,
            registry,
            options,
            accounts: AccountBook::default(),
        });
        let addresses = context.transport.get_accounts().await?;
        let mut accounts = Vec::with_capacity(addresses.len());
        for address in addresses {
            let signer = Signer::delegated(address, context.clone());
            context.accounts.register(&signer).await;
            accounts.push(signer);
        }
        debug!("Found {} account(s) held by the node", accounts.len());
        Ok(Self {
            context,
            accounts,
            _node: None,
        })
    }

    /// Connects to the network `name` of the configuration, or to the default
    /// one, starting its test node first if it has one.
    pub async fn connect(
        config: &HarnessConfig,
        name: Option<&str>,
        registry: ArtifactRegistry,
        report_gas: bool,
    ) -> anyhow::Result<Self> {
        let (name, network) = config.network(name)?;
        info!("Using network '{name}'");
        let node = match &network.test_rpc {
            Some(command_line) => Some(TestNode::new(command_line, &network.host).run().await?),
            None => None,
        };
        let client = EthereumClient::new(network.host.clone())?;
        let mut network = Self::new(Arc::new(client), registry, config.options(report_gas)).await?;
        network._node = node;
        Ok(network)
    }

    pub fn accounts(&self) -> &[Arc<Signer>] {
        &self.accounts
    }

    pub fn account(&self, index: usize) -> Option<&Arc<Signer>> {
        self.accounts.get(index)
    }

    /// Adds an account whose key is held locally.
    pub async fn add_account(
        &mut self,
        private_key: &str,
    ) -> Result<Arc<Signer>, EthereumServiceError> {
        let key = private_key.trim().parse()?;
        let signer = Signer::local(key, self.context.clone());
        self.context.accounts.register(&signer).await;
        self.accounts.push(signer.clone());
        info!("Added local account {signer}");
        Ok(signer)
    }

    /// Binds the contract `name` deployed at `address`.
    pub fn contract(
        &self,
        name: &str,
        address: Address,
        owner: Option<&Arc<Signer>>,
    ) -> Result<ContractBinding, EthereumServiceError> {
        let artifact = self.context.registry.resolve(name)?;
        Ok(ContractBinding::new(
            address,
            artifact,
            owner.cloned(),
            self.context.clone(),
        ))
    }

    pub fn transport(&self) -> &Arc<dyn EthereumTransport> {
        &self.context.transport
    }

    pub fn registry(&self) -> &ArtifactRegistry {
        &self.context.registry
    }

    pub fn options(&self) -> &NetworkOptions {
        &self.context.options
    }
}
