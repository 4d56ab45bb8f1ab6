// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Accounts able to send transactions, and the pipeline taking a transaction
//! request to a confirmed receipt.

use std::{collections::BTreeMap, fmt, sync::Arc};

use alloy::{
    dyn_abi::JsonAbiExt as _,
    eips::eip2718::Encodable2718 as _,
    network::{EthereumWallet, TransactionBuilder as _},
    primitives::{Address, Bytes, TxHash, U256},
    rpc::types::eth::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use async_lock::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    artifact::{Artifact, InterfaceIndex},
    client::Receipt,
    common::{json_to_sol_values, EthereumServiceError},
    contract::{ContractBinding, TxOptions},
    network::NetworkContext,
};

#[cfg(test)]
#[path = "unit_tests/signer_tests.rs"]
mod signer_tests;

/// The gas limit of a plain value transfer.
pub const TRANSFER_GAS: u64 = 21_000;

/// The largest numeric suffix used to record repeated deployments of one artifact.
pub const MAX_DEPLOYMENT_SUFFIX: usize = 9_999;

/// Who holds the key of an account.
#[derive(Clone)]
pub enum SigningStrategy {
    /// The node holds the key and signs on our behalf.
    Delegated,
    /// The key is held here and transactions are signed before submission.
    Local(PrivateKeySigner),
}

impl fmt::Debug for SigningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningStrategy::Delegated => write!(f, "Delegated"),
            SigningStrategy::Local(_) => write!(f, "Local"),
        }
    }
}

#[derive(Clone)]
struct Deployment {
    address: Address,
    artifact: Arc<Artifact>,
    index: Arc<InterfaceIndex>,
}

/// An account of the network together with the means to sign for it.
pub struct Signer {
    address: Address,
    strategy: SigningStrategy,
    context: Arc<NetworkContext>,
    /// Held from nonce selection until the node has accepted the transaction.
    pipeline: Mutex<()>,
    deployments: Mutex<BTreeMap<String, Deployment>>,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address.to_checksum(None))
    }
}

impl Signer {
    /// An account whose key is held by the node.
    pub fn delegated(address: Address, context: Arc<NetworkContext>) -> Arc<Self> {
        Arc::new(Self::new(address, SigningStrategy::Delegated, context))
    }

    /// An account whose key is held locally.
    pub fn local(key: PrivateKeySigner, context: Arc<NetworkContext>) -> Arc<Self> {
        let address = key.address();
        Arc::new(Self::new(address, SigningStrategy::Local(key), context))
    }

    fn new(address: Address, strategy: SigningStrategy, context: Arc<NetworkContext>) -> Self {
        Self {
            address,
            strategy,
            context,
            pipeline: Mutex::new(()),
            deployments: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn strategy(&self) -> &SigningStrategy {
        &self.strategy
    }

    pub fn is_local(&self) -> bool {
        matches!(self.strategy, SigningStrategy::Local(_))
    }

    pub async fn balance(&self) -> Result<U256, EthereumServiceError> {
        self.context.transport.get_balance(self.address).await
    }

    pub async fn nonce(&self) -> Result<u64, EthereumServiceError> {
        self.context.transport.get_transaction_count(self.address).await
    }

    /// Sends `request` from this account and waits for its receipt. A transaction
    /// that is mined but fails is reported as [`EthereumServiceError::Reverted`].
    pub async fn execute(
        &self,
        request: TransactionRequest,
        options: &TxOptions,
    ) -> Result<Receipt, EthereumServiceError> {
        let request = options.apply(request.with_from(self.address));
        let hash = self.submit(request).await?;
        let receipt = self
            .context
            .transport
            .wait_for_receipt(
                hash,
                self.context.options.poll_interval,
                self.context.options.receipt_timeout,
            )
            .await?;
        if !receipt.status {
            return Err(EthereumServiceError::Reverted { hash });
        }
        Ok(receipt)
    }

    /// Sends `amount` wei to `to`. Returns once the node has accepted the
    /// transaction, without waiting for it to be mined.
    pub async fn transfer(
        &self,
        to: Address,
        amount: U256,
        gas_price: Option<u128>,
    ) -> Result<TxHash, EthereumServiceError> {
        let mut request = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_value(amount);
        match &self.strategy {
            SigningStrategy::Delegated => {
                let gas_price = match gas_price {
                    Some(gas_price) => gas_price,
                    None => self.context.transport.get_gas_price().await?,
                };
                request.set_gas_price(gas_price);
            }
            SigningStrategy::Local(_) => {
                request.set_gas_limit(TRANSFER_GAS);
                if let Some(gas_price) = gas_price {
                    request.set_gas_price(gas_price);
                }
            }
        }
        self.submit(request).await
    }

    /// Deploys the artifact `name` with the given constructor arguments. A trailing
    /// JSON object is used as transaction options, whose `from` can only name this
    /// account.
    ///
    /// The new contract is recorded on this account under `name`, or under the
    /// first free name among `name1` to `name9999` on repeated deployments.
    pub async fn deploy(
        self: &Arc<Self>,
        name: &str,
        args: Vec<Value>,
    ) -> Result<ContractBinding, EthereumServiceError> {
        let artifact = self.context.registry.resolve(name)?;
        let (args, options) = TxOptions::split(args)?;
        if let Some(from) = options.from.filter(|from| *from != self.address) {
            return Err(EthereumServiceError::InvalidArgument(format!(
                "cannot deploy {name} from {from}: deployments are sent by {self}"
            )));
        }
        let mut code = artifact.bytecode.to_vec();
        match &artifact.abi.constructor {
            Some(constructor) => {
                let values = json_to_sol_values(&constructor.inputs, &args)?;
                code.extend(constructor.abi_encode_input(&values)?);
            }
            None if args.is_empty() => {}
            None => {
                return Err(EthereumServiceError::InvalidArgument(format!(
                    "{name} has no constructor but {} arguments were given",
                    args.len()
                )))
            }
        }
        let request = TransactionRequest::default().with_deploy_code(Bytes::from(code));
        let receipt = self.execute(request, &options).await?;
        if self.context.options.report_gas {
            info!("deploy {name}: {} gas", receipt.gas_used);
        }
        let address = receipt
            .contract_address
            .ok_or(EthereumServiceError::MissingContractAddress(receipt.transaction_hash))?;
        let index = Arc::new(InterfaceIndex::new(&artifact.abi));
        let deployment = Deployment {
            address,
            artifact,
            index,
        };
        let recorded = self.record(name, deployment.clone()).await?;
        debug!("{name} deployed at {address} and recorded as {recorded}");
        Ok(self.bind(deployment))
    }

    /// Returns a contract previously deployed by this account, by its recorded name.
    pub async fn deployment(self: &Arc<Self>, name: &str) -> Option<ContractBinding> {
        let deployments = self.deployments.lock().await;
        deployments.get(name).cloned().map(|deployment| self.bind(deployment))
    }

    /// The recorded names of the contracts deployed by this account.
    pub async fn deployment_names(&self) -> Vec<String> {
        self.deployments.lock().await.keys().cloned().collect()
    }

    fn bind(self: &Arc<Self>, deployment: Deployment) -> ContractBinding {
        ContractBinding::with_index(
            deployment.address,
            deployment.artifact,
            deployment.index,
            Some(self.clone()),
            self.context.clone(),
        )
    }

    async fn record(
        &self,
        name: &str,
        deployment: Deployment,
    ) -> Result<String, EthereumServiceError> {
        let mut deployments = self.deployments.lock().await;
        let key = std::iter::once(name.to_string())
            .chain((1..=MAX_DEPLOYMENT_SUFFIX).map(|i| format!("{name}{i}")))
            .find(|key| !deployments.contains_key(key))
            .ok_or_else(|| EthereumServiceError::NoFreeDeploymentName(name.to_string()))?;
        deployments.insert(key.clone(), deployment);
        Ok(key)
    }

    async fn submit(&self, request: TransactionRequest) -> Result<TxHash, EthereumServiceError> {
        match &self.strategy {
            SigningStrategy::Delegated => {
                debug!(from = %self.address, "submitting transaction to be signed by the node");
                self.context.transport.send_transaction(request).await
            }
            SigningStrategy::Local(key) => self.sign_and_submit(key, request).await,
        }
    }

    async fn sign_and_submit(
        &self,
        key: &PrivateKeySigner,
        mut request: TransactionRequest,
    ) -> Result<TxHash, EthereumServiceError> {
        let transport = self.context.transport.as_ref();
        let _guard = self.pipeline.lock().await;
        let nonce = transport.get_transaction_count(self.address).await?;
        request.set_nonce(nonce);
        if request.gas_price.is_none() {
            request.set_gas_price(transport.get_gas_price().await?);
        }
        if request.gas.is_none() {
            let gas = transport.estimate_gas(&request).await?;
            request.set_gas_limit(gas);
        }
        request.set_chain_id(transport.get_chain_id().await?);
        debug!(from = %self.address, nonce, gas = ?request.gas, "signing transaction locally");
        let wallet = EthereumWallet::from(key.clone());
        let envelope = request.build(&wallet).await?;
        transport.send_raw_transaction(&envelope.encoded_2718()).await
    }
}
