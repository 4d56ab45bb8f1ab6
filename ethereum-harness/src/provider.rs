// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use alloy::{
    network::Ethereum,
    primitives::{Address, Bytes, TxHash, U256},
    providers::{
        PendingTransactionBuilder, PendingTransactionError, Provider, RootProvider, WatchTxError,
    },
    rpc::types::eth::{TransactionReceipt, TransactionRequest},
};
use async_trait::async_trait;
use url::Url;

use crate::{
    client::{EthereumTransport, Receipt},
    common::EthereumServiceError,
};

pub type HttpProvider = RootProvider<Ethereum>;

/// The Ethereum endpoint and its provider used for accessing the Ethereum node.
pub struct EthereumClient<M> {
    pub provider: M,
}

#[async_trait]
impl EthereumTransport for EthereumClient<HttpProvider> {
    async fn get_accounts(&self) -> Result<Vec<Address>, EthereumServiceError> {
        Ok(self.provider.get_accounts().await?)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, EthereumServiceError> {
        Ok(self.provider.get_balance(address).latest().await?)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64, EthereumServiceError> {
        Ok(self.provider.get_transaction_count(address).pending().await?)
    }

    async fn get_gas_price(&self) -> Result<u128, EthereumServiceError> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn get_chain_id(&self) -> Result<u64, EthereumServiceError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn call(&self, request: &TransactionRequest) -> Result<Bytes, EthereumServiceError> {
        Ok(self.provider.call(request.clone()).latest().await?)
    }

    async fn estimate_gas(
        &self,
        request: &TransactionRequest,
    ) -> Result<u64, EthereumServiceError> {
        Ok(self.provider.estimate_gas(request.clone()).latest().await?)
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TxHash, EthereumServiceError> {
        let pending = self.provider.send_transaction(request).await?;
        Ok(*pending.tx_hash())
    }

    async fn send_raw_transaction(&self, encoded: &[u8]) -> Result<TxHash, EthereumServiceError> {
        let pending = self.provider.send_raw_transaction(encoded).await?;
        Ok(*pending.tx_hash())
    }

    async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<Receipt>, EthereumServiceError> {
        let receipt = self.provider.get_transaction_receipt(hash).await?;
        Ok(receipt.map(into_receipt))
    }

    /// Relies on the block heartbeat of the provider, which polls at the interval
    /// of its own client.
    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        _poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Receipt, EthereumServiceError> {
        let receipt = PendingTransactionBuilder::new(self.provider.clone(), hash)
            .with_timeout(Some(timeout))
            .get_receipt()
            .await
            .map_err(|error| match error {
                PendingTransactionError::TxWatcher(WatchTxError::Timeout) => {
                    EthereumServiceError::ReceiptTimeout(hash)
                }
                PendingTransactionError::TransportError(error) => error.into(),
                error => EthereumServiceError::PendingTransactionError(error),
            })?;
        Ok(into_receipt(receipt))
    }
}

fn into_receipt(receipt: TransactionReceipt) -> Receipt {
    Receipt {
        transaction_hash: receipt.transaction_hash,
        gas_used: receipt.gas_used,
        contract_address: receipt.contract_address,
        status: receipt.status(),
    }
}

impl EthereumClient<HttpProvider> {
    /// Connects to an existing Ethereum node and creates an `EthereumClient`
    /// if successful.
    pub fn new(url: String) -> Result<Self, EthereumServiceError> {
        let rpc_url = Url::parse(&url)?;
        let provider = RootProvider::new_http(rpc_url);
        let endpoint = Self { provider };
        Ok(endpoint)
    }
}
