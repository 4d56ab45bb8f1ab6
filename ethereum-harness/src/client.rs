// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes, TxHash, U256},
    rpc::types::eth::TransactionRequest,
};
use async_trait::async_trait;
use tracing::debug;

use crate::common::EthereumServiceError;

/// The confirmation record of a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub gas_used: u64,
    /// The address of the created contract, for deployments.
    pub contract_address: Option<Address>,
    /// Whether the execution succeeded.
    pub status: bool,
}

/// The node primitives used by accounts and contracts.
#[async_trait]
pub trait EthereumTransport: Send + Sync {
    /// Lists the accounts whose keys are held by the node.
    async fn get_accounts(&self) -> Result<Vec<Address>, EthereumServiceError>;

    async fn get_balance(&self, address: Address) -> Result<U256, EthereumServiceError>;

    /// Returns the next nonce of `address`, counting pending transactions.
    async fn get_transaction_count(&self, address: Address) -> Result<u64, EthereumServiceError>;

    async fn get_gas_price(&self) -> Result<u128, EthereumServiceError>;

    async fn get_chain_id(&self) -> Result<u64, EthereumServiceError>;

    /// Executes `request` against the latest block without creating a transaction.
    async fn call(&self, request: &TransactionRequest) -> Result<Bytes, EthereumServiceError>;

    async fn estimate_gas(&self, request: &TransactionRequest)
        -> Result<u64, EthereumServiceError>;

    /// Submits a transaction to be signed by the node.
    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TxHash, EthereumServiceError>;

    /// Submits an already signed, EIP-2718 encoded transaction.
    async fn send_raw_transaction(&self, encoded: &[u8]) -> Result<TxHash, EthereumServiceError>;

    async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<Receipt>, EthereumServiceError>;

    /// Waits until the receipt of `hash` is available, for at most `timeout`.
    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Receipt, EthereumServiceError> {
        poll_for_receipt(self, hash, poll_interval, timeout).await
    }
}

/// Polls the node until the receipt of `hash` is available.
pub async fn poll_for_receipt<T: EthereumTransport + ?Sized>(
    transport: &T,
    hash: TxHash,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<Receipt, EthereumServiceError> {
    let start = tokio::time::Instant::now();
    loop {
        if let Some(receipt) = transport.get_transaction_receipt(hash).await? {
            debug!(%hash, gas_used = receipt.gas_used, "transaction confirmed");
            return Ok(receipt);
        }
        if start.elapsed() >= timeout {
            return Err(EthereumServiceError::ReceiptTimeout(hash));
        }
        tokio::time::sleep(poll_interval).await;
    }
}
