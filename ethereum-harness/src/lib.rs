// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! This module provides a development harness driving an Ethereum node through
//! accounts and contract bindings built from compiled Solidity sources.

pub mod artifact;
pub mod client;
pub mod command;
pub mod common;
pub mod compiler;
pub mod config;
pub mod contract;
pub mod network;
pub mod node;
pub mod provider;
pub mod signer;
pub mod tracing;

/// Helper types for tests.
#[cfg(with_testing)]
pub mod test_utils;

pub use crate::{
    common::EthereumServiceError,
    contract::{ContractBinding, Invocation, Outcome, TxOptions},
    network::Network,
    signer::Signer,
};
