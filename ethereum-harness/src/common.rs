// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, Specifier as _},
    json_abi::Param,
    network::{Ethereum, TransactionBuilderError},
    primitives::{hex, TxHash, U256},
    transports::{RpcError, TransportErrorKind},
};
use serde_json::Value;
use thiserror::Error;

#[cfg(test)]
#[path = "unit_tests/common_tests.rs"]
mod common_tests;

#[derive(Debug, Error)]
pub enum EthereumServiceError {
    /// The requested network is not part of the configuration
    #[error("network '{0}' is not defined in the configuration")]
    UnknownNetwork(String),

    /// No Solidity sources were found
    #[error("cannot find any .sol files in {0}")]
    NoSourceFiles(PathBuf),

    /// The compiler ran but its output could not be used
    #[error("compiler failed: {0}")]
    CompilerFailed(String),

    #[error("contract artifact '{0}' not found")]
    ArtifactNotFound(String),

    #[error("contract '{contract}' has no member '{member}'")]
    MemberNotFound { contract: String, member: String },

    /// The `from` option names an account that is not known to the network
    #[error("no signer available for account {0}")]
    UnknownSender(String),

    /// The binding has no owner and no `from` option was given
    #[error("no account to send '{0}' from")]
    MissingSender(String),

    #[error("{0} is not a valid function")]
    NotAFunction(String),

    #[error("'{0}' is not a {1} function")]
    WrongMutability(String, &'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The node refused the request, e.g. because the execution reverted
    #[error("rejected by the node ({code}): {message}")]
    Rejected { code: i64, message: String },

    /// The transaction was mined but its execution failed
    #[error("transaction {hash} reverted")]
    Reverted { hash: TxHash },

    #[error("no free deployment name left for '{0}'")]
    NoFreeDeploymentName(String),

    #[error("no receipt for transaction {0} before the timeout")]
    ReceiptTimeout(TxHash),

    #[error("deployment transaction {0} did not create a contract")]
    MissingContractAddress(TxHash),

    /// ABI encoding or decoding error
    #[error(transparent)]
    AbiError(#[from] alloy::dyn_abi::Error),

    /// Transaction building or signing error
    #[error(transparent)]
    TransactionBuilderError(#[from] TransactionBuilderError<Ethereum>),

    /// Private key parsing error
    #[error(transparent)]
    LocalSignerError(#[from] alloy::signers::local::LocalSignerError),

    /// Hex parsing error
    #[error(transparent)]
    FromHexError(#[from] hex::FromHexError),

    /// `serde_json` error
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    /// RPC error
    #[error(transparent)]
    RpcError(RpcError<TransportErrorKind>),

    /// Failure while watching a pending transaction
    #[error(transparent)]
    PendingTransactionError(alloy::providers::PendingTransactionError),

    /// URL parsing error
    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl EthereumServiceError {
    /// Whether the error means the operation would fail on chain, as opposed to
    /// a transport or programming error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Reverted { .. })
    }
}

impl From<RpcError<TransportErrorKind>> for EthereumServiceError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        match error {
            RpcError::ErrorResp(payload) => Self::Rejected {
                code: payload.code,
                message: payload.message.into_owned(),
            },
            error => Self::RpcError(error),
        }
    }
}

/// Converts a JSON argument into a Solidity value of type `ty`.
pub fn json_to_sol_value(
    ty: &DynSolType,
    value: &Value,
) -> Result<DynSolValue, EthereumServiceError> {
    match (ty, value) {
        (DynSolType::Bool, Value::Bool(b)) => Ok(DynSolValue::Bool(*b)),
        (_, Value::String(s)) => Ok(ty.coerce_str(s)?),
        (_, Value::Number(n)) => Ok(ty.coerce_str(&n.to_string())?),
        (DynSolType::Array(inner), Value::Array(items)) => items
            .iter()
            .map(|item| json_to_sol_value(inner, item))
            .collect::<Result<_, _>>()
            .map(DynSolValue::Array),
        (DynSolType::FixedArray(inner, len), Value::Array(items)) => {
            if items.len() != *len {
                return Err(EthereumServiceError::InvalidArgument(format!(
                    "expected {len} elements for {ty}, got {}",
                    items.len()
                )));
            }
            items
                .iter()
                .map(|item| json_to_sol_value(inner, item))
                .collect::<Result<_, _>>()
                .map(DynSolValue::FixedArray)
        }
        (DynSolType::Tuple(types), Value::Array(items)) => {
            if items.len() != types.len() {
                return Err(EthereumServiceError::InvalidArgument(format!(
                    "expected {} tuple fields for {ty}, got {}",
                    types.len(),
                    items.len()
                )));
            }
            types
                .iter()
                .zip(items)
                .map(|(ty, item)| json_to_sol_value(ty, item))
                .collect::<Result<_, _>>()
                .map(DynSolValue::Tuple)
        }
        _ => Err(EthereumServiceError::InvalidArgument(format!(
            "cannot convert {value} into {ty}"
        ))),
    }
}

/// Converts the JSON arguments of a call according to the declared parameters.
pub fn json_to_sol_values(
    params: &[Param],
    args: &[Value],
) -> Result<Vec<DynSolValue>, EthereumServiceError> {
    if params.len() != args.len() {
        return Err(EthereumServiceError::InvalidArgument(format!(
            "expected {} arguments, got {}",
            params.len(),
            args.len()
        )));
    }
    params
        .iter()
        .zip(args)
        .map(|(param, arg)| json_to_sol_value(&param.resolve()?, arg))
        .collect()
}

/// Converts a decoded Solidity value into JSON. Byte strings become `0x`-prefixed
/// hex strings, at any depth.
pub fn sol_value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Uint(n, _) => {
            if *n <= U256::from(u64::MAX) {
                Value::from(n.to::<u64>())
            } else {
                Value::String(n.to_string())
            }
        }
        DynSolValue::Int(n, _) => {
            let text = n.to_string();
            match text.parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(text),
            }
        }
        DynSolValue::Address(address) => Value::String(address.to_checksum(None)),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(sol_value_to_json).collect())
        }
        DynSolValue::Bytes(bytes) => Value::String(hex::encode_prefixed(bytes)),
        DynSolValue::FixedBytes(word, size) => Value::String(hex::encode_prefixed(&word[..*size])),
        DynSolValue::Function(function) => Value::String(hex::encode_prefixed(function.as_slice())),
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}

/// Parses an amount of wei. Floating-point numbers are truncated toward zero:
/// fractional amounts are not supported.
pub fn parse_amount(value: &Value) -> Result<U256, EthereumServiceError> {
    let invalid = || EthereumServiceError::InvalidArgument(format!("invalid amount {value}"));
    match value {
        Value::Number(n) => {
            if let Some(n) = n.as_u64() {
                Ok(U256::from(n))
            } else if let Some(f) = n.as_f64() {
                if !f.is_finite() || f < 0.0 {
                    return Err(invalid());
                }
                // Formatting an integral float with no decimals prints every digit.
                format!("{:.0}", f.trunc())
                    .parse::<U256>()
                    .map_err(|_| invalid())
            } else {
                Err(invalid())
            }
        }
        Value::String(s) => s.parse::<U256>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Shortcut for `0x`-prefixed lowercase hex.
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode_prefixed(bytes)
}
