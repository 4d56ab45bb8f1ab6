// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Dynamic bindings to deployed contracts.

use std::sync::Arc;

use alloy::{
    dyn_abi::{FunctionExt as _, JsonAbiExt as _},
    json_abi::{Constructor, Error, Event, Fallback, Function, Receive},
    network::TransactionBuilder as _,
    primitives::{Address, TxHash, U256},
    rpc::types::eth::TransactionRequest,
};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{
    artifact::{Artifact, InterfaceIndex, Mutability},
    common::{json_to_sol_values, parse_amount, sol_value_to_json, to_hex, EthereumServiceError},
    network::NetworkContext,
    signer::Signer,
};

#[cfg(test)]
#[path = "unit_tests/contract_tests.rs"]
mod contract_tests;

/// Options of a transaction, given as a trailing JSON object such as
/// `{"from": "0x..", "value": 100, "gasPrice": 1, "gas": 50000}`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub from: Option<Address>,
    pub value: Option<U256>,
    pub gas_price: Option<u128>,
    pub gas: Option<u64>,
}

impl TxOptions {
    pub fn from_json(object: &Map<String, Value>) -> Result<Self, EthereumServiceError> {
        let mut options = TxOptions::default();
        for (key, value) in object {
            match key.as_str() {
                "from" => {
                    let address = value.as_str().ok_or_else(|| {
                        EthereumServiceError::InvalidArgument(format!("invalid sender {value}"))
                    })?;
                    options.from = Some(address.parse().map_err(|_| {
                        EthereumServiceError::InvalidArgument(format!("invalid sender {value}"))
                    })?);
                }
                "value" => options.value = Some(parse_amount(value)?),
                "gasPrice" | "gas_price" => {
                    let price = parse_amount(value)?;
                    if price > U256::from(u128::MAX) {
                        return Err(EthereumServiceError::InvalidArgument(format!(
                            "gas price {price} is too large"
                        )));
                    }
                    options.gas_price = Some(price.to::<u128>());
                }
                "gas" => {
                    options.gas = Some(value.as_u64().ok_or_else(|| {
                        EthereumServiceError::InvalidArgument(format!("invalid gas limit {value}"))
                    })?);
                }
                _ => {
                    return Err(EthereumServiceError::InvalidArgument(format!(
                        "unknown transaction option '{key}'"
                    )))
                }
            }
        }
        Ok(options)
    }

    /// Separates a trailing options object from the call arguments.
    pub fn split(mut args: Vec<Value>) -> Result<(Vec<Value>, Self), EthereumServiceError> {
        match args.last() {
            Some(Value::Object(object)) => {
                let options = Self::from_json(object)?;
                args.pop();
                Ok((args, options))
            }
            _ => Ok((args, Self::default())),
        }
    }

    /// Copies the options onto `request`. The sender is set by the signer.
    pub fn apply(&self, mut request: TransactionRequest) -> TransactionRequest {
        if let Some(value) = self.value {
            request.set_value(value);
        }
        if let Some(gas_price) = self.gas_price {
            request.set_gas_price(gas_price);
        }
        if let Some(gas) = self.gas {
            request.set_gas_limit(gas);
        }
        request
    }
}

/// ABI members that are not callable functions, returned as they are.
#[derive(Clone, Debug, PartialEq)]
pub enum RawMember {
    Address(Address),
    Constructor(Constructor),
    Fallback(Fallback),
    Receive(Receive),
    Events(Vec<Event>),
    Errors(Vec<Error>),
}

/// The result of [`ContractBinding::invoke`].
#[derive(Clone, Debug, PartialEq)]
pub enum Invocation {
    /// The decoded output of a read function.
    Value(Value),
    /// The hex hash of the confirmed transaction of a write function.
    Transaction(String),
    Member(RawMember),
}

/// Whether an operation went through, for [`ContractBinding::try_invoke`].
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Success(Invocation),
    /// The node or the chain rejected the operation.
    Reverted(String),
}

/// A deployed contract, seen through its ABI.
#[derive(Clone)]
pub struct ContractBinding {
    address: Address,
    artifact: Arc<Artifact>,
    index: Arc<InterfaceIndex>,
    owner: Option<Arc<Signer>>,
    context: Arc<NetworkContext>,
}

impl std::fmt::Debug for ContractBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractBinding")
            .field("name", &self.artifact.name)
            .field("address", &self.address)
            .field("owner", &self.owner.as_ref().map(|owner| owner.address()))
            .finish()
    }
}

impl ContractBinding {
    pub fn new(
        address: Address,
        artifact: Arc<Artifact>,
        owner: Option<Arc<Signer>>,
        context: Arc<NetworkContext>,
    ) -> Self {
        let index = Arc::new(InterfaceIndex::new(&artifact.abi));
        Self::with_index(address, artifact, index, owner, context)
    }

    pub(crate) fn with_index(
        address: Address,
        artifact: Arc<Artifact>,
        index: Arc<InterfaceIndex>,
        owner: Option<Arc<Signer>>,
        context: Arc<NetworkContext>,
    ) -> Self {
        Self {
            address,
            artifact,
            index,
            owner,
            context,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.artifact.name
    }

    pub fn artifact(&self) -> &Arc<Artifact> {
        &self.artifact
    }

    pub fn index(&self) -> &Arc<InterfaceIndex> {
        &self.index
    }

    pub fn owner(&self) -> Option<&Arc<Signer>> {
        self.owner.as_ref()
    }

    /// Calls the member `name`.
    ///
    /// Read functions are executed as calls and return their decoded outputs:
    /// `null` for none, the value itself for one, a list for several. Binary
    /// values are returned as `0x` hex strings.
    ///
    /// Write functions are sent as transactions from the owner, or from the
    /// account named in a trailing options object, and return the hex hash of
    /// the transaction once it is confirmed.
    ///
    /// Any other ABI member is returned unmodified.
    pub async fn invoke(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Invocation, EthereumServiceError> {
        match self.index.get(name) {
            None => self.raw_member(name).map(Invocation::Member),
            Some(Mutability::Read) => self.read(name, &args).await.map(Invocation::Value),
            Some(Mutability::Write) => {
                let (args, options) = TxOptions::split(args)?;
                let hash = self.write(name, &args, options).await?;
                Ok(Invocation::Transaction(to_hex(hash)))
            }
        }
    }

    /// Calls the read function `name`.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, EthereumServiceError> {
        self.expect(name, Mutability::Read)?;
        self.read(name, &args).await
    }

    /// Sends a transaction to the write function `name`, with options taken from
    /// a trailing JSON object if there is one.
    pub async fn transact(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<TxHash, EthereumServiceError> {
        self.expect(name, Mutability::Write)?;
        let (args, options) = TxOptions::split(args)?;
        self.write(name, &args, options).await
    }

    pub async fn transact_with(
        &self,
        name: &str,
        args: Vec<Value>,
        options: TxOptions,
    ) -> Result<TxHash, EthereumServiceError> {
        self.expect(name, Mutability::Write)?;
        self.write(name, &args, options).await
    }

    /// Like [`Self::invoke`], but a rejection by the node or the chain is
    /// returned as [`Outcome::Reverted`].
    pub async fn try_invoke(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Outcome, EthereumServiceError> {
        match self.invoke(name, args).await {
            Ok(invocation) => Ok(Outcome::Success(invocation)),
            Err(error) if error.is_validation() => {
                debug!("{name} was rejected: {error}");
                Ok(Outcome::Reverted(error.to_string()))
            }
            Err(error) => Err(error),
        }
    }

    /// Returns whether calling the function `name` is rejected.
    pub async fn reverts(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<bool, EthereumServiceError> {
        if !self.index.contains(name) {
            return Err(EthereumServiceError::NotAFunction(name.to_string()));
        }
        match self.try_invoke(name, args).await? {
            Outcome::Success(_) => Ok(false),
            Outcome::Reverted(_) => Ok(true),
        }
    }

    /// Looks up an ABI member that is not a function.
    pub fn raw_member(&self, name: &str) -> Result<RawMember, EthereumServiceError> {
        let abi = &self.artifact.abi;
        let member = match name {
            "address" => Some(RawMember::Address(self.address)),
            "constructor" => abi.constructor.clone().map(RawMember::Constructor),
            "fallback" => abi.fallback.map(RawMember::Fallback),
            "receive" => abi.receive.map(RawMember::Receive),
            _ => abi
                .events
                .get(name)
                .cloned()
                .map(RawMember::Events)
                .or_else(|| abi.errors.get(name).cloned().map(RawMember::Errors)),
        };
        member.ok_or_else(|| EthereumServiceError::MemberNotFound {
            contract: self.artifact.name.clone(),
            member: name.to_string(),
        })
    }

    fn expect(&self, name: &str, mutability: Mutability) -> Result<(), EthereumServiceError> {
        match self.index.get(name) {
            None => Err(self.not_a_function(name)),
            Some(found) if found != mutability => Err(EthereumServiceError::WrongMutability(
                name.to_string(),
                mutability.as_str(),
            )),
            Some(_) => Ok(()),
        }
    }

    /// The error for a name that is not a function: `MemberNotFound` when the ABI
    /// has no such member at all.
    fn not_a_function(&self, name: &str) -> EthereumServiceError {
        match self.raw_member(name) {
            Ok(_) => EthereumServiceError::NotAFunction(name.to_string()),
            Err(error) => error,
        }
    }

    /// Picks the overload of `name` taking `arity` arguments.
    fn function(&self, name: &str, arity: usize) -> Result<&Function, EthereumServiceError> {
        let overloads = self
            .artifact
            .abi
            .function(name)
            .ok_or_else(|| EthereumServiceError::NotAFunction(name.to_string()))?;
        overloads
            .iter()
            .find(|function| function.inputs.len() == arity)
            .ok_or_else(|| {
                EthereumServiceError::InvalidArgument(format!(
                    "{name} does not take {arity} arguments"
                ))
            })
    }

    fn request(
        &self,
        function: &Function,
        args: &[Value],
    ) -> Result<TransactionRequest, EthereumServiceError> {
        let values = json_to_sol_values(&function.inputs, args)?;
        let input = function.abi_encode_input(&values)?;
        Ok(TransactionRequest::default()
            .with_to(self.address)
            .with_input(input))
    }

    async fn read(&self, name: &str, args: &[Value]) -> Result<Value, EthereumServiceError> {
        let function = self.function(name, args.len())?;
        let mut request = self.request(function, args)?;
        if let Some(owner) = &self.owner {
            request.set_from(owner.address());
        }
        let output = self.context.transport.call(&request).await?;
        let mut values = function.abi_decode_output(&output)?;
        Ok(match values.len() {
            0 => Value::Null,
            1 => sol_value_to_json(&values.remove(0)),
            _ => Value::Array(values.iter().map(sol_value_to_json).collect()),
        })
    }

    async fn write(
        &self,
        name: &str,
        args: &[Value],
        options: TxOptions,
    ) -> Result<TxHash, EthereumServiceError> {
        let function = self.function(name, args.len())?;
        let request = self.request(function, args)?;
        let sender = self.sender(name, &options).await?;
        let receipt = sender.execute(request, &options).await?;
        if self.context.options.report_gas {
            info!("{name}: {} gas", receipt.gas_used);
        }
        Ok(receipt.transaction_hash)
    }

    async fn sender(
        &self,
        name: &str,
        options: &TxOptions,
    ) -> Result<Arc<Signer>, EthereumServiceError> {
        match options.from {
            Some(address) => self.context.accounts.find(address).await.ok_or_else(|| {
                EthereumServiceError::UnknownSender(address.to_checksum(None))
            }),
            None => self
                .owner
                .clone()
                .ok_or_else(|| EthereumServiceError::MissingSender(name.to_string())),
        }
    }
}
