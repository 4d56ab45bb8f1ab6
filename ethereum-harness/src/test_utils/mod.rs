// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! An in-memory node with contracts implemented in Rust, for tests.

use std::{
    borrow::Cow,
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy::{
    consensus::{transaction::SignerRecoverable as _, Transaction as _, TxEnvelope},
    dyn_abi::{DynSolValue, FunctionExt as _, JsonAbiExt as _},
    eips::eip2718::Decodable2718 as _,
    json_abi::JsonAbi,
    primitives::{keccak256, Address, Bytes, TxHash, TxKind, B256, U256},
    rpc::{json_rpc::ErrorPayload, types::eth::TransactionRequest},
    transports::{RpcError, TransportErrorKind},
};
use async_trait::async_trait;

use crate::{
    artifact::ArtifactRegistry,
    client::{EthereumTransport, Receipt},
    common::EthereumServiceError,
    config::NetworkOptions,
    network::Network,
};

pub const CHAIN_ID: u64 = 1337;

/// One gwei.
pub const GAS_PRICE: u128 = 1_000_000_000;

/// 100 ether, the balance of every account held by the node.
pub const INITIAL_BALANCE: u128 = 100_000_000_000_000_000_000;

/// The first development key of Anvil and Hardhat.
pub const TEST_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// The address of [`TEST_PRIVATE_KEY`].
pub const TEST_KEY_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

/// The JSON-RPC error code of a reverted execution.
pub const REVERT_CODE: i64 = 3;

/// A contract run by the [`MockNode`].
pub trait MockContract: Send + Sync {
    /// Executes a call with the given calldata and returns the ABI encoded output,
    /// or the revert reason.
    fn handle(&mut self, sender: Address, value: U256, input: &[u8]) -> Result<Vec<u8>, String>;

    fn box_clone(&self) -> Box<dyn MockContract>;
}

/// Creates a contract from its deployer and ABI encoded constructor arguments.
pub type Blueprint =
    Arc<dyn Fn(Address, &[u8]) -> Result<Box<dyn MockContract>, String> + Send + Sync>;

/// A transaction accepted by the [`MockNode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub value: U256,
    pub gas_price: Option<u128>,
    pub gas: Option<u64>,
    /// Whether the transaction arrived signed, rather than to be signed by the node.
    pub signed_locally: bool,
}

#[derive(Default)]
struct NodeState {
    accounts: Vec<Address>,
    balances: BTreeMap<Address, U256>,
    nonces: BTreeMap<Address, u64>,
    blueprints: Vec<(Bytes, Blueprint)>,
    contracts: BTreeMap<Address, Box<dyn MockContract>>,
    /// Receipts with the number of polls left before they show up.
    receipts: BTreeMap<TxHash, (Receipt, usize)>,
    submissions: Vec<Submission>,
    receipt_polls: usize,
    estimates: usize,
    receipt_delay: usize,
    fail_submissions: bool,
    withhold_receipts: bool,
}

/// An in-memory node. Transactions are mined as soon as they are accepted. Gas is
/// reported but never charged.
#[derive(Default)]
pub struct MockNode {
    state: Mutex<NodeState>,
}

fn rejected(code: i64, message: impl Into<String>) -> EthereumServiceError {
    RpcError::<TransportErrorKind>::ErrorResp(ErrorPayload {
        code,
        message: Cow::Owned(message.into()),
        data: None,
    })
    .into()
}

fn reverted(reason: String) -> EthereumServiceError {
    rejected(REVERT_CODE, format!("execution reverted: {reason}"))
}

fn gas_for(kind: TxKind, input: &[u8]) -> u64 {
    let creation = if kind.is_create() { 32_000 } else { 0 };
    21_000 + creation + 16 * input.len() as u64
}

fn request_input(request: &TransactionRequest) -> Bytes {
    request.input.input().cloned().unwrap_or_default()
}

impl NodeState {
    fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn nonce(&self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }

    fn instantiate(&self, deployer: Address, code: &[u8]) -> Result<Box<dyn MockContract>, String> {
        let (bytecode, blueprint) = self
            .blueprints
            .iter()
            .filter(|(bytecode, _)| code.starts_with(bytecode))
            .max_by_key(|(bytecode, _)| bytecode.len())
            .ok_or_else(|| "unknown bytecode".to_string())?;
        blueprint(deployer, &code[bytecode.len()..])
    }

    fn check_funds(&self, from: Address, value: U256) -> Result<(), EthereumServiceError> {
        if self.balance(from) < value {
            return Err(rejected(-32000, "insufficient funds for transfer"));
        }
        Ok(())
    }

    /// Runs a transaction without keeping its effects and returns its gas.
    fn dry_run(
        &self,
        from: Address,
        kind: TxKind,
        value: U256,
        input: &[u8],
    ) -> Result<u64, EthereumServiceError> {
        self.check_funds(from, value)?;
        match kind {
            TxKind::Create => {
                self.instantiate(from, input).map_err(reverted)?;
            }
            TxKind::Call(to) => {
                if let Some(contract) = self.contracts.get(&to) {
                    contract
                        .box_clone()
                        .handle(from, value, input)
                        .map_err(reverted)?;
                }
            }
        }
        Ok(gas_for(kind, input))
    }

    fn transfer_value(&mut self, from: Address, to: Address, value: U256) {
        let balance = self.balance(from);
        self.balances.insert(from, balance - value);
        let balance = self.balance(to);
        self.balances.insert(to, balance + value);
    }

    fn mine(&mut self, submission: Submission, kind: TxKind, input: &[u8]) -> TxHash {
        let Submission {
            hash,
            from,
            nonce,
            value,
            ..
        } = submission;
        self.nonces.insert(from, nonce + 1);
        self.submissions.push(submission);
        let (status, recipient, contract_address) = match kind {
            TxKind::Create => match self.instantiate(from, input) {
                Ok(contract) => {
                    let address = from.create(nonce);
                    self.contracts.insert(address, contract);
                    (true, Some(address), Some(address))
                }
                Err(_) => (false, None, None),
            },
            TxKind::Call(to) => match self.contracts.get(&to) {
                Some(contract) => {
                    let mut next = contract.box_clone();
                    match next.handle(from, value, input) {
                        Ok(_) => {
                            self.contracts.insert(to, next);
                            (true, Some(to), None)
                        }
                        Err(_) => (false, None, None),
                    }
                }
                None => (true, Some(to), None),
            },
        };
        if let Some(recipient) = recipient {
            self.transfer_value(from, recipient, value);
        }
        let receipt = Receipt {
            transaction_hash: hash,
            gas_used: gas_for(kind, input),
            contract_address,
            status,
        };
        let delay = self.receipt_delay;
        self.receipts.insert(hash, (receipt, delay));
        hash
    }
}

impl MockNode {
    /// Creates a node holding the keys of `accounts` funded accounts.
    pub fn new(accounts: usize) -> Self {
        let node = Self::default();
        {
            let mut state = node.state.lock().unwrap();
            for i in 0..accounts {
                let address = Address::with_last_byte(0x10 + i as u8);
                state.accounts.push(address);
                state.balances.insert(address, U256::from(INITIAL_BALANCE));
            }
        }
        node
    }

    pub fn register_blueprint(&self, bytecode: Bytes, blueprint: Blueprint) {
        self.state.lock().unwrap().blueprints.push((bytecode, blueprint));
    }

    pub fn fund(&self, address: Address, amount: U256) {
        let mut state = self.state.lock().unwrap();
        let balance = state.balance(address);
        state.balances.insert(address, balance + amount);
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.state.lock().unwrap().balance(address)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn receipt_polls(&self) -> usize {
        self.state.lock().unwrap().receipt_polls
    }

    pub fn estimates(&self) -> usize {
        self.state.lock().unwrap().estimates
    }

    pub fn has_contract(&self, address: Address) -> bool {
        self.state.lock().unwrap().contracts.contains_key(&address)
    }

    /// Makes receipts show up only after `polls` unsuccessful polls.
    pub fn set_receipt_delay(&self, polls: usize) {
        self.state.lock().unwrap().receipt_delay = polls;
    }

    /// Makes every submission fail with a transport error.
    pub fn fail_submissions(&self, fail: bool) {
        self.state.lock().unwrap().fail_submissions = fail;
    }

    /// Makes receipts never show up.
    pub fn withhold_receipts(&self, withhold: bool) {
        self.state.lock().unwrap().withhold_receipts = withhold;
    }
}

#[async_trait]
impl EthereumTransport for MockNode {
    async fn get_accounts(&self) -> Result<Vec<Address>, EthereumServiceError> {
        Ok(self.state.lock().unwrap().accounts.clone())
    }

    async fn get_balance(&self, address: Address) -> Result<U256, EthereumServiceError> {
        Ok(self.state.lock().unwrap().balance(address))
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64, EthereumServiceError> {
        Ok(self.state.lock().unwrap().nonce(address))
    }

    async fn get_gas_price(&self) -> Result<u128, EthereumServiceError> {
        Ok(GAS_PRICE)
    }

    async fn get_chain_id(&self) -> Result<u64, EthereumServiceError> {
        Ok(CHAIN_ID)
    }

    async fn call(&self, request: &TransactionRequest) -> Result<Bytes, EthereumServiceError> {
        let Some(TxKind::Call(to)) = request.to else {
            return Err(rejected(-32602, "call without a target"));
        };
        let from = request.from.unwrap_or_default();
        let value = request.value.unwrap_or_default();
        let state = self.state.lock().unwrap();
        match state.contracts.get(&to) {
            Some(contract) => contract
                .box_clone()
                .handle(from, value, &request_input(request))
                .map(Bytes::from)
                .map_err(reverted),
            None => Ok(Bytes::new()),
        }
    }

    async fn estimate_gas(
        &self,
        request: &TransactionRequest,
    ) -> Result<u64, EthereumServiceError> {
        let mut state = self.state.lock().unwrap();
        state.estimates += 1;
        let from = request.from.unwrap_or_default();
        let kind = request.to.unwrap_or(TxKind::Create);
        let value = request.value.unwrap_or_default();
        state.dry_run(from, kind, value, &request_input(request))
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TxHash, EthereumServiceError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_submissions {
            return Err(EthereumServiceError::from(RpcError::Transport(
                TransportErrorKind::BackendGone,
            )));
        }
        let from = request
            .from
            .ok_or_else(|| rejected(-32602, "missing sender"))?;
        if !state.accounts.contains(&from) {
            return Err(rejected(-32000, format!("unknown account {from}")));
        }
        let kind = request.to.unwrap_or(TxKind::Create);
        let value = request.value.unwrap_or_default();
        let input = request_input(&request);
        state.check_funds(from, value)?;
        if request.gas.is_none() {
            state.dry_run(from, kind, value, &input)?;
        }
        let nonce = state.nonce(from);
        let mut preimage = from.to_vec();
        preimage.extend(nonce.to_be_bytes());
        let submission = Submission {
            hash: keccak256(&preimage),
            from,
            to: kind.to().copied(),
            nonce,
            value,
            gas_price: request.gas_price,
            gas: request.gas,
            signed_locally: false,
        };
        Ok(state.mine(submission, kind, &input))
    }

    async fn send_raw_transaction(&self, encoded: &[u8]) -> Result<TxHash, EthereumServiceError> {
        let envelope = TxEnvelope::decode_2718(&mut &encoded[..])
            .map_err(|error| rejected(-32602, format!("invalid transaction: {error}")))?;
        let from = envelope
            .recover_signer()
            .map_err(|error| rejected(-32602, format!("invalid signature: {error}")))?;
        if envelope.chain_id() != Some(CHAIN_ID) {
            return Err(rejected(-32000, "invalid chain id"));
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_submissions {
            return Err(EthereumServiceError::from(RpcError::Transport(
                TransportErrorKind::BackendGone,
            )));
        }
        let expected = state.nonce(from);
        if envelope.nonce() != expected {
            return Err(rejected(
                -32000,
                format!("invalid nonce {}, expected {expected}", envelope.nonce()),
            ));
        }
        state.check_funds(from, envelope.value())?;
        let kind = envelope.kind();
        let submission = Submission {
            hash: *envelope.tx_hash(),
            from,
            to: kind.to().copied(),
            nonce: envelope.nonce(),
            value: envelope.value(),
            gas_price: envelope.gas_price(),
            gas: Some(envelope.gas_limit()),
            signed_locally: true,
        };
        Ok(state.mine(submission, kind, envelope.input()))
    }

    async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<Receipt>, EthereumServiceError> {
        let mut state = self.state.lock().unwrap();
        state.receipt_polls += 1;
        if state.withhold_receipts {
            return Ok(None);
        }
        match state.receipts.get_mut(&hash) {
            Some((_, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Ok(None)
            }
            Some((receipt, _)) => Ok(Some(receipt.clone())),
            None => Ok(None),
        }
    }
}

/// The interface of [`TokenContract`].
pub const TOKEN_SIGNATURES: &[&str] = &[
    "constructor(uint256 initialSupply)",
    "function balanceOf(address owner) view returns (uint256)",
    "function transfer(address to, uint256 amount) returns (bool)",
    "function transfer(address to, uint256 amount, bytes memo) returns (bool)",
    "function name() pure returns (string)",
    "function digest() view returns (bytes32)",
    "function blob() view returns (bytes)",
    "function history() view returns (bytes32[])",
    "function supply() view returns (uint256 total, address owner)",
    "function ping() view",
    "function deposit() payable",
    "function touch()",
    "event Transfer(address indexed from, address indexed to, uint256 amount)",
    "error InsufficientBalance(uint256 available, uint256 required)",
];

/// A minimal token: the deployer receives the initial supply.
#[derive(Clone)]
pub struct TokenContract {
    abi: Arc<JsonAbi>,
    owner: Address,
    supply: U256,
    balances: BTreeMap<Address, U256>,
    history: Vec<B256>,
    deposits: U256,
}

impl TokenContract {
    pub const NAME: &'static str = "Token";

    pub fn abi() -> JsonAbi {
        JsonAbi::parse(TOKEN_SIGNATURES.iter().copied()).unwrap()
    }

    /// Stand-in creation code, recognized by the [`MockNode`].
    pub fn bytecode() -> Bytes {
        Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52, 0x70, 0x6b])
    }

    /// The compiler output entry of the token.
    pub fn artifact_entry() -> (String, JsonAbi, Bytes) {
        (
            format!("contracts/{0}.sol:{0}", Self::NAME),
            Self::abi(),
            Self::bytecode(),
        )
    }

    pub fn blueprint() -> Blueprint {
        Arc::new(|deployer: Address, args: &[u8]| {
            let abi = Self::abi();
            let constructor = abi.constructor.as_ref().ok_or("no constructor")?;
            let values = constructor
                .abi_decode_input(args)
                .map_err(|error| error.to_string())?;
            let Some(DynSolValue::Uint(supply, _)) = values.first() else {
                return Err("invalid initial supply".to_string());
            };
            Ok(Box::new(TokenContract::new(abi, deployer, *supply)) as Box<dyn MockContract>)
        })
    }

    fn new(abi: JsonAbi, owner: Address, supply: U256) -> Self {
        Self {
            abi: Arc::new(abi),
            owner,
            supply,
            balances: BTreeMap::from([(owner, supply)]),
            history: Vec::new(),
            deposits: U256::ZERO,
        }
    }

    fn balance_of(&self, owner: Address) -> U256 {
        self.balances.get(&owner).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), String> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(format!("InsufficientBalance({available}, {amount})"));
        }
        self.balances.insert(from, available - amount);
        let balance = self.balance_of(to);
        self.balances.insert(to, balance + amount);
        let mut record = from.to_vec();
        record.extend(to.as_slice());
        record.extend(amount.to_be_bytes::<32>());
        self.history.push(keccak256(&record));
        Ok(())
    }
}

impl MockContract for TokenContract {
    fn handle(&mut self, sender: Address, value: U256, input: &[u8]) -> Result<Vec<u8>, String> {
        if input.len() < 4 {
            return Err("missing selector".to_string());
        }
        let abi = self.abi.clone();
        let function = abi
            .functions()
            .find(|function| function.selector().as_slice() == &input[..4])
            .ok_or("unknown selector")?;
        let args = function
            .abi_decode_input(&input[4..])
            .map_err(|error| error.to_string())?;
        let outputs = match (function.name.as_str(), args.as_slice()) {
            ("balanceOf", [DynSolValue::Address(owner)]) => {
                vec![DynSolValue::Uint(self.balance_of(*owner), 256)]
            }
            ("transfer", [DynSolValue::Address(to), DynSolValue::Uint(amount, _), ..]) => {
                self.transfer(sender, *to, *amount)?;
                vec![DynSolValue::Bool(true)]
            }
            ("name", []) => vec![DynSolValue::String(TokenContract::NAME.to_string())],
            ("digest", []) => vec![DynSolValue::FixedBytes(
                keccak256(TokenContract::NAME.as_bytes()),
                32,
            )],
            ("blob", []) => vec![DynSolValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef])],
            ("history", []) => vec![DynSolValue::Array(
                self.history
                    .iter()
                    .map(|hash| DynSolValue::FixedBytes(*hash, 32))
                    .collect(),
            )],
            ("supply", []) => vec![
                DynSolValue::Uint(self.supply, 256),
                DynSolValue::Address(self.owner),
            ],
            ("deposit", []) => {
                if value.is_zero() {
                    return Err("nothing to deposit".to_string());
                }
                self.deposits += value;
                vec![]
            }
            ("ping", []) | ("touch", []) => vec![],
            (name, _) => return Err(format!("unexpected call to {name}")),
        };
        function
            .abi_encode_output(&outputs)
            .map_err(|error| error.to_string())
    }

    fn box_clone(&self) -> Box<dyn MockContract> {
        Box::new(self.clone())
    }
}

/// Fast polling and a short timeout.
pub fn test_options() -> NetworkOptions {
    NetworkOptions {
        report_gas: false,
        poll_interval: Duration::from_millis(1),
        receipt_timeout: Duration::from_millis(200),
    }
}

/// A registry holding only the [`TokenContract`].
pub fn token_registry() -> ArtifactRegistry {
    ArtifactRegistry::new([TokenContract::artifact_entry()])
}

/// A [`MockNode`] knowing the token, and a network on top of it.
pub async fn mock_network(accounts: usize) -> (Arc<MockNode>, Network) {
    mock_network_with_options(accounts, test_options()).await
}

pub async fn mock_network_with_options(
    accounts: usize,
    options: NetworkOptions,
) -> (Arc<MockNode>, Network) {
    let node = Arc::new(MockNode::new(accounts));
    node.register_blueprint(TokenContract::bytecode(), TokenContract::blueprint());
    let network = Network::new(node.clone(), token_registry(), options)
        .await
        .unwrap();
    (node, network)
}
