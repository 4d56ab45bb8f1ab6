// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Compiled contracts and the index of their callable functions.

use std::{collections::BTreeMap, sync::Arc};

use alloy::{
    json_abi::{Function, JsonAbi, StateMutability},
    primitives::Bytes,
};
use tracing::warn;

use crate::common::EthereumServiceError;

#[cfg(test)]
#[path = "unit_tests/artifact_tests.rs"]
mod artifact_tests;

/// The compiled output of one contract definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub abi: JsonAbi,
    /// The creation bytecode.
    pub bytecode: Bytes,
}

/// Returns the simple name of a compiler output key such as `contracts/Token.sol:Token`.
pub fn simple_name(key: &str) -> &str {
    key.rsplit([':', '/']).next().unwrap_or(key)
}

/// All the artifacts of one compilation run, in compiler output order.
#[derive(Clone, Debug, Default)]
pub struct ArtifactRegistry {
    artifacts: Vec<(String, Arc<Artifact>)>,
}

impl ArtifactRegistry {
    pub fn new(entries: impl IntoIterator<Item = (String, JsonAbi, Bytes)>) -> Self {
        let artifacts = entries
            .into_iter()
            .map(|(key, abi, bytecode)| {
                let artifact = Artifact {
                    name: simple_name(&key).to_string(),
                    abi,
                    bytecode,
                };
                (key, Arc::new(artifact))
            })
            .collect();
        Self { artifacts }
    }

    /// Finds the artifact called `name`. If several compiler keys share that simple
    /// name, the first one in compiler output order is used.
    pub fn resolve(&self, name: &str) -> Result<Arc<Artifact>, EthereumServiceError> {
        let mut matches = self
            .artifacts
            .iter()
            .filter(|(key, _)| simple_name(key) == name);
        let (key, artifact) = matches
            .next()
            .ok_or_else(|| EthereumServiceError::ArtifactNotFound(name.to_string()))?;
        let others = matches.map(|(key, _)| key.as_str()).collect::<Vec<_>>();
        if !others.is_empty() {
            warn!("'{name}' is ambiguous: using {key}, ignoring {others:?}");
        }
        Ok(artifact.clone())
    }

    /// The compiler keys, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.artifacts.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Whether a function can change the chain state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutability {
    /// `view` or `pure`: executed as a call.
    Read,
    /// Everything else: executed as a transaction.
    Write,
}

impl Mutability {
    pub fn of(function: &Function) -> Self {
        match function.state_mutability {
            StateMutability::View | StateMutability::Pure => Mutability::Read,
            _ => Mutability::Write,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mutability::Read => "read",
            Mutability::Write => "write",
        }
    }
}

/// The functions of an ABI by name. Built once per deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceIndex {
    functions: BTreeMap<String, Mutability>,
}

impl InterfaceIndex {
    /// Classifies every function of `abi`. Overloads share a name; the last
    /// declared overload decides the classification.
    pub fn new(abi: &JsonAbi) -> Self {
        let functions = abi
            .functions()
            .map(|function| (function.name.clone(), Mutability::of(function)))
            .collect();
        Self { functions }
    }

    pub fn get(&self, name: &str) -> Option<Mutability> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}
