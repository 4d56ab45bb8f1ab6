// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{process::Stdio, time::Duration};

use anyhow::{bail, Context, Result};
use tokio::process::{Child, Command};
use tracing::info;

use crate::{
    client::EthereumTransport as _, command::CommandExt, provider::EthereumClient,
};

/// A local test node, started from the `test-rpc` command line of a network.
pub struct TestNode {
    command_line: String,
    host: String,
}

/// A test node running as a child process.
///
/// The guard preserves the child from destruction and destroys it when
/// it drops out of scope.
pub struct TestNodeGuard {
    _child: Child,
}

impl TestNode {
    pub fn new(command_line: &str, host: &str) -> Self {
        Self {
            command_line: command_line.to_string(),
            host: host.to_string(),
        }
    }

    fn command(&self) -> Result<Command> {
        let mut words = self.command_line.split_whitespace();
        let program = words
            .next()
            .with_context(|| format!("empty test node command for {}", self.host))?;
        let mut command = Command::new(program);
        command
            .args(words)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);
        Ok(command)
    }

    /// Starts the node and waits until it answers on its host.
    pub async fn run(&self) -> Result<TestNodeGuard> {
        let mut command = self.command()?;
        let _child = command.spawn_into()?;
        let guard = TestNodeGuard { _child };
        let client = EthereumClient::new(self.host.clone())?;
        for i in 1..10 {
            if let Ok(chain_id) = client.get_chain_id().await {
                info!("Test node ready at {} (chain id {chain_id})", self.host);
                return Ok(guard);
            }
            tokio::time::sleep(Duration::from_millis(250 * i)).await;
        }
        bail!("Failed to start the test node `{}`", self.command_line);
    }
}
