// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tracing subscriber setup for the harness binary.

use tracing_subscriber::{fmt, layer::SubscriberExt as _, util::SubscriberInitExt};

/// Initializes tracing in a standard way.
///
/// The environment variable `RUST_LOG` can be used to control the verbosity.
/// Everything is written to stderr so that stdout stays available to callers.
pub fn init(log_name: &str) {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy();

    let color_output = !std::env::var("NO_COLOR").is_ok_and(|x| !x.is_empty());

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(color_output);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
    tracing::debug!("Tracing initialized for {log_name}");
}
