// Copyright 2025 Disque Client Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Disque CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Check the cluster answers
//! disque -n 127.0.0.1:7711,127.0.0.1:7712 ping
//!
//! # Produce, consume and acknowledge
//! disque addjob emails hello --retry 60
//! disque getjob emails --count 1
//! disque ackjob D-dcb833cf-8YL1NT17e9+wsA/09NqxscQI-05a1
//!
//! # Raw command, raw JSON reply (pipe to jq)
//! disque call QLEN emails
//!
//! # Run a local mock cluster
//! disque mock --count 3 --base-port 7711
//! ```

use anyhow::Result;
use disque_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call keeps its output clean for piping into other tools
    if !matches!(cli.command, Commands::Call(_)) {
        // Default to INFO, RUST_LOG overrides
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    disque_cli::run(cli).await
}
