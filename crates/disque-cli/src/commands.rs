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

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use disque_client::Client;
use disque_mock::{MockCluster, MockOptions};
use serde_json::Value;
use tracing::info;

use crate::args::{Cli, Commands, MockArgs};

/// Runs the parsed command line and prints its result to stdout.
///
/// Every subcommand except `mock` connects a [`Client`], runs through
/// [`execute`] and quits the client again, even when the command failed.
pub async fn run(cli: Cli) -> Result<()> {
    if let Commands::Mock(args) = &cli.command {
        return run_mock(args).await;
    }

    let config = cli.client_config();
    let nodes = config.nodes.join(",");
    let client = Client::connect(config)
        .await
        .map_err(|e| anyhow!("Failed to connect to {}: {}", nodes, e))?;

    let result = execute(&client, &cli.command).await;
    client.quit().await;

    // Raw JSON on a single line
    println!("{}", result?);
    Ok(())
}

/// Executes one subcommand against a connected client and returns its
/// output as JSON.
///
/// # Errors
///
/// Returns an error if the command fails, or for `mock`, which does not run
/// against a client.
pub async fn execute(client: &Client, command: &Commands) -> Result<Value> {
    let value = match command {
        Commands::Ping(_) => Value::String(client.ping().await?),
        Commands::Info(args) => {
            let fields: BTreeMap<_, _> = client.info().await?.into_iter().collect();
            match &args.field {
                Some(field) => match fields.get(field) {
                    Some(value) => Value::String(value.clone()),
                    None => bail!("No INFO field named '{}'", field),
                },
                None => serde_json::to_value(fields)?,
            }
        }
        Commands::Call(call) => {
            let args: Vec<&str> = call.args.iter().map(String::as_str).collect();
            client.call(&call.name, &args).await?.to_json()
        }
        Commands::AddJob(args) => {
            let id = client
                .addjob(&args.queue, args.body.as_str(), args.wait_ms, &args.options())
                .await?;
            Value::String(id)
        }
        Commands::GetJob(args) => {
            if args.queues.is_empty() {
                bail!("getjob needs at least one queue");
            }
            let jobs = client.getjob(&args.queues[..], &args.options()).await?;
            serde_json::to_value(jobs)?
        }
        Commands::AckJob(args) => {
            if args.ids.is_empty() {
                bail!("ackjob needs at least one job id");
            }
            let count = if args.fast {
                client.fastack(&args.ids[..]).await?
            } else {
                client.ackjob(&args.ids[..]).await?
            };
            Value::from(count)
        }
        Commands::Hello(_) => serde_json::to_value(client.hello().await?)?,
        Commands::Mock(_) => bail!("mock runs its own cluster and takes no client"),
    };
    Ok(value)
}

/// Runs the `mock` subcommand until Ctrl-C.
async fn run_mock(args: &MockArgs) -> Result<()> {
    let mut options = MockOptions::default().with_nodes(args.count);
    options.host = args.host.clone();
    if let Some(port) = args.base_port {
        options = options.with_base_port(port);
    }
    if let Some(secret) = &args.auth {
        info!("AUTH required on every mock node");
        options = options.with_auth(secret.clone());
    }

    let cluster = MockCluster::start(options).await?;
    let nodes = cluster.addresses().join(",");
    info!(nodes = %nodes, "Mock cluster listening");
    println!("{}", nodes);

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = cluster.stopped() => {}
    }

    cluster.shutdown();
    info!("Mock cluster stopped");
    Ok(())
}
