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

use std::time::Duration;

use argh::FromArgs;
use disque_client::{AddJobOptions, ClientConfig, GetJobOptions, DEFAULT_CYCLE};
use disque_common::auth::AuthConfig;

/// Environment variable consulted when `--nodes` is absent.
pub const NODES_ENV: &str = "DISQUE_NODES";

/// Environment variable consulted when `--auth` is absent.
pub const AUTH_ENV: &str = "DISQUE_AUTH";

/// Seed used when neither `--nodes` nor `DISQUE_NODES` is set.
pub const DEFAULT_NODE: &str = "127.0.0.1:7711";

/// Main CLI structure parsed from command-line arguments.
///
/// Connection options apply to every subcommand except `mock` and must come
/// before the subcommand name:
///
/// ```bash
/// disque -n 127.0.0.1:7711,127.0.0.1:7712 --auth foobar ping
/// ```
#[derive(FromArgs, Debug)]
/// Disque - command-line client for a Disque cluster
pub struct Cli {
    /// seed node address (host:port); repeatable or comma separated
    #[argh(option, short = 'n', long = "nodes")]
    pub nodes: Vec<String>,

    /// secret sent with AUTH on every connection
    #[argh(option)]
    pub auth: Option<String>,

    /// consumption round-trips between topology refreshes
    ///
    /// Set to 0 to never move away from the first reachable seed.
    #[argh(option, default = "DEFAULT_CYCLE")]
    pub cycle: u32,

    /// time to wait for each reply, in milliseconds
    #[argh(option, default = "30_000")]
    pub timeout_ms: u64,

    #[argh(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Builds the client configuration, consulting `DISQUE_NODES` and
    /// `DISQUE_AUTH` for anything not given on the command line.
    pub fn client_config(&self) -> ClientConfig {
        let nodes = resolve_nodes(&self.nodes, std::env::var(NODES_ENV).ok());
        let auth = resolve_auth(self.auth.clone(), std::env::var(AUTH_ENV).ok());

        ClientConfig::new(nodes)
            .with_cycle(self.cycle)
            .with_auth_config(auth)
            .with_request_timeout(Duration::from_millis(self.timeout_ms))
    }
}

/// Picks the seed list: flags first, then the environment, then the default.
pub fn resolve_nodes(flags: &[String], env: Option<String>) -> Vec<String> {
    if !flags.is_empty() {
        return flags.to_vec();
    }
    match env {
        Some(value) if !value.trim().is_empty() => vec![value],
        _ => vec![DEFAULT_NODE.to_string()],
    }
}

/// Picks the `AUTH` secret: flag first, then the environment. Empty values
/// disable authentication.
pub fn resolve_auth(flag: Option<String>, env: Option<String>) -> AuthConfig {
    AuthConfig::from_option(flag.or(env).filter(|secret| !secret.is_empty()))
}

/// Available CLI subcommands.
#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub enum Commands {
    Ping(PingArgs),
    Info(InfoArgs),
    Call(CallArgs),
    AddJob(AddJobArgs),
    GetJob(GetJobArgs),
    AckJob(AckJobArgs),
    Hello(HelloArgs),
    Mock(MockArgs),
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "ping")]
/// check that the active node answers
pub struct PingArgs {}

/// Arguments for printing `INFO`.
///
/// Without a field the whole map is printed as a JSON object. With one, only
/// that field's value is printed.
///
/// ```bash
/// disque info registered_jobs
/// ```
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "info")]
/// print INFO fields of the active node
pub struct InfoArgs {
    /// single field to print
    #[argh(positional)]
    pub field: Option<String>,
}

/// Arguments for sending a single raw command.
///
/// The reply is printed as raw JSON to stdout, and no logging is set up, so
/// the output can be piped to other tools:
///
/// ```bash
/// disque call QLEN emails | jq .
/// ```
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "call")]
/// send an arbitrary command to the active node
pub struct CallArgs {
    /// command name, e.g. QLEN
    #[argh(positional)]
    pub name: String,

    /// command arguments
    #[argh(positional)]
    pub args: Vec<String>,
}

/// Arguments for adding a job.
///
/// ```bash
/// disque addjob emails '{"to":"a@b.c"}' --retry 60 --maxlen 1000
/// ```
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "addjob")]
/// add a job to a queue and print its id
pub struct AddJobArgs {
    /// queue name
    #[argh(positional)]
    pub queue: String,

    /// job payload
    #[argh(positional)]
    pub body: String,

    /// how long the node may wait for replication, in milliseconds
    #[argh(option, default = "0")]
    pub wait_ms: u64,

    /// number of nodes the job is replicated to
    #[argh(option)]
    pub replicate: Option<u32>,

    /// seconds before the job is queued
    #[argh(option)]
    pub delay: Option<u64>,

    /// seconds before an unacknowledged job is queued again
    #[argh(option)]
    pub retry: Option<u64>,

    /// seconds the job may live
    #[argh(option)]
    pub ttl: Option<u64>,

    /// refuse the job when the queue already holds this many
    #[argh(option)]
    pub maxlen: Option<u64>,

    /// replicate asynchronously
    #[argh(switch, long = "async")]
    pub asynchronous: bool,
}

impl AddJobArgs {
    pub fn options(&self) -> AddJobOptions {
        AddJobOptions {
            replicate: self.replicate,
            delay: self.delay,
            retry: self.retry,
            ttl: self.ttl,
            maxlen: self.maxlen,
            asynchronous: self.asynchronous,
        }
    }
}

/// Arguments for fetching jobs.
///
/// Jobs are printed as a JSON array of `{queue, id, body}` objects.
///
/// ```bash
/// disque getjob emails sms --count 10 --nohang
/// ```
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "getjob")]
/// fetch jobs from one or more queues
pub struct GetJobArgs {
    /// queues to fetch from
    #[argh(positional)]
    pub queues: Vec<String>,

    /// maximum number of jobs to return
    #[argh(option)]
    pub count: Option<u32>,

    /// how long to block waiting for jobs, in milliseconds
    #[argh(option)]
    pub timeout: Option<u64>,

    /// return immediately when no job is available
    #[argh(switch)]
    pub nohang: bool,

    /// include nack and delivery counters
    #[argh(switch)]
    pub with_counters: bool,
}

impl GetJobArgs {
    pub fn options(&self) -> GetJobOptions {
        GetJobOptions {
            count: self.count,
            timeout: self.timeout,
            nohang: self.nohang,
            with_counters: self.with_counters,
        }
    }
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "ackjob")]
/// acknowledge jobs and print how many the node knew
pub struct AckJobArgs {
    /// job ids
    #[argh(positional)]
    pub ids: Vec<String>,

    /// use FASTACK instead of ACKJOB
    #[argh(switch)]
    pub fast: bool,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "hello")]
/// print the cluster topology reported by the active node
pub struct HelloArgs {}

/// Arguments for running a mock cluster.
///
/// Every node shares one job store, so jobs added on one node can be
/// consumed from another. The comma separated node list is printed on the
/// first line of stdout, ready for `--nodes`.
///
/// ```bash
/// disque mock --count 3 --base-port 7711 --auth foobar
/// ```
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "mock")]
/// run an in-process mock cluster until Ctrl-C
pub struct MockArgs {
    /// number of nodes
    #[argh(option, default = "3")]
    pub count: usize,

    /// interface every node binds to
    #[argh(option, default = "\"127.0.0.1\".into()")]
    pub host: String,

    /// port of the first node; ephemeral ports when absent
    #[argh(option)]
    pub base_port: Option<u16>,

    /// secret every node requires
    #[argh(option)]
    pub auth: Option<String>,
}
