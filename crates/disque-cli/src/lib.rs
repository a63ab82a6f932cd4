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

//! # Disque CLI
//!
//! Command-line interface for a Disque cluster.
//!
//! This crate backs the `disque` binary. It parses arguments with `argh`,
//! builds a [`ClientConfig`](disque_client::ClientConfig) from them and runs
//! one command through [`disque_client::Client`], printing the result as a
//! single line of JSON.
//!
//! ## Key Commands
//!
//! - `disque ping`: Check that the cluster answers
//! - `disque info`: Print the active node's `INFO` fields
//! - `disque call`: Send an arbitrary command (raw JSON reply, no logging)
//! - `disque addjob` / `getjob` / `ackjob`: Produce, consume and acknowledge jobs
//! - `disque hello`: Print the cluster topology
//! - `disque mock`: Run an in-process mock cluster until Ctrl-C
//!
//! ## Node Selection
//!
//! Seed nodes come from `--nodes` (repeatable or comma separated), then the
//! `DISQUE_NODES` environment variable, then `127.0.0.1:7711`. The `AUTH`
//! secret comes from `--auth`, then `DISQUE_AUTH`.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
pub use commands::{execute, run};
