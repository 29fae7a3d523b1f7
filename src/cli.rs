// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Command-line surface (§12): a headless daemon with a couple of
//! operator subcommands for inspecting configuration before it commits to
//! running anything.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "nanoclaw", about = "Multi-tenant conversational-assistant dispatch core")]
pub struct Cli {
    /// Explicit config file, applied on top of the search-path layers (§12).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Repeat for more verbose logging: `-v` debug, `-vv` trace.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load and validate the resolved configuration, then exit.
    Validate,
    /// Print the fully resolved configuration as YAML and exit.
    ShowConfig,
}
