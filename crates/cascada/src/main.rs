// SPDX-FileCopyrightText: 2026 Cascada Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cascada - a conversational flow engine for WhatsApp.
//!
//! This is the binary entry point for the Cascada server.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};

mod serve;

/// Cascada - a conversational flow engine for WhatsApp.
#[derive(Parser, Debug)]
#[command(name = "cascada", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Cascada server.
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            if let Err(err) = serve::run().await {
                eprintln!("cascada serve failed: {err}");
                std::process::exit(1);
            }
        }
    }
}
