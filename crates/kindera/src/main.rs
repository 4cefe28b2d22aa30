// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kindera - an AI assistant core for kindergarten operations.
//!
//! This is the binary entry point for the Kindera server.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kindera_config::KinderaConfig;

mod serve;

/// Kindera - an AI assistant core for kindergarten operations.
#[derive(Parser, Debug)]
#[command(name = "kindera", version, about, long_about = None)]
struct Cli {
    /// Path to a kindera.toml; defaults to the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Kindera assistant server.
    Serve,
    /// Print the effective configuration as TOML.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> KinderaConfig {
    let loaded = match path {
        Some(path) => kindera_config::load_config_from_path(path),
        None => kindera_config::load_config(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("kindera: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(errors) = kindera_config::validation::validate_config(&config) {
        kindera_config::render_errors(&errors);
        std::process::exit(1);
    }
    config
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    match cli.command {
        Some(Commands::Config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("kindera: failed to render configuration: {e}");
                std::process::exit(1);
            }
        },
        Some(Commands::Serve) | None => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("kindera: {e}");
                std::process::exit(1);
            }
        }
    }
}
