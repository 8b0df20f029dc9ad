//! Operator tool for the tech blog authentication core.
//!
//! Produces and checks password hashes with the deployment's configured
//! parameters and validates configuration before a rollout.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use techblog_auth::{
    auth::{hash_password, verify_password},
    config::Settings,
    telemetry::init_tracing,
};
use tracing::info;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "techblog-auth", version, about)]
struct Cli {
    /// TOML config file (defaults to ./techblog-auth.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a password from stdin and print its Argon2id hash
    Hash,

    /// Read a password from stdin and check it against a stored hash
    Verify {
        /// Encoded PHC hash to check against
        #[arg(long)]
        hash: String,
    },

    /// Load, validate and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("loading configuration")?;

    init_tracing(&settings.log_level, settings.log_json);

    match cli.command {
        Commands::Hash => {
            let password = read_password()?;
            let encoded = tokio::task::spawn_blocking(move || {
                hash_password(&password, &settings.hashing)
            })
            .await??;
            println!("{encoded}");
            Ok(ExitCode::SUCCESS)
        },
        Commands::Verify { hash } => {
            let password = read_password()?;
            let matches =
                tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await??;
            if matches {
                println!("match");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("no match");
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::CheckConfig => {
            info!("configuration is valid");
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(ExitCode::SUCCESS)
        },
    }
}

/// First line of stdin, without the line terminator
fn read_password() -> anyhow::Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading password from stdin")?;

    let password = Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string());
    anyhow::ensure!(!password.is_empty(), "empty password on stdin");
    Ok(password)
}
