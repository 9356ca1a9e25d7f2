#![deny(missing_docs)]

//! # Exemplar CLI
//!
//! Command Line Interface for the exchange-to-OpenAPI engine.
//!
//! Supported Commands:
//! - `generate`: Merges exchange logs into the OpenAPI document.
//! - `routes`: Lists the route templates the logs group into.

use clap::{Parser, Subcommand};
use exemplar_core::AppResult;
use tracing_subscriber::EnvFilter;

mod generate;
mod ingest;
mod routes;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Exemplar OpenAPI generator")]
struct Cli {
    /// Log every exchange decision (`debug`). `RUST_LOG` takes precedence.
    #[clap(long, short, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge exchange logs into the document.
    Generate(generate::GenerateArgs),
    /// List route templates without writing anything.
    Routes(routes::RoutesArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Generate(args) => generate::execute(args)?,
        Commands::Routes(args) => routes::execute(args)?,
    }

    Ok(())
}
