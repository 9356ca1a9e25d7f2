//! # Generate Command
//!
//! Merges one or more exchange logs into the OpenAPI document:
//!
//! 1. **Config**: loads the optional config file, then applies flag overrides.
//! 2. **Collect**: funnels every log through the recorder.
//! 3. **Merge**: runs a single pass and writes the document atomically.

use crate::ingest;
use exemplar_core::{
    pipeline, AppResult, DocumentFormat, DocumentStore, ExchangeCollector, GeneratorConfig,
};
use std::path::PathBuf;
use tracing::info;

/// Arguments for the generate command.
#[derive(clap::Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Configuration file (YAML or JSON).
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Exchange logs (JSON Lines, JSON array, or YAML sequence).
    #[clap(long = "exchanges", required = true, num_args = 1..)]
    pub exchanges: Vec<PathBuf>,

    /// Output document path.
    #[clap(long, env = "OPENAPI_PATH")]
    pub output: Option<PathBuf>,

    /// Output format (`yaml` or `json`). Defaults from the output extension.
    #[clap(long, env = "OPENAPI_OUTPUT")]
    pub format: Option<DocumentFormat>,

    /// Document title.
    #[clap(long)]
    pub title: Option<String>,

    /// Print the merged document instead of writing it.
    #[clap(long)]
    pub dry_run: bool,
}

/// Builds the effective configuration: file first, flags on top.
pub fn resolve_config(
    config: Option<&PathBuf>,
    output: Option<&PathBuf>,
    format: Option<DocumentFormat>,
    title: Option<&String>,
) -> AppResult<GeneratorConfig> {
    let mut resolved = match config {
        Some(path) => GeneratorConfig::load(path)?,
        None => GeneratorConfig::default(),
    };
    if let Some(output) = output {
        resolved.path = output.clone();
    }
    if let Some(format) = format {
        resolved.format = Some(format);
    }
    if let Some(title) = title {
        resolved.title = Some(title.clone());
    }
    Ok(resolved)
}

/// Executes the generate command.
pub fn execute(args: &GenerateArgs) -> AppResult<()> {
    let config = resolve_config(
        args.config.as_ref(),
        args.output.as_ref(),
        args.format,
        args.title.as_ref(),
    )?;

    let collector = ExchangeCollector::new(&config);
    ingest::collect(&args.exchanges, &collector)?;
    let dropped = collector.dropped();
    let exchanges = collector.into_exchanges();

    if args.dry_run {
        let store = DocumentStore::from_config(&config);
        let (document, _) = pipeline::synthesize(&config, store.load()?, exchanges)?;
        print!("{}", store.encode(&document)?);
        return Ok(());
    }

    let report = pipeline::run(&config, exchanges)?;
    info!(dropped, "Filtered exchanges at ingestion");
    println!(
        "Wrote {} operation(s) from {} exchange(s) to {:?}",
        report.operations,
        report.recorded,
        config.path
    );
    Ok(())
}
