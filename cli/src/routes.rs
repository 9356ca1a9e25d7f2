//! # Routes Command
//!
//! Lists the route templates exchange logs group into, next to the templates
//! already in the document. Writes nothing.

use crate::generate::resolve_config;
use crate::ingest;
use exemplar_core::{
    AppResult, DocumentMerger, DocumentStore, ExchangeCollector, PathTemplater, RouteTemplate,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Arguments for the routes command.
#[derive(clap::Args, Debug, Clone)]
pub struct RoutesArgs {
    /// Configuration file (YAML or JSON).
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Exchange logs.
    #[clap(long = "exchanges", required = true, num_args = 1..)]
    pub exchanges: Vec<PathBuf>,

    /// Document whose templates take precedence.
    #[clap(long, env = "OPENAPI_PATH")]
    pub output: Option<PathBuf>,
}

/// Groups the exchanges and returns `(template, exchange count)` pairs.
pub fn route_counts(args: &RoutesArgs) -> AppResult<BTreeMap<RouteTemplate, usize>> {
    let config = resolve_config(args.config.as_ref(), args.output.as_ref(), None, None)?;

    let store = DocumentStore::from_config(&config);
    let document = DocumentMerger::new(&config).prepare(store.load()?)?;
    let templater = PathTemplater::new(DocumentMerger::existing_templates(&document));

    let collector = ExchangeCollector::new(&config);
    ingest::collect(&args.exchanges, &collector)?;

    Ok(templater
        .group(collector.into_exchanges())
        .into_iter()
        .map(|(template, group)| (template, group.len()))
        .collect())
}

/// Executes the routes command.
pub fn execute(args: &RoutesArgs) -> AppResult<()> {
    for (template, count) in route_counts(args)? {
        println!("{:<50} {}", template.to_string(), count);
    }
    Ok(())
}
