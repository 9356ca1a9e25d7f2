//! # Merge Pass
//!
//! Runs exchanges through the whole engine in one sequential pass:
//! record ➜ group by template ➜ assemble ➜ merge ➜ persist.
//!
//! The document is loaded once at the start and written once at the end.
//! Any error in between leaves the file on disk untouched.

use crate::assembler::{Operation, OperationAssembler};
use crate::config::GeneratorConfig;
use crate::error::AppResult;
use crate::exchange::Exchange;
use crate::merger::DocumentMerger;
use crate::recorder::record;
use crate::store::DocumentStore;
use crate::template::PathTemplater;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

/// Outcome counters of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Exchanges that reached assembly.
    pub recorded: usize,
    /// Exchanges filtered out (opt-out or ignored path).
    pub dropped: usize,
    /// Operations written.
    pub operations: usize,
    /// Document location, when the pass persisted it.
    pub path: Option<PathBuf>,
}

/// Produces the updated document without touching the file system.
pub fn synthesize(
    config: &GeneratorConfig,
    existing: Option<Value>,
    exchanges: Vec<Exchange>,
) -> AppResult<(Value, PassReport)> {
    config.validate()?;

    let total = exchanges.len();
    let recorded: Vec<Exchange> = exchanges
        .into_iter()
        .filter_map(|ex| record(ex, config))
        .collect();

    let merger = DocumentMerger::new(config);
    let document = merger.prepare(existing)?;

    let templater = PathTemplater::new(DocumentMerger::existing_templates(&document));
    let assembler = OperationAssembler::new(config);
    let report = PassReport {
        recorded: recorded.len(),
        dropped: total - recorded.len(),
        ..PassReport::default()
    };

    let operations: Vec<Operation> = templater
        .group(recorded)
        .iter()
        .map(|(route, group)| assembler.assemble(route, group))
        .collect();

    let merged = merger.apply(document, &operations)?;
    Ok((
        merged,
        PassReport {
            operations: operations.len(),
            ..report
        },
    ))
}

/// Loads the configured document, merges `exchanges` into it, and saves it.
pub fn run(config: &GeneratorConfig, exchanges: Vec<Exchange>) -> AppResult<PassReport> {
    let store = DocumentStore::from_config(config);
    let existing = store.load()?;
    let (document, report) = synthesize(config, existing, exchanges)?;
    store.save(&document)?;

    info!(
        path = ?store.path(),
        recorded = report.recorded,
        dropped = report.dropped,
        operations = report.operations,
        "Document updated"
    );
    Ok(PassReport {
        path: Some(store.path().to_path_buf()),
        ..report
    })
}
