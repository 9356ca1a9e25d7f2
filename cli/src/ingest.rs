//! # Exchange Log Ingestion
//!
//! Reads exchange logs written by a test-runner adapter. Accepted layouts:
//! - JSON Lines, one exchange per line (`.jsonl`, `.ndjson`, or any other file);
//! - a JSON array of exchanges;
//! - a YAML sequence of exchanges (`.yaml` / `.yml`).

use exemplar_core::{AppError, AppResult, Exchange, ExchangeCollector};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Parses every exchange of one log file.
pub fn read_exchanges(path: &Path) -> AppResult<Vec<Exchange>> {
    let content = fs::read_to_string(path)?;
    let parse_err = |detail: String| AppError::Parse(format!("{:?}: {}", path, detail));

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    if is_yaml {
        return serde_yaml::from_str::<Option<Vec<Exchange>>>(&content)
            .map(Option::unwrap_or_default)
            .map_err(|e| parse_err(e.to_string()));
    }

    if content.trim_start().starts_with('[') {
        return serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()));
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| parse_err(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

/// Feeds every log into the collector.
pub fn collect(paths: &[impl AsRef<Path>], collector: &ExchangeCollector<'_>) -> AppResult<()> {
    for path in paths {
        let path = path.as_ref();
        let exchanges = read_exchanges(path)?;
        debug!(path = ?path, count = exchanges.len(), "Read exchange log");
        for exchange in exchanges {
            collector.submit(Some(exchange));
        }
    }
    Ok(())
}
