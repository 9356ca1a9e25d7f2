//! # Exchange Recorder
//!
//! Filters and normalizes exchanges before they reach the merge pass:
//!
//! - drops exchanges whose test opted out (`openapi: false`);
//! - splits a query string off the raw path (bracket notation becomes nesting);
//! - drops exchanges for ignored paths;
//! - projects request/response headers down to their allow-lists.
//!
//! No I/O and no merging happens here.

use crate::config::GeneratorConfig;
use crate::exchange::{Exchange, Sample};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::debug;

const CONTENT_TYPE: &str = "content-type";

/// Filters one exchange. Returns `None` when it must not be recorded.
pub fn record(mut exchange: Exchange, config: &GeneratorConfig) -> Option<Exchange> {
    if exchange.is_skipped() {
        debug!(
            method = %exchange.method,
            path = %exchange.path,
            "Skipping exchange opted out by test"
        );
        return None;
    }

    let (path, query) = split_raw_path(&exchange.path);
    for (key, value) in query {
        exchange.query.entry(key).or_insert(value);
    }
    exchange.path = path;

    if config.is_ignored(&exchange.path) {
        debug!(method = %exchange.method, path = %exchange.path, "Skipping ignored path");
        return None;
    }

    if exchange.request_content_type.is_none() {
        exchange.request_content_type = header_value(&exchange.request_headers, CONTENT_TYPE);
    }
    if exchange.response_content_type.is_none() {
        exchange.response_content_type = header_value(&exchange.response_headers, CONTENT_TYPE);
    }

    exchange.request_headers = project_headers(exchange.request_headers, |name| {
        config.allowed_request_header(name)
    });
    exchange.response_headers = project_headers(exchange.response_headers, |name| {
        config.allowed_response_header(name)
    });

    Some(exchange)
}

fn header_value(headers: &BTreeMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.replace('_', "-").eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

fn project_headers<'c>(
    headers: BTreeMap<String, String>,
    allowed: impl Fn(&str) -> Option<&'c str>,
) -> BTreeMap<String, String> {
    headers
        .into_iter()
        .filter_map(|(name, value)| allowed(&name).map(|canonical| (canonical.to_string(), value)))
        .collect()
}

/// Splits `/tables?page=1#frag` into the bare path and a parsed query mapping.
///
/// A trailing slash is dropped (except for the root path).
pub fn split_raw_path(raw: &str) -> (String, BTreeMap<String, Sample>) {
    let raw = raw.split('#').next().unwrap_or_default();
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (raw, BTreeMap::new()),
    };

    let trimmed = path.trim_end_matches('/');
    let path = if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };
    (path, query)
}

/// Parses a query string with Rack/PHP bracket conventions.
///
/// `filter[name]=x` nests into `{filter: {name: x}}`, `ids[]=1&ids[]=2`
/// collects into `{ids: [1, 2]}`. All leaves are strings.
pub fn parse_query(query: &str) -> BTreeMap<String, Sample> {
    let mut out = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let path = key_path(&key);
        if path.first().map_or(true, String::is_empty) {
            continue;
        }
        insert_at(&mut out, &path, Sample::String(value.into_owned()));
    }
    out
}

fn key_path(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    let mut parts = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        parts.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }
    parts
}

fn insert_at(target: &mut BTreeMap<String, Sample>, path: &[String], value: Sample) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    match rest.split_first() {
        None => {
            target.insert(head.clone(), value);
        }
        Some((next, tail)) if next.is_empty() => {
            let slot = target
                .entry(head.clone())
                .or_insert_with(|| Sample::Array(Vec::new()));
            if !matches!(slot, Sample::Array(_)) {
                *slot = Sample::Array(Vec::new());
            }
            if let Sample::Array(items) = slot {
                if tail.is_empty() {
                    items.push(value);
                } else {
                    let mut element = BTreeMap::new();
                    insert_at(&mut element, tail, value);
                    items.push(Sample::Object(element));
                }
            }
        }
        Some(_) => {
            let slot = target
                .entry(head.clone())
                .or_insert_with(|| Sample::Object(BTreeMap::new()));
            if !matches!(slot, Sample::Object(_)) {
                *slot = Sample::Object(BTreeMap::new());
            }
            if let Sample::Object(inner) = slot {
                insert_at(inner, rest, value);
            }
        }
    }
}

/// Thread-safe funnel for exchanges produced by concurrent test workers.
///
/// Workers call [`ExchangeCollector::submit`]; the owner drains the batch
/// once with [`ExchangeCollector::into_exchanges`] and runs a single
/// sequential pass over it.
pub struct ExchangeCollector<'c> {
    config: &'c GeneratorConfig,
    exchanges: Mutex<Vec<Exchange>>,
    dropped: Mutex<usize>,
}

impl<'c> ExchangeCollector<'c> {
    /// Creates an empty collector filtering with `config`.
    pub fn new(config: &'c GeneratorConfig) -> Self {
        Self {
            config,
            exchanges: Mutex::new(Vec::new()),
            dropped: Mutex::new(0),
        }
    }

    /// Ingests the outcome of one test case.
    ///
    /// `None` means the test made no request. Returns whether an exchange was kept.
    pub fn submit(&self, exchange: Option<Exchange>) -> bool {
        let Some(exchange) = exchange else {
            return false;
        };
        match record(exchange, self.config) {
            Some(kept) => {
                self.exchanges.lock().push(kept);
                true
            }
            None => {
                *self.dropped.lock() += 1;
                false
            }
        }
    }

    /// Number of exchanges kept so far.
    pub fn len(&self) -> usize {
        self.exchanges.lock().len()
    }

    /// Whether nothing has been kept.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of exchanges filtered out so far.
    pub fn dropped(&self) -> usize {
        *self.dropped.lock()
    }

    /// Hands over the collected batch.
    pub fn into_exchanges(self) -> Vec<Exchange> {
        self.exchanges.into_inner()
    }
}
