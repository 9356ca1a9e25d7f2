//! # Document Merging
//!
//! Reconciles assembled operations with the existing document.
//!
//! The existing document is validated before anything is merged. Operations
//! are written path by path and status by status on top of what is already
//! there, and the result is normalized into a deterministic key order.

use crate::assembler::{Operation, OperationAssembler};
use crate::config::{GeneratorConfig, DEFAULT_TITLE, DEFAULT_VERSION};
use crate::error::{AppError, AppResult};
use crate::exchange::Method;
use crate::template::RouteTemplate;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// OpenAPI version written into fresh documents.
pub const OPENAPI_VERSION: &str = "3.0.3";

/// Merges operations into a document.
pub struct DocumentMerger<'c> {
    config: &'c GeneratorConfig,
}

impl<'c> DocumentMerger<'c> {
    /// Creates a merger for one pass.
    pub fn new(config: &'c GeneratorConfig) -> Self {
        Self { config }
    }

    /// Validates the existing document (or starts a fresh one) and injects
    /// the configured info block, servers, and security schemes.
    pub fn prepare(&self, existing: Option<Value>) -> AppResult<Map<String, Value>> {
        let mut doc = match existing {
            None | Some(Value::Null) => fresh_document(),
            Some(Value::Object(map)) => {
                validate_structure(&map)?;
                map
            }
            Some(other) => {
                return Err(AppError::Parse(format!(
                    "Existing document must be a mapping, found {}",
                    kind_of(&other)
                )))
            }
        };

        doc.entry("openapi")
            .or_insert_with(|| json!(OPENAPI_VERSION));

        let info = object_entry(&mut doc, "info")?;
        match &self.config.title {
            Some(title) => {
                info.insert("title".to_string(), json!(title));
            }
            None => {
                info.entry("title").or_insert_with(|| json!(DEFAULT_TITLE));
            }
        }
        match &self.config.version {
            Some(version) => {
                info.insert("version".to_string(), json!(version));
            }
            None => {
                info.entry("version").or_insert_with(|| json!(DEFAULT_VERSION));
            }
        }
        if let Some(description) = &self.config.description {
            info.insert("description".to_string(), json!(description));
        }
        if let Some(license) = &self.config.license {
            let mut value = Map::new();
            value.insert("name".to_string(), json!(license.name));
            if let Some(url) = &license.url {
                value.insert("url".to_string(), json!(url));
            }
            info.insert("license".to_string(), Value::Object(value));
        }

        if !self.config.servers.is_empty() {
            let servers: Vec<Value> = self
                .config
                .servers
                .iter()
                .map(|server| {
                    let mut value = Map::new();
                    value.insert("url".to_string(), json!(server.url));
                    if let Some(description) = &server.description {
                        value.insert("description".to_string(), json!(description));
                    }
                    Value::Object(value)
                })
                .collect();
            doc.insert("servers".to_string(), Value::Array(servers));
        }

        object_entry(&mut doc, "paths")?;

        if !self.config.security_schemes.is_empty() {
            let components = object_entry(&mut doc, "components")?;
            let schemes = object_entry(components, "securitySchemes")?;
            for (name, scheme) in &self.config.security_schemes {
                schemes.insert(name.clone(), scheme.clone());
            }
        }

        Ok(doc)
    }

    /// Route templates already present in a prepared document.
    pub fn existing_templates(document: &Map<String, Value>) -> Vec<RouteTemplate> {
        let Some(paths) = document.get("paths").and_then(Value::as_object) else {
            return Vec::new();
        };
        paths
            .iter()
            .flat_map(|(path, item)| {
                item.as_object()
                    .into_iter()
                    .flat_map(|item| item.keys())
                    .filter_map(|key| Method::from_key(key))
                    .map(move |method| RouteTemplate::parse(method, path))
            })
            .collect()
    }

    /// The operation object stored for a route, if any.
    pub fn existing_operation<'d>(
        document: &'d Map<String, Value>,
        route: &RouteTemplate,
    ) -> Option<&'d Value> {
        document
            .get("paths")?
            .get(route.path())?
            .get(route.method.as_key())
    }

    /// Writes operations into a prepared document and normalizes it.
    ///
    /// Fails without partial output when an operation requires a security
    /// scheme the document does not declare.
    pub fn apply(&self, mut doc: Map<String, Value>, operations: &[Operation]) -> AppResult<Value> {
        for operation in operations {
            check_security(&doc, operation)?;
        }

        let assembler = OperationAssembler::new(self.config);
        for operation in operations {
            let route = &operation.route;
            let rendered = assembler.render(operation, Self::existing_operation(&doc, route));
            let created = Self::existing_operation(&doc, route).is_none();

            let paths = object_entry(&mut doc, "paths")?;
            let item = object_entry(paths, &route.path())?;
            item.insert(route.method.as_key().to_string(), rendered);
            debug!(route = %route, created, "Merged operation");
        }

        info!(operations = operations.len(), "Merged operations into document");
        Ok(Value::Object(normalize(doc)))
    }

    /// `prepare` followed by `apply`.
    pub fn merge(&self, existing: Option<Value>, operations: &[Operation]) -> AppResult<Value> {
        let doc = self.prepare(existing)?;
        self.apply(doc, operations)
    }
}

fn fresh_document() -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert("openapi".to_string(), json!(OPENAPI_VERSION));
    doc.insert("info".to_string(), Value::Object(Map::new()));
    doc
}

/// Returns the object stored under `key`, inserting an empty one if absent.
fn object_entry<'m>(
    map: &'m mut Map<String, Value>,
    key: &str,
) -> AppResult<&'m mut Map<String, Value>> {
    match map
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
    {
        Value::Object(inner) => Ok(inner),
        other => Err(AppError::Parse(format!(
            "Expected a mapping at '{}', found {}",
            key,
            kind_of(other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Rejects documents whose skeleton the merge would have to guess at.
fn validate_structure(doc: &Map<String, Value>) -> AppResult<()> {
    let expect_object = |value: Option<&Value>, at: &str| -> AppResult<()> {
        match value {
            None | Some(Value::Object(_)) => Ok(()),
            Some(other) => Err(AppError::Parse(format!(
                "Expected a mapping at '{}', found {}",
                at,
                kind_of(other)
            ))),
        }
    };

    expect_object(doc.get("info"), "info")?;
    expect_object(doc.get("components"), "components")?;
    expect_object(
        doc.get("components").and_then(|c| c.get("securitySchemes")),
        "components.securitySchemes",
    )?;
    if let Some(servers) = doc.get("servers") {
        if !servers.is_array() {
            return Err(AppError::Parse(format!(
                "Expected a sequence at 'servers', found {}",
                kind_of(servers)
            )));
        }
    }

    expect_object(doc.get("paths"), "paths")?;
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Ok(());
    };
    for (path, item) in paths {
        if !path.starts_with('/') {
            return Err(AppError::Parse(format!("Path key '{}' must start with '/'", path)));
        }
        expect_object(Some(item), &format!("paths.{}", path))?;
        let Some(item) = item.as_object() else {
            continue;
        };
        for method in Method::ALL {
            let at = format!("paths.{}.{}", path, method.as_key());
            expect_object(item.get(method.as_key()), &at)?;
            if let Some(op) = item.get(method.as_key()) {
                expect_object(op.get("responses"), &format!("{}.responses", at))?;
                expect_object(op.get("requestBody"), &format!("{}.requestBody", at))?;
                if let Some(params) = op.get("parameters") {
                    if !params.is_array() {
                        return Err(AppError::Parse(format!(
                            "Expected a sequence at '{}.parameters', found {}",
                            at,
                            kind_of(params)
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_security(doc: &Map<String, Value>, operation: &Operation) -> AppResult<()> {
    let Some(requirements) = &operation.forced.security else {
        return Ok(());
    };
    let declared = doc
        .get("components")
        .and_then(|c| c.get("securitySchemes"))
        .and_then(Value::as_object);

    for scheme in requirements.iter().flat_map(|r| r.keys()) {
        if !declared.is_some_and(|d| d.contains_key(scheme)) {
            return Err(AppError::UnknownSecurityScheme {
                scheme: scheme.clone(),
                method: operation.route.method.to_string(),
                path: operation.route.path(),
            });
        }
    }
    Ok(())
}

/// Sorts paths, methods, and response codes into their canonical order.
fn normalize(mut doc: Map<String, Value>) -> Map<String, Value> {
    if let Some(Value::Object(paths)) = doc.get_mut("paths") {
        let mut sorted: Vec<(String, Value)> = std::mem::take(paths).into_iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        *paths = sorted
            .into_iter()
            .map(|(path, item)| (path, normalize_path_item(item)))
            .collect();
    }
    doc
}

fn normalize_path_item(item: Value) -> Value {
    let Value::Object(item) = item else {
        return item;
    };
    let mut others = Map::new();
    let mut operations: Vec<(Method, Value)> = Vec::new();
    for (key, value) in item {
        match Method::from_key(&key) {
            Some(method) => operations.push((method, normalize_operation(value))),
            None => {
                others.insert(key, value);
            }
        }
    }
    operations.sort_by_key(|(method, _)| *method);
    for (method, op) in operations {
        others.insert(method.as_key().to_string(), op);
    }
    Value::Object(others)
}

fn normalize_operation(op: Value) -> Value {
    let Value::Object(mut op) = op else {
        return op;
    };
    if let Some(Value::Object(responses)) = op.get_mut("responses") {
        let mut entries: Vec<(String, Value)> = std::mem::take(responses).into_iter().collect();
        entries.sort_by(|a, b| response_rank(&a.0).cmp(&response_rank(&b.0)));
        *responses = entries.into_iter().collect();
    }
    Value::Object(op)
}

/// Numeric codes first, then ranges such as `2XX`, then `default`.
fn response_rank(key: &str) -> (u8, u16, String) {
    match key.parse::<u16>() {
        Ok(code) => (0, code, String::new()),
        Err(_) if key == "default" => (2, 0, String::new()),
        Err(_) => (1, 0, key.to_string()),
    }
}
