//! # Operation Assembly
//!
//! Builds one [`Operation`] per route template from its exchanges, and
//! renders it onto the existing operation object of the document.
//!
//! Precedence of metadata, highest first:
//! 1. fields forced by test annotations,
//! 2. values already present in the document,
//! 3. suggestions carried by the exchanges (runner-derived summary, tags, id).

use crate::config::GeneratorConfig;
use crate::exchange::{Exchange, OperationOverride, Sample, SecurityRequirement};
use crate::schema::{Inferencer, SchemaNode};
use crate::template::{split_path, RouteTemplate};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Location of a parameter (`in`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamLocation {
    /// Path placeholder.
    Path,
    /// Query string.
    Query,
    /// Request header.
    Header,
}

impl ParamLocation {
    /// The OpenAPI `in` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
        }
    }
}

/// Sort rank of an `in` value. Unknown locations sort last.
fn location_rank(location: &str) -> u8 {
    match location {
        "path" => 0,
        "query" => 1,
        "header" => 2,
        "cookie" => 3,
        _ => 4,
    }
}

/// An inferred parameter (or response header).
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Where it travels.
    pub location: ParamLocation,
    /// Merged schema of every observed value.
    pub schema: SchemaNode,
    /// Present in every exchange.
    pub required: bool,
}

/// Schema and example for one media type.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaBody {
    /// Merged body schema.
    pub schema: SchemaNode,
    /// Example chosen among the samples, JSON media types only.
    pub example: Option<Value>,
}

/// Everything recorded for one response status.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseSpec {
    /// Smallest test description seen for the status.
    pub description: Option<String>,
    /// Allow-listed response headers.
    pub headers: Vec<Parameter>,
    /// Bodies keyed by media type.
    pub content: BTreeMap<String, MediaBody>,
}

/// Metadata suggested by the runner. Lower precedence than the document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperationMetadata {
    /// Summary suggestion.
    pub summary: Option<String>,
    /// Tag suggestions.
    pub tags: Vec<String>,
    /// Operation id suggestion.
    pub operation_id: Option<String>,
}

/// One assembled operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Method and path template.
    pub route: RouteTemplate,
    /// Path, query, and header parameters.
    pub parameters: Vec<Parameter>,
    /// Request bodies keyed by media type.
    pub request_body: BTreeMap<String, MediaBody>,
    /// Responses keyed by status code.
    pub responses: BTreeMap<u16, ResponseSpec>,
    /// Runner suggestions.
    pub suggested: OperationMetadata,
    /// Fields forced by test annotations.
    pub forced: OperationOverride,
}

/// Assembles and renders operations.
pub struct OperationAssembler<'c> {
    config: &'c GeneratorConfig,
    inferencer: Inferencer,
}

impl<'c> OperationAssembler<'c> {
    /// Creates an assembler for one pass.
    pub fn new(config: &'c GeneratorConfig) -> Self {
        Self {
            config,
            inferencer: Inferencer::new(config.enum_threshold),
        }
    }

    /// Combines the exchanges of one route into an operation.
    pub fn assemble(&self, route: &RouteTemplate, exchanges: &[Exchange]) -> Operation {
        let mut parameters = self.path_parameters(route, exchanges);
        parameters.extend(self.object_parameters(
            ParamLocation::Query,
            exchanges.iter().map(|ex| Sample::Object(ex.query.clone())),
        ));
        parameters.extend(self.object_parameters(
            ParamLocation::Header,
            exchanges.iter().map(|ex| header_sample(&ex.request_headers)),
        ));

        let request_body = self.bodies(exchanges.iter().filter_map(|ex| {
            ex.request_body
                .as_ref()
                .map(|body| (ex.request_content_type.as_deref(), body))
        }));

        let mut by_status: BTreeMap<u16, Vec<&Exchange>> = BTreeMap::new();
        for ex in exchanges {
            by_status.entry(ex.status).or_default().push(ex);
        }
        let responses = by_status
            .into_iter()
            .map(|(status, group)| {
                let spec = ResponseSpec {
                    description: group.iter().filter_map(|ex| ex.description.clone()).min(),
                    headers: self.object_parameters(
                        ParamLocation::Header,
                        group.iter().map(|ex| header_sample(&ex.response_headers)),
                    ),
                    content: self.bodies(group.iter().filter_map(|ex| {
                        ex.response_body
                            .as_ref()
                            .map(|body| (ex.response_content_type.as_deref(), body))
                    })),
                };
                (status, spec)
            })
            .collect();

        Operation {
            route: route.clone(),
            parameters,
            request_body,
            responses,
            suggested: OperationMetadata {
                summary: exchanges.iter().filter_map(|ex| ex.summary.clone()).min(),
                tags: exchanges
                    .iter()
                    .flat_map(|ex| ex.tags.iter().cloned())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
                operation_id: exchanges.iter().filter_map(|ex| ex.operation_id.clone()).min(),
            },
            forced: combine_overrides(exchanges.iter().filter_map(Exchange::forced_fields)),
        }
    }

    fn path_parameters(&self, route: &RouteTemplate, exchanges: &[Exchange]) -> Vec<Parameter> {
        let mut values: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
        for ex in exchanges {
            let concrete = split_path(&ex.path);
            for (name, value) in route.bind(&concrete) {
                values
                    .entry(name.to_string())
                    .or_default()
                    .push(Sample::String(value.to_string()).coerce_scalars());
            }
        }

        route
            .param_names()
            .map(|name| {
                let schema = values
                    .get(name)
                    .and_then(|samples| self.inferencer.infer_all(samples))
                    .unwrap_or_else(|| self.inferencer.infer(&Sample::String(String::new())));
                Parameter {
                    name: name.to_string(),
                    location: ParamLocation::Path,
                    schema,
                    required: true,
                }
            })
            .collect()
    }

    /// Merges one mapping per exchange; a key is required when every mapping has it.
    fn object_parameters(
        &self,
        location: ParamLocation,
        samples: impl Iterator<Item = Sample>,
    ) -> Vec<Parameter> {
        let samples: Vec<Sample> = samples.map(Sample::coerce_scalars).collect();
        let Some(node) = self.inferencer.infer_all(&samples) else {
            return Vec::new();
        };
        let Some((properties, required)) = node.as_object() else {
            return Vec::new();
        };
        properties
            .iter()
            .map(|(name, schema)| Parameter {
                name: name.clone(),
                location,
                schema: schema.clone(),
                required: required.contains(name),
            })
            .collect()
    }

    fn bodies<'e>(
        &self,
        entries: impl Iterator<Item = (Option<&'e str>, &'e Sample)>,
    ) -> BTreeMap<String, MediaBody> {
        let mut by_media: BTreeMap<String, Vec<&Sample>> = BTreeMap::new();
        for (content_type, sample) in entries {
            by_media
                .entry(media_type(content_type, sample))
                .or_default()
                .push(sample);
        }

        by_media
            .into_iter()
            .filter_map(|(media, samples)| {
                let schema = self.inferencer.infer_all(samples.iter().copied())?;
                // The smallest serialization wins, whatever the sample order.
                let example = is_json(&media)
                    .then(|| {
                        samples
                            .iter()
                            .map(|s| s.to_example())
                            .min_by_key(Value::to_string)
                    })
                    .flatten();
                Some((media, MediaBody { schema, example }))
            })
            .collect()
    }

    /// Renders an operation onto the existing operation object, if any.
    pub fn render(&self, operation: &Operation, existing: Option<&Value>) -> Value {
        let mut op = existing
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        self.render_metadata(operation, &mut op);

        let parameters = self.render_parameters(
            &operation.parameters,
            op.get("parameters"),
            existing.is_some(),
        );
        if !parameters.is_empty() {
            op.insert("parameters".to_string(), Value::Array(parameters));
        }

        if !operation.request_body.is_empty() {
            let mut body = object_at(&op, "requestBody");
            let content = self.render_content(&operation.request_body, body.get("content"));
            body.insert("content".to_string(), content);
            op.insert("requestBody".to_string(), Value::Object(body));
        }

        let mut responses = object_at(&op, "responses");
        for (status, spec) in &operation.responses {
            let key = status.to_string();
            let rendered = self.render_response(*status, spec, responses.get(&key));
            responses.insert(key, rendered);
        }
        op.insert("responses".to_string(), Value::Object(responses));

        Value::Object(op)
    }

    fn render_metadata(&self, operation: &Operation, op: &mut Map<String, Value>) {
        let forced = &operation.forced;
        let suggested = &operation.suggested;

        let summary = forced
            .summary
            .clone()
            .or_else(|| op.get("summary").and_then(Value::as_str).map(String::from))
            .or_else(|| suggested.summary.clone());
        if let Some(summary) = summary {
            op.insert("summary".to_string(), json!(summary));
        }
        if let Some(description) = &forced.description {
            op.insert("description".to_string(), json!(description));
        }
        if let Some(tags) = &forced.tags {
            op.insert("tags".to_string(), json!(tags));
        } else if !op.contains_key("tags") && !suggested.tags.is_empty() {
            op.insert("tags".to_string(), json!(suggested.tags));
        }
        if let Some(id) = &forced.operation_id {
            op.insert("operationId".to_string(), json!(id));
        } else if let (false, Some(id)) =
            (op.contains_key("operationId"), &suggested.operation_id)
        {
            op.insert("operationId".to_string(), json!(id));
        }
        if let Some(deprecated) = forced.deprecated {
            op.insert("deprecated".to_string(), json!(deprecated));
        }
        if let Some(security) = &forced.security {
            op.insert("security".to_string(), json!(security));
        }
    }

    /// Merges generated parameters into the existing list, sorted by (`in`, name).
    ///
    /// `recorded` tells whether the operation was already in the document: its
    /// earlier samples lacked any parameter first seen now.
    fn render_parameters(
        &self,
        generated: &[Parameter],
        existing: Option<&Value>,
        recorded: bool,
    ) -> Vec<Value> {
        let mut out: Vec<Value> = Vec::new();
        let existing: Vec<&Value> = existing
            .and_then(Value::as_array)
            .map(|list| list.iter().collect())
            .unwrap_or_default();

        let key_of = |param: &Value| -> (String, String) {
            let field = |k: &str| {
                param
                    .get(k)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            (field("in"), field("name"))
        };
        let generated_keys: BTreeSet<(String, String)> = generated
            .iter()
            .map(|p| (p.location.as_str().to_string(), p.name.clone()))
            .collect();
        let observed_locations: BTreeSet<&str> =
            generated.iter().map(|p| p.location.as_str()).collect();

        for prior in &existing {
            let key = key_of(prior);
            if generated_keys.contains(&key) {
                continue;
            }
            let mut kept = (*prior).clone();
            // Not seen in this batch: it can no longer be required.
            if (key.0 == "query" || key.0 == "header")
                && observed_locations.contains(key.0.as_str())
            {
                if let Some(obj) = kept.as_object_mut() {
                    if obj.get("required") == Some(&json!(true)) {
                        obj.insert("required".to_string(), json!(false));
                    }
                }
            }
            out.push(kept);
        }

        for param in generated {
            let key = (param.location.as_str().to_string(), param.name.clone());
            let prior = existing.iter().find(|p| key_of(p) == key).copied();
            out.push(self.render_parameter(param, prior, recorded));
        }

        out.sort_by(|a, b| {
            let (a_in, a_name) = key_of(a);
            let (b_in, b_name) = key_of(b);
            (location_rank(&a_in), a_name).cmp(&(location_rank(&b_in), b_name))
        });
        out
    }

    fn render_parameter(
        &self,
        param: &Parameter,
        existing: Option<&Value>,
        recorded: bool,
    ) -> Value {
        let mut obj = existing
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let was_required = obj
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(existing.is_none() && !recorded);
        let required = match param.location {
            ParamLocation::Path => true,
            _ => param.required && was_required,
        };

        obj.insert("name".to_string(), json!(param.name));
        obj.insert("in".to_string(), json!(param.location.as_str()));
        obj.insert("required".to_string(), json!(required));
        let schema = self.inferencer.reconcile(
            obj.get("schema"),
            param.schema.clone(),
            self.config.emit_enums,
        );
        obj.insert("schema".to_string(), schema);

        if param.location == ParamLocation::Query {
            if param.schema.as_object().is_some() {
                obj.entry("style").or_insert_with(|| json!("deepObject"));
                obj.entry("explode").or_insert_with(|| json!(true));
            } else if param.schema.is_array() {
                obj.entry("explode").or_insert_with(|| json!(true));
            }
        }
        Value::Object(obj)
    }

    fn render_content(
        &self,
        bodies: &BTreeMap<String, MediaBody>,
        existing: Option<&Value>,
    ) -> Value {
        let mut content = existing
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        for (media, body) in bodies {
            let mut entry = object_at(&content, media);
            let schema = self.inferencer.reconcile(
                entry.get("schema"),
                body.schema.clone(),
                self.config.emit_enums,
            );
            entry.insert("schema".to_string(), schema);
            if let (true, Some(example)) = (self.config.enable_examples, &body.example) {
                entry
                    .entry("example")
                    .or_insert_with(|| example.clone());
            }
            content.insert(media.clone(), Value::Object(entry));
        }
        Value::Object(content)
    }

    fn render_response(&self, status: u16, spec: &ResponseSpec, existing: Option<&Value>) -> Value {
        let mut response = existing
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        if !response.contains_key("description") {
            let description = spec
                .description
                .clone()
                .unwrap_or_else(|| reason_phrase(status).to_string());
            response.insert("description".to_string(), json!(description));
        }

        if !spec.headers.is_empty() {
            let mut headers = object_at(&response, "headers");
            for header in &spec.headers {
                let mut entry = object_at(&headers, &header.name);
                let schema = self.inferencer.reconcile(
                    entry.get("schema"),
                    header.schema.clone(),
                    self.config.emit_enums,
                );
                entry.insert("schema".to_string(), schema);
                headers.insert(header.name.clone(), Value::Object(entry));
            }
            response.insert("headers".to_string(), Value::Object(headers));
        }

        if !spec.content.is_empty() {
            let content = self.render_content(&spec.content, response.get("content"));
            response.insert("content".to_string(), content);
        }
        Value::Object(response)
    }
}

fn object_at(map: &Map<String, Value>, key: &str) -> Map<String, Value> {
    map.get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn header_sample(headers: &BTreeMap<String, String>) -> Sample {
    Sample::Object(
        headers
            .iter()
            .map(|(k, v)| (k.clone(), Sample::String(v.clone())))
            .collect(),
    )
}

/// Combines the annotations of every exchange of one operation.
///
/// Order independent: `deprecated` is true if any annotation says so,
/// list fields are sorted unions, text fields take the smallest value.
pub fn combine_overrides<'a>(
    overrides: impl Iterator<Item = &'a OperationOverride>,
) -> OperationOverride {
    let mut out = OperationOverride::default();
    let mut security: Option<BTreeSet<SecurityRequirement>> = None;
    let mut tags: Option<BTreeSet<String>> = None;

    for o in overrides {
        out.deprecated = match (out.deprecated, o.deprecated) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (a, b) => a.or(b),
        };
        if let Some(list) = &o.security {
            security
                .get_or_insert_with(BTreeSet::new)
                .extend(list.iter().cloned());
        }
        if let Some(list) = &o.tags {
            tags.get_or_insert_with(BTreeSet::new)
                .extend(list.iter().cloned());
        }
        out.summary = min_text(out.summary.take(), o.summary.as_ref());
        out.description = min_text(out.description.take(), o.description.as_ref());
        out.operation_id = min_text(out.operation_id.take(), o.operation_id.as_ref());
    }

    out.security = security.map(|s| s.into_iter().collect());
    out.tags = tags.map(|t| t.into_iter().collect());
    out
}

fn min_text(current: Option<String>, candidate: Option<&String>) -> Option<String> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(if b < &a { b.clone() } else { a }),
        (a, b) => a.or_else(|| b.cloned()),
    }
}

/// Body media type: declared type without parameters, or a default by content.
pub fn media_type(declared: Option<&str>, body: &Sample) -> String {
    match declared.map(|ct| ct.split(';').next().unwrap_or_default().trim()) {
        Some(ct) if !ct.is_empty() => ct.to_ascii_lowercase(),
        _ if body.contains_file() => "multipart/form-data".to_string(),
        _ => "application/json".to_string(),
    }
}

fn is_json(media: &str) -> bool {
    media == "application/json" || media.ends_with("+json")
}

/// Standard reason phrase for a status code.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        409 => "Conflict",
        410 => "Gone",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        100..=199 => "Informational",
        200..=299 => "Success",
        300..=399 => "Redirection",
        400..=499 => "Client Error",
        _ => "Server Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Method, Override};
    use pretty_assertions::assert_eq;

    fn config() -> GeneratorConfig {
        GeneratorConfig::default()
    }

    fn tables_route() -> RouteTemplate {
        RouteTemplate::parse(Method::Get, "/tables")
    }

    #[test]
    fn test_query_parameters_merge() {
        let config = config();
        let assembler = OperationAssembler::new(&config);
        let exchanges = vec![
            Exchange::new(Method::Get, "/tables", 200)
                .with_query("page", Sample::String("1".into()))
                .with_query("per", Sample::String("10".into())),
            Exchange::new(Method::Get, "/tables", 200).with_query(
                "filter",
                Sample::object([("name", Sample::String("Example Table".into()))]),
            ),
        ];
        let op = assembler.render(&assembler.assemble(&tables_route(), &exchanges), None);

        assert_eq!(
            op["parameters"],
            json!([
                {
                    "name": "filter", "in": "query", "required": false,
                    "schema": {
                        "type": "object",
                        "properties": {"name": {"type": "string"}},
                        "required": ["name"]
                    },
                    "style": "deepObject", "explode": true
                },
                {"name": "page", "in": "query", "required": false, "schema": {"type": "integer"}},
                {"name": "per", "in": "query", "required": false, "schema": {"type": "integer"}}
            ])
        );
        assert_eq!(op["responses"]["200"]["description"], json!("OK"));
    }

    #[test]
    fn test_path_parameter_from_template() {
        let config = config();
        let assembler = OperationAssembler::new(&config);
        let route = RouteTemplate::parse(Method::Get, "/tables/{id}");
        let exchanges = vec![
            Exchange::new(Method::Get, "/tables/1", 200),
            Exchange::new(Method::Get, "/tables/2", 404).with_description("returns not found"),
        ];
        let op = assembler.render(&assembler.assemble(&route, &exchanges), None);

        assert_eq!(
            op["parameters"],
            json!([{"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}])
        );
        assert_eq!(op["responses"]["404"]["description"], json!("returns not found"));
    }

    #[test]
    fn test_request_body_by_media_type() {
        let config = config();
        let assembler = OperationAssembler::new(&config);
        let route = RouteTemplate::parse(Method::Post, "/tables");
        let exchanges = vec![
            Exchange::new(Method::Post, "/tables", 201).with_request_body(
                "application/json; charset=utf-8",
                Sample::from(json!({"name": "table", "description": "d", "database_id": 2})),
            ),
            Exchange::new(Method::Post, "/tables", 422).with_request_body(
                "application/json",
                Sample::from(json!({"description": "d", "database_id": 2})),
            ),
        ];
        let op = assembler.assemble(&route, &exchanges);
        assert_eq!(op.request_body.keys().collect::<Vec<_>>(), vec!["application/json"]);
        assert_eq!(op.responses.keys().copied().collect::<Vec<_>>(), vec![201, 422]);

        let rendered = assembler.render(&op, None);
        let body = &rendered["requestBody"]["content"]["application/json"];
        assert_eq!(body["schema"]["required"], json!(["database_id", "description"]));
        assert_eq!(
            body["example"],
            json!({"database_id": 2, "description": "d", "name": "table"})
        );
    }

    #[test]
    fn test_multipart_default_media_type() {
        let body = Sample::object([("image", Sample::file("a.png", "image/png"))]);
        assert_eq!(media_type(None, &body), "multipart/form-data");
        assert_eq!(media_type(None, &Sample::Null), "application/json");
        assert_eq!(
            media_type(Some("Multipart/Form-Data; boundary=x"), &body),
            "multipart/form-data"
        );
    }

    #[test]
    fn test_header_parameters_and_response_headers() {
        let config = config();
        let assembler = OperationAssembler::new(&config);
        let exchanges = vec![
            Exchange::new(Method::Get, "/tables", 200)
                .with_request_header("X-Authorization-Token", "token")
                .with_response_header("X-Cursor", "100"),
            Exchange::new(Method::Get, "/tables", 200)
                .with_request_header("X-Authorization-Token", "token")
                .with_request_header("Secret-Key", "42"),
        ];
        let op = assembler.render(&assembler.assemble(&tables_route(), &exchanges), None);

        assert_eq!(
            op["parameters"],
            json!([
                {
                    "name": "Secret-Key", "in": "header", "required": false,
                    "schema": {"type": "integer"}
                },
                {
                    "name": "X-Authorization-Token", "in": "header", "required": true,
                    "schema": {"type": "string"}
                }
            ])
        );
        assert_eq!(
            op["responses"]["200"]["headers"],
            json!({"X-Cursor": {"schema": {"type": "integer"}}})
        );
    }

    #[test]
    fn test_existing_metadata_is_preserved() {
        let config = config();
        let assembler = OperationAssembler::new(&config);
        let mut exchange = Exchange::new(Method::Get, "/tables", 200);
        exchange.summary = Some("index".into());
        exchange.tags = vec!["Table".into()];

        let existing = json!({
            "summary": "List tables",
            "x-internal": true,
            "responses": {"200": {"description": "All tables"}}
        });
        let op = assembler.render(
            &assembler.assemble(&tables_route(), &[exchange.clone()]),
            Some(&existing),
        );
        assert_eq!(op["summary"], json!("List tables"));
        assert_eq!(op["tags"], json!(["Table"]));
        assert_eq!(op["x-internal"], json!(true));
        assert_eq!(op["responses"]["200"]["description"], json!("All tables"));

        let fresh = assembler.render(&assembler.assemble(&tables_route(), &[exchange]), None);
        assert_eq!(fresh["summary"], json!("index"));
    }

    #[test]
    fn test_forced_fields_take_precedence() {
        let config = config();
        let assembler = OperationAssembler::new(&config);
        let forced = |o: OperationOverride| {
            Exchange::new(Method::Get, "/tables", 200).with_override(Override::Fields(o))
        };
        let exchanges = vec![
            forced(OperationOverride {
                deprecated: Some(true),
                summary: Some("b".into()),
                ..Default::default()
            }),
            forced(OperationOverride {
                deprecated: Some(false),
                summary: Some("a".into()),
                ..Default::default()
            }),
            Exchange::new(Method::Get, "/tables", 200),
        ];
        let existing = json!({"summary": "on disk", "responses": {}});
        let op = assembler.render(
            &assembler.assemble(&tables_route(), &exchanges),
            Some(&existing),
        );
        assert_eq!(op["deprecated"], json!(true));
        assert_eq!(op["summary"], json!("a"));
    }

    #[test]
    fn test_combine_overrides_is_order_independent() {
        let a = OperationOverride {
            security: Some(vec![BTreeMap::from([("B".to_string(), vec![])])]),
            tags: Some(vec!["x".into()]),
            ..Default::default()
        };
        let b = OperationOverride {
            security: Some(vec![BTreeMap::from([("A".to_string(), vec![])])]),
            tags: Some(vec!["w".into(), "x".into()]),
            operation_id: Some("listTables".into()),
            ..Default::default()
        };
        let ab = combine_overrides([&a, &b].into_iter());
        let ba = combine_overrides([&b, &a].into_iter());
        assert_eq!(ab, ba);
        assert_eq!(ab.tags, Some(vec!["w".to_string(), "x".to_string()]));
        assert_eq!(ab.deprecated, None);
        assert_eq!(ab.operation_id.as_deref(), Some("listTables"));
    }

    #[test]
    fn test_unobserved_parameter_loses_required() {
        let config = config();
        let assembler = OperationAssembler::new(&config);
        let existing = json!({
            "parameters": [{
                "name": "page", "in": "query", "required": true,
                "schema": {"type": "integer"}, "description": "Page"
            }],
            "responses": {}
        });
        let exchanges = vec![
            Exchange::new(Method::Get, "/tables", 200).with_query("per", Sample::String("5".into()))
        ];
        let op = assembler.render(
            &assembler.assemble(&tables_route(), &exchanges),
            Some(&existing),
        );
        assert_eq!(
            op["parameters"][0],
            json!({
                "name": "page", "in": "query", "required": false,
                "schema": {"type": "integer"}, "description": "Page"
            })
        );
        // Earlier samples of the operation did not carry it.
        assert_eq!(op["parameters"][1]["name"], json!("per"));
        assert_eq!(op["parameters"][1]["required"], json!(false));
    }

    #[test]
    fn test_new_operation_keeps_observed_required() {
        let config = config();
        let assembler = OperationAssembler::new(&config);
        let exchanges = vec![
            Exchange::new(Method::Get, "/tables", 200).with_query("per", Sample::String("5".into()))
        ];
        let op = assembler.render(&assembler.assemble(&tables_route(), &exchanges), None);
        assert_eq!(op["parameters"][0]["required"], json!(true));

        let hand_written = json!({"responses": {}});
        let op = assembler.render(
            &assembler.assemble(&tables_route(), &exchanges),
            Some(&hand_written),
        );
        assert_eq!(op["parameters"][0]["required"], json!(false));
    }

    #[test]
    fn test_reason_phrase_fallbacks() {
        assert_eq!(reason_phrase(201), "Created");
        assert_eq!(reason_phrase(299), "Success");
        assert_eq!(reason_phrase(599), "Server Error");
    }
}
