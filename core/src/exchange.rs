//! # Exchanges
//!
//! The record a test-runner adapter hands to the engine: one HTTP
//! request/response pair plus the per-test annotation that travelled with it.
//!
//! Bodies and query strings are carried as [`Sample`] trees. On the wire
//! (exchange logs) a sample is plain JSON, except for two reserved single-key
//! objects:
//!
//! - `{"$file": {"filename": "a.png", "content_type": "image/png"}}` is an uploaded file.
//! - `{"$binary": 1024}` is an opaque binary payload of the given length.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// HTTP method of an operation.
///
/// The declaration order is the order methods are written inside a path item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Method {
    /// `GET`
    Get,
    /// `PUT`
    Put,
    /// `POST`
    Post,
    /// `DELETE`
    Delete,
    /// `OPTIONS`
    Options,
    /// `HEAD`
    Head,
    /// `PATCH`
    Patch,
    /// `TRACE`
    Trace,
}

impl Method {
    /// All methods, in path item order.
    pub const ALL: [Method; 8] = [
        Method::Get,
        Method::Put,
        Method::Post,
        Method::Delete,
        Method::Options,
        Method::Head,
        Method::Patch,
        Method::Trace,
    ];

    /// The lowercase key used inside an OpenAPI path item.
    pub fn as_key(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Put => "put",
            Method::Post => "post",
            Method::Delete => "delete",
            Method::Options => "options",
            Method::Head => "head",
            Method::Patch => "patch",
            Method::Trace => "trace",
        }
    }

    /// Looks up a method by its path item key (case-insensitive).
    pub fn from_key(key: &str) -> Option<Method> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_key().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_key().to_ascii_uppercase())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::from_key(s).ok_or_else(|| format!("Unsupported HTTP method '{}'", s))
    }
}

impl TryFrom<String> for Method {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        method.to_string()
    }
}

/// Metadata of an uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpload {
    /// Original file name, if the client sent one.
    pub filename: Option<String>,
    /// Declared part content type (e.g. `image/png`).
    pub content_type: Option<String>,
}

/// A concrete observed value: body, query string, or header value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Sample {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// Integral number.
    Integer(i64),
    /// Any other number.
    Number(f64),
    /// Text.
    String(String),
    /// A file upload placeholder.
    File(FileUpload),
    /// An opaque binary payload that is not a file upload (length in bytes).
    Binary(usize),
    /// Sequence, including `images[]`-style repeated form fields.
    Array(Vec<Sample>),
    /// Mapping, including nested (`filter[name]=x`) query parameters.
    Object(BTreeMap<String, Sample>),
}

const FILE_KEY: &str = "$file";
const BINARY_KEY: &str = "$binary";

impl Sample {
    /// Builds an object sample from `(key, value)` pairs.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Sample)>) -> Self {
        Sample::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds a file placeholder.
    pub fn file(filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Sample::File(FileUpload {
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
        })
    }

    /// Whether the tree contains a file placeholder anywhere.
    pub fn contains_file(&self) -> bool {
        match self {
            Sample::File(_) => true,
            Sample::Array(items) => items.iter().any(Sample::contains_file),
            Sample::Object(map) => map.values().any(Sample::contains_file),
            _ => false,
        }
    }

    /// Re-types textual scalars that spell a canonical integer (`"42"`).
    ///
    /// Applied to path, query, and header values, which always arrive as text.
    pub fn coerce_scalars(self) -> Sample {
        match self {
            Sample::String(s) => match s.parse::<i64>() {
                Ok(n) if n.to_string() == s => Sample::Integer(n),
                _ => Sample::String(s),
            },
            Sample::Array(items) => {
                Sample::Array(items.into_iter().map(Sample::coerce_scalars).collect())
            }
            Sample::Object(map) => Sample::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.coerce_scalars()))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Renders the sample as a plain JSON example value.
    ///
    /// Unlike the wire form, file placeholders become their file name.
    pub fn to_example(&self) -> Value {
        match self {
            Sample::File(file) => json!(file.filename.clone().unwrap_or_default()),
            Sample::Binary(_) => json!(""),
            Sample::Array(items) => Value::Array(items.iter().map(Sample::to_example).collect()),
            Sample::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_example()))
                    .collect(),
            ),
            other => Value::from(other.clone()),
        }
    }
}

impl From<Value> for Sample {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Sample::Null,
            Value::Bool(b) => Sample::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Sample::Integer(i),
                None => Sample::Number(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Sample::String(s),
            Value::Array(items) => Sample::Array(items.into_iter().map(Sample::from).collect()),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(Value::Object(file)) = map.get(FILE_KEY) {
                        let field =
                            |key: &str| file.get(key).and_then(Value::as_str).map(String::from);
                        return Sample::File(FileUpload {
                            filename: field("filename"),
                            content_type: field("content_type"),
                        });
                    }
                    if let Some(len) = map.get(BINARY_KEY).and_then(Value::as_u64) {
                        return Sample::Binary(usize::try_from(len).unwrap_or(usize::MAX));
                    }
                }
                Sample::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, Sample::from(v)))
                        .collect(),
                )
            }
        }
    }
}

impl From<Sample> for Value {
    fn from(sample: Sample) -> Self {
        match sample {
            Sample::Null => Value::Null,
            Sample::Bool(b) => json!(b),
            Sample::Integer(i) => json!(i),
            Sample::Number(n) => json!(n),
            Sample::String(s) => Value::String(s),
            Sample::File(file) => {
                let mut inner = Map::new();
                if let Some(name) = file.filename {
                    inner.insert("filename".to_string(), json!(name));
                }
                if let Some(ct) = file.content_type {
                    inner.insert("content_type".to_string(), json!(ct));
                }
                json!({ FILE_KEY: inner })
            }
            Sample::Binary(len) => json!({ BINARY_KEY: len }),
            Sample::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Sample::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// One security requirement: scheme name ➜ required scopes.
pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

/// The closed set of operation-object fields a test may force onto the
/// generated operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct OperationOverride {
    /// Marks the operation deprecated (or explicitly not).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    /// Replaces the operation's security requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,
    /// Replaces the operation summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Replaces the operation description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Replaces the operation tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Replaces the operation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

impl OperationOverride {
    /// Whether no field is forced.
    pub fn is_empty(&self) -> bool {
        self == &OperationOverride::default()
    }
}

/// Per-test instruction attached to an exchange.
///
/// Serialized as `false` (skip) or as a mapping of operation fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OverrideRepr", into = "OverrideRepr")]
pub enum Override {
    /// Never record this exchange.
    Skip,
    /// Record it and force these fields onto the operation.
    Fields(OperationOverride),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum OverrideRepr {
    Flag(bool),
    Fields(OperationOverride),
}

impl From<OverrideRepr> for Override {
    fn from(repr: OverrideRepr) -> Self {
        match repr {
            OverrideRepr::Flag(false) => Override::Skip,
            OverrideRepr::Flag(true) => Override::Fields(OperationOverride::default()),
            OverrideRepr::Fields(fields) => Override::Fields(fields),
        }
    }
}

impl From<Override> for OverrideRepr {
    fn from(value: Override) -> Self {
        match value {
            Override::Skip => OverrideRepr::Flag(false),
            Override::Fields(fields) if fields.is_empty() => OverrideRepr::Flag(true),
            Override::Fields(fields) => OverrideRepr::Fields(fields),
        }
    }
}

/// One observed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// Request method.
    pub method: Method,
    /// Raw request path. May still carry a query string.
    pub path: String,
    /// Query parameters (flat or nested).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, Sample>,
    /// Request headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_headers: BTreeMap<String, String>,
    /// Declared request media type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_content_type: Option<String>,
    /// Request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Sample>,
    /// Response status code.
    pub status: u16,
    /// Response headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_headers: BTreeMap<String, String>,
    /// Declared response media type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_content_type: Option<String>,
    /// Response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Sample>,
    /// Test case description; becomes the response description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Suggested operation summary (e.g. the action name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Suggested operation tags (e.g. the test group).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Suggested operation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Per-test annotation.
    #[serde(default, rename = "openapi", skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Override>,
}

impl Exchange {
    /// Creates an exchange with no query, headers, or bodies.
    pub fn new(method: Method, path: impl Into<String>, status: u16) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            request_headers: BTreeMap::new(),
            request_content_type: None,
            request_body: None,
            status,
            response_headers: BTreeMap::new(),
            response_content_type: None,
            response_body: None,
            description: None,
            summary: None,
            tags: Vec::new(),
            operation_id: None,
            annotation: None,
        }
    }

    /// Adds a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: Sample) -> Self {
        self.query.insert(name.into(), value);
        self
    }

    /// Adds a request header.
    pub fn with_request_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.request_headers.insert(name.into(), value.into());
        self
    }

    /// Sets the request body and its media type.
    pub fn with_request_body(mut self, content_type: impl Into<String>, body: Sample) -> Self {
        self.request_content_type = Some(content_type.into());
        self.request_body = Some(body);
        self
    }

    /// Adds a response header.
    pub fn with_response_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.response_headers.insert(name.into(), value.into());
        self
    }

    /// Sets the response body and its media type.
    pub fn with_response_body(mut self, content_type: impl Into<String>, body: Sample) -> Self {
        self.response_content_type = Some(content_type.into());
        self.response_body = Some(body);
        self
    }

    /// Sets the test case description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attaches a per-test annotation.
    pub fn with_override(mut self, annotation: Override) -> Self {
        self.annotation = Some(annotation);
        self
    }

    /// Forced operation fields, if any.
    pub fn forced_fields(&self) -> Option<&OperationOverride> {
        match &self.annotation {
            Some(Override::Fields(fields)) => Some(fields),
            _ => None,
        }
    }

    /// Whether the test opted out of generation.
    pub fn is_skipped(&self) -> bool {
        matches!(self.annotation, Some(Override::Skip))
    }
}
