//! # Generator Configuration
//!
//! The explicit configuration value consumed by every pipeline component.
//! Constructed once (from a YAML/JSON file, builders, or CLI flags) and passed
//! by reference; no component looks anything up globally.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Title written into fresh documents when none is configured.
pub const DEFAULT_TITLE: &str = "OpenAPI Documentation";

/// Version written into fresh documents when none is configured.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Default number of distinct literals tracked before an enumeration hint is dropped.
pub const DEFAULT_ENUM_THRESHOLD: usize = 10;

/// Serialization format of the document file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// YAML (`.yaml` / `.yml`).
    Yaml,
    /// JSON (`.json`).
    Json,
}

impl DocumentFormat {
    /// Guesses the format from a file extension, defaulting to YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(DocumentFormat::Yaml),
            "json" => Ok(DocumentFormat::Json),
            other => Err(format!("Unknown document format '{}'", other)),
        }
    }
}

/// License metadata for the `info` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// License name.
    pub name: String,
    /// License URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// An entry of the `servers` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Server URL.
    pub url: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Server {
    /// Creates a server entry.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            description: None,
        }
    }
}

/// Configuration of a generation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Document title (`info.title`).
    pub title: Option<String>,
    /// Application version (`info.version`).
    pub version: Option<String>,
    /// Document description (`info.description`).
    pub description: Option<String>,
    /// Document license (`info.license`).
    pub license: Option<License>,
    /// Server list. Replaces the on-disk list when non-empty.
    pub servers: Vec<Server>,
    /// Named security schemes, merged into `components.securitySchemes` by name.
    pub security_schemes: BTreeMap<String, Value>,
    /// Ignored paths. Exact paths, `/prefix*` string prefixes, or path-segment prefixes.
    pub ignored_paths: Vec<String>,
    /// Request header names that may be recorded.
    pub request_headers: Vec<String>,
    /// Response header names that may be recorded.
    pub response_headers: Vec<String>,
    /// Output document path.
    pub path: PathBuf,
    /// Output format. Defaults from the extension of `path`.
    pub format: Option<DocumentFormat>,
    /// Comment header written at the top of YAML output.
    pub comment: Option<String>,
    /// Whether `example` values are written for bodies.
    pub enable_examples: bool,
    /// Distinct literal values tracked per field before an enumeration hint is dropped.
    pub enum_threshold: usize,
    /// Whether enumeration hints are written as `enum`.
    pub emit_enums: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            title: None,
            version: None,
            description: None,
            license: None,
            servers: Vec::new(),
            security_schemes: BTreeMap::new(),
            ignored_paths: Vec::new(),
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            path: PathBuf::from("doc/openapi.yaml"),
            format: None,
            comment: None,
            enable_examples: true,
            enum_threshold: DEFAULT_ENUM_THRESHOLD,
            emit_enums: false,
        }
    }
}

impl GeneratorConfig {
    /// Creates a configuration writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Loads a configuration file (YAML or JSON) and validates it.
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: GeneratorConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants the deserializer cannot express.
    pub fn validate(&self) -> AppResult<()> {
        for (name, scheme) in &self.security_schemes {
            let has_type = scheme
                .as_object()
                .and_then(|o| o.get("type"))
                .is_some_and(Value::is_string);
            if !has_type {
                return Err(AppError::Config(format!(
                    "Security scheme '{}' must be an object with a 'type'",
                    name
                )));
            }
        }
        if let Some(bad) = self.ignored_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(AppError::Config(format!(
                "Ignored path '{}' must start with '/'",
                bad
            )));
        }
        Ok(())
    }

    /// Sets the document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the application version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the document description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the license.
    pub fn with_license(mut self, license: License) -> Self {
        self.license = Some(license);
        self
    }

    /// Adds a server.
    pub fn with_server(mut self, server: Server) -> Self {
        self.servers.push(server);
        self
    }

    /// Registers a security scheme.
    pub fn with_security_scheme(mut self, name: impl Into<String>, scheme: Value) -> Self {
        self.security_schemes.insert(name.into(), scheme);
        self
    }

    /// Adds an ignored path.
    pub fn with_ignored_path(mut self, path: impl Into<String>) -> Self {
        self.ignored_paths.push(path.into());
        self
    }

    /// Sets the request header allow-list.
    pub fn with_request_headers<S: Into<String>>(
        mut self,
        headers: impl IntoIterator<Item = S>,
    ) -> Self {
        self.request_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the response header allow-list.
    pub fn with_response_headers<S: Into<String>>(
        mut self,
        headers: impl IntoIterator<Item = S>,
    ) -> Self {
        self.response_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the output format explicitly.
    pub fn with_format(mut self, format: DocumentFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Sets the YAML comment header.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Enables or disables `example` output.
    pub fn with_examples(mut self, enabled: bool) -> Self {
        self.enable_examples = enabled;
        self
    }

    /// Enables or disables `enum` output.
    pub fn with_enums(mut self, enabled: bool) -> Self {
        self.emit_enums = enabled;
        self
    }

    /// Effective output format.
    pub fn output_format(&self) -> DocumentFormat {
        self.format
            .unwrap_or_else(|| DocumentFormat::from_path(&self.path))
    }

    /// Whether a concrete request path is excluded from generation.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignored_paths.iter().any(|entry| {
            if let Some(prefix) = entry.strip_suffix('*') {
                return path.starts_with(prefix);
            }
            let entry = entry.trim_end_matches('/');
            path == entry
                || path
                    .strip_prefix(entry)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Canonical spelling of an allow-listed request header, if `name` is allowed.
    pub fn allowed_request_header(&self, name: &str) -> Option<&str> {
        find_header(&self.request_headers, name)
    }

    /// Canonical spelling of an allow-listed response header, if `name` is allowed.
    pub fn allowed_response_header(&self, name: &str) -> Option<&str> {
        find_header(&self.response_headers, name)
    }
}

/// Compares header names the way test frameworks mangle them:
/// case-insensitive, `_` equal to `-`, and an optional CGI `HTTP_` prefix.
fn find_header<'a>(allowed: &'a [String], name: &str) -> Option<&'a str> {
    let wanted = header_key(name);
    let wanted = wanted.strip_prefix("http-").map_or(wanted.as_str(), |s| s);
    allowed
        .iter()
        .find(|a| header_key(a) == wanted || header_key(a) == header_key(name))
        .map(String::as_str)
}

fn header_key(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('_', "-")
}
