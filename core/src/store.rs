//! # Document Store
//!
//! Reads and writes the persisted document.
//!
//! Writes are atomic: the encoded document goes to a temporary file in the
//! destination directory and is then renamed over the target, so readers
//! only ever see the previous or the new document.

use crate::config::{DocumentFormat, GeneratorConfig};
use crate::error::{AppError, AppResult};
use serde_json::{Map, Number, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// File-backed document persistence.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
    format: DocumentFormat,
    comment: Option<String>,
}

impl DocumentStore {
    /// Creates a store for `path` in `format`.
    pub fn new(path: impl Into<PathBuf>, format: DocumentFormat) -> Self {
        Self {
            path: path.into(),
            format,
            comment: None,
        }
    }

    /// Creates the store a configuration describes.
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            path: config.path.clone(),
            format: config.output_format(),
            comment: config.comment.clone(),
        }
    }

    /// Sets the comment header written above YAML output.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the existing document. `None` when the file is absent or empty.
    pub fn load(&self) -> AppResult<Option<Value>> {
        if !self.path.exists() {
            debug!(path = ?self.path, "No existing document");
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let value = self.decode(&content).map_err(|e| match e {
            AppError::Parse(msg) => {
                AppError::Parse(format!("Failed to parse {:?}: {}", self.path, msg))
            }
            other => other,
        })?;
        Ok((!value.is_null()).then_some(value))
    }

    /// Decodes document text in the store's format.
    pub fn decode(&self, content: &str) -> AppResult<Value> {
        match self.format {
            DocumentFormat::Json => {
                serde_json::from_str(content).map_err(|e| AppError::Parse(e.to_string()))
            }
            DocumentFormat::Yaml => {
                let yaml: serde_yaml::Value =
                    serde_yaml::from_str(content).map_err(|e| AppError::Parse(e.to_string()))?;
                yaml_to_json(yaml)
            }
        }
    }

    /// Encodes a document in the store's format.
    pub fn encode(&self, document: &Value) -> AppResult<String> {
        match self.format {
            DocumentFormat::Json => {
                let mut out = serde_json::to_string_pretty(document)
                    .map_err(|e| AppError::Serialization(e.to_string()))?;
                out.push('\n');
                Ok(out)
            }
            DocumentFormat::Yaml => {
                let body = serde_yaml::to_string(document)
                    .map_err(|e| AppError::Serialization(e.to_string()))?;
                let mut out = String::new();
                if let Some(comment) = &self.comment {
                    for line in comment.lines() {
                        if line.is_empty() {
                            out.push_str("#\n");
                        } else {
                            out.push_str("# ");
                            out.push_str(line);
                            out.push('\n');
                        }
                    }
                }
                out.push_str(&body);
                Ok(out)
            }
        }
    }

    /// Atomically replaces the document on disk.
    pub fn save(&self, document: &Value) -> AppResult<()> {
        let encoded = self.encode(document)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(encoded.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| AppError::Io(e.error))?;

        debug!(path = ?self.path, bytes = encoded.len(), "Wrote document");
        Ok(())
    }
}

/// Converts YAML into JSON, stringifying non-string mapping keys (`200:`).
fn yaml_to_json(value: serde_yaml::Value) -> AppResult<Value> {
    use serde_yaml::Value as Yaml;
    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Value::Number(Number::from_f64(f).ok_or_else(|| {
                    AppError::Parse(format!("Number {} has no JSON representation", n))
                })?)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<AppResult<Vec<_>>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(yaml_key(key)?, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn yaml_key(key: serde_yaml::Value) -> AppResult<String> {
    use serde_yaml::Value as Yaml;
    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        other => Err(AppError::Parse(format!(
            "Unsupported mapping key: {:?}",
            other
        ))),
    }
}
