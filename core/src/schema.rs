//! # Schema Inference
//!
//! A closed lattice of structural types inferred from [`Sample`] values.
//!
//! `merge` is a total function over every pair of kinds. It is commutative,
//! associative, and idempotent, so a batch of samples folds to the same node
//! in any order, and re-merging a document's own output changes nothing.
//!
//! * `null` never widens a type; it sets the `nullable` flag.
//! * `required` of a merged object is the intersection of both sides.
//! * Incompatible kinds become a `union` with at most one member per class
//!   (boolean, numeric, string, array, object).

use crate::config::DEFAULT_ENUM_THRESHOLD;
use crate::exchange::Sample;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Keys of a schema object that the engine writes itself.
const STRUCTURAL_KEYS: [&str; 7] = [
    "type",
    "format",
    "nullable",
    "items",
    "properties",
    "required",
    "oneOf",
];

/// Keys that make a schema opaque to the engine.
const OPAQUE_KEYS: [&str; 5] = ["$ref", "allOf", "anyOf", "not", "additionalProperties"];

/// A literal value collected for enumeration hints.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Literal {
    /// Integer literal.
    Integer(i64),
    /// String literal.
    String(String),
}

impl Literal {
    fn to_value(&self) -> Value {
        match self {
            Literal::Integer(i) => json!(i),
            Literal::String(s) => json!(s),
        }
    }
}

/// The literal values a scalar field was seen with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    /// At most `enum_threshold` distinct values.
    Values(BTreeSet<Literal>),
    /// Too many values, or values that cannot be enumerated.
    Unbounded,
}

impl Observed {
    fn single(literal: Literal, threshold: usize) -> Self {
        Observed::Values(BTreeSet::from([literal])).bounded(threshold)
    }

    fn bounded(self, threshold: usize) -> Self {
        match self {
            Observed::Values(values) if !values.is_empty() && values.len() <= threshold => {
                Observed::Values(values)
            }
            _ => Observed::Unbounded,
        }
    }

    fn merge(self, other: Observed, threshold: usize) -> Self {
        match (self, other) {
            (Observed::Values(mut a), Observed::Values(b)) => {
                a.extend(b);
                Observed::Values(a).bounded(threshold)
            }
            _ => Observed::Unbounded,
        }
    }
}

/// The tag of a [`SchemaNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaKind {
    /// Only `null` was seen.
    Null,
    /// `boolean`.
    Boolean,
    /// `integer`.
    Integer(Observed),
    /// `number`.
    Number,
    /// `string`, with an optional `format` (`binary` for uploads).
    String {
        /// Format shared by every sample, if any.
        format: Option<String>,
        /// Enumeration hint.
        values: Observed,
    },
    /// `array`. `None` items means only empty arrays were seen.
    Array(Option<Box<SchemaNode>>),
    /// `object`.
    Object {
        /// Per-key schemas over the union of observed keys.
        properties: BTreeMap<String, SchemaNode>,
        /// Keys present in every sample.
        required: BTreeSet<String>,
    },
    /// Incompatible kinds, one per class, sorted by class.
    Union(Vec<SchemaKind>),
}

impl SchemaKind {
    /// Union-member class. Members never hold `Null` or `Union`.
    fn class(&self) -> u8 {
        match self {
            SchemaKind::Null => 0,
            SchemaKind::Boolean => 1,
            SchemaKind::Integer(_) | SchemaKind::Number => 2,
            SchemaKind::String { .. } => 3,
            SchemaKind::Array(_) => 4,
            SchemaKind::Object { .. } => 5,
            SchemaKind::Union(_) => 6,
        }
    }

    fn into_members(self) -> Vec<SchemaKind> {
        match self {
            SchemaKind::Null => Vec::new(),
            SchemaKind::Union(members) => members,
            other => vec![other],
        }
    }

    fn type_name(&self) -> Option<&'static str> {
        match self {
            SchemaKind::Boolean => Some("boolean"),
            SchemaKind::Integer(_) => Some("integer"),
            SchemaKind::Number => Some("number"),
            SchemaKind::String { .. } => Some("string"),
            SchemaKind::Array(_) => Some("array"),
            SchemaKind::Object { .. } => Some("object"),
            SchemaKind::Null | SchemaKind::Union(_) => None,
        }
    }
}

/// A structural type plus its nullability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNode {
    /// The tag and its payload.
    pub kind: SchemaKind,
    /// Whether `null` was observed.
    pub nullable: bool,
}

impl SchemaNode {
    /// A non-nullable node of the given kind.
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    /// The object properties and required set, if this is an object.
    pub fn as_object(&self) -> Option<(&BTreeMap<String, SchemaNode>, &BTreeSet<String>)> {
        match &self.kind {
            SchemaKind::Object {
                properties,
                required,
            } => Some((properties, required)),
            _ => None,
        }
    }

    /// Whether this is an array node.
    pub fn is_array(&self) -> bool {
        matches!(self.kind, SchemaKind::Array(_))
    }

    /// Renders the node as an OpenAPI schema object.
    ///
    /// Key order is fixed: `type`, `format`, `nullable`, `enum`, `items`,
    /// `properties`, `required`, `oneOf`.
    pub fn to_value(&self, emit_enums: bool) -> Value {
        Value::Object(render_kind(&self.kind, self.nullable, emit_enums))
    }
}

fn render_kind(kind: &SchemaKind, nullable: bool, emit_enums: bool) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(name) = kind.type_name() {
        out.insert("type".to_string(), json!(name));
    }
    if let SchemaKind::String {
        format: Some(format),
        ..
    } = kind
    {
        out.insert("format".to_string(), json!(format));
    }
    if nullable || matches!(kind, SchemaKind::Null) {
        out.insert("nullable".to_string(), json!(true));
    }

    if emit_enums {
        if let SchemaKind::Integer(Observed::Values(values))
        | SchemaKind::String {
            values: Observed::Values(values),
            ..
        } = kind
        {
            let mut literals: Vec<Value> = values.iter().map(Literal::to_value).collect();
            if nullable {
                literals.push(Value::Null);
            }
            out.insert("enum".to_string(), Value::Array(literals));
        }
    }

    match kind {
        SchemaKind::Array(items) => {
            let items = match items {
                Some(node) => node.to_value(emit_enums),
                None => json!({}),
            };
            out.insert("items".to_string(), items);
        }
        SchemaKind::Object {
            properties,
            required,
        } => {
            if !properties.is_empty() {
                let props: Map<String, Value> = properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value(emit_enums)))
                    .collect();
                out.insert("properties".to_string(), Value::Object(props));
            }
            if !required.is_empty() {
                out.insert("required".to_string(), json!(required));
            }
        }
        SchemaKind::Union(members) => {
            let branches: Vec<Value> = members
                .iter()
                .map(|m| Value::Object(render_kind(m, false, emit_enums)))
                .collect();
            out.insert("oneOf".to_string(), Value::Array(branches));
        }
        _ => {}
    }
    out
}

/// Infers and merges [`SchemaNode`]s.
#[derive(Debug, Clone, Copy)]
pub struct Inferencer {
    /// Maximum number of distinct literals kept as an enumeration hint.
    pub enum_threshold: usize,
}

impl Default for Inferencer {
    fn default() -> Self {
        Self::new(DEFAULT_ENUM_THRESHOLD)
    }
}

impl Inferencer {
    /// Creates an inferencer with the given enumeration threshold.
    pub fn new(enum_threshold: usize) -> Self {
        Self { enum_threshold }
    }

    /// Derives a node from one sample.
    pub fn infer(&self, sample: &Sample) -> SchemaNode {
        match sample {
            Sample::Null => SchemaNode {
                kind: SchemaKind::Null,
                nullable: true,
            },
            Sample::Bool(_) => SchemaNode::new(SchemaKind::Boolean),
            Sample::Integer(i) => SchemaNode::new(SchemaKind::Integer(Observed::single(
                Literal::Integer(*i),
                self.enum_threshold,
            ))),
            Sample::Number(_) => SchemaNode::new(SchemaKind::Number),
            Sample::String(s) => SchemaNode::new(SchemaKind::String {
                format: None,
                values: Observed::single(Literal::String(s.clone()), self.enum_threshold),
            }),
            Sample::File(_) => SchemaNode::new(SchemaKind::String {
                format: Some("binary".to_string()),
                values: Observed::Unbounded,
            }),
            Sample::Binary(len) => {
                warn!(bytes = len, "Opaque binary sample typed as plain string");
                SchemaNode::new(SchemaKind::String {
                    format: None,
                    values: Observed::Unbounded,
                })
            }
            Sample::Array(items) => {
                let item = self.infer_all(items);
                SchemaNode::new(SchemaKind::Array(item.map(Box::new)))
            }
            Sample::Object(map) => SchemaNode::new(SchemaKind::Object {
                properties: map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.infer(v)))
                    .collect(),
                required: map.keys().cloned().collect(),
            }),
        }
    }

    /// Folds the inference of several samples. `None` for an empty input.
    pub fn infer_all<'a>(
        &self,
        samples: impl IntoIterator<Item = &'a Sample>,
    ) -> Option<SchemaNode> {
        samples
            .into_iter()
            .map(|s| self.infer(s))
            .reduce(|acc, node| self.merge(acc, node))
    }

    /// Merges two nodes. Conventionally called as `(prior, new)`.
    pub fn merge(&self, a: SchemaNode, b: SchemaNode) -> SchemaNode {
        SchemaNode {
            nullable: a.nullable || b.nullable,
            kind: self.merge_kind(a.kind, b.kind),
        }
    }

    fn merge_kind(&self, a: SchemaKind, b: SchemaKind) -> SchemaKind {
        let mut members: Vec<SchemaKind> = Vec::new();
        for kind in a.into_members().into_iter().chain(b.into_members()) {
            match members.iter().position(|m| m.class() == kind.class()) {
                Some(i) => {
                    let prior = members.remove(i);
                    members.push(self.merge_member(prior, kind));
                }
                None => members.push(kind),
            }
        }
        members.sort_by_key(SchemaKind::class);
        match members.len() {
            0 => SchemaKind::Null,
            1 => members.remove(0),
            _ => SchemaKind::Union(members),
        }
    }

    /// Merges two kinds of the same class.
    fn merge_member(&self, a: SchemaKind, b: SchemaKind) -> SchemaKind {
        match (a, b) {
            (SchemaKind::Integer(x), SchemaKind::Integer(y)) => {
                SchemaKind::Integer(x.merge(y, self.enum_threshold))
            }
            (
                SchemaKind::Integer(_) | SchemaKind::Number,
                SchemaKind::Integer(_) | SchemaKind::Number,
            ) => SchemaKind::Number,
            (
                SchemaKind::String {
                    format: f1,
                    values: v1,
                },
                SchemaKind::String {
                    format: f2,
                    values: v2,
                },
            ) => SchemaKind::String {
                format: if f1 == f2 { f1 } else { None },
                values: v1.merge(v2, self.enum_threshold),
            },
            (SchemaKind::Array(x), SchemaKind::Array(y)) => SchemaKind::Array(match (x, y) {
                (Some(x), Some(y)) => Some(Box::new(self.merge(*x, *y))),
                (x, None) => x,
                (None, y) => y,
            }),
            (
                SchemaKind::Object {
                    properties: mut p1,
                    required: r1,
                },
                SchemaKind::Object {
                    properties: p2,
                    required: r2,
                },
            ) => {
                for (key, node) in p2 {
                    let merged = match p1.remove(&key) {
                        Some(prior) => self.merge(prior, node),
                        None => node,
                    };
                    p1.insert(key, merged);
                }
                SchemaKind::Object {
                    properties: p1,
                    required: r1.intersection(&r2).cloned().collect(),
                }
            }
            (a, _) => a,
        }
    }

    /// Reads an existing schema object back into the lattice.
    ///
    /// Returns `None` for schemas the engine does not interpret (`$ref`,
    /// `allOf`, free-form `{}`, ...); callers keep those verbatim.
    pub fn from_value(&self, value: &Value) -> Option<SchemaNode> {
        let obj = value.as_object()?;
        if OPAQUE_KEYS.iter().any(|k| obj.contains_key(*k)) {
            return None;
        }

        let mut nullable = obj.get("nullable").and_then(Value::as_bool).unwrap_or(false);
        let type_name = match obj.get("type") {
            None => None,
            Some(Value::String(t)) => Some(t.as_str()),
            Some(Value::Array(types)) => {
                let mut named: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
                if named.len() != types.len() {
                    return None;
                }
                if let Some(i) = named.iter().position(|t| *t == "null") {
                    named.remove(i);
                    nullable = true;
                }
                match named.as_slice() {
                    [] => None,
                    [single] => Some(*single),
                    _ => return None,
                }
            }
            Some(_) => return None,
        };

        let kind = match type_name {
            Some("boolean") => SchemaKind::Boolean,
            Some("integer") => SchemaKind::Integer(self.observed(obj)),
            Some("number") => SchemaKind::Number,
            Some("string") => SchemaKind::String {
                format: obj.get("format").and_then(Value::as_str).map(String::from),
                values: self.observed(obj),
            },
            Some("array") => match obj.get("items") {
                None => SchemaKind::Array(None),
                Some(items) if items.as_object().is_some_and(Map::is_empty) => {
                    SchemaKind::Array(None)
                }
                Some(items) => SchemaKind::Array(Some(Box::new(self.from_value(items)?))),
            },
            Some("object") => {
                let mut properties = BTreeMap::new();
                if let Some(props) = obj.get("properties") {
                    for (key, schema) in props.as_object()? {
                        properties.insert(key.clone(), self.from_value(schema)?);
                    }
                }
                let required = obj
                    .get("required")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                    .filter(|k| properties.contains_key(*k))
                    .map(String::from)
                    .collect();
                SchemaKind::Object {
                    properties,
                    required,
                }
            }
            Some("null") => {
                nullable = true;
                SchemaKind::Null
            }
            Some(_) => return None,
            None => match obj.get("oneOf") {
                Some(branches) => {
                    let mut kind = SchemaKind::Null;
                    for branch in branches.as_array()? {
                        let node = self.from_value(branch)?;
                        nullable |= node.nullable;
                        kind = self.merge_kind(kind, node.kind);
                    }
                    kind
                }
                None if nullable => SchemaKind::Null,
                None => return None,
            },
        };

        Some(SchemaNode { kind, nullable })
    }

    fn observed(&self, obj: &Map<String, Value>) -> Observed {
        let Some(values) = obj.get("enum").and_then(Value::as_array) else {
            return Observed::Unbounded;
        };
        let mut literals = BTreeSet::new();
        for value in values {
            match value {
                Value::Null => {}
                Value::String(s) => {
                    literals.insert(Literal::String(s.clone()));
                }
                Value::Number(n) => match n.as_i64() {
                    Some(i) => {
                        literals.insert(Literal::Integer(i));
                    }
                    None => return Observed::Unbounded,
                },
                _ => return Observed::Unbounded,
            }
        }
        Observed::Values(literals).bounded(self.enum_threshold)
    }

    /// Merges observations into an existing schema and renders the result.
    ///
    /// Uninterpretable existing schemas are returned unchanged. Otherwise
    /// annotations on the existing schema are carried over.
    pub fn reconcile(
        &self,
        existing: Option<&Value>,
        observed: SchemaNode,
        emit_enums: bool,
    ) -> Value {
        let Some(existing) = existing else {
            return observed.to_value(emit_enums);
        };
        match self.from_value(existing) {
            Some(prior) => {
                let mut out = self.merge(prior, observed).to_value(emit_enums);
                preserve_annotations(existing, &mut out, emit_enums);
                out
            }
            None => existing.clone(),
        }
    }
}

/// Copies keys the engine does not generate from `existing` onto `generated`.
///
/// Recurses through `properties`, `items`, and `oneOf` branches of the same type.
pub fn preserve_annotations(existing: &Value, generated: &mut Value, emit_enums: bool) {
    let (Some(existing), Some(generated)) = (existing.as_object(), generated.as_object_mut()) else {
        return;
    };

    for (key, value) in existing {
        let owned = STRUCTURAL_KEYS.contains(&key.as_str()) || (emit_enums && key == "enum");
        if !owned && !generated.contains_key(key) {
            generated.insert(key.clone(), value.clone());
        }
    }

    if let (Some(Value::Object(old)), Some(Value::Object(new))) =
        (existing.get("properties"), generated.get_mut("properties"))
    {
        for (key, schema) in new.iter_mut() {
            if let Some(prior) = old.get(key) {
                preserve_annotations(prior, schema, emit_enums);
            }
        }
    }

    if let (Some(prior), Some(items)) = (existing.get("items"), generated.get_mut("items")) {
        preserve_annotations(prior, items, emit_enums);
    }

    if let Some(Value::Array(new)) = generated.get_mut("oneOf") {
        let old = existing
            .get("oneOf")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for branch in new.iter_mut() {
            let ty = branch.get("type").cloned();
            if let Some(prior) = old.iter().find(|b| b.get("type") == ty.as_ref()) {
                preserve_annotations(prior, branch, emit_enums);
            }
        }
    }
}
