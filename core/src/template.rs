//! # Path Templating
//!
//! Turns concrete request paths into route templates (`/tables/{table_id}`)
//! so that exchanges for the same logical operation are grouped together.
//!
//! A segment becomes a placeholder when:
//! - it has an identifier shape ([`is_identifier`]), or
//! - it is interior (literal neighbours on both sides) and takes different
//!   values across exchanges that agree on every other segment.
//!
//! Templates already present in the destination document win over freshly
//! inferred ones, so established placeholder names are never renamed.

use crate::exchange::{Exchange, Method};
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// One path segment of a route template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// Fixed text.
    Literal(String),
    /// Named placeholder (`{name}`).
    Param(String),
}

impl Segment {
    fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }
}

/// A method plus a parameterized path shape. Identity key for grouping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteTemplate {
    /// HTTP method.
    pub method: Method,
    /// Ordered path segments.
    pub segments: Vec<Segment>,
}

impl RouteTemplate {
    /// Parses an OpenAPI path key such as `/tables/{id}`.
    pub fn parse(method: Method, path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
                _ => Segment::Literal(s.to_string()),
            })
            .collect();
        Self { method, segments }
    }

    /// The OpenAPI path key.
    pub fn path(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(l) => format!("/{}", l),
                Segment::Param(p) => format!("/{{{}}}", p),
            })
            .collect()
    }

    /// Placeholder names in path order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(p) => Some(p.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// `(literal segment count, literal prefix length)`; larger is more specific.
    pub fn specificity(&self) -> (usize, usize) {
        let literals = self.segments.iter().filter(|s| s.is_literal()).count();
        let prefix = self.segments.iter().take_while(|s| s.is_literal()).count();
        (literals, prefix)
    }

    /// Whether this (existing) template's path claims a concrete, decoded path.
    /// The method is not compared.
    ///
    /// Literals must match exactly. A placeholder claims a segment only if the
    /// segment has an identifier shape or sits between two literals; otherwise
    /// the concrete path is left to become a route of its own.
    pub fn claims(&self, concrete: &[String]) -> bool {
        if self.segments.len() != concrete.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(concrete)
            .enumerate()
            .all(|(i, (seg, value))| match seg {
                Segment::Literal(l) => l == value,
                Segment::Param(_) => is_identifier(value) || self.is_interior(i),
            })
    }

    /// The same path under another method.
    pub fn with_method(&self, method: Method) -> RouteTemplate {
        RouteTemplate {
            method,
            segments: self.segments.clone(),
        }
    }

    /// Pairs each placeholder with its concrete value.
    pub fn bind<'a>(&'a self, concrete: &'a [String]) -> Vec<(&'a str, &'a str)> {
        self.segments
            .iter()
            .zip(concrete)
            .filter_map(|(seg, value)| match seg {
                Segment::Param(name) => Some((name.as_str(), value.as_str())),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    fn is_interior(&self, i: usize) -> bool {
        i > 0
            && i + 1 < self.segments.len()
            && self.segments[i - 1].is_literal()
            && self.segments[i + 1].is_literal()
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())
    }
}

/// Splits a concrete path into percent-decoded, non-empty segments.
///
/// A segment whose decoded form contains `/` stays encoded, so rendering the
/// template never introduces a segment boundary.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            let decoded = percent_decode_str(s).decode_utf8_lossy();
            if decoded.contains('/') {
                s.to_string()
            } else {
                decoded.into_owned()
            }
        })
        .collect()
}

/// The shapes a concrete segment can take to be recognized as an identifier.
///
/// In order: all digits, UUID, long hex digest, digit-led slug (`42-answer`).
pub const IDENTIFIER_SHAPES: [&str; 4] = [
    r"^[0-9]+$",
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
    r"^[0-9a-fA-F]{16,}$",
    r"^[0-9]+-[a-z0-9-]+$",
];

/// Whether a concrete segment looks like an identifier value.
pub fn is_identifier(segment: &str) -> bool {
    static SHAPES: OnceLock<Vec<Regex>> = OnceLock::new();
    let shapes = SHAPES.get_or_init(|| {
        IDENTIFIER_SHAPES
            .iter()
            .map(|p| Regex::new(p).expect("Invalid regex"))
            .collect()
    });
    shapes.iter().any(|re| re.is_match(segment))
}

/// Shape-only template for a single path, before any cross-exchange reconciliation.
pub fn templatize(method: Method, concrete_path: &str) -> RouteTemplate {
    let shape = shape_of(&split_path(concrete_path));
    RouteTemplate {
        method,
        segments: name_placeholders(shape),
    }
}

/// A segment before placeholder naming: `None` is an unnamed placeholder.
type Shape = Vec<Option<String>>;

fn shape_of(concrete: &[String]) -> Shape {
    concrete
        .iter()
        .map(|s| (!is_identifier(s)).then(|| s.clone()))
        .collect()
}

/// Generalizes interior positions that vary across shapes agreeing everywhere else.
///
/// Computed over the whole set at once and repeated to a fixpoint, so the
/// result does not depend on input order.
fn generalize(shapes: BTreeSet<Shape>) -> BTreeMap<Shape, Shape> {
    let mut mapping: BTreeMap<Shape, Shape> =
        shapes.iter().map(|s| (s.clone(), s.clone())).collect();

    loop {
        let current: BTreeSet<Shape> = mapping.values().cloned().collect();
        let mut buckets: BTreeMap<(usize, Shape), BTreeSet<Option<String>>> = BTreeMap::new();
        for shape in &current {
            for i in 1..shape.len().saturating_sub(1) {
                if shape[i - 1].is_none() || shape[i + 1].is_none() {
                    continue;
                }
                let mut key = shape.clone();
                key[i] = None;
                buckets.entry((i, key)).or_default().insert(shape[i].clone());
            }
        }
        let widen: Vec<(usize, Shape)> = buckets
            .into_iter()
            .filter(|(_, values)| values.len() > 1)
            .map(|(bucket, _)| bucket)
            .collect();

        if widen.is_empty() {
            return mapping;
        }

        for target in mapping.values_mut() {
            for (i, key) in &widen {
                if target.len() == key.len() {
                    let mut probe = target.clone();
                    probe[*i] = None;
                    if &probe == key {
                        *target = probe;
                    }
                }
            }
        }
    }
}

/// Names placeholders after the preceding literal (`tables` ➜ `table_id`),
/// falling back to `param{n}`.
fn name_placeholders(shape: Shape) -> Vec<Segment> {
    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut ordinal = 0;
    let mut out = Vec::with_capacity(shape.len());

    for (i, seg) in shape.iter().enumerate() {
        match seg {
            Some(literal) => out.push(Segment::Literal(literal.clone())),
            None => {
                ordinal += 1;
                let base = match i.checked_sub(1).and_then(|p| shape[p].as_ref()) {
                    Some(hint) => format!("{}_id", singularize(hint)),
                    None => format!("param{}", ordinal),
                };
                let mut name = base.clone();
                let mut n = 2;
                while !used.insert(name.clone()) {
                    name = format!("{}_{}", base, n);
                    n += 1;
                }
                out.push(Segment::Param(name));
            }
        }
    }
    out
}

/// Crude English singular of a path word, normalized to snake case.
pub fn singularize(word: &str) -> String {
    let word = word.to_ascii_lowercase().replace(['-', '.'], "_");
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if word.ends_with("sses") || word.ends_with("xes") || word.ends_with("ches") {
        word[..word.len() - 2].to_string()
    } else if word.ends_with('s') && !word.ends_with("ss") && word.len() > 1 {
        word[..word.len() - 1].to_string()
    } else {
        word
    }
}

/// Groups exchanges by route template.
///
/// Seeded with the templates of the destination document; those take
/// precedence over anything inferred from the current batch.
#[derive(Debug, Default)]
pub struct PathTemplater {
    existing: Vec<RouteTemplate>,
}

impl PathTemplater {
    /// Creates a templater that honours `existing` templates.
    pub fn new(existing: impl IntoIterator<Item = RouteTemplate>) -> Self {
        Self {
            existing: existing.into_iter().collect(),
        }
    }

    /// Most specific existing template claiming the path, if any.
    ///
    /// Templates of the same method are tried first. Failing that, a path
    /// already documented under another method is reused so one path never
    /// appears under two placeholder spellings.
    fn existing_match(&self, method: Method, concrete: &[String]) -> Option<RouteTemplate> {
        let claiming: Vec<&RouteTemplate> = self
            .existing
            .iter()
            .filter(|t| t.claims(concrete))
            .collect();
        let same_method = claiming.iter().copied().filter(|t| t.method == method);
        most_specific(same_method)
            .or_else(|| most_specific(claiming.iter().copied()))
            .map(|t| t.with_method(method))
    }

    /// Groups exchanges by the template they belong to.
    pub fn group(&self, exchanges: Vec<Exchange>) -> BTreeMap<RouteTemplate, Vec<Exchange>> {
        let mut groups: BTreeMap<RouteTemplate, Vec<Exchange>> = BTreeMap::new();
        let mut fresh: Vec<(Shape, Exchange)> = Vec::new();

        for exchange in exchanges {
            let concrete = split_path(&exchange.path);
            if let Some(template) = self.existing_match(exchange.method, &concrete) {
                groups.entry(template).or_default().push(exchange);
            } else {
                fresh.push((shape_of(&concrete), exchange));
            }
        }

        let mut by_method: BTreeMap<Method, BTreeSet<Shape>> = BTreeMap::new();
        for (shape, exchange) in &fresh {
            by_method
                .entry(exchange.method)
                .or_default()
                .insert(shape.clone());
        }
        let generalized: BTreeMap<Method, BTreeMap<Shape, Shape>> = by_method
            .into_iter()
            .map(|(method, shapes)| (method, generalize(shapes)))
            .collect();

        for (shape, exchange) in fresh {
            let target = generalized
                .get(&exchange.method)
                .and_then(|m| m.get(&shape))
                .cloned()
                .unwrap_or(shape);
            let template = RouteTemplate {
                method: exchange.method,
                segments: name_placeholders(target),
            };
            groups.entry(template).or_default().push(exchange);
        }

        self.log_one_offs(&groups);
        groups
    }

    /// Reports literal routes that a placeholder route of the same method
    /// would also have matched; they stay separate operations.
    fn log_one_offs(&self, groups: &BTreeMap<RouteTemplate, Vec<Exchange>>) {
        let templates: Vec<&RouteTemplate> = groups.keys().chain(self.existing.iter()).collect();
        for literal in groups.keys().filter(|t| t.param_names().next().is_none()) {
            let concrete: Vec<String> = literal
                .segments
                .iter()
                .map(|s| match s {
                    Segment::Literal(l) | Segment::Param(l) => l.clone(),
                })
                .collect();
            let shadowing = templates.iter().find(|t| {
                t.param_names().next().is_some()
                    && t.method == literal.method
                    && t.segments.len() == concrete.len()
                    && t.segments.iter().zip(&concrete).all(|(s, v)| match s {
                        Segment::Literal(l) => l == v,
                        Segment::Param(_) => true,
                    })
            });
            if let Some(general) = shadowing {
                debug!(
                    literal = %literal,
                    general = %general,
                    "Keeping literal route separate from placeholder route"
                );
            }
        }
    }
}

/// Ties resolve to the lexicographically smallest path.
fn most_specific<'t>(
    candidates: impl Iterator<Item = &'t RouteTemplate>,
) -> Option<&'t RouteTemplate> {
    candidates.max_by(|a, b| {
        a.specificity()
            .cmp(&b.specificity())
            .then_with(|| b.path().cmp(&a.path()))
    })
}
