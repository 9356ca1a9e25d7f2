#![deny(missing_docs)]

//! # Exemplar Core
//!
//! Synthesizes and maintains an OpenAPI document from HTTP exchanges recorded
//! during test runs.

/// Shared error types.
pub mod error;

/// Generation settings.
pub mod config;

/// Exchange data model.
pub mod exchange;

/// Exchange filtering and the collector funnel.
pub mod recorder;

/// Route templates from concrete paths.
pub mod template;

/// Schema inference and merging.
pub mod schema;

/// Operation assembly.
pub mod assembler;

/// Document reconciliation.
pub mod merger;

/// Document persistence.
pub mod store;

/// The merge pass.
pub mod pipeline;

pub use assembler::{Operation, OperationAssembler};
pub use config::{DocumentFormat, GeneratorConfig, License, Server};
pub use error::{AppError, AppResult};
pub use exchange::{Exchange, FileUpload, Method, OperationOverride, Override, Sample};
pub use merger::DocumentMerger;
pub use pipeline::{run, synthesize, PassReport};
pub use recorder::{record, ExchangeCollector};
pub use schema::{Inferencer, SchemaKind, SchemaNode};
pub use store::DocumentStore;
pub use template::{PathTemplater, RouteTemplate, Segment};
