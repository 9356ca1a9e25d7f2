//! # Error Handling
//!
//! Provides the unified `AppError` enum used across the workspace.

use derive_more::{Display, From};

/// The Global Error Enum.
///
/// We use `derive_more` for boilerplate.
/// Note: String errors default to `General`.
#[derive(Debug, Display, From)]
pub enum AppError {
    /// Wrapper for standard IO errors (reading or writing the document).
    #[display("IO Error: {_0}")]
    Io(std::io::Error),

    /// The existing document or an input file could not be decoded.
    /// Fatal for a pass: nothing is merged against unknown structure.
    #[from(ignore)]
    #[display("Parse Error: {_0}")]
    Parse(String),

    /// The merged document could not be encoded.
    #[from(ignore)]
    #[display("Serialization Error: {_0}")]
    Serialization(String),

    /// The configuration value is inconsistent.
    #[from(ignore)]
    #[display("Config Error: {_0}")]
    Config(String),

    /// An operation requires a security scheme that is not declared in
    /// `components.securitySchemes`.
    #[from(ignore)]
    #[display("Unknown security scheme '{scheme}' required by {method} {path}")]
    UnknownSecurityScheme {
        /// Name of the missing scheme.
        scheme: String,
        /// HTTP method of the offending operation.
        method: String,
        /// Route template of the offending operation.
        path: String,
    },

    /// Generic errors.
    #[display("General Error: {_0}")]
    General(String),
}

/// Manual implementation of the standard Error trait.
impl std::error::Error for AppError {}

/// Helper type alias for Result using AppError.
pub type AppResult<T> = Result<T, AppError>;
