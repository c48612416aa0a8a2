//! Unified error model for frame queries.
//! Every fallible operation in the crate returns `AppResult`, so the facade,
//! the cache coordinator and the CLI share one taxonomy. None of these errors
//! are retried inside the crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// A field type the type mapper cannot represent.
    #[error("unsupported_type: {type_name}")]
    UnsupportedType { type_name: String },
    /// Two frames of one group declare the same column with different kinds.
    #[error("schema_conflict: column '{column}' in group '{group}' is {left} in one frame and {right} in another")]
    SchemaConflict { group: String, column: String, left: String, right: String },
    /// Writing columnar fragments failed.
    #[error("materialization_error: {message}")]
    Materialization { message: String },
    /// The query was rejected before execution.
    #[error("validation_error: {message}")]
    Validation { message: String },
    /// The engine exited non-zero or wrote to stderr.
    #[error("execution_error: {message}")]
    Execution { message: String },
    /// The engine output could not be decoded.
    #[error("decode_error: {message}")]
    Decode { message: String },
    #[error("config_error: {message}")]
    Config { message: String },
}

impl AppError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AppError::UnsupportedType { .. } => "unsupported_type",
            AppError::SchemaConflict { .. } => "schema_conflict",
            AppError::Materialization { .. } => "materialization_error",
            AppError::Validation { .. } => "validation_error",
            AppError::Execution { .. } => "execution_error",
            AppError::Decode { .. } => "decode_error",
            AppError::Config { .. } => "config_error",
        }
    }

    /// Human readable detail without the code prefix.
    pub fn message(&self) -> String {
        match self {
            AppError::UnsupportedType { type_name } => format!("unsupported type for conversion to parquet: {}", type_name),
            AppError::SchemaConflict { group, column, left, right } => {
                format!("column '{}' in group '{}' is {} in one frame and {} in another", column, group, left, right)
            }
            AppError::Materialization { message }
            | AppError::Validation { message }
            | AppError::Execution { message }
            | AppError::Decode { message }
            | AppError::Config { message } => message.clone(),
        }
    }

    pub fn unsupported<S: Into<String>>(type_name: S) -> Self { AppError::UnsupportedType { type_name: type_name.into() } }
    pub fn materialization<S: Into<String>>(msg: S) -> Self { AppError::Materialization { message: msg.into() } }
    pub fn validation<S: Into<String>>(msg: S) -> Self { AppError::Validation { message: msg.into() } }
    pub fn execution<S: Into<String>>(msg: S) -> Self { AppError::Execution { message: msg.into() } }
    pub fn decode<S: Into<String>>(msg: S) -> Self { AppError::Decode { message: msg.into() } }
    pub fn config<S: Into<String>>(msg: S) -> Self { AppError::Config { message: msg.into() } }

    /// Fatal errors describe the input itself; resubmitting the same frames cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::UnsupportedType { .. } | AppError::SchemaConflict { .. } | AppError::Validation { .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Materialization { message: err.to_string() }
    }
}

impl From<polars::prelude::PolarsError> for AppError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        AppError::Materialization { message: err.to_string() }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode { message: err.to_string() }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Execution unless downcasted elsewhere
        match err.downcast::<AppError>() {
            Ok(app) => app,
            Err(other) => AppError::Execution { message: other.to_string() },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
