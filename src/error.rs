use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ValidationReport;

/// The main error type for detbridge operations.
#[derive(Debug, Error)]
pub enum DetbridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse tensor store JSON from {path}: {source}")]
    StoreJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write tensor store JSON to {path}: {source}")]
    StoreJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse config {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Failed to parse boxes CSV: {message}")]
    BoxesCsvParse { message: String },

    #[error("Invalid bounding box array: expected shape (N, 4), got ({rows}, {cols})")]
    InvalidBoundingBoxShape { rows: usize, cols: usize },

    #[error("Unsupported bounding box format: mode '{mode}', type '{unit}'")]
    UnsupportedBoxFormat { mode: String, unit: String },

    #[error("Invalid image shape {dims:?}: expected (height, width[, channels])")]
    InvalidImageShape { dims: Vec<usize> },

    #[error("No tensor found for {role} (htype '{htype}')")]
    MissingTensor { role: &'static str, htype: String },

    #[error("Unknown tensor '{0}'")]
    UnknownTensor(String),

    #[error("Tensor '{tensor}' sample {index}: {message}")]
    TensorShape {
        tensor: String,
        index: usize,
        message: String,
    },

    #[error("Sample index {index} out of range for tensor '{tensor}' with {len} sample(s)")]
    SampleOutOfRange {
        tensor: String,
        index: usize,
        len: usize,
    },

    #[error("Invalid dataloader implementation '{0}' (expected one of: auto, c++, python)")]
    InvalidDataloaderImpl(String),

    #[error("Invalid loader settings: {message}")]
    InvalidLoaderSettings { message: String },

    #[error("Unsupported metric: {0}")]
    UnsupportedMetric(String),

    #[error("Evaluation failed: {message}")]
    EvaluationFailed { message: String },

    #[error("Result count {actual} does not match dataset length {expected}")]
    ResultCountMismatch { expected: usize, actual: usize },

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },

    #[error("Failed to serialize output: {0}")]
    OutputSerialize(#[source] serde_json::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}
