// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// Typed errors for the failures the pipeline can name up front:
//
//   configuration — unsupported dataset or architecture
//   data          — malformed CIFAR files or class lists
//   weights       — pretrained checkpoint does not fit the model
//
// Outer layers wrap these in anyhow::Error with extra context.
// Numeric overflow under mixed precision is not an error: it is
// absorbed by the gradient scaler.

use std::path::PathBuf;

use thiserror::Error;

pub type FinetuneResult<T> = Result<T, FinetuneError>;

#[derive(Debug, Error)]
pub enum FinetuneError {
    #[error("unsupported dataset '{name}' (supported: {supported})")]
    UnsupportedDataset { name: String, supported: String },

    #[error("unsupported architecture '{name}' (supported: {supported})")]
    UnsupportedArchitecture { name: String, supported: String },

    #[error("malformed dataset file {path}: {msg}")]
    MalformedData { path: PathBuf, msg: String },

    #[error("expected {expected} class names, found {found}")]
    ClassCount { expected: usize, found: usize },

    #[error("pretrained weights are missing tensor '{0}'")]
    MissingTensor(String),

    #[error("tensor '{name}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name:     String,
        expected: Vec<usize>,
        found:    Vec<usize>,
    },

    #[error("tensor '{name}' has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("invalid weights file: {0}")]
    InvalidWeights(String),
}
