//! Pipeline-level error taxonomy.

use crate::field::FieldError;
use crate::passes::PassName;

#[derive(Debug, thiserror::Error)]
pub enum FluidError {
    /// Stepping, sampling or uploading before a successful `init`.
    #[error("pipeline is not ready: call init() before stepping or sampling")]
    NotReady,

    #[error("failed to load program for pass {pass:?}: {message}")]
    ProgramLoad { pass: PassName, message: String },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("invalid domain size: {x} x {y}")]
    InvalidSize { x: f32, y: f32 },

    #[error("boundary mask size mismatch: expected {expected} floats, got {actual}")]
    MaskSizeMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}
