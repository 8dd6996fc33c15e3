//! Error types for the `adk-themes` crate.

use thiserror::Error;

/// Errors that can occur while discovering and summarizing themes.
///
/// Data-integrity variants ([`InsufficientData`](ThemeError::InsufficientData),
/// [`InvalidEmbedding`](ThemeError::InvalidEmbedding)) abort a run. Generation variants are
/// absorbed by the stage that issued the call and degrade to a fallback result.
#[derive(Debug, Error)]
pub enum ThemeError {
    /// Fewer records than the smallest candidate cluster count.
    #[error("Insufficient data: {records} record(s), at least {required} required")]
    InsufficientData {
        /// Number of records available.
        records: usize,
        /// Minimum number of records required.
        required: usize,
    },

    /// The dispersion curve has no detectable knee.
    #[error("No knee detected in dispersion curve over k = {k_min}..={k_max}")]
    NoKneeDetected {
        /// Smallest candidate cluster count evaluated.
        k_min: usize,
        /// Largest candidate cluster count evaluated.
        k_max: usize,
    },

    /// An embedding vector is malformed (non-finite values or wrong dimension).
    #[error("Invalid embedding at index {index}: {reason}")]
    InvalidEmbedding {
        /// Position of the offending vector.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// A generation call did not complete within its timeout.
    #[error("Generation timed out ({model}) after {timeout_ms} ms")]
    GenerationTimeout {
        /// The model identifier of the generator.
        model: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// A generation call failed.
    #[error("Generation failed ({model}): {message}")]
    GenerationFailure {
        /// The model identifier of the generator.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// The generator returned no usable theme label.
    #[error("Empty theme label for cluster {cluster}")]
    EmptyThemeLabel {
        /// The cluster that could not be named.
        cluster: usize,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Records could not be loaded or are inconsistent.
    #[error("Record source error: {0}")]
    RecordSource(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The report could not be written.
    #[error("Report error: {0}")]
    Report(String),

    /// The batch was cancelled by the operator.
    #[error("Run cancelled")]
    Cancelled,

    /// An I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ThemeError {
    /// Whether the error comes from a generation service and may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::GenerationTimeout { .. } | Self::GenerationFailure { .. })
    }
}

/// A convenience result type for theme operations.
pub type Result<T> = std::result::Result<T, ThemeError>;
