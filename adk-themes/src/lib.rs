//! Theme discovery and adaptive summarization for ADK-Rust.
//!
//! This crate provides:
//! - Idea record loading and segment filtering
//! - Seeded k-means with automatic cluster count selection at the knee of the dispersion curve
//! - TF-IDF keyword extraction and generator-backed theme naming with deterministic fallbacks
//! - Size-aware direct or hierarchical summarization of every theme
//! - A sorted theme report with the annotated record set
//!
//! Embeddings and text generation sit behind the [`EmbeddingProvider`], [`TextGenerator`] and
//! [`ShortFormSummarizer`] traits. An Ollama backend is available with the `ollama` feature.

pub mod aggregate;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod kmeans;
pub mod knee;
pub mod naming;
pub mod partition;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod summarize;
pub mod tfidf;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use aggregate::{AnnotatedRecord, Theme};
pub use config::{
    ClusteringConfig, ConcurrencyConfig, EmbeddingConfig, GenerationConfig, LabelCollision,
    NamingConfig, RetryPolicy, SummaryConfig, ThemeConfig, ThemeConfigBuilder,
};
pub use embedding::EmbeddingProvider;
pub use error::{Result, ThemeError};
pub use generation::{ShortFormSummarizer, TextGenerator};
pub use knee::{ClusterCountSelector, DispersionCurve, Selection};
pub use naming::{ClusterLabel, ThemeNamer};
pub use partition::{ClusterAssignment, EmbeddingMatrix, Partitioner};
pub use pipeline::{ThemePipeline, ThemePipelineBuilder, ThemeRun};
pub use record::{
    CsvRecordSource, IdeaRecord, InMemoryRecordSource, JsonRecordSource, RecordSource,
    SegmentFilter,
};
pub use report::{JsonReportSink, ReportSink, ThemeReport, ThemeRow};
pub use summarize::{
    AdaptiveSummarizer, CancellationFlag, ProgressEvent, SUMMARY_UNAVAILABLE, SummaryOutcome,
    SummaryStrategy,
};
pub use tfidf::TfIdfMatrix;

#[cfg(feature = "ollama")]
pub use ollama::OllamaClient;
