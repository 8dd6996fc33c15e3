//! Theme pipeline orchestrator.
//!
//! The [`ThemePipeline`] runs the full batch: filter → embed → select k → partition →
//! name → aggregate → summarize → report. Each stage consumes the previous stage's output in
//! full before the next one starts.
//!
//! # Example
//!
//! ```rust,ignore
//! use adk_themes::{ThemePipeline, ThemeConfig};
//!
//! let pipeline = ThemePipeline::builder()
//!     .config(ThemeConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .long_form(Arc::new(my_generator))
//!     .short_form(Arc::new(my_summarizer))
//!     .build()?;
//!
//! let report = pipeline.run(records).await?;
//! ```

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::aggregate::{aggregate, resolve_labels};
use crate::config::ThemeConfig;
use crate::embedding::{EmbeddingProvider, embed_texts};
use crate::error::{Result, ThemeError};
use crate::generation::{ShortFormSummarizer, TextGenerator};
use crate::knee::{ClusterCountSelector, DispersionCurve};
use crate::naming::{ClusterLabel, ThemeNamer};
use crate::partition::{EmbeddingMatrix, Partitioner};
use crate::record::{IdeaRecord, RecordSource, ensure_unique_ids};
use crate::report::ThemeReport;
use crate::summarize::{AdaptiveSummarizer, CancellationFlag, ProgressEvent, SummaryOutcome};
use crate::tfidf::TfIdfMatrix;

/// Everything a run produced, for callers that want more than the report.
#[derive(Debug, Clone, Default)]
pub struct ThemeRun {
    /// The emitted report.
    pub report: ThemeReport,
    /// Number of clusters used (0 for an empty input).
    pub k: usize,
    /// Dispersion curve the cluster count was read from, if one was evaluated.
    pub curve: Option<DispersionCurve>,
    /// Label chosen per non-empty cluster.
    pub labels: Vec<ClusterLabel>,
    /// Summarization outcome per theme, in label order.
    pub outcomes: Vec<SummaryOutcome>,
}

/// The theme pipeline orchestrator.
///
/// Construct one via [`ThemePipeline::builder()`].
pub struct ThemePipeline {
    config: ThemeConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    long_form: Arc<dyn TextGenerator>,
    short_form: Arc<dyn ShortFormSummarizer>,
    progress: Option<UnboundedSender<ProgressEvent>>,
    cancellation: CancellationFlag,
}

impl ThemePipeline {
    /// Create a new [`ThemePipelineBuilder`].
    pub fn builder() -> ThemePipelineBuilder {
        ThemePipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &ThemeConfig {
        &self.config
    }

    /// Return the flag that cancels this pipeline's runs.
    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }

    /// Load records from `source` and run the pipeline over them.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run); source failures are returned as-is.
    pub async fn run_source(&self, source: &dyn RecordSource) -> Result<ThemeReport> {
        Ok(self.run_source_detailed(source).await?.report)
    }

    /// Load records from `source` and return the report with intermediate results.
    ///
    /// # Errors
    ///
    /// Same as [`run_source`](Self::run_source).
    pub async fn run_source_detailed(&self, source: &dyn RecordSource) -> Result<ThemeRun> {
        let records = source.load().await.map_err(|e| {
            error!(error = %e, "failed to load records");
            e
        })?;
        self.run_detailed(records).await
    }

    /// Run the pipeline and return the report.
    ///
    /// # Errors
    ///
    /// - [`ThemeError::RecordSource`] for duplicate record ids
    /// - [`ThemeError::InsufficientData`] if fewer records than `k_min` remain after filtering
    /// - [`ThemeError::Embedding`] or [`ThemeError::InvalidEmbedding`] if embedding fails
    /// - [`ThemeError::NoKneeDetected`] if no knee is found and no fallback k is configured
    /// - [`ThemeError::Cancelled`] if the cancellation flag is set
    pub async fn run(&self, records: Vec<IdeaRecord>) -> Result<ThemeReport> {
        Ok(self.run_detailed(records).await?.report)
    }

    /// Run the pipeline and return the report with intermediate results.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_detailed(&self, records: Vec<IdeaRecord>) -> Result<ThemeRun> {
        // 1. Filter
        let records = self.config.segment.apply(records);
        ensure_unique_ids(&records)?;
        if records.is_empty() {
            info!("no records to theme, emitting empty report");
            return Ok(ThemeRun::default());
        }

        let clustering = &self.config.clustering;
        if records.len() < clustering.k_min {
            error!(records = records.len(), k_min = clustering.k_min, "not enough records");
            return Err(ThemeError::InsufficientData {
                records: records.len(),
                required: clustering.k_min,
            });
        }
        self.check_cancelled()?;

        // 2. Embed
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let embeddings =
            embed_texts(self.embedding_provider.as_ref(), &texts, &self.config.embedding).await?;
        let matrix = EmbeddingMatrix::from_embeddings(&embeddings).map_err(|e| {
            error!(error = %e, "embedding validation failed");
            e
        })?;
        let expected = self.embedding_provider.dimensions();
        if expected > 0 && matrix.dimensions() != expected {
            return Err(ThemeError::InvalidEmbedding {
                index: 0,
                reason: format!(
                    "dimension {} differs from provider dimension {expected}",
                    matrix.dimensions()
                ),
            });
        }
        drop(embeddings);
        info!(records = matrix.len(), dimensions = matrix.dimensions(), "embedded records");

        // 3. Select k
        let (k, curve) = match ClusterCountSelector::new(clustering.clone()).select(&matrix) {
            Ok(selection) => (selection.k, Some(selection.curve)),
            Err(ThemeError::NoKneeDetected { k_min, k_max }) if clustering.fallback_k.is_some() => {
                let k = clustering.fallback_k.unwrap_or(k_min).min(matrix.len());
                warn!(
                    k_min,
                    k_max,
                    fallback_k = k,
                    "no knee detected, using fallback cluster count"
                );
                (k, None)
            }
            Err(e) => return Err(e),
        };

        // 4. Partition
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let assignment = Partitioner::new(clustering.clone()).partition(&ids, &matrix, k)?;
        drop(matrix);
        self.check_cancelled()?;

        // 5. Name
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max_concurrent_generations));
        let tfidf = Arc::new(TfIdfMatrix::fit(&texts, self.config.naming.max_features));
        let namer = ThemeNamer::new(
            self.long_form.clone(),
            self.config.naming.clone(),
            self.config.generation.clone(),
            permits.clone(),
        )
        .with_max_concurrent(self.config.concurrency.max_concurrent_themes);
        let labels = namer.name_clusters(&tfidf, &assignment).await;
        self.check_cancelled()?;

        // 6. Aggregate
        let resolved = resolve_labels(&labels, self.config.naming.label_collision);
        let mut aggregation = aggregate(&records, &assignment, &resolved)?;

        // 7. Summarize
        let mut summarizer = AdaptiveSummarizer::new(
            self.long_form.clone(),
            self.short_form.clone(),
            self.config.summary.clone(),
            self.config.generation.clone(),
            permits,
        )
        .with_max_concurrent(self.config.concurrency.max_concurrent_themes)
        .with_cancellation(self.cancellation.clone());
        if let Some(sender) = &self.progress {
            summarizer = summarizer.with_progress(sender.clone());
        }
        let outcomes = summarizer.summarize_themes(&mut aggregation.themes).await?;

        // 8. Report
        let report = ThemeReport::new(&aggregation.themes, aggregation.records);
        info!(k, themes = report.rows.len(), records = records.len(), "theme run completed");

        Ok(ThemeRun { report, k, curve, labels, outcomes })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            warn!("theme run cancelled");
            return Err(ThemeError::Cancelled);
        }
        Ok(())
    }
}

/// Builder for constructing a [`ThemePipeline`].
///
/// `config`, `embedding_provider`, `long_form` and `short_form` are required. Call
/// [`build()`](ThemePipelineBuilder::build) to validate and produce the pipeline.
#[derive(Default)]
pub struct ThemePipelineBuilder {
    config: Option<ThemeConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    long_form: Option<Arc<dyn TextGenerator>>,
    short_form: Option<Arc<dyn ShortFormSummarizer>>,
    progress: Option<UnboundedSender<ProgressEvent>>,
    cancellation: Option<CancellationFlag>,
}

impl ThemePipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: ThemeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the long-form generator used for labels and final summaries.
    pub fn long_form(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.long_form = Some(generator);
        self
    }

    /// Set the short-form summarizer used for chunk summaries.
    pub fn short_form(mut self, summarizer: Arc<dyn ShortFormSummarizer>) -> Self {
        self.short_form = Some(summarizer);
        self
    }

    /// Send summarization progress to `sender`.
    pub fn progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Use an operator-held cancellation flag.
    pub fn cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    /// Build the [`ThemePipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::Config`] if any required field is missing or the configuration
    /// is inconsistent.
    pub fn build(self) -> Result<ThemePipeline> {
        let config =
            self.config.ok_or_else(|| ThemeError::Config("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| ThemeError::Config("embedding_provider is required".to_string()))?;
        let long_form =
            self.long_form.ok_or_else(|| ThemeError::Config("long_form is required".to_string()))?;
        let short_form = self
            .short_form
            .ok_or_else(|| ThemeError::Config("short_form is required".to_string()))?;

        Ok(ThemePipeline {
            config,
            embedding_provider,
            long_form,
            short_form,
            progress: self.progress,
            cancellation: self.cancellation.unwrap_or_default(),
        })
    }
}
