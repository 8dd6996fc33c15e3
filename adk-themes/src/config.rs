//! Configuration for the theme pipeline.
//!
//! Every tunable that drives a stage (random seed, candidate cluster range, chunk size,
//! summarization thresholds, retry policy) lives here and is passed explicitly into the stage
//! that uses it.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThemeError};
use crate::record::SegmentFilter;

/// Top-level configuration for a [`ThemePipeline`](crate::pipeline::ThemePipeline) run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThemeConfig {
    /// Pre-filter applied to records before clustering.
    pub segment: SegmentFilter,
    /// Cluster count selection and partitioning.
    pub clustering: ClusteringConfig,
    /// Keyword extraction and theme labelling.
    pub naming: NamingConfig,
    /// Adaptive summarization thresholds.
    pub summary: SummaryConfig,
    /// Timeouts and retries for generator calls.
    pub generation: GenerationConfig,
    /// Embedding batching and timeout.
    pub embedding: EmbeddingConfig,
    /// Worker pool bounds.
    pub concurrency: ConcurrencyConfig,
}

/// Parameters for the cluster count selector and the partitioner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Smallest candidate cluster count (inclusive).
    pub k_min: usize,
    /// Largest candidate cluster count (inclusive). Clamped to the number of records.
    pub k_max: usize,
    /// Seed shared by every k-means fit of a run.
    pub seed: u64,
    /// Maximum Lloyd iterations per fit.
    pub max_iterations: usize,
    /// Convergence tolerance on the largest centroid shift.
    pub tolerance: f64,
    /// Number of seeded restarts per fit; the lowest inertia wins.
    pub n_init: usize,
    /// Kneedle sensitivity `S`.
    pub knee_sensitivity: f64,
    /// Cluster count used when no knee is detected. `None` surfaces the error.
    pub fallback_k: Option<usize>,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            k_min: 1,
            k_max: 14,
            seed: 42,
            max_iterations: 300,
            tolerance: 1e-4,
            n_init: 10,
            knee_sensitivity: 1.0,
            fallback_k: None,
        }
    }
}

/// What to do when two clusters are given the same label.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabelCollision {
    /// Merge the clusters into a single theme.
    #[default]
    Merge,
    /// Keep the clusters apart by suffixing later labels with ` (2)`, ` (3)`, ...
    Disambiguate,
}

/// Parameters for the theme namer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NamingConfig {
    /// Vocabulary cap for the TF-IDF table.
    pub max_features: usize,
    /// Number of ranked keywords handed to the generator per cluster.
    pub top_keywords: usize,
    /// Number of keywords used to build a fallback label.
    pub fallback_keywords: usize,
    /// Reuse labels for identical keyword lists instead of re-querying the generator.
    pub memoize_labels: bool,
    /// Policy for clusters that end up with identical labels.
    pub label_collision: LabelCollision,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            max_features: 10_000,
            top_keywords: 30,
            fallback_keywords: 3,
            memoize_labels: true,
            label_collision: LabelCollision::Merge,
        }
    }
}

/// Thresholds for the adaptive summarizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SummaryConfig {
    /// Themes with at most this many texts are summarized directly.
    pub direct_max_texts: usize,
    /// Themes whose joined text is shorter than this (in characters) are summarized directly.
    pub direct_max_chars: usize,
    /// Number of texts per chunk on the hierarchical path.
    pub chunk_size: usize,
    /// Upper bound on a chunk summary's length.
    pub chunk_max_len: usize,
    /// Lower bound on a chunk summary's length.
    pub chunk_min_len: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            direct_max_texts: 10,
            direct_max_chars: 2500,
            chunk_size: 4,
            chunk_max_len: 120,
            chunk_min_len: 30,
        }
    }
}

/// Bounded retry with exponential backoff for generator calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff_ms: u64,
    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on a single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Timeout and retry settings shared by the short-form and long-form generators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Retry policy for long-form calls (labels and final summaries).
    pub retry: RetryPolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { timeout_secs: 120, retry: RetryPolicy::default() }
    }
}

impl GenerationConfig {
    /// The per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Embedding batching and timeout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Texts per `embed_batch` call.
    pub batch_size: usize,
    /// Per-batch timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { batch_size: 64, timeout_secs: 120 }
    }
}

impl EmbeddingConfig {
    /// The per-batch timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Worker pool bounds for naming and summarization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Clusters or themes processed at the same time.
    pub max_concurrent_themes: usize,
    /// Long-form generator calls in flight at the same time.
    pub max_concurrent_generations: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_concurrent_themes: 4, max_concurrent_generations: 1 }
    }
}

impl ThemeConfig {
    /// Create a new builder for constructing a [`ThemeConfig`].
    pub fn builder() -> ThemeConfigBuilder {
        ThemeConfigBuilder::default()
    }

    /// Load and validate a configuration from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::Io`] or [`ThemeError::Json`] if the file cannot be read or parsed,
    /// and [`ThemeError::Config`] if the values are inconsistent.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: ThemeConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::Config`] describing the first inconsistency found.
    pub fn validate(&self) -> Result<()> {
        let c = &self.clustering;
        if c.k_min == 0 {
            return Err(config_error("clustering.k_min must be greater than zero"));
        }
        if c.k_max < c.k_min {
            return Err(ThemeError::Config(format!(
                "clustering.k_max ({}) must be at least k_min ({})",
                c.k_max, c.k_min
            )));
        }
        if c.max_iterations == 0 || c.n_init == 0 {
            return Err(config_error(
                "clustering.max_iterations and n_init must be greater than zero",
            ));
        }
        if !c.tolerance.is_finite() || c.tolerance < 0.0 {
            return Err(config_error("clustering.tolerance must be a finite non-negative number"));
        }
        if !c.knee_sensitivity.is_finite() || c.knee_sensitivity < 0.0 {
            return Err(config_error(
                "clustering.knee_sensitivity must be a finite non-negative number",
            ));
        }
        if c.fallback_k == Some(0) {
            return Err(config_error("clustering.fallback_k must be greater than zero"));
        }

        let n = &self.naming;
        if n.max_features == 0 || n.top_keywords == 0 || n.fallback_keywords == 0 {
            return Err(config_error(
                "naming.max_features, top_keywords and fallback_keywords must be greater than zero",
            ));
        }

        let s = &self.summary;
        if s.chunk_size == 0 {
            return Err(config_error("summary.chunk_size must be greater than zero"));
        }
        if s.chunk_max_len == 0 || s.chunk_min_len > s.chunk_max_len {
            return Err(ThemeError::Config(format!(
                "summary.chunk_min_len ({}) must not exceed a non-zero chunk_max_len ({})",
                s.chunk_min_len, s.chunk_max_len
            )));
        }

        let g = &self.generation;
        if g.timeout_secs == 0 || g.retry.max_attempts == 0 {
            return Err(config_error(
                "generation.timeout_secs and retry.max_attempts must be greater than zero",
            ));
        }
        if !g.retry.backoff_multiplier.is_finite() || g.retry.backoff_multiplier < 1.0 {
            return Err(config_error("generation.retry.backoff_multiplier must be at least 1.0"));
        }

        if self.embedding.batch_size == 0 || self.embedding.timeout_secs == 0 {
            return Err(config_error(
                "embedding.batch_size and timeout_secs must be greater than zero",
            ));
        }

        let p = &self.concurrency;
        if p.max_concurrent_themes == 0 || p.max_concurrent_generations == 0 {
            return Err(config_error("concurrency limits must be greater than zero"));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> ThemeError {
    ThemeError::Config(message.to_string())
}

/// Builder for constructing a validated [`ThemeConfig`].
#[derive(Debug, Clone, Default)]
pub struct ThemeConfigBuilder {
    config: ThemeConfig,
}

impl ThemeConfigBuilder {
    /// Restrict the run to one segment.
    pub fn segment(mut self, segment: SegmentFilter) -> Self {
        self.config.segment = segment;
        self
    }

    /// Set the inclusive candidate range of cluster counts.
    pub fn k_range(mut self, k_min: usize, k_max: usize) -> Self {
        self.config.clustering.k_min = k_min;
        self.config.clustering.k_max = k_max;
        self
    }

    /// Set the seed used by every k-means fit.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.clustering.seed = seed;
        self
    }

    /// Set the number of seeded k-means restarts.
    pub fn n_init(mut self, n_init: usize) -> Self {
        self.config.clustering.n_init = n_init;
        self
    }

    /// Set the cluster count used when the dispersion curve has no knee.
    pub fn fallback_k(mut self, k: usize) -> Self {
        self.config.clustering.fallback_k = Some(k);
        self
    }

    /// Set the number of keywords extracted per cluster.
    pub fn top_keywords(mut self, n: usize) -> Self {
        self.config.naming.top_keywords = n;
        self
    }

    /// Set the TF-IDF vocabulary cap.
    pub fn max_features(mut self, n: usize) -> Self {
        self.config.naming.max_features = n;
        self
    }

    /// Enable or disable label memoization.
    pub fn memoize_labels(mut self, enabled: bool) -> Self {
        self.config.naming.memoize_labels = enabled;
        self
    }

    /// Set the identical-label policy.
    pub fn label_collision(mut self, policy: LabelCollision) -> Self {
        self.config.naming.label_collision = policy;
        self
    }

    /// Set the number of texts per hierarchical chunk.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.summary.chunk_size = size;
        self
    }

    /// Set the bounds on chunk summary length.
    pub fn chunk_summary_len(mut self, min_len: usize, max_len: usize) -> Self {
        self.config.summary.chunk_min_len = min_len;
        self.config.summary.chunk_max_len = max_len;
        self
    }

    /// Set the direct-path thresholds.
    pub fn direct_thresholds(mut self, max_texts: usize, max_chars: usize) -> Self {
        self.config.summary.direct_max_texts = max_texts;
        self.config.summary.direct_max_chars = max_chars;
        self
    }

    /// Set the per-call generation timeout.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the retry policy for long-form calls.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.generation.retry = policy;
        self
    }

    /// Set the embedding batch size.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding.batch_size = size;
        self
    }

    /// Set the worker pool bounds.
    pub fn concurrency(mut self, themes: usize, generations: usize) -> Self {
        self.config.concurrency.max_concurrent_themes = themes;
        self.config.concurrency.max_concurrent_generations = generations;
        self
    }

    /// Build the [`ThemeConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::Config`] if any value is out of range, for example:
    /// - `k_min == 0` or `k_max < k_min`
    /// - `chunk_size == 0`
    /// - `chunk_min_len > chunk_max_len`
    pub fn build(self) -> Result<ThemeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
