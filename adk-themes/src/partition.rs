//! Partitioning of validated embeddings into clusters.

use tracing::info;

use crate::config::ClusteringConfig;
use crate::error::{Result, ThemeError};
use crate::kmeans::{self, KMeansFit, KMeansParams};

/// Embeddings that passed validation: non-empty vectors, equal dimension, finite values.
///
/// Built once per run and shared read-only by the cluster count selector and the
/// partitioner. Values are widened to `f64` for the distance arithmetic.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    points: Vec<Vec<f64>>,
    dimensions: usize,
}

impl EmbeddingMatrix {
    /// Validate and convert raw embeddings.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::InvalidEmbedding`] for the first vector that is empty, has a
    /// different dimension from the first vector, or contains a NaN or infinite value.
    pub fn from_embeddings(embeddings: &[Vec<f32>]) -> Result<Self> {
        let dimensions = validate_embeddings(embeddings)?;
        let points = embeddings
            .iter()
            .map(|v| v.iter().map(|&x| f64::from(x)).collect())
            .collect();
        Ok(Self { points, dimensions })
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no vectors.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Dimension shared by every vector (0 when empty).
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Fit k-means with `k` clusters using the seed and limits from `config`.
    pub(crate) fn fit(&self, k: usize, config: &ClusteringConfig) -> KMeansFit {
        let params = KMeansParams {
            k,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            n_init: config.n_init,
            seed: config.seed,
        };
        kmeans::fit(&self.points, &params)
    }
}

/// Check that embeddings are usable for clustering and return their dimension.
///
/// # Errors
///
/// Returns [`ThemeError::InvalidEmbedding`] naming the offending vector.
pub fn validate_embeddings(embeddings: &[Vec<f32>]) -> Result<usize> {
    let Some(first) = embeddings.first() else {
        return Ok(0);
    };
    let dimensions = first.len();

    for (index, vector) in embeddings.iter().enumerate() {
        if vector.is_empty() {
            return Err(ThemeError::InvalidEmbedding { index, reason: "empty vector".into() });
        }
        if vector.len() != dimensions {
            return Err(ThemeError::InvalidEmbedding {
                index,
                reason: format!("dimension {} differs from {dimensions}", vector.len()),
            });
        }
        if let Some(component) = vector.iter().position(|x| !x.is_finite()) {
            return Err(ThemeError::InvalidEmbedding {
                index,
                reason: format!("non-finite value {} at component {component}", vector[component]),
            });
        }
    }

    Ok(dimensions)
}

/// Mapping from record to cluster index.
///
/// Every record has exactly one cluster in `[0, k)`. Clusters may be empty when the
/// embeddings contain fewer distinct points than `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    k: usize,
    ids: Vec<String>,
    labels: Vec<usize>,
}

impl ClusterAssignment {
    /// Build an assignment from parallel id and label lists.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::Config`] if the lists differ in length or a label is out of range.
    pub fn new(k: usize, ids: Vec<String>, labels: Vec<usize>) -> Result<Self> {
        if ids.len() != labels.len() {
            return Err(ThemeError::Config(format!(
                "{} ids but {} cluster labels",
                ids.len(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l >= k) {
            return Err(ThemeError::Config(format!("cluster label {bad} out of range for k = {k}")));
        }
        Ok(Self { k, ids, labels })
    }

    /// Number of clusters.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of assigned records.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no records are assigned.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Cluster index per record position.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Record ids, by position.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Positions of the records in `cluster`, in record order.
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.labels.iter().enumerate().filter(|(_, l)| **l == cluster).map(|(i, _)| i).collect()
    }

    /// Member count per cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    /// `(id, cluster)` pairs in record order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.ids.iter().map(String::as_str).zip(self.labels.iter().copied())
    }
}

/// One-shot k-means partitioner.
///
/// Uses the same seed and limits as the cluster count selector, so partitioning with the
/// selected k reproduces the labeling the selector evaluated.
#[derive(Debug, Clone)]
pub struct Partitioner {
    config: ClusteringConfig,
}

impl Partitioner {
    /// Create a partitioner from the clustering configuration.
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Partition `matrix` into `k` clusters; `ids[i]` names the record of row `i`.
    ///
    /// # Errors
    ///
    /// - [`ThemeError::Config`] if `k == 0` or the id count differs from the row count
    /// - [`ThemeError::InsufficientData`] if `k` exceeds the number of rows
    pub fn partition(
        &self,
        ids: &[String],
        matrix: &EmbeddingMatrix,
        k: usize,
    ) -> Result<ClusterAssignment> {
        if k == 0 {
            return Err(ThemeError::Config("cluster count must be greater than zero".into()));
        }
        if k > matrix.len() {
            return Err(ThemeError::InsufficientData { records: matrix.len(), required: k });
        }

        let fit = matrix.fit(k, &self.config);
        info!(
            k,
            n = matrix.len(),
            inertia = fit.inertia,
            iterations = fit.iterations,
            converged = fit.converged,
            "partitioned embeddings"
        );
        ClusterAssignment::new(k, ids.to_vec(), fit.labels)
    }

    /// Validate raw embeddings, then partition them.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::InvalidEmbedding`] before any clustering if a vector is corrupt,
    /// plus the errors of [`partition`](Self::partition).
    pub fn partition_embeddings(
        &self,
        ids: &[String],
        embeddings: &[Vec<f32>],
        k: usize,
    ) -> Result<ClusterAssignment> {
        let matrix = EmbeddingMatrix::from_embeddings(embeddings)?;
        self.partition(ids, &matrix, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("idea-{i}")).collect()
    }

    #[test]
    fn non_finite_values_are_rejected_before_partitioning() {
        let embeddings = vec![vec![0.0, 1.0], vec![f32::NAN, 0.0], vec![1.0, 1.0]];
        let err = Partitioner::new(ClusteringConfig::default())
            .partition_embeddings(&ids(3), &embeddings, 2)
            .unwrap_err();
        assert!(matches!(err, ThemeError::InvalidEmbedding { index: 1, .. }));
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let embeddings = vec![vec![0.0, 1.0], vec![1.0]];
        assert!(matches!(
            validate_embeddings(&embeddings),
            Err(ThemeError::InvalidEmbedding { index: 1, .. })
        ));
    }

    #[test]
    fn every_record_gets_exactly_one_cluster() {
        let embeddings: Vec<Vec<f32>> =
            (0..12).map(|i| vec![(i % 3) as f32 * 5.0, (i / 3) as f32 * 0.1]).collect();
        let assignment = Partitioner::new(ClusteringConfig::default())
            .partition_embeddings(&ids(12), &embeddings, 3)
            .unwrap();

        assert_eq!(assignment.len(), 12);
        let mut seen: Vec<usize> = (0..3).flat_map(|c| assignment.members(c)).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
        assert_eq!(assignment.cluster_sizes().iter().sum::<usize>(), 12);
    }

    #[test]
    fn k_above_record_count_is_insufficient_data() {
        let embeddings = vec![vec![0.0], vec![1.0]];
        let err = Partitioner::new(ClusteringConfig::default())
            .partition_embeddings(&ids(2), &embeddings, 3)
            .unwrap_err();
        assert!(matches!(err, ThemeError::InsufficientData { records: 2, required: 3 }));
    }
}
