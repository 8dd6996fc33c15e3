//! Automatic selection of the number of clusters.
//!
//! The selector fits k-means for every candidate k with the same seed, records the
//! inertia of each fit, and locates the knee of the resulting convex, decreasing curve with
//! the Kneedle method (Satopää et al., 2011).

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ClusteringConfig;
use crate::error::{Result, ThemeError};
use crate::partition::EmbeddingMatrix;

/// Inertia per candidate cluster count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersionCurve {
    /// Candidate cluster counts, ascending.
    pub ks: Vec<usize>,
    /// Inertia for each candidate, non-increasing.
    pub inertias: Vec<f64>,
}

impl DispersionCurve {
    /// `(k, inertia)` pairs, ascending by k.
    pub fn points(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.ks.iter().copied().zip(self.inertias.iter().copied())
    }
}

/// The chosen cluster count together with the curve it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Selected number of clusters.
    pub k: usize,
    /// The evaluated dispersion curve.
    pub curve: DispersionCurve,
}

/// Picks the number of clusters at the knee of the dispersion curve.
#[derive(Debug, Clone)]
pub struct ClusterCountSelector {
    config: ClusteringConfig,
}

impl ClusterCountSelector {
    /// Create a selector from the clustering configuration.
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Evaluate inertia for every candidate k in `[k_min, min(k_max, n)]`.
    ///
    /// The raw inertias are replaced by their running minimum so the curve is
    /// non-increasing even when a larger k lands in a worse local optimum.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::InsufficientData`] if there are fewer vectors than `k_min`.
    pub fn dispersion_curve(&self, matrix: &EmbeddingMatrix) -> Result<DispersionCurve> {
        let n = matrix.len();
        let k_min = self.config.k_min;
        if n < k_min || n == 0 {
            return Err(ThemeError::InsufficientData { records: n, required: k_min.max(1) });
        }
        let k_max = self.config.k_max.min(n);

        let ks: Vec<usize> = (k_min..=k_max).collect();
        let mut inertias = Vec::with_capacity(ks.len());
        let mut running_min = f64::INFINITY;

        for &k in &ks {
            let fit = matrix.fit(k, &self.config);
            debug!(k, inertia = fit.inertia, iterations = fit.iterations, "evaluated candidate k");
            if fit.inertia > running_min {
                debug!(k, inertia = fit.inertia, running_min, "inertia above smaller k, clamped");
            }
            running_min = running_min.min(fit.inertia);
            inertias.push(running_min);
        }

        Ok(DispersionCurve { ks, inertias })
    }

    /// Select the number of clusters.
    ///
    /// A range that collapses to a single candidate (for example one record) returns that
    /// candidate.
    ///
    /// # Errors
    ///
    /// - [`ThemeError::InsufficientData`] if there are fewer vectors than `k_min`
    /// - [`ThemeError::NoKneeDetected`] if the curve has no knee; the caller decides the
    ///   fallback
    pub fn select(&self, matrix: &EmbeddingMatrix) -> Result<Selection> {
        let curve = self.dispersion_curve(matrix)?;

        if let [only] = curve.ks.as_slice() {
            let k = *only;
            info!(k, "single candidate cluster count");
            return Ok(Selection { k, curve });
        }

        let x: Vec<f64> = curve.ks.iter().map(|&k| k as f64).collect();
        match find_knee(&x, &curve.inertias, self.config.knee_sensitivity) {
            Some(index) => {
                let k = curve.ks[index];
                info!(k, candidates = curve.ks.len(), "selected cluster count at knee");
                Ok(Selection { k, curve })
            }
            None => {
                let k_min = curve.ks.first().copied().unwrap_or(self.config.k_min);
                let k_max = curve.ks.last().copied().unwrap_or(self.config.k_max);
                warn!(k_min, k_max, "no knee detected in dispersion curve");
                Err(ThemeError::NoKneeDetected { k_min, k_max })
            }
        }
    }
}

/// Locate the knee of a convex, decreasing curve.
///
/// Returns the index into `x` of the knee, or `None` when the curve has fewer than three
/// points, is flat, or never drops below a local-maximum threshold of the difference curve.
pub fn find_knee(x: &[f64], y: &[f64], sensitivity: f64) -> Option<usize> {
    let n = x.len();
    if n < 3 || y.len() != n {
        return None;
    }

    let (x_min, x_max) = bounds(x);
    let (y_min, y_max) = bounds(y);
    if x_max - x_min <= 0.0 || y_max - y_min <= 0.0 {
        return None;
    }

    let x_norm: Vec<f64> = x.iter().map(|v| (v - x_min) / (x_max - x_min)).collect();
    // Convex + decreasing: flip y so the knee becomes a maximum of the difference curve.
    let y_norm: Vec<f64> = y.iter().map(|v| 1.0 - (v - y_min) / (y_max - y_min)).collect();
    let diff: Vec<f64> = y_norm.iter().zip(&x_norm).map(|(y, x)| y - x).collect();

    let neighbours = |i: usize| (diff[i.saturating_sub(1)], diff[(i + 1).min(n - 1)]);
    let maxima: Vec<usize> = (0..n)
        .filter(|&i| {
            let (prev, next) = neighbours(i);
            diff[i] >= prev && diff[i] >= next
        })
        .collect();
    let minima: Vec<usize> = (0..n)
        .filter(|&i| {
            let (prev, next) = neighbours(i);
            diff[i] <= prev && diff[i] <= next
        })
        .collect();
    let first_max = *maxima.first()?;

    let mean_step = (x_norm[n - 1] - x_norm[0]) / (n - 1) as f64;
    let thresholds: Vec<f64> = maxima.iter().map(|&i| diff[i] - sensitivity * mean_step).collect();

    let mut threshold = 0.0;
    let mut threshold_index = 0;
    let mut next_max = 0;

    for i in first_max..n - 1 {
        if maxima.contains(&i) {
            threshold = thresholds[next_max];
            threshold_index = i;
            next_max += 1;
        }
        if minima.contains(&i) {
            threshold = 0.0;
        }
        if diff[i + 1] < threshold {
            return Some(threshold_index);
        }
    }

    None
}

fn bounds(values: &[f64]) -> (f64, f64) {
    values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}
