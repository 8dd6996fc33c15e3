//! Seeded k-means for embedding vectors.
//!
//! # Algorithm
//!
//! 1. Initialize k centroids with k-means++ from a seeded [`StdRng`]
//! 2. Assign each vector to its nearest centroid (squared Euclidean distance, ties to the
//!    lowest index)
//! 3. Recompute centroids as the mean of their members; an emptied cluster takes the point
//!    farthest from its own centroid
//! 4. Repeat until assignments stop changing, the largest centroid shift drops below the
//!    tolerance, or the iteration cap is reached
//!
//! The whole procedure is restarted `n_init` times from the same RNG stream and the fit with
//! the lowest inertia is kept, so identical input and seed always give identical labels.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Parameters of a single k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    /// Number of clusters. Must be in `1..=points.len()`.
    pub k: usize,
    /// Maximum Lloyd iterations per restart.
    pub max_iterations: usize,
    /// Convergence threshold on the largest centroid shift.
    pub tolerance: f64,
    /// Number of restarts.
    pub n_init: usize,
    /// RNG seed.
    pub seed: u64,
}

/// Result of a k-means fit.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// Cluster index per point, in `[0, k)`.
    pub labels: Vec<usize>,
    /// Final centroids.
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances from each point to its centroid.
    pub inertia: f64,
    /// Iterations used by the winning restart.
    pub iterations: usize,
    /// Whether the winning restart converged before the iteration cap.
    pub converged: bool,
}

/// Fit k-means to `points`.
///
/// `points` must be non-empty, finite and of equal dimension; callers validate this
/// (see [`validate_embeddings`](crate::partition::validate_embeddings)). `k` is clamped to
/// `1..=points.len()`.
pub fn fit(points: &[Vec<f64>], params: &KMeansParams) -> KMeansFit {
    let k = params.k.clamp(1, points.len().max(1));
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<KMeansFit> = None;

    for _ in 0..params.n_init.max(1) {
        let centroids = kmeans_plus_plus_init(points, k, &mut rng);
        let candidate = lloyd(points, centroids, params);
        let better = best.as_ref().is_none_or(|b| candidate.inertia < b.inertia);
        if better {
            best = Some(candidate);
        }
    }

    best.unwrap_or_else(|| KMeansFit {
        labels: Vec::new(),
        centroids: Vec::new(),
        inertia: 0.0,
        iterations: 0,
        converged: true,
    })
}

/// Squared Euclidean distance.
#[inline]
pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn kmeans_plus_plus_init(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..n)].clone());

    let mut nearest: Vec<f64> = points.iter().map(|p| squared_distance(p, &centroids[0])).collect();

    while centroids.len() < k {
        let total: f64 = nearest.iter().sum();
        let chosen = if total > 0.0 {
            let target = rng.gen_range(0.0..total);
            let mut cumulative = 0.0;
            nearest
                .iter()
                .position(|d| {
                    cumulative += d;
                    cumulative > target
                })
                .unwrap_or(n - 1)
        } else {
            // Every point coincides with a centroid already.
            rng.gen_range(0..n)
        };

        let centroid = points[chosen].clone();
        for (d, p) in nearest.iter_mut().zip(points) {
            *d = d.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

fn lloyd(points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, params: &KMeansParams) -> KMeansFit {
    let mut labels = vec![usize::MAX; points.len()];
    let mut iterations = 0;
    let mut converged = false;

    for iteration in 1..=params.max_iterations.max(1) {
        iterations = iteration;
        let changed = assign(points, &centroids, &mut labels);
        if !changed && iteration > 1 {
            converged = true;
            break;
        }

        let updated = recompute_centroids(points, &mut labels, &centroids);
        let shift = centroids
            .iter()
            .zip(&updated)
            .map(|(old, new)| squared_distance(old, new).sqrt())
            .fold(0.0f64, f64::max);
        centroids = updated;

        if shift <= params.tolerance {
            converged = true;
            break;
        }
    }

    assign(points, &centroids, &mut labels);
    let inertia =
        points.iter().zip(&labels).map(|(p, &l)| squared_distance(p, &centroids[l])).sum();

    KMeansFit { labels, centroids, inertia, iterations, converged }
}

/// Assign each point to its nearest centroid. Returns whether any label changed.
fn assign(points: &[Vec<f64>], centroids: &[Vec<f64>], labels: &mut [usize]) -> bool {
    let mut changed = false;
    for (point, label) in points.iter().zip(labels.iter_mut()) {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (j, centroid) in centroids.iter().enumerate() {
            let d = squared_distance(point, centroid);
            if d < best_distance {
                best_distance = d;
                best = j;
            }
        }
        if *label != best {
            *label = best;
            changed = true;
        }
    }
    changed
}

fn recompute_centroids(
    points: &[Vec<f64>],
    labels: &mut [usize],
    previous: &[Vec<f64>],
) -> Vec<Vec<f64>> {
    let k = previous.len();
    let dim = points.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0f64; dim]; k];
    let mut counts = vec![0usize; k];

    for (point, &label) in points.iter().zip(labels.iter()) {
        counts[label] += 1;
        for (s, x) in sums[label].iter_mut().zip(point) {
            *s += x;
        }
    }

    let mut centroids: Vec<Vec<f64>> = sums
        .into_iter()
        .zip(&counts)
        .zip(previous)
        .map(|((sum, &count), old)| {
            if count == 0 {
                old.clone()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect();

    let empties: Vec<usize> = (0..k).filter(|&j| counts[j] == 0).collect();
    for empty in empties {
        let farthest = points
            .iter()
            .enumerate()
            .filter(|(i, _)| counts[labels[*i]] > 1)
            .map(|(i, p)| (i, squared_distance(p, &centroids[labels[i]])))
            .fold(None, |acc: Option<(usize, f64)>, (i, d)| match acc {
                Some((_, best)) if best >= d => acc,
                _ => Some((i, d)),
            });

        if let Some((i, _)) = farthest {
            counts[labels[i]] -= 1;
            labels[i] = empty;
            counts[empty] = 1;
            centroids[empty] = points[i].clone();
        }
    }

    centroids
}
