//! Deterministic Lloyd k-means used to train IVF quantizers

use vss_vector::distance::l2_squared;
use vss_vector::MetricType;

/// Index of the centroid closest to `vector` under squared L2. Ties go to the
/// lower index.
pub fn nearest_centroid(centroids: &[f32], dimension: usize, vector: &[f32]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, centroid) in centroids.chunks_exact(dimension).enumerate() {
        let d = l2_squared(vector, centroid);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

/// Centroid indices ordered by increasing distance to `vector`.
pub fn ranked_centroids(centroids: &[f32], dimension: usize, vector: &[f32]) -> Vec<usize> {
    let mut scored: Vec<(usize, f32)> = centroids
        .chunks_exact(dimension)
        .enumerate()
        .map(|(i, c)| (i, l2_squared(vector, c)))
        .collect();
    scored.sort_by(|a, b| MetricType::L2.compare(a.1, b.1));
    scored.into_iter().map(|(i, _)| i).collect()
}

/// Cluster `points` (row-major) into `k` centroids.
///
/// Seeds are spread evenly over the input so identical training batches always
/// produce identical centroids. A cluster that loses every point keeps its
/// previous centroid. Callers guarantee at least `k` points.
pub fn train(points: &[f32], dimension: usize, k: usize, iterations: usize) -> Vec<f32> {
    let n = points.len() / dimension;
    let point = |i: usize| &points[i * dimension..(i + 1) * dimension];

    let mut centroids = Vec::with_capacity(k * dimension);
    for j in 0..k {
        centroids.extend_from_slice(point(j * n / k));
    }

    let mut assignment = vec![usize::MAX; n];
    for _ in 0..iterations {
        let mut changed = false;
        for (i, slot) in assignment.iter_mut().enumerate() {
            let c = nearest_centroid(&centroids, dimension, point(i));
            if *slot != c {
                *slot = c;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![0.0f64; k * dimension];
        let mut counts = vec![0usize; k];
        for (i, &c) in assignment.iter().enumerate() {
            counts[c] += 1;
            for (sum, x) in sums[c * dimension..(c + 1) * dimension]
                .iter_mut()
                .zip(point(i))
            {
                *sum += f64::from(*x);
            }
        }

        for (c, &count) in counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            for d in 0..dimension {
                centroids[c * dimension + d] = (sums[c * dimension + d] / count as f64) as f32;
            }
        }
    }

    centroids
}
