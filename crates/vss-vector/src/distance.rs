//! Distance and similarity functions over f32 slices
//!
//! Every function expects two slices of equal length. The index layer only
//! ever compares vectors of one column's fixed dimension; the SQL wrappers
//! check lengths before calling in.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use vss_core::VssError;

/// Metric an index orders its results by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    /// Inner product (similarity: larger is closer)
    InnerProduct,
    /// Manhattan distance
    L1,
    /// Squared Euclidean distance
    L2,
    /// Chebyshev distance
    Linf,
    Canberra,
    BrayCurtis,
    /// Jensen-Shannon divergence
    JensenShannon,
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricType::InnerProduct => write!(f, "INNER_PRODUCT"),
            MetricType::L1 => write!(f, "L1"),
            MetricType::L2 => write!(f, "L2"),
            MetricType::Linf => write!(f, "Linf"),
            MetricType::Canberra => write!(f, "Canberra"),
            MetricType::BrayCurtis => write!(f, "BrayCurtis"),
            MetricType::JensenShannon => write!(f, "JensenShannon"),
        }
    }
}

impl Default for MetricType {
    fn default() -> Self {
        MetricType::L2
    }
}

impl FromStr for MetricType {
    type Err = VssError;

    /// Case-insensitive, with or without a `METRIC_` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VssError::EmptyMetric);
        }

        let upper = trimmed.to_ascii_uppercase();
        let name = upper.strip_prefix("METRIC_").unwrap_or(&upper);
        match name {
            "INNER_PRODUCT" | "IP" => Ok(MetricType::InnerProduct),
            "L1" => Ok(MetricType::L1),
            "L2" => Ok(MetricType::L2),
            "LINF" => Ok(MetricType::Linf),
            "CANBERRA" => Ok(MetricType::Canberra),
            "BRAYCURTIS" => Ok(MetricType::BrayCurtis),
            "JENSENSHANNON" => Ok(MetricType::JensenShannon),
            _ => Err(VssError::UnknownMetric(trimmed.to_string())),
        }
    }
}

impl MetricType {
    /// Larger values are closer for similarity metrics.
    pub fn is_similarity(&self) -> bool {
        matches!(self, MetricType::InnerProduct)
    }

    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            MetricType::InnerProduct => inner_product(a, b),
            MetricType::L1 => l1(a, b),
            MetricType::L2 => l2_squared(a, b),
            MetricType::Linf => linf(a, b),
            MetricType::Canberra => canberra(a, b),
            MetricType::BrayCurtis => bray_curtis(a, b),
            MetricType::JensenShannon => jensen_shannon(a, b),
        }
    }

    /// Ordering that puts the closer of two scores first. NaN scores sort
    /// last under every metric.
    pub fn compare(&self, a: f32, b: f32) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (false, false) if self.is_similarity() => b.total_cmp(&a),
            (false, false) => a.total_cmp(&b),
            (a_nan, b_nan) => a_nan.cmp(&b_nan),
        }
    }

    /// True when `score` falls inside a range query of `radius`.
    pub fn within(&self, score: f32, radius: f32) -> bool {
        if self.is_similarity() {
            score >= radius
        } else {
            score <= radius
        }
    }
}

pub fn l1(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// Sum of squared differences, not square-rooted.
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

pub fn linf(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Plain ratio in [-1, 1]; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = inner_product(a, a).sqrt();
    let norm_b = inner_product(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    inner_product(a, b) / (norm_a * norm_b)
}

pub fn canberra(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let denom = x.abs() + y.abs();
            if denom == 0.0 {
                0.0
            } else {
                (x - y).abs() / denom
            }
        })
        .sum()
}

pub fn bray_curtis(a: &[f32], b: &[f32]) -> f32 {
    let (num, denom) = a.iter().zip(b).fold((0.0f32, 0.0f32), |(n, d), (x, y)| {
        (n + (x - y).abs(), d + (x + y).abs())
    });
    if denom == 0.0 {
        0.0
    } else {
        num / denom
    }
}

/// Jensen-Shannon divergence between two probability distributions.
pub fn jensen_shannon(a: &[f32], b: &[f32]) -> f32 {
    fn term(p: f32, m: f32) -> f32 {
        if p > 0.0 && m > 0.0 {
            p * (p / m).ln()
        } else {
            0.0
        }
    }

    let total: f32 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let m = 0.5 * (x + y);
            term(x, m) + term(y, m)
        })
        .sum();
    0.5 * total
}

pub fn fvec_add(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

pub fn fvec_sub(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// Scale `v` to unit L2 norm in place; zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = inner_product(v, v).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: [f32; 2] = [0.0, 0.0];
    const POINT: [f32; 2] = [4.0, 1.0];

    #[test]
    fn test_metric_dispatch_against_origin() {
        assert_eq!(MetricType::InnerProduct.distance(&ORIGIN, &POINT), 0.0);
        assert_eq!(MetricType::L1.distance(&ORIGIN, &POINT), 5.0);
        assert_eq!(MetricType::L2.distance(&ORIGIN, &POINT), 17.0);
        assert_eq!(MetricType::Linf.distance(&ORIGIN, &POINT), 4.0);
        assert_eq!(MetricType::Canberra.distance(&ORIGIN, &POINT), 2.0);
        assert_eq!(MetricType::BrayCurtis.distance(&ORIGIN, &POINT), 1.0);
    }

    #[test]
    fn test_l2_is_squared() {
        assert_eq!(l2_squared(&[0.0, 0.0], &[0.0, 1.0]), 1.0);
        assert_eq!(l2_squared(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
    }

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-3.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_jensen_shannon() {
        let p = [0.8, 0.2];
        assert!(jensen_shannon(&p, &p).abs() < 1e-7);

        // Disjoint support reaches the ln(2) upper bound.
        let js = jensen_shannon(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((js - std::f32::consts::LN_2).abs() < 1e-6);

        let expected = 0.5 * (0.8 * (0.8f32 / 0.65).ln() + 0.2 * (0.2f32 / 0.35).ln())
            + 0.5 * (0.5 * (0.5f32 / 0.65).ln() + 0.5 * (0.5f32 / 0.35).ln());
        assert!((jensen_shannon(&p, &[0.5, 0.5]) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_compare_puts_nan_last() {
        for metric in [MetricType::L2, MetricType::InnerProduct] {
            let mut scores = vec![f32::NAN, 1.0, f32::NAN, 3.0, 2.0];
            scores.sort_by(|a, b| metric.compare(*a, *b));
            assert!(scores[3].is_nan() && scores[4].is_nan(), "{metric}");
            let head = &scores[..3];
            if metric.is_similarity() {
                assert_eq!(head, &[3.0, 2.0, 1.0]);
            } else {
                assert_eq!(head, &[1.0, 2.0, 3.0]);
            }
        }
        assert_eq!(MetricType::L2.compare(f32::NAN, f32::NAN), Ordering::Equal);
    }

    #[test]
    fn test_canberra_skips_zero_terms() {
        assert_eq!(canberra(&[0.0, 1.0], &[0.0, 3.0]), 0.5);
    }

    #[test]
    fn test_elementwise() {
        assert_eq!(fvec_add(&[1.0, 2.0], &[0.5, -2.0]), vec![1.5, 0.0]);
        assert_eq!(fvec_sub(&[1.0, 2.0], &[0.5, -2.0]), vec![0.5, 4.0]);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("l2".parse::<MetricType>().unwrap(), MetricType::L2);
        assert_eq!("METRIC_L1".parse::<MetricType>().unwrap(), MetricType::L1);
        assert_eq!(
            "metric_inner_product".parse::<MetricType>().unwrap(),
            MetricType::InnerProduct
        );
        assert_eq!("Linf".parse::<MetricType>().unwrap(), MetricType::Linf);
        assert_eq!(
            "BrayCurtis".parse::<MetricType>().unwrap(),
            MetricType::BrayCurtis
        );

        let err = "cosine".parse::<MetricType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown metric type: cosine");

        let err = "".parse::<MetricType>().unwrap_err();
        assert_eq!(err.to_string(), "invalid metric_type value");
    }

    #[test]
    fn test_similarity_ordering() {
        assert_eq!(MetricType::L2.compare(1.0, 2.0), Ordering::Less);
        assert_eq!(MetricType::InnerProduct.compare(1.0, 2.0), Ordering::Greater);
        assert!(MetricType::L2.within(1.0, 1.0));
        assert!(!MetricType::InnerProduct.within(0.5, 1.0));
    }

    #[test]
    fn test_normalize() {
        let mut v = [3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = [0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, [0.0, 0.0]);
    }
}
