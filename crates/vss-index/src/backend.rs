//! The narrow interface every ANN backend implements

use serde::{Deserialize, Serialize};
use vss_core::Result;
use vss_vector::MetricType;

use crate::flat::FlatIndex;
use crate::ivf::IvfIndex;

/// One search hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: i64,
    pub distance: f32,
}

/// Index operations the engine dispatches to. Whether a given column may call
/// them is decided by its build spec's capabilities before dispatch; the
/// backend itself only enforces dimension and training preconditions.
pub trait AnnIndex {
    fn dimension(&self) -> usize;

    fn metric(&self) -> MetricType;

    /// Number of stored vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_trained(&self) -> bool;

    /// Train on `vectors` (row-major, `dimension` floats each). A trained
    /// index ignores further training.
    fn train(&mut self, vectors: &[f32]) -> Result<()>;

    /// Store `vectors` under `ids`, replacing any entry already holding one
    /// of those ids.
    fn add_with_ids(&mut self, ids: &[i64], vectors: &[f32]) -> Result<()>;

    /// Returns how many entries were removed.
    fn remove_ids(&mut self, ids: &[i64]) -> usize;

    fn contains(&self, id: i64) -> bool;

    /// Up to `k` closest entries, best first; ties keep storage order.
    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor>;

    /// Every entry within `radius`, in storage order.
    fn range_search(&self, query: &[f32], radius: f32) -> Vec<Neighbor>;

    fn reconstruct(&self, id: i64) -> Option<Vec<f32>>;

    /// Heap bytes held by stored vectors and ids
    fn memory_bytes(&self) -> usize;
}

/// Rank scored candidates best first and keep `k`.
pub(crate) fn top_k(metric: MetricType, mut candidates: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    // Stable sort keeps storage order among equal scores.
    candidates.sort_by(|a, b| metric.compare(a.distance, b.distance));
    candidates.truncate(k);
    candidates
}

/// Concrete backends, serialized as part of an index blob.
#[derive(Debug, Serialize, Deserialize)]
pub enum IndexBackend {
    Flat(FlatIndex),
    Ivf(IvfIndex),
}

impl IndexBackend {
    /// Recompute derived lookup state after deserialization.
    pub(crate) fn rebuild(&mut self, nprobe: usize) {
        match self {
            IndexBackend::Flat(index) => index.rebuild(),
            IndexBackend::Ivf(index) => {
                index.set_nprobe(nprobe);
                index.rebuild();
            }
        }
    }

    fn inner(&self) -> &dyn AnnIndex {
        match self {
            IndexBackend::Flat(index) => index,
            IndexBackend::Ivf(index) => index,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn AnnIndex {
        match self {
            IndexBackend::Flat(index) => index,
            IndexBackend::Ivf(index) => index,
        }
    }
}

impl AnnIndex for IndexBackend {
    fn dimension(&self) -> usize {
        self.inner().dimension()
    }

    fn metric(&self) -> MetricType {
        self.inner().metric()
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn is_trained(&self) -> bool {
        self.inner().is_trained()
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        self.inner_mut().train(vectors)
    }

    fn add_with_ids(&mut self, ids: &[i64], vectors: &[f32]) -> Result<()> {
        self.inner_mut().add_with_ids(ids, vectors)
    }

    fn remove_ids(&mut self, ids: &[i64]) -> usize {
        self.inner_mut().remove_ids(ids)
    }

    fn contains(&self, id: i64) -> bool {
        self.inner().contains(id)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        self.inner().search(query, k)
    }

    fn range_search(&self, query: &[f32], radius: f32) -> Vec<Neighbor> {
        self.inner().range_search(query, radius)
    }

    fn reconstruct(&self, id: i64) -> Option<Vec<f32>> {
        self.inner().reconstruct(id)
    }

    fn memory_bytes(&self) -> usize {
        self.inner().memory_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbors(scores: &[f32]) -> Vec<Neighbor> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &distance)| Neighbor { id: i as i64, distance })
            .collect()
    }

    #[test]
    fn test_top_k_skips_nan_scores() {
        let hits = top_k(MetricType::L2, neighbors(&[f32::NAN, 2.0, 1.0, f32::NAN]), 2);
        assert_eq!(hits.iter().map(|n| n.id).collect::<Vec<_>>(), vec![2, 1]);

        let hits = top_k(MetricType::InnerProduct, neighbors(&[f32::NAN, 2.0, 1.0]), 3);
        assert_eq!(hits.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2, 0]);
    }

    #[test]
    fn test_top_k_keeps_storage_order_on_ties() {
        let hits = top_k(MetricType::L2, neighbors(&[1.0, 0.5, 1.0, 1.0]), 3);
        assert_eq!(hits.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 0, 2]);
    }
}
