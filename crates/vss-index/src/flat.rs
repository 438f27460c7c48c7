//! # Flat Index (exact search)
//!
//! Every query scores every stored vector. Used for the `Flat` base stage and
//! as ground truth for the partitioned index in tests.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use vss_core::{Result, VssError};
use vss_vector::MetricType;

use crate::backend::{top_k, AnnIndex, Neighbor};
use crate::list::VectorList;
use crate::memory::MemoryCharge;

#[derive(Debug, Serialize, Deserialize)]
pub struct FlatIndex {
    metric: MetricType,
    list: VectorList,
    /// id -> position in `list`
    #[serde(skip)]
    positions: HashMap<i64, usize>,
    #[serde(skip)]
    charge: MemoryCharge,
}

impl FlatIndex {
    pub fn new(dimension: usize, metric: MetricType) -> Self {
        Self {
            metric,
            list: VectorList::new(dimension),
            positions: HashMap::new(),
            charge: MemoryCharge::default(),
        }
    }

    pub(crate) fn rebuild(&mut self) {
        self.positions = self
            .list
            .ids()
            .iter()
            .enumerate()
            .map(|(pos, &id)| (id, pos))
            .collect();
        self.charge.set(self.memory_bytes());
    }
}

impl AnnIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.list.dimension()
    }

    fn metric(&self) -> MetricType {
        self.metric
    }

    fn len(&self) -> usize {
        self.list.len()
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn train(&mut self, _vectors: &[f32]) -> Result<()> {
        Ok(())
    }

    fn add_with_ids(&mut self, ids: &[i64], vectors: &[f32]) -> Result<()> {
        let dim = self.dimension();
        if vectors.len() != ids.len() * dim {
            return Err(VssError::InvalidState(format!(
                "{} ids given for {} floats of dimension {}",
                ids.len(),
                vectors.len(),
                dim
            )));
        }

        let replaced: HashSet<i64> = ids
            .iter()
            .copied()
            .filter(|id| self.positions.contains_key(id))
            .collect();
        if !replaced.is_empty() {
            self.list.remove(&replaced);
            self.rebuild();
        }

        for (id, vector) in ids.iter().zip(vectors.chunks_exact(dim)) {
            self.positions.insert(*id, self.list.len());
            self.list.push(*id, vector);
        }
        self.charge.set(self.memory_bytes());
        Ok(())
    }

    fn remove_ids(&mut self, ids: &[i64]) -> usize {
        let ids: HashSet<i64> = ids.iter().copied().collect();
        let removed = self.list.remove(&ids);
        if removed > 0 {
            self.rebuild();
        }
        removed
    }

    fn contains(&self, id: i64) -> bool {
        self.positions.contains_key(&id)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || self.list.is_empty() {
            return Vec::new();
        }
        let mut scored = Vec::with_capacity(self.list.len());
        self.list.score_into(self.metric, query, &mut scored);
        top_k(self.metric, scored, k)
    }

    fn range_search(&self, query: &[f32], radius: f32) -> Vec<Neighbor> {
        let mut scored = Vec::new();
        self.list.score_into(self.metric, query, &mut scored);
        scored.retain(|n| self.metric.within(n.distance, radius));
        scored
    }

    fn reconstruct(&self, id: i64) -> Option<Vec<f32>> {
        self.positions
            .get(&id)
            .map(|&pos| self.list.vector(pos).to_vec())
    }

    fn memory_bytes(&self) -> usize {
        self.list.memory_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatIndex {
        let mut index = FlatIndex::new(2, MetricType::L2);
        index
            .add_with_ids(
                &[1000, 1001, 1002, 1003],
                &[0.0, 1.0, 0.0, -1.0, 1.0, 0.0, -1.0, 0.0],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_search_order_and_ties() {
        let hits = sample().search(&[0.9, 0.0], 5);
        let ids: Vec<i64> = hits.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1002, 1000, 1001, 1003]);
        assert!((hits[0].distance - 0.01).abs() < 1e-6);
        assert!((hits[1].distance - 1.81).abs() < 1e-6);
        assert!((hits[3].distance - 3.61).abs() < 1e-6);
    }

    #[test]
    fn test_range_search() {
        let hits = sample().range_search(&[0.5, 0.5], 1.0);
        let ids: Vec<i64> = hits.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1000, 1002]);
        assert!(hits.iter().all(|n| (n.distance - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_readd_replaces_vector() {
        let mut index = sample();
        index.add_with_ids(&[1001], &[5.0, 5.0]).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.reconstruct(1001), Some(vec![5.0, 5.0]));
    }

    #[test]
    fn test_remove_then_reconstruct() {
        let mut index = sample();
        assert_eq!(index.remove_ids(&[1000, 42]), 1);
        assert!(index.reconstruct(1000).is_none());
        assert_eq!(index.reconstruct(1003), Some(vec![-1.0, 0.0]));
    }

    #[test]
    fn test_inner_product_ranks_descending() {
        let mut index = FlatIndex::new(2, MetricType::InnerProduct);
        index
            .add_with_ids(&[1, 2, 3], &[1.0, 0.0, 3.0, 0.0, 2.0, 0.0])
            .unwrap();
        let ids: Vec<i64> = index.search(&[1.0, 0.0], 3).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
