//! # Inverted File Index
//!
//! Vectors are partitioned by their nearest k-means centroid. A query scores
//! only the `nprobe` partitions whose centroids are closest to it, so results
//! are approximate once `nprobe < nlist`.
//!
//! Coarse assignment always uses squared L2 against the centroids; the
//! column's metric is applied when scoring inside the probed lists.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use vss_core::{Result, VssError};
use vss_vector::MetricType;

use crate::backend::{top_k, AnnIndex, Neighbor};
use crate::kmeans;
use crate::list::VectorList;
use crate::memory::MemoryCharge;

fn default_nprobe() -> usize {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IvfIndex {
    metric: MetricType,
    dimension: usize,
    nlist: usize,
    kmeans_iterations: usize,
    /// Empty until trained, then `nlist * dimension` floats
    centroids: Vec<f32>,
    lists: Vec<VectorList>,
    #[serde(skip, default = "default_nprobe")]
    nprobe: usize,
    /// id -> (list, position)
    #[serde(skip)]
    locator: HashMap<i64, (usize, usize)>,
    #[serde(skip)]
    charge: MemoryCharge,
}

impl IvfIndex {
    pub fn new(dimension: usize, metric: MetricType, nlist: usize, kmeans_iterations: usize) -> Self {
        Self {
            metric,
            dimension,
            nlist,
            kmeans_iterations,
            centroids: Vec::new(),
            lists: Vec::new(),
            nprobe: default_nprobe(),
            locator: HashMap::new(),
            charge: MemoryCharge::default(),
        }
    }

    pub fn nlist(&self) -> usize {
        self.nlist
    }

    pub fn set_nprobe(&mut self, nprobe: usize) {
        self.nprobe = nprobe.clamp(1, self.nlist);
    }

    pub(crate) fn rebuild(&mut self) {
        self.locator.clear();
        for (list_no, list) in self.lists.iter().enumerate() {
            for (pos, &id) in list.ids().iter().enumerate() {
                self.locator.insert(id, (list_no, pos));
            }
        }
        self.charge.set(self.memory_bytes());
    }

    fn probe(&self, query: &[f32]) -> Vec<usize> {
        let mut ranked = kmeans::ranked_centroids(&self.centroids, self.dimension, query);
        ranked.truncate(self.nprobe);
        ranked
    }

    fn score_probed(&self, query: &[f32]) -> Vec<Neighbor> {
        let mut scored = Vec::new();
        for list_no in self.probe(query) {
            self.lists[list_no].score_into(self.metric, query, &mut scored);
        }
        scored
    }
}

impl AnnIndex for IvfIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> MetricType {
        self.metric
    }

    fn len(&self) -> usize {
        self.locator.len()
    }

    fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        if self.is_trained() {
            return Ok(());
        }

        let points = vectors.len() / self.dimension;
        if points < self.nlist {
            return Err(VssError::Parameter(format!(
                "number of training points ({points}) should be at least as large as number of clusters ({})",
                self.nlist
            )));
        }

        self.centroids = kmeans::train(vectors, self.dimension, self.nlist, self.kmeans_iterations);
        self.lists = (0..self.nlist)
            .map(|_| VectorList::new(self.dimension))
            .collect();
        self.rebuild();
        tracing::debug!(nlist = self.nlist, points, "trained IVF quantizer");
        Ok(())
    }

    fn add_with_ids(&mut self, ids: &[i64], vectors: &[f32]) -> Result<()> {
        if !self.is_trained() {
            return Err(VssError::InvalidState(
                "IVF index must be trained before adding vectors".to_string(),
            ));
        }
        if vectors.len() != ids.len() * self.dimension {
            return Err(VssError::InvalidState(format!(
                "{} ids given for {} floats of dimension {}",
                ids.len(),
                vectors.len(),
                self.dimension
            )));
        }

        if ids.iter().any(|id| self.locator.contains_key(id)) {
            self.remove_ids(ids);
        }

        for (id, vector) in ids.iter().zip(vectors.chunks_exact(self.dimension)) {
            let list_no = kmeans::nearest_centroid(&self.centroids, self.dimension, vector);
            let list = &mut self.lists[list_no];
            self.locator.insert(*id, (list_no, list.len()));
            list.push(*id, vector);
        }
        self.charge.set(self.memory_bytes());
        Ok(())
    }

    fn remove_ids(&mut self, ids: &[i64]) -> usize {
        let ids: HashSet<i64> = ids.iter().copied().collect();
        let touched: HashSet<usize> = ids
            .iter()
            .filter_map(|id| self.locator.get(id).map(|(list_no, _)| *list_no))
            .collect();

        let removed = touched
            .into_iter()
            .map(|list_no| self.lists[list_no].remove(&ids))
            .sum();
        if removed > 0 {
            self.rebuild();
        }
        removed
    }

    fn contains(&self, id: i64) -> bool {
        self.locator.contains_key(&id)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || !self.is_trained() {
            return Vec::new();
        }
        top_k(self.metric, self.score_probed(query), k)
    }

    fn range_search(&self, query: &[f32], radius: f32) -> Vec<Neighbor> {
        if !self.is_trained() {
            return Vec::new();
        }
        let mut scored = self.score_probed(query);
        scored.retain(|n| self.metric.within(n.distance, radius));
        scored
    }

    fn reconstruct(&self, id: i64) -> Option<Vec<f32>> {
        self.locator
            .get(&id)
            .map(|&(list_no, pos)| self.lists[list_no].vector(pos).to_vec())
    }

    fn memory_bytes(&self) -> usize {
        self.centroids.capacity() * std::mem::size_of::<f32>()
            + self.lists.iter().map(VectorList::memory_bytes).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat::FlatIndex;

    fn grid() -> Vec<f32> {
        let mut points = Vec::new();
        for x in 0..6 {
            for y in 0..6 {
                points.push(x as f32);
                points.push(y as f32);
            }
        }
        points
    }

    #[test]
    fn test_requires_training() {
        let mut index = IvfIndex::new(2, MetricType::L2, 4, 10);
        assert!(!index.is_trained());
        assert!(index.add_with_ids(&[1], &[0.0, 0.0]).is_err());

        let err = index.train(&[0.0, 0.0, 1.0, 1.0]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "number of training points (2) should be at least as large as number of clusters (4)"
        );
    }

    #[test]
    fn test_full_probe_matches_flat() {
        let points = grid();
        let ids: Vec<i64> = (0..36).collect();

        let mut ivf = IvfIndex::new(2, MetricType::L2, 4, 10);
        ivf.train(&points).unwrap();
        ivf.set_nprobe(4);
        ivf.add_with_ids(&ids, &points).unwrap();

        let mut flat = FlatIndex::new(2, MetricType::L2);
        flat.add_with_ids(&ids, &points).unwrap();

        let query = [2.2, 3.1];
        let ivf_hits = ivf.search(&query, 5);
        let flat_hits = flat.search(&query, 5);
        let ivf_distances: Vec<f32> = ivf_hits.iter().map(|n| n.distance).collect();
        let flat_distances: Vec<f32> = flat_hits.iter().map(|n| n.distance).collect();
        assert_eq!(ivf_distances, flat_distances);
        assert_eq!(ivf_hits[0].id, flat_hits[0].id);
    }

    #[test]
    fn test_train_twice_is_noop() {
        let points = grid();
        let mut index = IvfIndex::new(2, MetricType::L2, 3, 10);
        index.train(&points).unwrap();
        let centroids = index.centroids.clone();
        index.train(&points[..6]).unwrap();
        assert_eq!(index.centroids, centroids);
    }

    #[test]
    fn test_remove_and_reinsert() {
        let points = grid();
        let ids: Vec<i64> = (0..36).collect();
        let mut index = IvfIndex::new(2, MetricType::L2, 4, 10);
        index.train(&points).unwrap();
        index.add_with_ids(&ids, &points).unwrap();

        assert_eq!(index.remove_ids(&[7]), 1);
        assert!(!index.contains(7));
        index.add_with_ids(&[7], &[9.0, 9.0]).unwrap();
        assert_eq!(index.reconstruct(7), Some(vec![9.0, 9.0]));
        assert_eq!(index.len(), 36);
    }
}
