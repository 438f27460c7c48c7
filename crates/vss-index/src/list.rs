//! Contiguous id-tagged vector storage shared by the flat and IVF backends

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use vss_vector::MetricType;

use crate::Neighbor;

/// Vectors stored back to back: `[v0_d0, .., v0_dn, v1_d0, ..]`, with the id
/// of each vector at the same position in `ids`. `dimension` is never zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorList {
    dimension: usize,
    ids: Vec<i64>,
    data: Vec<f32>,
}

impl VectorList {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn push(&mut self, id: i64, vector: &[f32]) {
        self.ids.push(id);
        self.data.extend_from_slice(vector);
    }

    pub fn vector(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.data[start..start + self.dimension]
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &[f32])> + '_ {
        self.ids
            .iter()
            .copied()
            .zip(self.data.chunks_exact(self.dimension))
    }

    /// Drop every entry whose id is in `ids`, keeping the survivors in their
    /// original order. Returns how many entries were removed.
    pub fn remove(&mut self, ids: &HashSet<i64>) -> usize {
        let dim = self.dimension;
        let mut kept_ids = Vec::with_capacity(self.ids.len());
        let mut kept_data = Vec::with_capacity(self.data.len());
        for (id, vector) in self.ids.iter().zip(self.data.chunks_exact(dim)) {
            if !ids.contains(id) {
                kept_ids.push(*id);
                kept_data.extend_from_slice(vector);
            }
        }

        let removed = self.ids.len() - kept_ids.len();
        self.ids = kept_ids;
        self.data = kept_data;
        removed
    }

    /// Score every entry against `query`, appending to `out` in storage order.
    pub fn score_into(&self, metric: MetricType, query: &[f32], out: &mut Vec<Neighbor>) {
        out.extend(self.iter().map(|(id, vector)| Neighbor {
            id,
            distance: metric.distance(query, vector),
        }));
    }

    pub fn memory_bytes(&self) -> usize {
        self.ids.capacity() * std::mem::size_of::<i64>()
            + self.data.capacity() * std::mem::size_of::<f32>()
    }
}
