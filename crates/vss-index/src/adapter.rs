//! Per-column index adapter
//!
//! Wraps one backend with the column's declaration, gates every operation on
//! the build spec's capabilities, buffers training vectors until there are
//! enough of them, and tracks whether the in-memory state has diverged from
//! the last persisted blob.

use vss_core::{Result, VssConfig, VssError};
use vss_vector::{distance::normalize, MetricType};

use crate::backend::{AnnIndex, IndexBackend, Neighbor};
use crate::flat::FlatIndex;
use crate::ivf::IvfIndex;
use crate::snapshot::{self, SnapshotRef};
use crate::spec::{BaseStage, Capabilities, IndexSpec};

/// Runtime knobs that are not part of a column's declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    pub nprobe: usize,
    pub kmeans_iterations: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self::from(&VssConfig::default())
    }
}

impl From<&VssConfig> for IndexOptions {
    fn from(config: &VssConfig) -> Self {
        Self {
            nprobe: config.nprobe,
            kmeans_iterations: config.kmeans_iterations,
        }
    }
}

/// Lifecycle of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Usable, holds no vectors
    Empty,
    /// The build spec needs training and none has happened
    Untrained,
    /// Usable, matches the last persisted blob
    Ready,
    /// Usable, holds changes not yet persisted
    Dirty,
}

#[derive(Debug)]
pub struct IndexAdapter {
    column: String,
    spec: IndexSpec,
    metric: MetricType,
    backend: IndexBackend,
    pending_training: Vec<f32>,
    dirty: bool,
}

impl IndexAdapter {
    /// A fresh adapter for a column declaration.
    pub fn new(
        column: impl Into<String>,
        dimension: usize,
        metric: MetricType,
        spec: IndexSpec,
        options: IndexOptions,
    ) -> Result<Self> {
        let column = column.into();
        if dimension == 0 {
            return Err(VssError::Config(format!(
                "column {column} must have a positive dimension"
            )));
        }

        let mut backend = match spec.base {
            BaseStage::Flat => IndexBackend::Flat(FlatIndex::new(dimension, metric)),
            BaseStage::Ivf { nlist } => IndexBackend::Ivf(IvfIndex::new(
                dimension,
                metric,
                nlist,
                options.kmeans_iterations,
            )),
        };
        backend.rebuild(options.nprobe);

        Ok(Self {
            column,
            spec,
            metric,
            backend,
            pending_training: Vec::new(),
            dirty: false,
        })
    }

    /// Restore an adapter from a persisted blob.
    pub fn from_bytes(column: impl Into<String>, bytes: &[u8], options: IndexOptions) -> Result<Self> {
        let snapshot = snapshot::decode(bytes)?;
        let mut backend = snapshot.backend;
        if backend.dimension() != snapshot.dimension || backend.metric() != snapshot.metric {
            return Err(VssError::Serialization(
                "index blob is corrupt: header disagrees with stored index".to_string(),
            ));
        }
        backend.rebuild(options.nprobe);

        Ok(Self {
            column: column.into(),
            spec: snapshot.spec,
            metric: snapshot.metric,
            backend,
            pending_training: snapshot.pending_training,
            dirty: false,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        snapshot::encode(&SnapshotRef {
            spec: self.spec,
            metric: self.metric,
            dimension: self.dimension(),
            pending_training: &self.pending_training,
            backend: &self.backend,
        })
    }

    /// True when this adapter was built for the given declaration.
    pub fn matches(&self, dimension: usize, metric: MetricType, spec: &IndexSpec) -> bool {
        self.dimension() == dimension && self.metric == metric && &self.spec == spec
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    pub fn capabilities(&self) -> Capabilities {
        self.spec.capabilities()
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    pub fn metric(&self) -> MetricType {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    pub fn is_trained(&self) -> bool {
        self.backend.is_trained()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Force the next flush to persist this adapter.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn contains(&self, id: i64) -> bool {
        self.backend.contains(id)
    }

    pub fn memory_bytes(&self) -> usize {
        self.backend.memory_bytes() + self.pending_training.capacity() * std::mem::size_of::<f32>()
    }

    pub fn state(&self) -> AdapterState {
        if !self.is_trained() {
            AdapterState::Untrained
        } else if self.dirty {
            AdapterState::Dirty
        } else if self.is_empty() {
            AdapterState::Empty
        } else {
            AdapterState::Ready
        }
    }

    /// Number of vectors buffered for training
    pub fn pending_training(&self) -> usize {
        self.pending_training.len() / self.dimension()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension() {
            return Err(VssError::Dimension {
                got: vector.len(),
                want: self.dimension(),
            });
        }
        Ok(())
    }

    fn required_training_points(&self) -> usize {
        match self.spec.base {
            BaseStage::Flat => 0,
            BaseStage::Ivf { nlist } => nlist,
        }
    }

    fn prepared(&self, vector: &[f32]) -> Vec<f32> {
        let mut v = vector.to_vec();
        if self.spec.normalize {
            normalize(&mut v);
        }
        v
    }

    /// Buffer one training vector. Already-trained indexes ignore it.
    pub fn add_training(&mut self, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        if self.is_trained() {
            return Ok(());
        }
        let prepared = self.prepared(vector);
        self.pending_training.extend_from_slice(&prepared);
        self.dirty = true;
        Ok(())
    }

    /// Train on `vectors` (row-major). A no-op once trained.
    pub fn train(&mut self, vectors: &[f32]) -> Result<()> {
        if self.is_trained() {
            return Ok(());
        }
        if vectors.len() % self.dimension() != 0 {
            return Err(VssError::Dimension {
                got: vectors.len() % self.dimension(),
                want: self.dimension(),
            });
        }
        self.backend.train(vectors)?;
        self.pending_training.clear();
        self.dirty = true;
        tracing::debug!(column = %self.column, spec = %self.spec, "index trained");
        Ok(())
    }

    /// Train on the buffered vectors if there are enough of them.
    pub fn train_pending(&mut self) -> Result<bool> {
        if self.is_trained() || self.pending_training() < self.required_training_points() {
            return Ok(false);
        }
        let vectors = std::mem::take(&mut self.pending_training);
        self.train(&vectors)?;
        Ok(true)
    }

    /// Validate an insert without applying it.
    pub fn check_insert(&self, vector: &[f32]) -> Result<()> {
        if !self.capabilities().contains(Capabilities::ADD_WITH_IDS) {
            return Err(VssError::Capability("add_with_ids"));
        }
        self.check_dimension(vector)?;
        if !self.is_trained() && self.pending_training() < self.required_training_points() {
            return Err(VssError::Untrained(self.column.clone()));
        }
        Ok(())
    }

    pub fn add(&mut self, id: i64, vector: &[f32]) -> Result<()> {
        self.add_with_ids(&[id], vector)
    }

    /// Store `vectors` (row-major) under `ids`, training first from the
    /// buffered vectors when the index needs it.
    pub fn add_with_ids(&mut self, ids: &[i64], vectors: &[f32]) -> Result<()> {
        if !self.capabilities().contains(Capabilities::ADD_WITH_IDS) {
            return Err(VssError::Capability("add_with_ids"));
        }
        for vector in vectors.chunks(self.dimension()) {
            self.check_dimension(vector)?;
        }
        if !self.is_trained() && !self.train_pending()? {
            return Err(VssError::Untrained(self.column.clone()));
        }

        if self.spec.normalize {
            let mut normalized = Vec::with_capacity(vectors.len());
            for vector in vectors.chunks(self.dimension()) {
                normalized.extend(self.prepared(vector));
            }
            self.backend.add_with_ids(ids, &normalized)?;
        } else {
            self.backend.add_with_ids(ids, vectors)?;
        }
        self.dirty = true;
        Ok(())
    }

    /// Remove `ids`. An index without id support can only hold nothing
    /// addressable, so removing from an empty one succeeds.
    pub fn remove_ids(&mut self, ids: &[i64]) -> Result<usize> {
        if !self.capabilities().contains(Capabilities::REMOVE_IDS) {
            if self.is_empty() {
                return Ok(0);
            }
            return Err(VssError::Capability("remove_ids"));
        }
        let removed = self.backend.remove_ids(ids);
        if removed > 0 {
            self.dirty = true;
        }
        Ok(removed)
    }

    pub fn search(&self, query: &[f32], k: i64) -> Result<Vec<Neighbor>> {
        if k <= 0 {
            return Err(VssError::InvalidLimit(k));
        }
        self.check_dimension(query)?;
        let k = usize::try_from(k).unwrap_or(usize::MAX).min(self.len());
        Ok(self.backend.search(&self.prepared(query), k))
    }

    pub fn range_search(&self, query: &[f32], radius: f32) -> Result<Vec<Neighbor>> {
        self.check_dimension(query)?;
        Ok(self.backend.range_search(&self.prepared(query), radius))
    }

    pub fn reconstruct(&self, id: i64) -> Result<Vec<f32>> {
        if !self.capabilities().contains(Capabilities::RECONSTRUCT) {
            return Err(VssError::Capability("reconstruct"));
        }
        self.backend
            .reconstruct(id)
            .ok_or_else(|| VssError::Parameter(format!("id {id} not found in index")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(spec: &str) -> IndexAdapter {
        IndexAdapter::new(
            "a",
            2,
            MetricType::L2,
            spec.parse().unwrap(),
            IndexOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let mut flat = adapter("Flat,IDMap2");
        assert_eq!(flat.state(), AdapterState::Empty);
        flat.add(1, &[0.0, 1.0]).unwrap();
        assert_eq!(flat.state(), AdapterState::Dirty);
        flat.mark_clean();
        assert_eq!(flat.state(), AdapterState::Ready);

        let mut ivf = adapter("IVF2,Flat,IDMap2");
        assert_eq!(ivf.state(), AdapterState::Untrained);
        ivf.add_training(&[0.0, 0.0]).unwrap();
        ivf.add_training(&[5.0, 5.0]).unwrap();
        assert_eq!(ivf.pending_training(), 2);
        assert!(ivf.train_pending().unwrap());
        assert_eq!(ivf.state(), AdapterState::Dirty);
        assert_eq!(ivf.pending_training(), 0);
    }

    #[test]
    fn test_add_requires_id_support() {
        let mut flat = adapter("Flat");
        let err = flat.add(1, &[0.0, 1.0]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "add_with_ids not implemented for this type of index"
        );
        assert!(flat.check_insert(&[0.0, 1.0]).is_err());
        assert_eq!(flat.remove_ids(&[1]).unwrap(), 0);
    }

    #[test]
    fn test_reconstruct_requires_idmap2() {
        let mut idmap = adapter("Flat,IDMap");
        idmap.add(7, &[1.0, 2.0]).unwrap();
        let err = idmap.reconstruct(7).unwrap_err();
        assert_eq!(
            err.to_string(),
            "reconstruct not implemented for this type of index"
        );
        assert!(idmap.contains(7));
    }

    #[test]
    fn test_search_guards() {
        let mut flat = adapter("Flat,IDMap2");
        flat.add(1, &[0.0, 1.0]).unwrap();
        flat.add(2, &[1.0, 0.0]).unwrap();

        let err = flat.search(&[0.0, 1.0], 0).unwrap_err();
        assert_eq!(err.to_string(), "limit must be greater than 0, got 0");

        let err = flat.search(&[0.0, 1.0, 2.0], 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "input query size doesn't match index dimensions: 3 != 2"
        );
        assert!(flat.range_search(&[0.0], 1.0).is_err());

        assert_eq!(flat.search(&[0.0, 1.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn test_untrained_insert_fails() {
        let mut ivf = adapter("IVF2,Flat,IDMap2");
        let err = ivf.add(1, &[0.0, 1.0]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "index for column a requires training before inserting data"
        );
        assert!(matches!(ivf.check_insert(&[0.0, 1.0]), Err(VssError::Untrained(_))));
    }

    #[test]
    fn test_bytes_roundtrip_preserves_contents() {
        let mut ivf = adapter("IVF2,Flat,IDMap2");
        for v in [[0.0, 0.0], [0.0, 1.0], [9.0, 9.0], [9.0, 8.0]] {
            ivf.add_training(&v).unwrap();
        }
        ivf.add(10, &[0.0, 0.5]).unwrap();
        ivf.add(11, &[9.0, 8.5]).unwrap();

        let bytes = ivf.to_bytes().unwrap();
        let restored = IndexAdapter::from_bytes("a", &bytes, IndexOptions::default()).unwrap();
        assert!(restored.is_trained());
        assert!(!restored.is_dirty());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.reconstruct(11).unwrap(), vec![9.0, 8.5]);
        assert!(restored.matches(2, MetricType::L2, &"IVF2,Flat,IDMap2".parse().unwrap()));
        assert!(!restored.matches(3, MetricType::L2, &"IVF2,Flat,IDMap2".parse().unwrap()));
    }

    #[test]
    fn test_pending_training_survives_serialization() {
        let mut ivf = adapter("IVF4,Flat,IDMap2");
        ivf.add_training(&[1.0, 1.0]).unwrap();
        let bytes = ivf.to_bytes().unwrap();
        let restored = IndexAdapter::from_bytes("a", &bytes, IndexOptions::default()).unwrap();
        assert_eq!(restored.pending_training(), 1);
        assert_eq!(restored.state(), AdapterState::Untrained);
    }

    #[test]
    fn test_corrupt_blob_rejected() {
        assert!(IndexAdapter::from_bytes("a", b"nope", IndexOptions::default()).is_err());
        assert!(IndexAdapter::from_bytes("a", b"VSSI\x09", IndexOptions::default()).is_err());
    }

    #[test]
    fn test_normalized_spec_stores_unit_vectors() {
        let mut adapter = adapter("L2norm,Flat,IDMap2");
        adapter.add(1, &[3.0, 4.0]).unwrap();
        let v = adapter.reconstruct(1).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
    }
}
