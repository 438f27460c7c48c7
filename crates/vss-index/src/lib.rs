//! ANN index adapters for the vss engine
//!
//! Each vector column of a vss table owns one [`IndexAdapter`]. The adapter
//! pairs a backend ([`FlatIndex`] for exact scans, [`IvfIndex`] for k-means
//! partitioned search) with the column's [`IndexSpec`], whose
//! [`Capabilities`] decide which operations the column accepts.
//!
//! Adapters serialize to a self-describing blob (`to_bytes`/`from_bytes`)
//! that the SQLite layer keeps in the `X_index` shadow table.

pub mod adapter;
pub mod backend;
pub mod flat;
pub mod ivf;
pub mod kmeans;
pub mod list;
pub mod memory;
mod snapshot;
pub mod spec;

pub use adapter::{AdapterState, IndexAdapter, IndexOptions};
pub use backend::{AnnIndex, IndexBackend, Neighbor};
pub use flat::FlatIndex;
pub use ivf::IvfIndex;
pub use spec::{BaseStage, Capabilities, IdMapStage, IndexSpec};
