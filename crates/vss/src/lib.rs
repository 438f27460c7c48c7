//! Vector similarity search tables for SQLite
//!
//! `vss` bundles the engine crates behind one API:
//!
//! - [`VssStore`]: a SQLite database with the `vss0` module and the vector
//!   functions registered, configured from a [`StoreConfig`]
//! - [`VssSearch`]: k-nearest-neighbour, range and filtered search over one
//!   vector column
//! - [`create_vss_table`]: migration helper declaring vss tables
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vss::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let store = Arc::new(VssStore::open(StoreConfig::new("./data/vectors.db"))?);
//!
//! store.execute(|conn| create_vss_table(conn, "vss_items", &[VssColumn::new("embedding", 3)]))?;
//!
//! store.transaction(|tx| {
//!     tx.execute(
//!         "INSERT INTO vss_items(rowid, embedding) VALUES (?1, ?2)",
//!         rusqlite::params![1, Vector::new(vec![0.1, 0.2, 0.3])],
//!     )?;
//!     Ok(())
//! })?;
//!
//! let search = VssSearch::new(store.clone(), "vss_items", "embedding")?;
//! let hits = search.knn(&Vector::new(vec![0.1, 0.2, 0.25]), 10).await?;
//! # Ok(())
//! # }
//! ```

pub mod migration;
pub mod prelude;
pub mod search;
pub mod store;

pub use migration::{create_vss_table, create_vss_table_with_module, drop_vss_table, VssColumn};
pub use search::{SearchResult, VssSearch};
pub use store::VssStore;

pub use vss_core::{observe, Result, StoreConfig, SynchronousMode, VssConfig, VssError};
pub use vss_index::{Capabilities, IndexSpec};
pub use vss_sqlite::{register, register_with_config, unregister};
pub use vss_vector::{MetricType, Vector, VectorForm};
