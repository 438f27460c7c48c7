//! Commonly used types
//!
//! ```
//! use vss::prelude::*;
//! ```

pub use crate::{
    create_vss_table, drop_vss_table, SearchResult, VssColumn, VssSearch, VssStore,
};

// Configs
pub use crate::{StoreConfig, SynchronousMode, VssConfig};

// Errors
pub use crate::{Result, VssError};

// Vectors and indexes
pub use crate::{IndexSpec, MetricType, Vector};

// Re-export common external deps
pub use rusqlite;
pub use std::sync::Arc;
pub use tracing;
