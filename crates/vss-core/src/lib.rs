//! vss core: error taxonomy, configuration and metrics hooks shared by every
//! crate of the vector similarity search engine.
//!
//! - [`error`]: the single [`VssError`] enum every layer reports through
//! - [`config`]: engine and store settings, serde-loadable with defaults
//! - [`observe`]: optional `metrics` instrumentation (feature `observe`)

pub mod config;
pub mod error;
pub mod observe;

pub use config::{StoreConfig, SynchronousMode, VssConfig};
pub use error::{DecodeError, Result, VssError};
