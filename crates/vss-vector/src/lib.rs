//! Vector codec and metric library for the vss engine
//!
//! A [`Vector`] travels in three forms:
//!
//! - **tagged blob**: `['v', version, f32 LE...]`, the form every vector
//!   returning SQL function produces
//! - **raw blob**: the headerless f32 payload, as stored in `X_data`
//! - **JSON**: an array of numbers
//!
//! [`distance`] holds the pure metric functions an index orders by, plus the
//! ones exposed only as scalar SQL functions (cosine similarity, elementwise
//! add/subtract).
//!
//! # Example
//!
//! ```
//! use vss_vector::{MetricType, Vector, VectorForm};
//!
//! let v = Vector::from_json("[0.0, 1.0]").unwrap();
//! let blob = v.encode(VectorForm::Tagged).unwrap();
//! assert_eq!(Vector::decode(&blob, VectorForm::Tagged).unwrap(), v);
//!
//! let d = MetricType::L2.distance(v.as_slice(), &[0.0, 0.0]);
//! assert_eq!(d, 1.0);
//! ```

pub mod codec;
pub mod distance;

pub use codec::{Vector, VectorForm, VECTOR_BLOB_VERSION};
pub use distance::MetricType;

/// Version string reported by `vector_version()`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
