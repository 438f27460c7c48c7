//! Index blob format
//!
//! ```text
//! "VSSI" | format:u8 | bincode(Snapshot)
//! ```
//!
//! The snapshot carries the declaration it was built from so a blob can be
//! checked against the column it is loaded into.

use serde::{Deserialize, Serialize};
use vss_core::{Result, VssError};
use vss_vector::MetricType;

use crate::backend::IndexBackend;
use crate::spec::IndexSpec;

const MAGIC: &[u8; 4] = b"VSSI";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 1;

#[derive(Serialize)]
pub(crate) struct SnapshotRef<'a> {
    pub spec: IndexSpec,
    pub metric: MetricType,
    pub dimension: usize,
    pub pending_training: &'a [f32],
    pub backend: &'a IndexBackend,
}

#[derive(Deserialize)]
pub(crate) struct Snapshot {
    pub spec: IndexSpec,
    pub metric: MetricType,
    pub dimension: usize,
    pub pending_training: Vec<f32>,
    pub backend: IndexBackend,
}

pub(crate) fn encode(snapshot: &SnapshotRef<'_>) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(HEADER_LEN + 64);
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    bincode::serialize_into(&mut out, snapshot)
        .map_err(|e| VssError::Serialization(e.to_string()))?;
    Ok(out)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Snapshot> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(VssError::Serialization(
            "index blob is corrupt: missing header".to_string(),
        ));
    }
    if bytes[MAGIC.len()] != FORMAT_VERSION {
        return Err(VssError::Serialization(format!(
            "index blob is corrupt: unsupported format {}",
            bytes[MAGIC.len()]
        )));
    }
    bincode::deserialize(&bytes[HEADER_LEN..])
        .map_err(|e| VssError::Serialization(format!("index blob is corrupt: {e}")))
}
