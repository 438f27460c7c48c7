//! Search parameter values built by `vss_search_params()` and
//! `vss_range_search_params()`
//!
//! ```text
//! knn:   'p' 's' k:i64 LE   f32 LE payload...
//! range: 'p' 'r' radius:f32 LE f32 LE payload...
//! ```
//!
//! Both layouts have a length of 2 mod 4, so a parameter blob can never be
//! mistaken for a raw vector payload and vice versa.

use rusqlite::types::ValueRef;
use vss_vector::Vector;

const TAG: u8 = b'p';
const KNN: u8 = b's';
const RANGE: u8 = b'r';

#[derive(Debug, Clone, PartialEq)]
pub enum SearchParams {
    Knn { vector: Vector, k: i64 },
    Range { vector: Vector, radius: f32 },
}

impl SearchParams {
    pub fn to_blob(&self) -> Vec<u8> {
        let (kind, scalar, vector): (u8, Vec<u8>, &Vector) = match self {
            SearchParams::Knn { vector, k } => (KNN, k.to_le_bytes().to_vec(), vector),
            SearchParams::Range { vector, radius } => {
                (RANGE, radius.to_le_bytes().to_vec(), vector)
            }
        };
        let mut out = Vec::with_capacity(2 + scalar.len() + vector.len() * 4);
        out.push(TAG);
        out.push(kind);
        out.extend_from_slice(&scalar);
        out.extend_from_slice(&vector.to_raw());
        out
    }

    /// `None` when `bytes` is not a parameter blob.
    pub fn from_blob(bytes: &[u8]) -> Option<Self> {
        let (&tag, rest) = bytes.split_first()?;
        let (&kind, rest) = rest.split_first()?;
        if tag != TAG {
            return None;
        }
        match kind {
            KNN => {
                let (k, payload) = split_array::<8>(rest)?;
                let vector = Vector::from_raw(payload).ok()?;
                Some(SearchParams::Knn {
                    vector,
                    k: i64::from_le_bytes(k),
                })
            }
            RANGE => {
                let (radius, payload) = split_array::<4>(rest)?;
                let vector = Vector::from_raw(payload).ok()?;
                Some(SearchParams::Range {
                    vector,
                    radius: f32::from_le_bytes(radius),
                })
            }
            _ => None,
        }
    }

    pub fn from_value(value: ValueRef<'_>) -> Option<Self> {
        match value {
            ValueRef::Blob(bytes) => Self::from_blob(bytes),
            _ => None,
        }
    }
}

fn split_array<const N: usize>(bytes: &[u8]) -> Option<([u8; N], &[u8])> {
    if bytes.len() < N {
        return None;
    }
    let (head, tail) = bytes.split_at(N);
    Some((head.try_into().ok()?, tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knn_blob_layout() {
        let params = SearchParams::Knn {
            vector: Vector::new(vec![1.0, 2.0]),
            k: 5,
        };
        let blob = params.to_blob();
        assert_eq!(&blob[..2], b"ps");
        assert_eq!(blob.len(), 2 + 8 + 8);
        assert_eq!(SearchParams::from_blob(&blob), Some(params));
    }

    #[test]
    fn test_range_blob_layout() {
        let params = SearchParams::Range {
            vector: Vector::new(vec![0.5, 0.5]),
            radius: 1.0,
        };
        let blob = params.to_blob();
        assert_eq!(&blob[..2], b"pr");
        assert_eq!(blob.len() % 4, 2);
        assert_eq!(SearchParams::from_blob(&blob), Some(params));
    }

    #[test]
    fn test_vectors_are_not_params() {
        let tagged = Vector::new(vec![1.0]).to_tagged();
        assert_eq!(SearchParams::from_blob(&tagged), None);
        assert_eq!(SearchParams::from_blob(b"ps"), None);
        assert_eq!(SearchParams::from_blob(b"px\0\0\0\0"), None);
        assert_eq!(SearchParams::from_value(ValueRef::Text(b"[1.0]")), None);
    }
}
