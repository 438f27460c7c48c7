//! Vector type and its three wire forms

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use vss_core::{DecodeError, Result, VssError};

/// Format version written as the second byte of every tagged blob.
pub const VECTOR_BLOB_VERSION: u8 = 1;

const TAG_LOWER: u8 = b'v';
const TAG_UPPER: u8 = b'V';
const HEADER_LEN: usize = 2;

/// Encodings a vector can travel in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorForm {
    /// `['v', version, f32 LE payload...]`
    Tagged,
    /// Headerless f32 LE payload
    Raw,
    /// JSON array of numbers
    Json,
}

impl std::fmt::Display for VectorForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorForm::Tagged => write!(f, "blob"),
            VectorForm::Raw => write!(f, "raw"),
            VectorForm::Json => write!(f, "json"),
        }
    }
}

/// A dense f32 vector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    /// Decode `bytes` from the given form.
    pub fn decode(bytes: &[u8], form: VectorForm) -> Result<Self> {
        match form {
            VectorForm::Tagged => Self::from_tagged(bytes),
            VectorForm::Raw => Self::from_raw(bytes),
            VectorForm::Json => {
                let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::Json)?;
                Self::from_json(text)
            }
        }
    }

    /// Encode into the given form.
    pub fn encode(&self, form: VectorForm) -> Result<Vec<u8>> {
        match form {
            VectorForm::Tagged => Ok(self.to_tagged()),
            VectorForm::Raw => Ok(self.to_raw()),
            VectorForm::Json => Ok(self.to_json()?.into_bytes()),
        }
    }

    /// Decode a tagged blob, validating header length, tag and version.
    pub fn from_tagged(blob: &[u8]) -> Result<Self> {
        if blob.len() < HEADER_LEN {
            return Err(DecodeError::HeaderTooShort.into());
        }
        if blob[0] != TAG_LOWER && blob[0] != TAG_UPPER {
            return Err(DecodeError::NotAVector.into());
        }
        if blob[1] != VECTOR_BLOB_VERSION {
            return Err(DecodeError::WrongType.into());
        }
        Self::from_raw(&blob[HEADER_LEN..])
    }

    /// Decode a headerless little-endian f32 payload.
    pub fn from_raw(blob: &[u8]) -> Result<Self> {
        if blob.len() % 4 != 0 {
            return Err(DecodeError::RawLength.into());
        }

        let data = blob
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self::new(data))
    }

    /// Decode a JSON array of numbers.
    pub fn from_json(text: &str) -> Result<Self> {
        let data: Vec<f32> = serde_json::from_str(text).map_err(|_| DecodeError::Json)?;
        Ok(Self::new(data))
    }

    pub fn to_tagged(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.push(TAG_LOWER);
        out.push(VECTOR_BLOB_VERSION);
        out.extend(self.data.iter().flat_map(|f| f.to_le_bytes()));
        out
    }

    pub fn to_raw(&self) -> Vec<u8> {
        self.data.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.data).map_err(|e| VssError::Serialization(e.to_string()))
    }

    /// Human-readable rendering used by `vector_debug()`.
    pub fn debug_string(&self) -> String {
        let values = self
            .data
            .iter()
            .map(|v| format!("{v:.6}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("size: {} [{}]", self.data.len(), values)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.data.get(index).copied()
    }

    /// Coerce an SQL value into a vector.
    ///
    /// Blobs are tried as tagged blobs first, then as raw payloads; text is
    /// parsed as JSON. `Ok(None)` means the value is not vector-shaped at all
    /// (NULL, integers, reals).
    pub fn from_value(value: ValueRef<'_>) -> Result<Option<Self>> {
        match value {
            ValueRef::Blob(bytes) => match Self::from_tagged(bytes) {
                Ok(v) => Ok(Some(v)),
                Err(_) => Self::from_raw(bytes).map(Some),
            },
            ValueRef::Text(text) => {
                let text = std::str::from_utf8(text).map_err(|_| DecodeError::Json)?;
                Self::from_json(text).map(Some)
            }
            _ => Ok(None),
        }
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}

impl From<&[f32]> for Vector {
    fn from(data: &[f32]) -> Self {
        Self::new(data.to_vec())
    }
}

impl AsRef<[f32]> for Vector {
    fn as_ref(&self) -> &[f32] {
        &self.data
    }
}

impl ToSql for Vector {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_tagged()))
    }
}

impl FromSql for Vector {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match Self::from_value(value) {
            Ok(Some(v)) => Ok(v),
            Ok(None) => Err(FromSqlError::InvalidType),
            Err(e) => Err(FromSqlError::Other(Box::new(e))),
        }
    }
}
