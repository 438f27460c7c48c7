//! Scalar SQL functions
//!
//! Vector-valued results are tagged blobs. Arguments accept any vector form
//! (tagged blob, raw blob, JSON text).

use std::os::raw::c_int;

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use vss_core::{DecodeError, Result, VssError};
use vss_index::memory;
use vss_vector::{distance, Vector, VectorForm};

use crate::params::SearchParams;

/// Every function this module registers, with its argument count
pub const FUNCTIONS: &[(&str, c_int)] = &[
    ("vector_version", 0),
    ("vector_debug", 1),
    ("vector_length", 1),
    ("vector_value_at", 2),
    ("vector_from", -1),
    ("vector_from_blob", 1),
    ("vector_from_json", 1),
    ("vector_from_raw", 1),
    ("vector_to_blob", 1),
    ("vector_to_json", 1),
    ("vector_to_raw", 1),
    ("vss_version", 0),
    ("vss_debug", 0),
    ("vss_memory_usage", 0),
    ("vss_distance_l1", 2),
    ("vss_distance_l2", 2),
    ("vss_distance_linf", 2),
    ("vss_inner_product", 2),
    ("vss_cosine_similarity", 2),
    ("vss_fvec_add", 2),
    ("vss_fvec_sub", 2),
    ("vss_search", 2),
    ("vss_range_search", 2),
    ("vss_search_params", 2),
    ("vss_range_search_params", 2),
];

fn pure() -> FunctionFlags {
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC | FunctionFlags::SQLITE_INNOCUOUS
}

/// Lenient coercion used by the `vector_to_*` family: anything that is not a
/// vector yields SQL NULL.
fn vector_arg(ctx: &Context<'_>, idx: usize) -> Option<Vector> {
    Vector::from_value(ctx.get_raw(idx)).ok().flatten()
}

fn operands(ctx: &Context<'_>) -> Result<(Vector, Vector)> {
    let lhs = vector_arg(ctx, 0).ok_or_else(|| VssError::Parameter("LHS is not a vector".into()))?;
    let rhs = vector_arg(ctx, 1).ok_or_else(|| VssError::Parameter("RHS is not a vector".into()))?;
    if lhs.len() != rhs.len() {
        return Err(VssError::Parameter(
            "LHS and RHS are not vectors of the same size".into(),
        ));
    }
    Ok((lhs, rhs))
}

fn metric_function(
    conn: &Connection,
    name: &'static str,
    f: fn(&[f32], &[f32]) -> f32,
) -> rusqlite::Result<()> {
    conn.create_scalar_function(name, 2, pure(), move |ctx| {
        let (lhs, rhs) = operands(ctx)?;
        Ok(f64::from(f(lhs.as_slice(), rhs.as_slice())))
    })
}

fn elementwise_function(
    conn: &Connection,
    name: &'static str,
    f: fn(&[f32], &[f32]) -> Vec<f32>,
) -> rusqlite::Result<()> {
    conn.create_scalar_function(name, 2, pure(), move |ctx| {
        let (lhs, rhs) = operands(ctx)?;
        Ok(Vector::new(f(lhs.as_slice(), rhs.as_slice())).to_raw())
    })
}

fn decode_function(conn: &Connection, name: &'static str, form: VectorForm) -> rusqlite::Result<()> {
    conn.create_scalar_function(name, 1, pure(), move |ctx| {
        let vector = match (form, ctx.get_raw(0)) {
            (VectorForm::Json, ValueRef::Text(text)) => Vector::decode(text, form)?,
            (VectorForm::Json, _) => return Err(VssError::from(DecodeError::Json).into()),
            (_, ValueRef::Blob(bytes)) => Vector::decode(bytes, form)?,
            (_, _) => return Err(VssError::from(DecodeError::NotAVector).into()),
        };
        Ok(vector.to_tagged())
    })
}

fn encode_function(conn: &Connection, name: &'static str, form: VectorForm) -> rusqlite::Result<()> {
    conn.create_scalar_function(name, 1, pure(), move |ctx| {
        let Some(vector) = vector_arg(ctx, 0) else {
            return Ok(None);
        };
        Ok(Some(match form {
            VectorForm::Json => rusqlite::types::Value::Text(vector.to_json()?),
            _ => rusqlite::types::Value::Blob(vector.encode(form)?),
        }))
    })
}

pub fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function("vector_version", 0, pure(), |_| Ok(vss_vector::VERSION))?;
    conn.create_scalar_function("vss_version", 0, pure(), |_| Ok(env!("CARGO_PKG_VERSION")))?;
    conn.create_scalar_function("vss_debug", 0, pure(), |_| {
        Ok(format!(
            "version: {}\nindex backends: Flat, IVF",
            env!("CARGO_PKG_VERSION")
        ))
    })?;
    conn.create_scalar_function("vss_memory_usage", 0, FunctionFlags::SQLITE_UTF8, |_| {
        Ok(i64::try_from(memory::allocated_kb()).unwrap_or(i64::MAX))
    })?;

    conn.create_scalar_function("vector_debug", 1, pure(), |ctx| {
        let vector = vector_arg(ctx, 0)
            .ok_or_else(|| VssError::Parameter("Value not a vector".into()))?;
        Ok(vector.debug_string())
    })?;
    conn.create_scalar_function("vector_length", 1, pure(), |ctx| {
        Ok(vector_arg(ctx, 0).map(|v| v.len() as i64))
    })?;
    conn.create_scalar_function("vector_value_at", 2, pure(), |ctx| {
        let Some(vector) = vector_arg(ctx, 0) else {
            return Ok(None);
        };
        let pos: i64 = ctx.get(1)?;
        let value = usize::try_from(pos)
            .ok()
            .and_then(|i| vector.get(i))
            .ok_or_else(|| {
                VssError::Parameter(format!(
                    "{pos} out of range: vector has {} elements",
                    vector.len()
                ))
            })?;
        Ok(Some(f64::from(value)))
    })?;
    conn.create_scalar_function("vector_from", -1, pure(), |ctx| {
        let data = (0..ctx.len())
            .map(|i| match ctx.get_raw(i) {
                ValueRef::Integer(n) => Ok(n as f32),
                ValueRef::Real(f) => Ok(f as f32),
                _ => Err(VssError::Parameter(format!(
                    "vector_from() argument {} is not a number",
                    i + 1
                ))),
            })
            .collect::<Result<Vec<f32>>>()?;
        Ok(Vector::new(data).to_tagged())
    })?;

    decode_function(conn, "vector_from_blob", VectorForm::Tagged)?;
    decode_function(conn, "vector_from_raw", VectorForm::Raw)?;
    decode_function(conn, "vector_from_json", VectorForm::Json)?;
    encode_function(conn, "vector_to_blob", VectorForm::Tagged)?;
    encode_function(conn, "vector_to_raw", VectorForm::Raw)?;
    encode_function(conn, "vector_to_json", VectorForm::Json)?;

    metric_function(conn, "vss_distance_l1", distance::l1)?;
    metric_function(conn, "vss_distance_l2", distance::l2_squared)?;
    metric_function(conn, "vss_distance_linf", distance::linf)?;
    metric_function(conn, "vss_inner_product", distance::inner_product)?;
    metric_function(conn, "vss_cosine_similarity", distance::cosine_similarity)?;
    elementwise_function(conn, "vss_fvec_add", distance::fvec_add)?;
    elementwise_function(conn, "vss_fvec_sub", distance::fvec_sub)?;

    // Only meaningful as vss0 constraints; the table consumes them.
    conn.create_scalar_function("vss_search", 2, pure(), |_| Ok(None::<i64>))?;
    conn.create_scalar_function("vss_range_search", 2, pure(), |_| Ok(None::<i64>))?;

    conn.create_scalar_function("vss_search_params", 2, pure(), |ctx| {
        let vector = vector_arg(ctx, 0)
            .ok_or_else(|| VssError::Parameter("1st argument is not a vector".into()))?;
        let k: i64 = ctx.get(1)?;
        Ok(SearchParams::Knn { vector, k }.to_blob())
    })?;
    conn.create_scalar_function("vss_range_search_params", 2, pure(), |ctx| {
        let vector = vector_arg(ctx, 0)
            .ok_or_else(|| VssError::Parameter("1st argument is not a vector".into()))?;
        let radius: f64 = ctx.get(1)?;
        Ok(SearchParams::Range {
            vector,
            radius: radius as f32,
        }
        .to_blob())
    })?;

    Ok(())
}

pub fn unregister_functions(conn: &Connection) -> Result<()> {
    for (name, n_arg) in FUNCTIONS {
        conn.remove_function(*name, *n_arg)?;
    }
    Ok(())
}
