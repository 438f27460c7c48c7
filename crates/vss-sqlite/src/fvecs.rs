//! `vector_fvecs_each(blob)`: one row per record of an `.fvecs` buffer
//!
//! Records are `[dim: i32 LE][dim x f32 LE]`, repeated until the end of the
//! buffer.

use std::marker::PhantomData;
use std::os::raw::c_int;

use rusqlite::types::Null;
use rusqlite::vtab::{
    eponymous_only_module, sqlite3_vtab, sqlite3_vtab_cursor, Context, Filters, IndexConstraintOp,
    IndexInfo, VTab, VTabConnection, VTabCursor,
};
use rusqlite::Connection;
use vss_core::{Result, VssError};
use vss_vector::Vector;

pub const FVECS_EACH_NAME: &str = "vector_fvecs_each";

const DIMENSIONS_COLUMN: c_int = 0;
const VECTOR_COLUMN: c_int = 1;
const INPUT_COLUMN: c_int = 2;

/// Split an fvecs buffer into its vectors.
pub fn parse_fvecs(mut bytes: &[u8]) -> Result<Vec<Vector>> {
    let mut vectors = Vec::new();
    while !bytes.is_empty() {
        let record = vectors.len() + 1;
        let (header, rest) = bytes.split_first_chunk::<4>().ok_or_else(|| {
            VssError::Parameter(format!("fvecs record {record} has a truncated header"))
        })?;
        let dim = usize::try_from(i32::from_le_bytes(*header)).map_err(|_| {
            VssError::Parameter(format!("fvecs record {record} has a negative dimension"))
        })?;
        let len = dim * 4;
        if rest.len() < len {
            return Err(VssError::Parameter(format!(
                "fvecs record {record} is truncated: {} of {len} bytes",
                rest.len()
            )));
        }
        vectors.push(Vector::from_raw(&rest[..len])?);
        bytes = &rest[len..];
    }
    Ok(vectors)
}

pub fn register_fvecs_each(conn: &Connection) -> Result<()> {
    conn.create_module(
        FVECS_EACH_NAME,
        eponymous_only_module::<FvecsEachTab>(),
        None,
    )?;
    Ok(())
}

#[repr(C)]
pub struct FvecsEachTab {
    base: sqlite3_vtab,
}

unsafe impl<'vtab> VTab<'vtab> for FvecsEachTab {
    type Aux = ();
    type Cursor = FvecsEachCursor<'vtab>;

    fn connect(
        _: &mut VTabConnection,
        _aux: Option<&()>,
        _args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        Ok((
            "create table x(dimensions, vector, input hidden)".to_owned(),
            FvecsEachTab {
                base: sqlite3_vtab::default(),
            },
        ))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let input = info.constraints().position(|c| {
            c.column() == INPUT_COLUMN
                && c.operator() == IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ
                && c.is_usable()
        });
        match input {
            Some(i) => {
                let mut usage = info.constraint_usage(i);
                usage.set_argv_index(1);
                usage.set_omit(true);
                info.set_estimated_cost(10.0);
                info.set_estimated_rows(10);
            }
            None => {
                info.set_estimated_cost(f64::MAX);
            }
        }
        Ok(())
    }

    fn open(&'vtab mut self) -> rusqlite::Result<FvecsEachCursor<'vtab>> {
        Ok(FvecsEachCursor {
            base: sqlite3_vtab_cursor::default(),
            vectors: Vec::new(),
            pos: 0,
            phantom: PhantomData,
        })
    }
}

#[repr(C)]
pub struct FvecsEachCursor<'vtab> {
    base: sqlite3_vtab_cursor,
    vectors: Vec<Vector>,
    pos: usize,
    phantom: PhantomData<&'vtab FvecsEachTab>,
}

unsafe impl VTabCursor for FvecsEachCursor<'_> {
    fn filter(
        &mut self,
        _idx_num: c_int,
        _idx_str: Option<&str>,
        args: &Filters<'_>,
    ) -> rusqlite::Result<()> {
        if args.is_empty() {
            return Err(VssError::Parameter(format!(
                "{FVECS_EACH_NAME}() requires an fvecs blob argument"
            ))
            .into());
        }
        let blob: Vec<u8> = args.get(0)?;
        self.vectors = parse_fvecs(&blob)?;
        self.pos = 0;
        Ok(())
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.pos >= self.vectors.len()
    }

    fn column(&self, ctx: &mut Context, i: c_int) -> rusqlite::Result<()> {
        let vector = &self.vectors[self.pos];
        match i {
            DIMENSIONS_COLUMN => ctx.set_result(&(vector.len() as i64)),
            VECTOR_COLUMN => ctx.set_result(&vector.to_tagged()),
            _ => ctx.set_result(&Null),
        }
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.pos as i64 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(values: &[f32]) -> Vec<u8> {
        let mut out = (values.len() as i32).to_le_bytes().to_vec();
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_parse_records() {
        let mut blob = record(&[1.0, 2.0]);
        blob.extend(record(&[3.0]));
        blob.extend(record(&[]));

        let vectors = parse_fvecs(&blob).unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0].as_slice(), &[1.0, 2.0]);
        assert_eq!(vectors[1].as_slice(), &[3.0]);
        assert!(vectors[2].is_empty());
        assert!(parse_fvecs(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_truncated() {
        let mut blob = record(&[1.0, 2.0]);
        blob.truncate(blob.len() - 1);
        assert!(parse_fvecs(&blob).unwrap_err().to_string().contains("truncated"));
        assert!(parse_fvecs(&[1, 0]).is_err());
        assert!(parse_fvecs(&(-1i32).to_le_bytes()).is_err());
    }

    #[test]
    fn test_table_function() {
        let conn = Connection::open_in_memory().unwrap();
        register_fvecs_each(&conn).unwrap();
        crate::functions::register_functions(&conn).unwrap();

        let mut blob = record(&[1.0, 2.0]);
        blob.extend(record(&[3.0, 4.0, 5.0]));

        let mut stmt = conn
            .prepare(
                "select rowid, dimensions, vector_to_json(vector) from vector_fvecs_each(?1)",
            )
            .unwrap();
        let rows: Vec<(i64, i64, String)> = stmt
            .query_map([blob], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![
                (1, 2, "[1.0,2.0]".to_string()),
                (2, 3, "[3.0,4.0,5.0]".to_string()),
            ]
        );
    }
}
