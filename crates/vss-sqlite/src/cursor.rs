use std::marker::PhantomData;
use std::os::raw::c_int;
use std::time::Instant;

use rusqlite::types::{Null, Value, ValueRef};
use rusqlite::vtab::{sqlite3_vtab_cursor, Context, Filters, VTabCursor};
use vss_core::{observe, Result, VssError};
use vss_index::Neighbor;
use vss_vector::Vector;

use crate::columns::{DISTANCE_COLUMN, FIRST_VECTOR_COLUMN, OPERATION_COLUMN};
use crate::params::SearchParams;
use crate::plan::ScanStrategy;
use crate::vtab::VssTab;

/// First SQLite release whose planner passes a plain vector through
/// `vss_search()` together with a LIMIT constraint
const VECTOR_ARGUMENT_MIN_SQLITE: i32 = 3_041_000;

#[repr(C)]
pub struct VssCursor<'vtab> {
    base: sqlite3_vtab_cursor,
    phantom: PhantomData<&'vtab VssTab>,
    rows: Vec<i64>,
    /// Present for search and range search, absent for full scans
    distances: Option<Vec<f32>>,
    pos: usize,
}

impl<'vtab> VssCursor<'vtab> {
    pub(crate) fn new() -> Self {
        VssCursor {
            base: sqlite3_vtab_cursor::default(),
            phantom: PhantomData,
            rows: Vec::new(),
            distances: None,
            pos: 0,
        }
    }

    fn vtab(&self) -> &'vtab VssTab {
        unsafe { &*(self.base.pVtab as *const VssTab) }
    }

    fn set_hits(&mut self, hits: Vec<Neighbor>) {
        let (rows, distances): (Vec<i64>, Vec<f32>) =
            hits.into_iter().map(|n| (n.id, n.distance)).unzip();
        self.rows = rows;
        self.distances = Some(distances);
    }

    fn current(&self) -> Result<i64> {
        self.rows
            .get(self.pos)
            .copied()
            .ok_or_else(|| VssError::InvalidState("cursor is past the last row".to_string()))
    }
}

fn search_arguments(args: &Filters<'_>) -> Result<(Vector, i64)> {
    let not_a_vector =
        || VssError::Parameter("2nd argument to vss_search() must be a vector".to_string());

    let first: Value = args.get(0)?;
    match SearchParams::from_value(ValueRef::from(&first)) {
        Some(SearchParams::Knn { vector, k }) => return Ok((vector, k)),
        Some(SearchParams::Range { .. }) => return Err(not_a_vector()),
        None => {}
    }

    if rusqlite::version_number() < VECTOR_ARGUMENT_MIN_SQLITE {
        return Err(VssError::Parameter(
            "vss_search() only support vss_search_params() as a 2nd parameter for SQLite versions below 3.41.0"
                .to_string(),
        ));
    }

    let vector = match Vector::from_value(ValueRef::from(&first)) {
        Ok(Some(vector)) => vector,
        _ => return Err(not_a_vector()),
    };
    if args.len() < 2 {
        return Err(VssError::Parameter(
            "LIMIT required on vss_search() queries".to_string(),
        ));
    }
    let k: i64 = args.get(1)?;
    Ok((vector, k))
}

fn range_arguments(args: &Filters<'_>) -> Result<(Vector, f32)> {
    let first: Value = args.get(0)?;
    match SearchParams::from_value(ValueRef::from(&first)) {
        Some(SearchParams::Range { vector, radius }) => Ok((vector, radius)),
        _ => Err(VssError::Parameter(
            "2nd argument to vss_range_search() must be a vss_range_search_params() value"
                .to_string(),
        )),
    }
}

unsafe impl VTabCursor for VssCursor<'_> {
    fn filter(
        &mut self,
        idx_num: c_int,
        idx_str: Option<&str>,
        args: &Filters<'_>,
    ) -> rusqlite::Result<()> {
        let table = self.vtab();
        table.refresh()?;
        self.pos = 0;

        match ScanStrategy::decode(idx_num, idx_str, table.columns().len())? {
            ScanStrategy::Search(column) => {
                let (query, k) = search_arguments(args)?;
                let started = Instant::now();
                let hits = table.search(column, &query, k)?;
                observe::record_search("knn", started.elapsed(), hits.len());
                self.set_hits(hits);
            }
            ScanStrategy::RangeSearch(column) => {
                let (query, radius) = range_arguments(args)?;
                let started = Instant::now();
                let hits = table.range_search(column, &query, radius)?;
                observe::record_search("range", started.elapsed(), hits.len());
                self.set_hits(hits);
            }
            ScanStrategy::Fullscan => {
                self.rows = table.shadow().row_ids(table.conn())?;
                self.distances = None;
            }
        }
        Ok(())
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.pos >= self.rows.len()
    }

    fn column(&self, ctx: &mut Context, i: c_int) -> rusqlite::Result<()> {
        match i {
            DISTANCE_COLUMN => match self.distances.as_ref().and_then(|d| d.get(self.pos)) {
                Some(distance) => ctx.set_result(&f64::from(*distance)),
                None => ctx.set_result(&Null),
            },
            OPERATION_COLUMN => ctx.set_result(&Null),
            _ => {
                let column = usize::try_from(i - FIRST_VECTOR_COLUMN).map_err(|_| {
                    VssError::InvalidState(format!("no column {i}"))
                })?;
                let vector = Vector::new(self.vtab().reconstruct(column, self.current()?)?);
                ctx.set_result(&vector.to_json()?)
            }
        }
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.current()?)
    }
}
