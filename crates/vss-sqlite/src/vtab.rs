//! The `vss0` virtual table
//!
//! Every vector column owns an [`IndexAdapter`]. DML applies to the adapters
//! immediately and marks them dirty; `xSync` writes dirty adapters to the
//! `_index` table as part of SQLite's commit. On rollback the adapters are
//! marked stale and reloaded from the committed blobs the next time they are
//! used, replaying the savepoint journal when only part of the transaction was
//! rolled back.

use std::cell::RefCell;
use std::os::raw::c_int;

use rusqlite::types::{Value, ValueRef};
use rusqlite::vtab::{
    sqlite3_vtab, CreateVTab, IndexConstraintOp, IndexInfo, Inserts, TransactionVTab, UpdateVTab,
    Updates, VTab, VTabConfig, VTabConnection, VTabKind,
};
use rusqlite::Connection;
use vss_core::{observe, DecodeError, Result, VssConfig, VssError};
use vss_index::{Capabilities, IndexAdapter, IndexOptions, Neighbor};
use vss_vector::Vector;

use crate::columns::{self, ColumnDescriptor, DISTANCE_COLUMN, FIRST_VECTOR_COLUMN, OPERATION_COLUMN};
use crate::cursor::VssCursor;
use crate::journal::{Journal, JournalEntry};
use crate::plan::{
    self, ConstraintKind, ConstraintShape, ScanStrategy, RANGE_SEARCH_FUNCTION_OP,
    SEARCH_FUNCTION_OP,
};
use crate::shadow::ShadowTables;

/// Value of the `operation` column that routes an insert into training.
pub const TRAINING_OPERATION: &str = "training";

struct TableState {
    indexes: Vec<IndexAdapter>,
    journal: Journal,
    /// Set when `indexes` no longer reflect the committed blobs plus the
    /// journal; holds the reason for the pending reload.
    stale: Option<&'static str>,
    data_version: Option<i64>,
}

#[repr(C)]
pub struct VssTab {
    base: sqlite3_vtab,
    conn: Connection,
    module: String,
    table: String,
    shadow: ShadowTables,
    columns: Vec<ColumnDescriptor>,
    options: IndexOptions,
    track_data_version: bool,
    state: RefCell<TableState>,
}

fn fresh_adapter(column: &ColumnDescriptor, options: IndexOptions) -> Result<IndexAdapter> {
    IndexAdapter::new(
        column.name.clone(),
        column.dimension,
        column.metric,
        column.spec,
        options,
    )
}

fn load_indexes(
    conn: &Connection,
    shadow: &ShadowTables,
    columns: &[ColumnDescriptor],
    options: IndexOptions,
) -> Result<Vec<IndexAdapter>> {
    columns
        .iter()
        .enumerate()
        .map(|(ordinal, column)| match shadow.read_index(conn, ordinal)? {
            Some(blob) => {
                let adapter = IndexAdapter::from_bytes(column.name.clone(), &blob, options)?;
                if !adapter.matches(column.dimension, column.metric, &column.spec) {
                    return Err(VssError::Config(format!(
                        "index blob for column {} does not match its declaration",
                        column.name
                    )));
                }
                Ok(adapter)
            }
            None => {
                let mut adapter = fresh_adapter(column, options)?;
                adapter.mark_dirty();
                Ok(adapter)
            }
        })
        .collect()
}

fn replay(indexes: &mut [IndexAdapter], journal: &Journal) -> Result<()> {
    for entry in journal.operations() {
        match entry {
            JournalEntry::Insert { id, vectors } => {
                for (index, vector) in indexes.iter_mut().zip(vectors) {
                    index.add(*id, vector)?;
                }
            }
            JournalEntry::Delete { id } => {
                for index in indexes.iter_mut() {
                    index.remove_ids(&[*id])?;
                }
            }
            JournalEntry::Training { vectors } => {
                for (index, vector) in indexes.iter_mut().zip(vectors) {
                    if let Some(vector) = vector {
                        index.add_training(vector)?;
                    }
                }
            }
            JournalEntry::Savepoint(_) => {}
        }
    }
    Ok(())
}

/// Human readable rendering of an `operation` value for error messages
fn describe(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} byte blob>", b.len()),
    }
}

impl VssTab {
    fn init(
        db: &mut VTabConnection,
        aux: Option<&VssConfig>,
        args: &[&[u8]],
        create: bool,
    ) -> Result<(String, Self)> {
        let default_config;
        let config = match aux {
            Some(config) => config,
            None => {
                default_config = VssConfig::default();
                &default_config
            }
        };

        let args = args
            .iter()
            .map(|arg| std::str::from_utf8(arg))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VssError::Config(format!("constructor arguments are not UTF-8: {e}")))?;
        let [module, schema, table, column_args @ ..] = args.as_slice() else {
            return Err(VssError::Config(
                "Error parsing VSS index factory constructor".to_string(),
            ));
        };

        let columns = columns::parse_columns(column_args, config)?;
        db.config(VTabConfig::ConstraintSupport)?;

        // The handle belongs to SQLite; this wrapper never closes it.
        let conn = unsafe { Connection::from_handle(db.handle())? };
        let shadow = ShadowTables::new(*schema, *table, columns.len());
        let options = IndexOptions::from(config);

        let indexes = if create {
            shadow.create(&conn)?;
            let indexes = columns
                .iter()
                .map(|column| fresh_adapter(column, options))
                .collect::<Result<Vec<_>>>()?;
            for (ordinal, index) in indexes.iter().enumerate() {
                shadow.write_index(&conn, ordinal, &index.to_bytes()?)?;
            }
            tracing::info!(table = %table, columns = columns.len(), "created vss table");
            indexes
        } else {
            let indexes = load_indexes(&conn, &shadow, &columns, options)?;
            tracing::info!(table = %table, columns = columns.len(), "connected vss table");
            indexes
        };

        let data_version = if config.track_data_version {
            Some(shadow.data_version(&conn)?)
        } else {
            None
        };

        let vtab = VssTab {
            base: sqlite3_vtab::default(),
            conn,
            module: module.to_string(),
            table: table.to_string(),
            shadow,
            options,
            track_data_version: config.track_data_version,
            state: RefCell::new(TableState {
                indexes,
                journal: Journal::default(),
                stale: None,
                data_version,
            }),
            columns,
        };
        Ok((columns::declare_sql(&vtab.columns), vtab))
    }

    pub(crate) fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn shadow(&self) -> &ShadowTables {
        &self.shadow
    }

    /// Bring the in-memory indexes up to date with the committed blobs.
    ///
    /// No borrow of the table state is held while SQL runs: statements issued
    /// here can call back into the savepoint hooks.
    pub(crate) fn refresh(&self) -> Result<()> {
        if self.track_data_version {
            let current = self.shadow.data_version(&self.conn)?;
            let mut state = self.state.borrow_mut();
            if state.data_version != Some(current) {
                let clean = !state.indexes.iter().any(IndexAdapter::is_dirty);
                if clean && state.journal.is_empty() && state.stale.is_none() {
                    state.stale = Some("data_version");
                }
                state.data_version = Some(current);
            }
        }

        let Some(reason) = self.state.borrow().stale else {
            return Ok(());
        };
        let mut indexes = load_indexes(&self.conn, &self.shadow, &self.columns, self.options)?;
        let mut state = self.state.borrow_mut();
        replay(&mut indexes, &state.journal)?;
        state.indexes = indexes;
        state.stale = None;
        observe::record_reload(reason);
        tracing::debug!(table = %self.table, reason, "reloaded indexes");
        Ok(())
    }

    pub(crate) fn search(&self, column: usize, query: &Vector, k: i64) -> Result<Vec<Neighbor>> {
        let state = self.state.borrow();
        state.indexes[column].search(query.as_slice(), k)
    }

    pub(crate) fn range_search(
        &self,
        column: usize,
        query: &Vector,
        radius: f32,
    ) -> Result<Vec<Neighbor>> {
        let state = self.state.borrow();
        state.indexes[column].range_search(query.as_slice(), radius)
    }

    pub(crate) fn reconstruct(&self, column: usize, id: i64) -> Result<Vec<f32>> {
        let state = self.state.borrow();
        let index = state
            .indexes
            .get(column)
            .ok_or_else(|| VssError::InvalidState(format!("no vector column {column}")))?;
        index.reconstruct(id)
    }

    fn coerce(column: &ColumnDescriptor, value: &Value) -> Result<Option<Vector>> {
        if let Value::Null = value {
            return Ok(None);
        }
        let vector = Vector::from_value(ValueRef::from(value))?
            .ok_or(VssError::Decode(DecodeError::NotAVector))?;
        if vector.len() != column.dimension {
            return Err(VssError::Dimension {
                got: vector.len(),
                want: column.dimension,
            });
        }
        Ok(Some(vector))
    }

    fn insert_row(&self, rowid: Option<i64>, values: &[Value]) -> Result<i64> {
        let mut vectors = Vec::with_capacity(values.len());
        {
            let state = self.state.borrow();
            for ((column, value), index) in self.columns.iter().zip(values).zip(&state.indexes) {
                let vector = Self::coerce(column, value)?.ok_or_else(|| {
                    VssError::Parameter(format!(
                        "vector for column {} must not be NULL",
                        column.name
                    ))
                })?;
                index.check_insert(vector.as_slice())?;
                vectors.push(vector);
            }
        }

        let payloads: Vec<Vec<u8>> = vectors.iter().map(Vector::to_raw).collect();
        let id = self.shadow.insert_row(&self.conn, rowid, &payloads)?;

        let mut state = self.state.borrow_mut();
        for (index, vector) in state.indexes.iter_mut().zip(&vectors) {
            index.add(id, vector.as_slice())?;
        }
        state.journal.record(JournalEntry::Insert {
            id,
            vectors: vectors.into_iter().map(Vector::into_inner).collect(),
        });
        observe::record_mutation("insert");
        tracing::debug!(table = %self.table, id, "inserted row");
        Ok(id)
    }

    fn insert_training(&self, values: &[Value]) -> Result<()> {
        let mut state = self.state.borrow_mut();

        let vectors = self
            .columns
            .iter()
            .zip(values)
            .map(|(column, value)| Ok(Self::coerce(column, value)?.map(Vector::into_inner)))
            .collect::<Result<Vec<_>>>()?;

        for (index, vector) in state.indexes.iter_mut().zip(&vectors) {
            if let Some(vector) = vector {
                index.add_training(vector)?;
            }
        }

        state.journal.record(JournalEntry::Training { vectors });
        observe::record_mutation("train");
        Ok(())
    }

    fn delete_row(&self, id: i64) -> Result<()> {
        for index in &self.state.borrow().indexes {
            if !index.capabilities().contains(Capabilities::REMOVE_IDS) && !index.is_empty() {
                return Err(VssError::Capability("remove_ids"));
            }
        }

        self.shadow.delete_row(&self.conn, id)?;

        let mut state = self.state.borrow_mut();
        for index in state.indexes.iter_mut() {
            index.remove_ids(&[id])?;
        }
        state.journal.record(JournalEntry::Delete { id });
        observe::record_mutation("delete");
        tracing::debug!(table = %self.table, id, "deleted row");
        Ok(())
    }

    /// Train what can be trained and persist every dirty index.
    fn flush(&self) -> Result<()> {
        self.refresh()?;

        let mut pending = Vec::new();
        for (ordinal, index) in self.state.borrow_mut().indexes.iter_mut().enumerate() {
            index.train_pending()?;
            if index.is_dirty() {
                pending.push((ordinal, index.to_bytes()?));
            }
        }

        for (ordinal, blob) in pending {
            let started = std::time::Instant::now();
            self.shadow.write_index(&self.conn, ordinal, &blob)?;
            self.state.borrow_mut().indexes[ordinal].mark_clean();
            observe::record_flush(blob.len(), started.elapsed());
            tracing::debug!(
                table = %self.table,
                column = %self.columns[ordinal].name,
                bytes = blob.len(),
                "flushed index"
            );
        }
        Ok(())
    }

    pub(crate) fn savepoint(&self, level: c_int) {
        self.state.borrow_mut().journal.savepoint(level);
    }

    pub(crate) fn release(&self, level: c_int) {
        self.state.borrow_mut().journal.release(level);
    }

    pub(crate) fn rollback_to(&self, level: c_int) {
        let mut state = self.state.borrow_mut();
        if state.journal.rollback_to(level) {
            state.stale = Some("savepoint");
            tracing::debug!(table = %self.table, level, "rolled back to savepoint");
        }
    }
}

unsafe impl<'vtab> VTab<'vtab> for VssTab {
    type Aux = VssConfig;
    type Cursor = VssCursor<'vtab>;

    fn connect(
        db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        Ok(Self::init(db, aux, args, false)?)
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let shapes: Vec<ConstraintShape> = info
            .constraints()
            .map(|constraint| ConstraintShape {
                column: constraint.column(),
                kind: match constraint.operator() {
                    IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_FUNCTION(SEARCH_FUNCTION_OP) => {
                        ConstraintKind::Search
                    }
                    IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_FUNCTION(
                        RANGE_SEARCH_FUNCTION_OP,
                    ) => ConstraintKind::RangeSearch,
                    IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LIMIT => ConstraintKind::Limit,
                    _ => ConstraintKind::Other,
                },
                usable: constraint.is_usable(),
            })
            .collect();

        let plan = plan::select(&shapes, self.columns.len());
        if let Some(i) = plan.query_constraint {
            let mut usage = info.constraint_usage(i);
            usage.set_argv_index(1);
            usage.set_omit(true);
        }
        if let Some(i) = plan.limit_constraint {
            info.constraint_usage(i).set_argv_index(2);
        }

        // Search results come back nearest first, which only matches
        // `ORDER BY distance` for true distances.
        if let ScanStrategy::Search(column) = plan.strategy {
            let ascending_distance = {
                let mut order_bys = info.order_bys();
                matches!(
                    (order_bys.next(), order_bys.next()),
                    (Some(order), None)
                        if order.column() == DISTANCE_COLUMN && !order.is_order_by_desc()
                )
            };
            if ascending_distance && !self.columns[column].metric.is_similarity() {
                info.set_order_by_consumed(true);
            }
        }

        info.set_idx_num(plan.strategy.idx_num());
        info.set_idx_str(plan.strategy.idx_str());
        info.set_estimated_cost(plan.strategy.estimated_cost());
        info.set_estimated_rows(plan.strategy.estimated_rows());
        Ok(())
    }

    fn open(&'vtab mut self) -> rusqlite::Result<VssCursor<'vtab>> {
        Ok(VssCursor::new())
    }
}

impl<'vtab> CreateVTab<'vtab> for VssTab {
    const KIND: VTabKind = VTabKind::Default;

    fn create(
        db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        Ok(Self::init(db, aux, args, true)?)
    }

    fn destroy(&self) -> rusqlite::Result<()> {
        self.shadow.drop_tables(&self.conn)?;
        tracing::info!(table = %self.table, "dropped vss table");
        Ok(())
    }
}

impl<'vtab> UpdateVTab<'vtab> for VssTab {
    fn delete(&mut self, arg: ValueRef<'_>) -> rusqlite::Result<()> {
        let ValueRef::Integer(id) = arg else {
            return Err(VssError::Parameter("DELETE requires an integer rowid".to_string()).into());
        };
        self.refresh()?;
        self.delete_row(id)?;
        Ok(())
    }

    fn insert(&mut self, args: &Inserts<'_>) -> rusqlite::Result<i64> {
        // argv: old rowid, new rowid, then one value per declared column
        let operation: Value = args.get(2 + OPERATION_COLUMN as usize)?;
        let values = (0..self.columns.len())
            .map(|i| args.get::<Value>(2 + FIRST_VECTOR_COLUMN as usize + i))
            .collect::<rusqlite::Result<Vec<_>>>()?;

        self.refresh()?;
        match operation {
            Value::Null => {
                let rowid: Option<i64> = args.get(1)?;
                Ok(self.insert_row(rowid, &values)?)
            }
            Value::Text(op) if op == TRAINING_OPERATION => {
                self.insert_training(&values)?;
                Ok(0)
            }
            other => Err(VssError::Parameter(format!(
                "unknown operation '{}'",
                describe(&other)
            ))
            .into()),
        }
    }

    fn update(&mut self, _args: &Updates<'_>) -> rusqlite::Result<()> {
        Err(VssError::Unsupported(format!(
            "UPDATE statements on {} virtual tables not supported yet",
            self.module
        ))
        .into())
    }
}

impl<'vtab> TransactionVTab<'vtab> for VssTab {
    fn begin(&mut self) -> rusqlite::Result<()> {
        self.state.get_mut().journal.clear();
        self.refresh()?;
        Ok(())
    }

    fn sync(&mut self) -> rusqlite::Result<()> {
        self.flush()?;
        Ok(())
    }

    fn commit(&mut self) -> rusqlite::Result<()> {
        self.state.get_mut().journal.clear();
        Ok(())
    }

    fn rollback(&mut self) -> rusqlite::Result<()> {
        let state = self.state.get_mut();
        state.journal.clear();
        state.stale = Some("rollback");
        tracing::debug!(table = %self.table, "transaction rolled back, indexes stale");
        Ok(())
    }
}
