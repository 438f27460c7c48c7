//! Backing tables of a vss table
//!
//! - `<name>_index(ordinal INTEGER PRIMARY KEY, idx BLOB)`: one serialized
//!   index per vector column
//! - `<name>_data(id INTEGER PRIMARY KEY, c0 BLOB, ..)`: raw f32 payloads
//!   keyed by row id
//!
//! Both keys are declared `INTEGER PRIMARY KEY` so VACUUM never renumbers
//! them.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use vss_core::Result;

pub const SHADOW_SUFFIXES: [&str; 2] = ["index", "data"];

#[derive(Debug, Clone)]
pub struct ShadowTables {
    schema: String,
    table: String,
    columns: usize,
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl ShadowTables {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, columns: usize) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            columns,
        }
    }

    fn index_table(&self) -> String {
        format!("{}.{}", quote(&self.schema), quote(&format!("{}_index", self.table)))
    }

    fn data_table(&self) -> String {
        format!("{}.{}", quote(&self.schema), quote(&format!("{}_data", self.table)))
    }

    pub fn create(&self, conn: &Connection) -> Result<()> {
        let data_columns: String = (0..self.columns).map(|i| format!(", c{i} BLOB")).collect();
        conn.execute_batch(&format!(
            "CREATE TABLE {}(ordinal INTEGER PRIMARY KEY, idx BLOB NOT NULL);
             CREATE TABLE {}(id INTEGER PRIMARY KEY{data_columns});",
            self.index_table(),
            self.data_table(),
        ))?;
        Ok(())
    }

    pub fn drop_tables(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}; DROP TABLE IF EXISTS {};",
            self.index_table(),
            self.data_table(),
        ))?;
        Ok(())
    }

    pub fn read_index(&self, conn: &Connection, ordinal: usize) -> Result<Option<Vec<u8>>> {
        let blob = conn
            .query_row(
                &format!("SELECT idx FROM {} WHERE ordinal = ?1", self.index_table()),
                [ordinal as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob)
    }

    pub fn write_index(&self, conn: &Connection, ordinal: usize, blob: &[u8]) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO {}(ordinal, idx) VALUES (?1, ?2)
                 ON CONFLICT(ordinal) DO UPDATE SET idx = excluded.idx",
                self.index_table()
            ),
            params![ordinal as i64, blob],
        )?;
        Ok(())
    }

    /// Insert one row of raw payloads. `rowid` of `None` lets SQLite assign
    /// one. Returns the row id used.
    pub fn insert_row(
        &self,
        conn: &Connection,
        rowid: Option<i64>,
        payloads: &[Vec<u8>],
    ) -> Result<i64> {
        let names: String = (0..payloads.len()).map(|i| format!(", c{i}")).collect();
        let placeholders: String = (0..payloads.len()).map(|i| format!(", ?{}", i + 2)).collect();
        let sql = format!(
            "INSERT INTO {}(id{names}) VALUES (?1{placeholders})",
            self.data_table()
        );

        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(payloads.len() + 1);
        values.push(rowid.map_or(rusqlite::types::Value::Null, rusqlite::types::Value::Integer));
        values.extend(payloads.iter().cloned().map(rusqlite::types::Value::Blob));
        conn.execute(&sql, params_from_iter(values))?;

        Ok(match rowid {
            Some(id) => id,
            None => conn.last_insert_rowid(),
        })
    }

    /// Returns whether a row was deleted.
    pub fn delete_row(&self, conn: &Connection, rowid: i64) -> Result<bool> {
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.data_table()),
            [rowid],
        )?;
        Ok(deleted > 0)
    }

    pub fn row_ids(&self, conn: &Connection) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(&format!("SELECT id FROM {} ORDER BY id", self.data_table()))?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// `PRAGMA data_version` of the table's schema. Changes whenever another
    /// connection commits to the database.
    pub fn data_version(&self, conn: &Connection) -> Result<i64> {
        let version = conn.query_row(
            &format!("PRAGMA {}.data_version", quote(&self.schema)),
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Connection, ShadowTables) {
        let conn = Connection::open_in_memory().unwrap();
        let shadow = ShadowTables::new("main", "x", 2);
        shadow.create(&conn).unwrap();
        (conn, shadow)
    }

    #[test]
    fn test_index_upsert() {
        let (conn, shadow) = setup();
        assert_eq!(shadow.read_index(&conn, 0).unwrap(), None);
        shadow.write_index(&conn, 0, b"one").unwrap();
        shadow.write_index(&conn, 0, b"two").unwrap();
        assert_eq!(shadow.read_index(&conn, 0).unwrap(), Some(b"two".to_vec()));

        let rows: i64 = conn
            .query_row("SELECT count(*) FROM x_index", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_rows_keep_ids() {
        let (conn, shadow) = setup();
        let id = shadow
            .insert_row(&conn, Some(1000), &[vec![0; 8], vec![0; 4]])
            .unwrap();
        assert_eq!(id, 1000);
        let auto = shadow.insert_row(&conn, None, &[vec![0; 8], vec![0; 4]]).unwrap();
        assert_eq!(auto, 1001);
        assert!(shadow.insert_row(&conn, Some(1000), &[vec![], vec![]]).is_err());

        assert!(shadow.delete_row(&conn, 1000).unwrap());
        assert!(!shadow.delete_row(&conn, 1000).unwrap());
        assert_eq!(shadow.row_ids(&conn).unwrap(), vec![1001]);
    }

    #[test]
    fn test_drop_tables() {
        let (conn, shadow) = setup();
        shadow.drop_tables(&conn).unwrap();
        let remaining: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE name LIKE 'x_%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_data_version_readable() {
        let (conn, shadow) = setup();
        let before = shadow.data_version(&conn).unwrap();
        shadow.write_index(&conn, 1, b"x").unwrap();
        // Own commits never move data_version.
        assert_eq!(shadow.data_version(&conn).unwrap(), before);
    }
}
