//! Migration helpers for creating vss tables

use rusqlite::Connection;
use vss_core::{Result, VssError};
use vss_index::IndexSpec;
use vss_vector::MetricType;

/// Declaration of one vector column of a vss table
#[derive(Debug, Clone, PartialEq)]
pub struct VssColumn {
    pub name: String,
    pub dimension: usize,
    pub factory: Option<IndexSpec>,
    pub metric: Option<MetricType>,
}

impl VssColumn {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            factory: None,
            metric: None,
        }
    }

    /// Use the given build spec instead of the module default.
    pub fn factory(mut self, spec: &str) -> Result<Self> {
        self.factory = Some(spec.parse()?);
        Ok(self)
    }

    pub fn metric(mut self, metric: MetricType) -> Self {
        self.metric = Some(metric);
        self
    }

    /// The argument this column contributes to `USING vss0(...)`.
    pub fn declaration(&self) -> String {
        let mut decl = format!("{}({})", self.name, self.dimension);
        if let Some(spec) = &self.factory {
            decl.push_str(&format!(" factory=\"{spec}\""));
        }
        if let Some(metric) = &self.metric {
            decl.push_str(&format!(" metric_type={metric}"));
        }
        decl
    }
}

/// Create a vss table with the given vector columns.
///
/// # Example
///
/// ```no_run
/// use vss::{create_vss_table, VssColumn, VssStore};
/// use vss::prelude::*;
///
/// # fn example() -> Result<()> {
/// let store = VssStore::open(StoreConfig::new("./vectors.db"))?;
/// store.execute(|conn| {
///     create_vss_table(
///         conn,
///         "vss_articles",
///         &[
///             VssColumn::new("headline_embedding", 384),
///             VssColumn::new("body_embedding", 384).factory("IVF64,Flat,IDMap2")?,
///         ],
///     )
/// })?;
/// # Ok(())
/// # }
/// ```
pub fn create_vss_table(conn: &Connection, table: &str, columns: &[VssColumn]) -> Result<()> {
    create_vss_table_with_module(conn, "vss0", table, columns)
}

/// [`create_vss_table`] for a module registered under a custom name.
pub fn create_vss_table_with_module(
    conn: &Connection,
    module: &str,
    table: &str,
    columns: &[VssColumn],
) -> Result<()> {
    validate_sql_identifier(module, "Module")?;
    validate_sql_identifier(table, "Table")?;
    if columns.is_empty() {
        return Err(VssError::Config(format!(
            "vss table {table} needs at least one vector column"
        )));
    }
    for column in columns {
        validate_sql_identifier(&column.name, "Column")?;
        if column.dimension == 0 {
            return Err(VssError::Config(format!(
                "Column {} must have at least one dimension",
                column.name
            )));
        }
    }

    let declarations = columns
        .iter()
        .map(VssColumn::declaration)
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE {table} USING {module}({declarations})"
    ))?;

    tracing::info!("Created vss table {} ({})", table, declarations);
    Ok(())
}

/// Drop a vss table together with its shadow tables.
pub fn drop_vss_table(conn: &Connection, table: &str) -> Result<()> {
    validate_sql_identifier(table, "Table")?;
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
    tracing::info!("Dropped vss table {}", table);
    Ok(())
}

/// Only allows `[a-zA-Z_][a-zA-Z0-9_]*`, at most 128 characters.
pub(crate) fn validate_sql_identifier(name: &str, kind: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(VssError::Config(format!("{kind} name must not be empty")));
    };
    if name.len() > 128 {
        return Err(VssError::Config(format!(
            "{kind} name must be 128 characters or fewer, got {}",
            name.len()
        )));
    }
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(VssError::Config(format!(
            "{kind} name '{name}' must start with a letter or underscore"
        )));
    }
    if let Some(c) = chars.find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(VssError::Config(format!(
            "{kind} name '{name}' contains invalid character '{c}'. \
             Only ASCII alphanumeric and underscore are allowed."
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifier() {
        for ok in ["table_name", "_private", "Table123", "_"] {
            assert!(validate_sql_identifier(ok, "Table").is_ok(), "{ok}");
        }
        for bad in ["", "123table", "table-name", "table.name", "table name", "table'name"] {
            assert!(validate_sql_identifier(bad, "Table").is_err(), "{bad}");
        }
        assert!(validate_sql_identifier(&"a".repeat(129), "Table").is_err());
    }

    #[test]
    fn test_declarations() {
        assert_eq!(VssColumn::new("a", 2).declaration(), "a(2)");
        let column = VssColumn::new("b", 8)
            .factory("IVF4,Flat,IDMap2")
            .unwrap()
            .metric(MetricType::InnerProduct);
        assert_eq!(
            column.declaration(),
            "b(8) factory=\"IVF4,Flat,IDMap2\" metric_type=INNER_PRODUCT"
        );
        assert!(VssColumn::new("c", 2).factory("HNSW32").is_err());
    }

    #[test]
    fn test_create_and_drop() {
        let conn = Connection::open_in_memory().unwrap();
        vss_sqlite::register(&conn).unwrap();

        create_vss_table(
            &conn,
            "vss_docs",
            &[VssColumn::new("a", 2), VssColumn::new("b", 3).metric(MetricType::L1)],
        )
        .unwrap();
        conn.execute("insert into vss_docs(rowid, a, b) values (1, '[1, 0]', '[0, 0, 1]')", [])
            .unwrap();

        assert!(create_vss_table(&conn, "bad-name", &[VssColumn::new("a", 2)]).is_err());
        assert!(create_vss_table(&conn, "empty", &[]).is_err());
        assert!(create_vss_table(&conn, "zero", &[VssColumn::new("a", 0)]).is_err());

        drop_vss_table(&conn, "vss_docs").unwrap();
        let remaining: i64 = conn
            .query_row(
                "select count(*) from sqlite_master where name like 'vss_docs%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
