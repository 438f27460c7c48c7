//! Search builder over a vss table

use crate::migration::validate_sql_identifier;
use crate::store::VssStore;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use vss_core::{Result, VssError};
use vss_vector::Vector;

/// One search hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub rowid: i64,
    /// Distance (or similarity score) under the column's metric
    pub distance: f32,
}

/// Search builder for one vector column
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use vss::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let store = Arc::new(VssStore::open(StoreConfig::new("./vectors.db"))?);
/// let search = VssSearch::new(store, "vss_articles", "headline_embedding")?;
///
/// let query = Vector::new(vec![0.1, 0.2, 0.3]);
/// for hit in search.knn(&query, 10).await? {
///     println!("row {}: {}", hit.rowid, hit.distance);
/// }
/// # Ok(())
/// # }
/// ```
pub struct VssSearch {
    store: Arc<VssStore>,
    table: String,
    column: String,
    content_table: Option<String>,
}

impl VssSearch {
    /// `table` and `column` must be plain SQL identifiers.
    pub fn new(
        store: Arc<VssStore>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Result<Self> {
        let table = table.into();
        let column = column.into();
        validate_sql_identifier(&table, "Table")?;
        validate_sql_identifier(&column, "Column")?;
        Ok(Self {
            store,
            table,
            column,
            content_table: None,
        })
    }

    /// Table whose rowids match the vss table's, used by [`Self::knn_filtered`].
    pub fn content_table(mut self, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_sql_identifier(&table, "Table")?;
        self.content_table = Some(table);
        Ok(self)
    }

    /// Up to `k` nearest rows, closest first.
    pub async fn knn(&self, query: &Vector, k: usize) -> Result<Vec<SearchResult>> {
        let table = self.table.clone();
        let column = self.column.clone();
        let query = query.to_tagged();
        let k = i64::try_from(k).map_err(|_| VssError::InvalidLimit(i64::MAX))?;

        self.store
            .query_async(move |conn| knn_blocking(conn, &table, &column, query, k))
            .await
    }

    /// Every row within `radius` of `query`.
    pub async fn range(&self, query: &Vector, radius: f32) -> Result<Vec<SearchResult>> {
        let table = self.table.clone();
        let column = self.column.clone();
        let query = query.to_tagged();

        self.store
            .query_async(move |conn| {
                let sql = format!(
                    "SELECT rowid, distance FROM {table}
                     WHERE vss_range_search({column}, vss_range_search_params(?1, ?2))"
                );
                collect_hits(conn, &sql, params![query, f64::from(radius)])
            })
            .await
    }

    /// [`Self::knn`], keeping only hits whose content row matches `filter`.
    ///
    /// The filter runs against the content table aliased as `t` after the
    /// `k` nearest rows are found, so fewer than `k` rows may come back.
    /// **Always use `?` placeholders** for values and pass them in
    /// `filter_params`; never interpolate user input into `filter`.
    ///
    /// ```no_run
    /// # use vss::prelude::*;
    /// # async fn example(search: VssSearch) -> Result<()> {
    /// let query = Vector::new(vec![0.1, 0.2, 0.3]);
    /// let search = search.content_table("articles")?;
    /// let hits = search
    ///     .knn_filtered(&query, 10, "t.category = ?", vec!["tech".to_string()])
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn knn_filtered(
        &self,
        query: &Vector,
        k: usize,
        filter: &str,
        filter_params: Vec<String>,
    ) -> Result<Vec<SearchResult>> {
        let content = self.content_table.clone().ok_or_else(|| {
            VssError::Config("knn_filtered requires a content table".to_string())
        })?;
        let table = self.table.clone();
        let column = self.column.clone();
        let query = query.to_tagged();
        let k = i64::try_from(k).map_err(|_| VssError::InvalidLimit(i64::MAX))?;
        let filter = filter.to_string();

        self.store
            .query_async(move |conn| {
                let hits = knn_blocking(conn, &table, &column, query, k)?;
                if hits.is_empty() {
                    return Ok(hits);
                }

                let ids = hits
                    .iter()
                    .map(|hit| hit.rowid.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "SELECT t.rowid FROM {content} AS t WHERE t.rowid IN ({ids}) AND ({filter})"
                );
                let mut stmt = conn.prepare(&sql)?;
                let keep = stmt
                    .query_map(params_from_iter(filter_params), |row| row.get::<_, i64>(0))?
                    .collect::<rusqlite::Result<HashSet<_>>>()?;

                Ok(hits
                    .into_iter()
                    .filter(|hit| keep.contains(&hit.rowid))
                    .collect())
            })
            .await
    }
}

fn knn_blocking(
    conn: &Connection,
    table: &str,
    column: &str,
    query: Vec<u8>,
    k: i64,
) -> Result<Vec<SearchResult>> {
    let sql = format!(
        "SELECT rowid, distance FROM {table}
         WHERE vss_search({column}, vss_search_params(?1, ?2))"
    );
    collect_hits(conn, &sql, params![query, k])
}

fn collect_hits(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<SearchResult>> {
    let mut stmt = conn.prepare(sql)?;
    let hits = stmt
        .query_map(params, |row| {
            Ok(SearchResult {
                rowid: row.get(0)?,
                distance: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(hits)
}
