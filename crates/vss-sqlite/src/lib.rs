//! SQLite surface of the vss engine
//!
//! Registers the `vss0` virtual table module, the `vector_*` and `vss_*`
//! scalar functions and the `vector_fvecs_each` table-valued function on a
//! rusqlite [`Connection`](rusqlite::Connection).
//!
//! # Example
//!
//! ```no_run
//! use rusqlite::Connection;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = Connection::open("./vectors.db")?;
//! vss_sqlite::register(&conn)?;
//!
//! conn.execute_batch(
//!     "create virtual table vss_items using vss0(embedding(2));
//!      insert into vss_items(rowid, embedding) values (1, '[0.0, 1.0]');",
//! )?;
//!
//! let mut stmt = conn.prepare(
//!     "select rowid, distance from vss_items
//!      where vss_search(embedding, vss_search_params('[0.0, 0.9]', 5))",
//! )?;
//! let hits = stmt
//!     .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)))?
//!     .collect::<Result<Vec<_>, _>>()?;
//! # Ok(())
//! # }
//! ```
//!
//! Each table `X` is backed by `X_data` (one row per vector row) and
//! `X_index` (one serialized index per column). Index changes are written to
//! `X_index` when SQLite syncs the virtual table during commit.

pub mod columns;
mod cursor;
pub mod extension;
pub mod functions;
pub mod fvecs;
mod journal;
pub mod params;
pub mod plan;
pub mod shadow;
pub mod vtab;

pub use columns::ColumnDescriptor;
pub use extension::{register, register_with_config, unregister};
pub use fvecs::parse_fvecs;
pub use params::SearchParams;
pub use vtab::{VssTab, TRAINING_OPERATION};
