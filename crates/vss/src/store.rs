use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::sync::Arc;
use vss_core::{Result, StoreConfig, VssConfig, VssError};

/// A SQLite database with the vss engine registered on its connection
///
/// The connection sits behind a mutex; async callers run their closures on
/// tokio's blocking pool.
pub struct VssStore {
    conn: Arc<Mutex<Connection>>,
    config: StoreConfig,
}

impl VssStore {
    /// Open (or create) the database at `config.path`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Self::configure_connection(&conn, &config)?;
        vss_sqlite::register_with_config(&conn, config.engine.clone())?;

        tracing::info!(path = %config.path.display(), "Opened vss store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    /// A private in-memory database, mostly useful in tests.
    pub fn open_in_memory(engine: VssConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        vss_sqlite::register_with_config(&conn, engine.clone())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: StoreConfig::new(":memory:")
                .with_wal_mode(false)
                .with_engine(engine),
        })
    }

    fn configure_connection(conn: &Connection, cfg: &StoreConfig) -> Result<()> {
        if cfg.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| VssError::Config(e.to_string()))?;
        }
        conn.pragma_update(None, "synchronous", cfg.synchronous.as_pragma())
            .map_err(|e| VssError::Config(e.to_string()))?;
        conn.pragma_update(None, "cache_size", cfg.cache_size)
            .map_err(|e| VssError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The shared connection, for migrations and custom queries
    pub fn conn(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    pub fn query<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        self.query(f)
    }

    /// Run `f` on the blocking pool.
    ///
    /// # Example
    /// ```ignore
    /// let rows: i64 = store.query_async(|conn| {
    ///     Ok(conn.query_row("SELECT count(*) FROM items_data", [], |row| row.get(0))?)
    /// }).await?;
    /// ```
    pub async fn query_async<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| VssError::Other(anyhow::Error::new(e)))?
    }

    pub async fn execute_async<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> Result<()> + Send + 'static,
    {
        self.query_async(f).await
    }

    /// Run `f` inside a transaction, committing when it returns `Ok`.
    ///
    /// Index changes made by the transaction are written to the shadow
    /// tables as part of the commit; an `Err` rolls both back.
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<R>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub async fn transaction_async<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
        .map_err(|e| VssError::Other(anyhow::Error::new(e)))?
    }
}
