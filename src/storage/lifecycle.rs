//! Database lifecycle: open, restore, migrate, snapshot, reset, close.
//!
//! [`Database`] owns the only engine handle. The engine lives purely in
//! memory; durability comes from writing its full byte image to a
//! [`SnapshotStore`] after schema changes and on demand.

use crate::cache::CacheTiers;
use crate::config::CacheSettings;
use crate::error::{Error, Result};
use crate::storage::engine::{Engine, EngineModule, ResultSet};
use crate::storage::migrations::{get_schema_version, run_migrations};
use crate::storage::schema::{initialize_schema, list_tables, seed_data};
use crate::storage::snapshot::{SnapshotStore, SNAPSHOT_KEY};
use crate::storage::transaction::{transaction, TxContext};
use rusqlite::types::Value;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Row count for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub name: String,
    pub row_count: i64,
}

/// Introspection summary returned by [`Database::get_database_stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub schema_version: u32,
    pub sqlite_version: String,
    pub page_count: i64,
    pub page_size: i64,
    pub size_bytes: i64,
    pub tables: Vec<TableStats>,
}

/// The persistence handle.
///
/// All operations take `&self`/`&mut self` explicitly; independent
/// `Database` values share nothing.
pub struct Database<S: SnapshotStore> {
    store: S,
    module: Option<EngineModule>,
    engine: Option<Engine>,
    caches: CacheTiers<serde_json::Value>,
}

fn persist<S: SnapshotStore>(store: &S, engine: &Engine) -> Result<()> {
    let bytes = engine.export()?;
    store.set(SNAPSHOT_KEY, &bytes)?;
    debug!(bytes = bytes.len(), "Database snapshot saved");
    Ok(())
}

fn as_int(value: Option<Value>) -> i64 {
    match value {
        Some(Value::Integer(i)) => i,
        _ => 0,
    }
}

impl<S: SnapshotStore> Database<S> {
    /// Create an uninitialized handle with default cache tiers.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_cache_settings(store, &CacheSettings::default())
    }

    #[must_use]
    pub fn with_cache_settings(store: S, settings: &CacheSettings) -> Self {
        Self {
            store,
            module: None,
            engine: None,
            caches: settings.build_tiers(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read caches tied to this database. Cleared on reset.
    #[must_use]
    pub fn caches(&self) -> &CacheTiers<serde_json::Value> {
        &self.caches
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    #[must_use]
    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    fn load_module(&mut self) -> Result<EngineModule> {
        if let Some(module) = &self.module {
            return Ok(module.clone());
        }
        let module = EngineModule::load()?;
        self.module = Some(module.clone());
        Ok(module)
    }

    /// Open the database, restoring the last snapshot if there is one.
    ///
    /// A restored image is migrated to the current schema and saved once if
    /// any migration ran. A fresh database gets the full schema and seed
    /// rows and is saved once. Calling this again returns the open handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or restored, or if
    /// schema setup, migration or the initial save fails.
    pub fn init_database(&mut self) -> Result<&Engine> {
        if self.engine.is_some() {
            return self.engine.as_ref().ok_or(Error::NotInitialized);
        }

        let module = self.load_module()?;

        let engine = if let Some(bytes) = self.store.get(SNAPSHOT_KEY)? {
            info!(bytes = bytes.len(), "Restoring database from snapshot");
            let engine = module.open_from_bytes(&bytes)?;

            let store = &self.store;
            let mut save = |e: &Engine| persist(store, e);
            let report = run_migrations(&engine, Some(&mut save))?;
            if !report.is_noop() {
                info!(from = report.from, to = report.to, "Snapshot migrated");
            }
            engine
        } else {
            info!("No snapshot found, creating database");
            let engine = module.open_empty()?;
            initialize_schema(&engine)?;
            seed_data(&engine)?;
            persist(&self.store, &engine)?;
            engine
        };

        Ok(&*self.engine.insert(engine))
    }

    /// Throw away all data and start over with a freshly seeded database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineNotLoaded`] if the database was never
    /// initialized in this process, or any error from rebuilding or saving.
    pub fn reset_database(&mut self) -> Result<&Engine> {
        let module = self.module.clone().ok_or(Error::EngineNotLoaded)?;

        self.engine = None;
        self.store.remove(SNAPSHOT_KEY)?;
        self.caches.clear_all();

        let engine = module.open_empty()?;
        initialize_schema(&engine)?;
        seed_data(&engine)?;
        persist(&self.store, &engine)?;

        info!("Database reset");
        Ok(&*self.engine.insert(engine))
    }

    /// Save and release the handle. A no-op when already closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the final save fails; the handle stays open then.
    pub fn close_database(&mut self) -> Result<()> {
        if let Some(engine) = &self.engine {
            persist(&self.store, engine)?;
            self.engine = None;
            info!("Database closed");
        }
        Ok(())
    }

    /// Write the live database to the snapshot store.
    ///
    /// # Errors
    ///
    /// Returns an error if export or the store write fails. Without an open
    /// handle this only logs a warning.
    pub fn save_database(&self) -> Result<()> {
        match &self.engine {
            Some(engine) => persist(&self.store, engine),
            None => {
                warn!("save_database called before init_database, nothing saved");
                Ok(())
            }
        }
    }

    /// Run `f` against the open engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] without an open handle, otherwise
    /// whatever `f` returns.
    pub fn with_engine<T>(&self, f: impl FnOnce(&Engine) -> Result<T>) -> Result<T> {
        let engine = self.engine.as_ref().ok_or(Error::NotInitialized)?;
        f(engine)
    }

    /// Run `f` in a savepoint transaction on the open engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] without an open handle, otherwise
    /// see [`transaction`].
    pub fn transaction<'a, T, F>(&'a self, f: F) -> Result<T>
    where
        F: FnOnce(&TxContext<'a>) -> Result<T>,
    {
        let engine = self.engine.as_ref().ok_or(Error::NotInitialized)?;
        transaction(engine, f)
    }

    /// Execute raw SQL. Unlike the other helpers this requires an open handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] without an open handle, or the
    /// engine error.
    pub fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<Vec<ResultSet>> {
        self.with_engine(|engine| engine.exec(sql, params))
    }

    /// Stored schema version, or `None` without an open handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the version read fails.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        self.engine.as_ref().map(get_schema_version).transpose()
    }

    /// User table names, or empty without an open handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog query fails.
    pub fn get_tables(&self) -> Result<Vec<String>> {
        match &self.engine {
            Some(engine) => list_tables(engine),
            None => Ok(Vec::new()),
        }
    }

    /// Size and row counts, or `None` without an open handle.
    ///
    /// # Errors
    ///
    /// Returns an error if any introspection query fails.
    pub fn get_database_stats(&self) -> Result<Option<DatabaseStats>> {
        let Some(engine) = &self.engine else {
            return Ok(None);
        };

        let page_count = as_int(engine.scalar("PRAGMA page_count", &[])?);
        let page_size = as_int(engine.scalar("PRAGMA page_size", &[])?);

        let mut tables = Vec::new();
        for name in list_tables(engine)? {
            let sql = format!("SELECT COUNT(*) FROM \"{}\"", name.replace('"', "\"\""));
            let row_count = as_int(engine.scalar(&sql, &[])?);
            tables.push(TableStats { name, row_count });
        }

        Ok(Some(DatabaseStats {
            schema_version: get_schema_version(engine)?,
            sqlite_version: self
                .module
                .as_ref()
                .map_or_else(|| rusqlite::version().to_string(), |m| m.sqlite_version().to_string()),
            page_count,
            page_size,
            size_bytes: page_count * page_size,
            tables,
        }))
    }
}

impl<S: SnapshotStore> std::fmt::Debug for Database<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("initialized", &self.engine.is_some())
            .field("module_loaded", &self.module.is_some())
            .finish_non_exhaustive()
    }
}
