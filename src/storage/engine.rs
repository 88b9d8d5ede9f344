//! In-process SQL engine adapter.
//!
//! Wraps a single in-memory SQLite connection. The engine has no durable
//! backing of its own: its whole state is exported as a byte image and
//! handed to a [`SnapshotStore`](crate::storage::snapshot::SnapshotStore),
//! and rebuilt from such an image on the next start.

use crate::error::{Error, Result};
use crate::storage::query::Query;
use rusqlite::backup::Progress;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Batch, Connection, DatabaseName, Statement};
use std::cell::Cell;
use tracing::debug;

/// Every valid SQLite image starts with this header.
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

/// Oldest SQLite release with savepoints and the online backup API.
const MIN_SQLITE_VERSION: i32 = 3_008_000;

/// Connection settings applied to every engine built from this module.
const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

/// One block of rows produced by a statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Value>>,
}

/// The loaded engine implementation.
///
/// Loading happens once per [`Database`](crate::storage::Database); a reset
/// requires it to already be present.
#[derive(Debug, Clone)]
pub struct EngineModule {
    sqlite_version: &'static str,
    pragmas: &'static str,
}

impl EngineModule {
    /// Load the bundled engine and check it supports what the store needs.
    ///
    /// # Errors
    ///
    /// Returns a config error if the linked SQLite is too old.
    pub fn load() -> Result<Self> {
        if rusqlite::version_number() < MIN_SQLITE_VERSION {
            return Err(Error::Config(format!(
                "SQLite {} lacks savepoint/backup support",
                rusqlite::version()
            )));
        }

        debug!(version = rusqlite::version(), "SQL engine loaded");
        Ok(Self {
            sqlite_version: rusqlite::version(),
            pragmas: CONNECTION_PRAGMAS,
        })
    }

    #[must_use]
    pub fn sqlite_version(&self) -> &'static str {
        self.sqlite_version
    }

    /// Build an empty engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened.
    pub fn open_empty(&self) -> Result<Engine> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(self.pragmas)?;
        Ok(Engine::wrap(conn))
    }

    /// Build an engine from a previously exported byte image.
    ///
    /// # Errors
    ///
    /// Returns a snapshot error if the bytes are not an SQLite image, or a
    /// database error if the restore itself fails.
    pub fn open_from_bytes(&self, bytes: &[u8]) -> Result<Engine> {
        if !bytes.starts_with(SQLITE_HEADER) {
            return Err(Error::Snapshot(format!(
                "not an SQLite image ({} bytes, bad header)",
                bytes.len()
            )));
        }

        let scratch = tempfile::NamedTempFile::new()?;
        std::fs::write(scratch.path(), bytes)?;

        let mut conn = Connection::open_in_memory()?;
        conn.restore(DatabaseName::Main, scratch.path(), None::<fn(Progress)>)?;
        conn.execute_batch(self.pragmas)?;

        debug!(bytes = bytes.len(), "Engine restored from snapshot");
        Ok(Engine::wrap(conn))
    }
}

/// The live engine handle.
///
/// Besides the connection it carries the per-handle transaction depth, so
/// independent handles never share nesting state.
pub struct Engine {
    conn: Connection,
    tx_depth: Cell<usize>,
}

impl Engine {
    fn wrap(conn: Connection) -> Self {
        Self {
            conn,
            tx_depth: Cell::new(0),
        }
    }

    /// Underlying connection, for callers that need rusqlite directly.
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    #[cfg(test)]
    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Execute SQL and discard any rows.
    ///
    /// The SQL may hold several `;`-separated statements; parameters are
    /// consumed in order, as for [`Engine::exec`].
    ///
    /// # Errors
    ///
    /// Returns an error if preparation or execution fails.
    pub fn run(&self, sql: &str, params: &[Value]) -> Result<()> {
        if params.is_empty() {
            self.conn.execute_batch(sql)?;
            return Ok(());
        }
        self.exec(sql, params).map(drop)
    }

    /// Execute every statement in `sql` and collect the rows each produces.
    ///
    /// Positional parameters are handed out in statement order, each
    /// statement taking as many as it has placeholders. One [`ResultSet`] is
    /// returned per statement that yielded rows.
    ///
    /// # Errors
    ///
    /// Returns an error if preparation, execution or value extraction fails,
    /// or if parameters are left over once every statement has run.
    pub fn exec(&self, sql: &str, params: &[Value]) -> Result<Vec<ResultSet>> {
        let mut sets = Vec::new();
        let mut remaining = params;
        let mut batch = Batch::new(&self.conn, sql);

        while let Some(mut stmt) = batch.next()? {
            let take = stmt.parameter_count().min(remaining.len());
            let (bound, rest) = remaining.split_at(take);
            remaining = rest;
            if let Some(set) = collect_rows(&mut stmt, bound)? {
                sets.push(set);
            }
        }

        if !remaining.is_empty() {
            return Err(Error::InvalidQuery(format!(
                "{} parameter(s) left unbound",
                remaining.len()
            )));
        }
        Ok(sets)
    }

    /// Execute a built query, discarding rows.
    ///
    /// # Errors
    ///
    /// See [`Engine::run`].
    pub fn run_query(&self, query: &Query) -> Result<()> {
        self.run(&query.sql, &query.params)
    }

    /// Execute a built query and collect its rows.
    ///
    /// # Errors
    ///
    /// See [`Engine::exec`].
    pub fn exec_query(&self, query: &Query) -> Result<Vec<ResultSet>> {
        self.exec(&query.sql, &query.params)
    }

    /// First column of the first row, if any.
    ///
    /// # Errors
    ///
    /// See [`Engine::exec`].
    pub fn scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        Ok(self
            .exec(sql, params)?
            .into_iter()
            .next()
            .and_then(|set| set.values.into_iter().next())
            .and_then(|row| row.into_iter().next()))
    }

    /// Serialize the full database into a byte image.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup or the scratch file I/O fails.
    pub fn export(&self) -> Result<Vec<u8>> {
        let scratch = tempfile::NamedTempFile::new()?;
        self.conn.backup(DatabaseName::Main, scratch.path(), None)?;
        let bytes = std::fs::read(scratch.path())?;
        debug!(bytes = bytes.len(), "Engine exported");
        Ok(bytes)
    }

    pub(crate) fn tx_depth(&self) -> usize {
        self.tx_depth.get()
    }

    pub(crate) fn enter_tx(&self) -> usize {
        let depth = self.tx_depth.get() + 1;
        self.tx_depth.set(depth);
        depth
    }

    pub(crate) fn leave_tx(&self) {
        self.tx_depth.set(self.tx_depth.get().saturating_sub(1));
    }
}

fn collect_rows(stmt: &mut Statement<'_>, params: &[Value]) -> Result<Option<ResultSet>> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let width = columns.len();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(width);
        for idx in 0..width {
            record.push(row.get::<_, Value>(idx)?);
        }
        values.push(record);
    }

    Ok((!values.is_empty()).then_some(ResultSet { columns, values }))
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tx_depth", &self.tx_depth.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        EngineModule::load().unwrap().open_empty().unwrap()
    }

    #[test]
    fn test_exec_returns_columns_and_rows() {
        let engine = engine();
        engine
            .run("CREATE TABLE t (id INTEGER, name TEXT)", &[])
            .unwrap();
        engine
            .run(
                "INSERT INTO t (id, name) VALUES (?, ?)",
                &[Value::Integer(1), Value::Text("a".into())],
            )
            .unwrap();

        let sets = engine.exec("SELECT id, name FROM t", &[]).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].columns, vec!["id", "name"]);
        assert_eq!(
            sets[0].values,
            vec![vec![Value::Integer(1), Value::Text("a".into())]]
        );
    }

    #[test]
    fn test_exec_without_rows_is_empty() {
        let engine = engine();
        engine.run("CREATE TABLE t (id INTEGER)", &[]).unwrap();
        assert!(engine.exec("SELECT id FROM t", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_export_and_restore_roundtrip() {
        let module = EngineModule::load().unwrap();
        let engine = module.open_empty().unwrap();
        engine
            .run("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('kept');", &[])
            .unwrap();

        let bytes = engine.export().unwrap();
        assert!(bytes.starts_with(SQLITE_HEADER));

        let restored = module.open_from_bytes(&bytes).unwrap();
        let value = restored.scalar("SELECT v FROM t", &[]).unwrap();
        assert_eq!(value, Some(Value::Text("kept".into())));
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let module = EngineModule::load().unwrap();
        let err = module.open_from_bytes(b"definitely not sqlite").unwrap_err();
        assert!(matches!(err, Error::Snapshot(_)));
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let engine = engine();
        let fk = engine.scalar("PRAGMA foreign_keys", &[]).unwrap();
        assert_eq!(fk, Some(Value::Integer(1)));
    }

    #[test]
    fn test_exec_runs_every_statement() {
        let engine = engine();
        engine.run("CREATE TABLE t (name TEXT)", &[]).unwrap();

        let sets = engine
            .exec(
                "INSERT INTO t (name) VALUES (?); INSERT INTO t (name) VALUES (?);",
                &[Value::Text("a".into()), Value::Text("b".into())],
            )
            .unwrap();
        assert!(sets.is_empty());
        assert_eq!(
            engine.scalar("SELECT COUNT(*) FROM t", &[]).unwrap(),
            Some(Value::Integer(2))
        );
    }

    #[test]
    fn test_exec_returns_one_set_per_statement() {
        let engine = engine();
        let sets = engine.exec("SELECT 1; SELECT 2", &[]).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].values, vec![vec![Value::Integer(1)]]);
        assert_eq!(sets[1].values, vec![vec![Value::Integer(2)]]);
    }

    #[test]
    fn test_exec_rejects_leftover_params() {
        let engine = engine();
        let err = engine
            .exec("SELECT ?", &[Value::Integer(1), Value::Integer(2)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }
}
