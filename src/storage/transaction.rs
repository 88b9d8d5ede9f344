//! Savepoint-based transactions.
//!
//! The engine only offers `SAVEPOINT` / `RELEASE` / `ROLLBACK TO`, so every
//! logical transaction, nested or not, is a savepoint frame on one handle.
//! A frame released inside an outer frame is only durable once the outer
//! frame releases too; savepoints are not snapshots, so nested and sibling
//! frames see each other's uncommitted writes.
//!
//! Nesting is call-stack nesting on a single thread of control. The depth
//! counter lives on the [`Engine`] itself, and is restored by a drop guard
//! whatever the callback does.

use crate::error::{Error, Result};
use crate::storage::engine::{Engine, ResultSet};
use crate::storage::query::Query;
use rusqlite::types::Value;
use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

/// Savepoint uniqueness token, shared by every engine in the process.
static SAVEPOINT_SEQ: AtomicU64 = AtomicU64::new(0);

const DEFAULT_BATCH_SIZE: usize = 100;

fn next_savepoint_name(depth: usize) -> String {
    let token = SAVEPOINT_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
    format!("sp_{token}_{depth}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Active,
    Committed,
    RolledBack,
}

/// Scoped capability bound to one open savepoint.
///
/// Cloning is allowed, but every clone goes inert once its savepoint is
/// released or rolled back: later `run`/`exec` calls fail with
/// [`Error::TransactionInactive`] instead of writing outside the transaction.
#[derive(Clone)]
pub struct TxContext<'e> {
    engine: &'e Engine,
    savepoint: Rc<str>,
    state: Rc<Cell<FrameState>>,
}

impl<'e> TxContext<'e> {
    fn ensure_active(&self) -> Result<()> {
        match self.state.get() {
            FrameState::Active => Ok(()),
            FrameState::Committed => Err(Error::TransactionInactive { state: "commit" }),
            FrameState::RolledBack => Err(Error::TransactionInactive { state: "rollback" }),
        }
    }

    /// Name of the savepoint this context is bound to.
    #[must_use]
    pub fn savepoint(&self) -> &str {
        &self.savepoint
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.get() == FrameState::Active
    }

    /// The engine, for opening nested transactions.
    ///
    /// # Errors
    ///
    /// Fails once the context is inactive.
    pub fn engine(&self) -> Result<&'e Engine> {
        self.ensure_active()?;
        Ok(self.engine)
    }

    /// # Errors
    ///
    /// Fails once the context is inactive, or if the statement fails.
    pub fn run(&self, sql: &str, params: &[Value]) -> Result<()> {
        self.ensure_active()?;
        self.engine.run(sql, params)
    }

    /// # Errors
    ///
    /// Fails once the context is inactive, or if the statement fails.
    pub fn exec(&self, sql: &str, params: &[Value]) -> Result<Vec<ResultSet>> {
        self.ensure_active()?;
        self.engine.exec(sql, params)
    }

    /// # Errors
    ///
    /// See [`TxContext::run`].
    pub fn run_query(&self, query: &Query) -> Result<()> {
        self.run(&query.sql, &query.params)
    }

    /// # Errors
    ///
    /// See [`TxContext::exec`].
    pub fn exec_query(&self, query: &Query) -> Result<Vec<ResultSet>> {
        self.exec(&query.sql, &query.params)
    }
}

impl std::fmt::Debug for TxContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("savepoint", &self.savepoint)
            .field("state", &self.state.get())
            .finish()
    }
}

/// One open savepoint. Dropping it restores the depth counter and rolls
/// back if it was never resolved (panic, or a dropped future).
struct Frame<'e> {
    engine: &'e Engine,
    name: Rc<str>,
    state: Rc<Cell<FrameState>>,
}

impl<'e> Frame<'e> {
    fn open(engine: &'e Engine) -> Result<Self> {
        let depth = engine.enter_tx();
        let name = next_savepoint_name(depth);

        if let Err(e) = engine.run(&format!("SAVEPOINT {name}"), &[]) {
            engine.leave_tx();
            return Err(e);
        }

        debug!(savepoint = %name, depth, "Savepoint opened");
        Ok(Self {
            engine,
            name: Rc::from(name),
            state: Rc::new(Cell::new(FrameState::Active)),
        })
    }

    fn context(&self) -> TxContext<'e> {
        TxContext {
            engine: self.engine,
            savepoint: Rc::clone(&self.name),
            state: Rc::clone(&self.state),
        }
    }

    fn rollback(&self) {
        self.state.set(FrameState::RolledBack);
        let sql = format!(
            "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}",
            name = self.name
        );
        match self.engine.run(&sql, &[]) {
            Ok(()) => debug!(savepoint = %self.name, "Savepoint rolled back"),
            // Never mask the error that triggered the rollback.
            Err(e) => error!(savepoint = %self.name, error = %e, "Rollback failed"),
        }
    }

    fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                match self
                    .engine
                    .run(&format!("RELEASE SAVEPOINT {}", self.name), &[])
                {
                    Ok(()) => {
                        self.state.set(FrameState::Committed);
                        debug!(savepoint = %self.name, "Savepoint released");
                        Ok(value)
                    }
                    Err(e) => {
                        self.rollback();
                        Err(e.in_savepoint(&self.name))
                    }
                }
            }
            Err(e) => {
                self.rollback();
                Err(e.in_savepoint(&self.name))
            }
        }
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        if self.state.get() == FrameState::Active {
            self.rollback();
        }
        self.engine.leave_tx();
    }
}

/// Run `f` inside a new savepoint.
///
/// On `Ok` the savepoint is released and the value returned. On `Err` the
/// savepoint is rolled back and released, and the error is returned wrapped
/// as [`Error::Transaction`] (unless a nested frame already wrapped it).
///
/// # Errors
///
/// Returns the callback's error, or an engine error opening/releasing the savepoint.
pub fn transaction<'e, T, F>(engine: &'e Engine, f: F) -> Result<T>
where
    F: FnOnce(&TxContext<'e>) -> Result<T>,
{
    let frame = Frame::open(engine)?;
    let ctx = frame.context();
    let outcome = f(&ctx);
    frame.finish(outcome)
}

/// Async form of [`transaction`]. The savepoint stays open across awaits.
///
/// # Errors
///
/// See [`transaction`].
pub async fn transaction_async<'e, T, F, Fut>(engine: &'e Engine, f: F) -> Result<T>
where
    F: FnOnce(TxContext<'e>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let frame = Frame::open(engine)?;
    let outcome = f(frame.context()).await;
    frame.finish(outcome)
}

/// Whether any savepoint is open on this engine.
#[must_use]
pub fn is_in_transaction(engine: &Engine) -> bool {
    engine.tx_depth() > 0
}

/// Current savepoint nesting depth; 0 outside any transaction.
#[must_use]
pub fn transaction_depth(engine: &Engine) -> usize {
    engine.tx_depth()
}

/// Run `ops` in order inside one transaction. An empty list does nothing.
///
/// # Errors
///
/// Returns the first failing operation's error, after rolling everything back.
pub fn batch_transaction(engine: &Engine, ops: &[Query]) -> Result<()> {
    if ops.is_empty() {
        return Ok(());
    }

    transaction(engine, |tx| {
        for op in ops {
            tx.run_query(op)?;
        }
        Ok(())
    })
}

/// Options for [`create_batch_inserter`].
pub struct BatchOptions<'p> {
    /// Operations per transaction chunk (minimum 1).
    pub batch_size: usize,
    /// Called after each chunk with `(completed, total)`.
    pub on_progress: Option<Box<dyn FnMut(usize, usize) + 'p>>,
}

impl Default for BatchOptions<'_> {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            on_progress: None,
        }
    }
}

/// Accumulates operations and commits them in fixed-size transactional chunks.
///
/// Nothing touches the engine until [`BatchInserter::commit`]. An inserter
/// commits at most once; `discard` also ends its life.
pub struct BatchInserter<'e, 'p> {
    engine: &'e Engine,
    pending: Vec<Query>,
    batch_size: usize,
    on_progress: Option<Box<dyn FnMut(usize, usize) + 'p>>,
    committed: bool,
}

/// Create a [`BatchInserter`] over `engine`.
#[must_use]
pub fn create_batch_inserter<'e, 'p>(
    engine: &'e Engine,
    options: BatchOptions<'p>,
) -> BatchInserter<'e, 'p> {
    BatchInserter {
        engine,
        pending: Vec::new(),
        batch_size: options.batch_size.max(1),
        on_progress: options.on_progress,
        committed: false,
    }
}

impl BatchInserter<'_, '_> {
    /// Queue one operation.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BatchCommitted`] after commit or discard.
    pub fn add(&mut self, op: Query) -> Result<()> {
        if self.committed {
            return Err(Error::BatchCommitted);
        }
        self.pending.push(op);
        Ok(())
    }

    /// Queue several operations.
    ///
    /// # Errors
    ///
    /// See [`BatchInserter::add`].
    pub fn add_many(&mut self, ops: impl IntoIterator<Item = Query>) -> Result<()> {
        if self.committed {
            return Err(Error::BatchCommitted);
        }
        self.pending.extend(ops);
        Ok(())
    }

    /// Number of queued operations.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Flush queued operations, one transaction per chunk.
    ///
    /// Returns the number of operations written. The inserter is spent even
    /// if a chunk fails; chunks committed before the failure stay committed.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BatchCommitted`] on a second call, or with the
    /// failing chunk's transaction error.
    pub fn commit(&mut self) -> Result<usize> {
        if self.committed {
            return Err(Error::BatchCommitted);
        }
        self.committed = true;

        let ops = std::mem::take(&mut self.pending);
        let total = ops.len();
        let mut completed = 0;

        for chunk in ops.chunks(self.batch_size) {
            batch_transaction(self.engine, chunk)?;
            completed += chunk.len();
            debug!(completed, total, "Batch chunk committed");
            if let Some(on_progress) = self.on_progress.as_mut() {
                on_progress(completed, total);
            }
        }

        Ok(completed)
    }

    /// Drop queued operations and retire the inserter.
    pub fn discard(&mut self) {
        self.pending.clear();
        self.committed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::engine::EngineModule;
    use std::cell::RefCell;

    fn engine() -> Engine {
        let engine = EngineModule::load().unwrap().open_empty().unwrap();
        engine
            .run("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)", &[])
            .unwrap();
        engine
    }

    thread_local! {
        static TRACED: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn record_statement(sql: &str) {
        TRACED.with(|log| log.borrow_mut().push(sql.trim().to_string()));
    }

    fn traced_engine() -> Engine {
        let mut engine = engine();
        TRACED.with(|log| log.borrow_mut().clear());
        engine
            .conn_mut()
            .trace(Some(record_statement as fn(&str)));
        engine
    }

    fn savepoint_statements() -> Vec<String> {
        TRACED.with(|log| {
            log.borrow_mut()
                .drain(..)
                .filter(|sql| {
                    ["SAVEPOINT", "RELEASE", "ROLLBACK"]
                        .iter()
                        .any(|verb| sql.starts_with(verb))
                })
                .collect()
        })
    }

    fn count(engine: &Engine) -> i64 {
        match engine.scalar("SELECT COUNT(*) FROM notes", &[]).unwrap() {
            Some(Value::Integer(n)) => n,
            other => panic!("unexpected count {other:?}"),
        }
    }

    fn insert(body: &str) -> Query {
        Query::raw(
            "INSERT INTO notes (body) VALUES (?)",
            vec![Value::Text(body.to_string())],
        )
    }

    #[test]
    fn test_commit_keeps_all_writes() {
        let engine = engine();
        let result = transaction(&engine, |tx| {
            for i in 0..5 {
                tx.run_query(&insert(&format!("n{i}")))?;
            }
            Ok("done")
        })
        .unwrap();

        assert_eq!(result, "done");
        assert_eq!(count(&engine), 5);
        assert_eq!(transaction_depth(&engine), 0);
    }

    #[test]
    fn test_failure_rolls_back_and_wraps() {
        let engine = engine();
        let err = transaction(&engine, |tx| {
            tx.run_query(&insert("a"))?;
            tx.run_query(&insert("b"))?;
            Err::<(), _>(Error::InvalidArgument("stop".into()))
        })
        .unwrap_err();

        assert!(matches!(err, Error::Transaction { .. }));
        assert!(matches!(err.root_cause(), Error::InvalidArgument(_)));
        assert_eq!(count(&engine), 0);
        assert!(!is_in_transaction(&engine));
    }

    #[test]
    fn test_commit_issues_one_savepoint_release_pair() {
        let engine = traced_engine();
        let name = transaction(&engine, |tx| {
            tx.run_query(&insert("a"))?;
            tx.run_query(&insert("b"))?;
            Ok(tx.savepoint().to_string())
        })
        .unwrap();

        assert_eq!(
            savepoint_statements(),
            vec![format!("SAVEPOINT {name}"), format!("RELEASE SAVEPOINT {name}")]
        );
    }

    #[test]
    fn test_failure_issues_rollback_then_release() {
        let engine = traced_engine();
        let mut name = String::new();
        transaction(&engine, |tx| {
            name = tx.savepoint().to_string();
            tx.run_query(&insert("a"))?;
            Err::<(), _>(Error::InvalidArgument("stop".into()))
        })
        .unwrap_err();

        assert_eq!(
            savepoint_statements(),
            vec![
                format!("SAVEPOINT {name}"),
                format!("ROLLBACK TO SAVEPOINT {name}"),
                format!("RELEASE SAVEPOINT {name}"),
            ]
        );
    }

    #[test]
    fn test_depth_tracks_nesting() {
        let engine = engine();
        assert_eq!(transaction_depth(&engine), 0);

        transaction(&engine, |outer| {
            assert_eq!(transaction_depth(&engine), 1);
            transaction(outer.engine()?, |inner| {
                assert_eq!(transaction_depth(&engine), 2);
                transaction(inner.engine()?, |_| {
                    assert_eq!(transaction_depth(&engine), 3);
                    assert!(is_in_transaction(&engine));
                    Ok(())
                })?;
                assert_eq!(transaction_depth(&engine), 2);
                Ok(())
            })?;
            assert_eq!(transaction_depth(&engine), 1);
            Ok(())
        })
        .unwrap();

        assert_eq!(transaction_depth(&engine), 0);
        assert!(!is_in_transaction(&engine));
    }

    #[test]
    fn test_inner_failure_only_rolls_back_inner() {
        let engine = engine();
        transaction(&engine, |outer| {
            outer.run_query(&insert("outer"))?;
            let inner = transaction(&engine, |tx| {
                tx.run_query(&insert("inner"))?;
                Err::<(), _>(Error::Other("inner failed".into()))
            });
            assert!(inner.is_err());
            assert_eq!(transaction_depth(&engine), 1);
            Ok(())
        })
        .unwrap();

        let rows = engine.exec("SELECT body FROM notes", &[]).unwrap();
        assert_eq!(rows[0].values, vec![vec![Value::Text("outer".into())]]);
    }

    #[test]
    fn test_outer_failure_discards_released_inner() {
        let engine = engine();
        let err = transaction(&engine, |_| {
            transaction(&engine, |tx| tx.run_query(&insert("inner")))?;
            Err::<(), _>(Error::Other("outer failed".into()))
        })
        .unwrap_err();

        assert!(matches!(err.root_cause(), Error::Other(_)));
        assert_eq!(count(&engine), 0);
    }

    #[test]
    fn test_nested_error_wrapped_once() {
        let engine = engine();
        let inner_name = RefCell::new(String::new());
        let err = transaction(&engine, |_| {
            transaction(&engine, |tx| {
                *inner_name.borrow_mut() = tx.savepoint().to_string();
                Err::<(), _>(Error::Other("deep".into()))
            })
        })
        .unwrap_err();

        match err {
            Error::Transaction { savepoint, source } => {
                assert_eq!(savepoint, *inner_name.borrow());
                assert!(matches!(*source, Error::Other(_)));
            }
            other => panic!("expected transaction error, got {other:?}"),
        }
    }

    #[test]
    fn test_context_inert_after_commit() {
        let engine = engine();
        let mut kept = None;
        transaction(&engine, |tx| {
            kept = Some(tx.clone());
            tx.run_query(&insert("ok"))
        })
        .unwrap();

        let ctx = kept.unwrap();
        assert!(!ctx.is_active());
        let err = ctx.run_query(&insert("late")).unwrap_err();
        assert!(matches!(err, Error::TransactionInactive { state: "commit" }));
        assert!(ctx.exec("SELECT 1", &[]).is_err());
        assert_eq!(count(&engine), 1);
    }

    #[test]
    fn test_context_inert_after_rollback() {
        let engine = engine();
        let mut kept = None;
        let _ = transaction(&engine, |tx| {
            kept = Some(tx.clone());
            Err::<(), _>(Error::Other("x".into()))
        });

        let err = kept.unwrap().run_query(&insert("late")).unwrap_err();
        assert!(matches!(err, Error::TransactionInactive { state: "rollback" }));
    }

    #[test]
    fn test_savepoint_names_unique() {
        let engine = engine();
        let names = RefCell::new(Vec::new());
        for _ in 0..50 {
            transaction(&engine, |tx| {
                names.borrow_mut().push(tx.savepoint().to_string());
                Ok(())
            })
            .unwrap();
        }

        let mut names = names.into_inner();
        assert!(names.iter().all(|n| n.starts_with("sp_") && n.ends_with("_1")));
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 50);
    }

    #[test]
    fn test_panic_restores_depth() {
        let engine = engine();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = transaction(&engine, |tx| -> Result<()> {
                tx.run_query(&insert("doomed"))?;
                panic!("callback blew up");
            });
        }));

        assert!(result.is_err());
        assert_eq!(transaction_depth(&engine), 0);
        assert_eq!(count(&engine), 0);
    }

    #[tokio::test]
    async fn test_async_transaction_commit_and_rollback() {
        let engine = engine();

        let n = transaction_async(&engine, |tx| async move {
            tx.run_query(&insert("one"))?;
            tokio::task::yield_now().await;
            tx.run_query(&insert("two"))?;
            Ok::<_, Error>(2)
        })
        .await
        .unwrap();
        assert_eq!(n, 2);
        assert_eq!(count(&engine), 2);

        let err = transaction_async(&engine, |tx| async move {
            tx.run_query(&insert("three"))?;
            tokio::task::yield_now().await;
            Err::<(), _>(Error::Other("async failure".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Transaction { .. }));
        assert_eq!(count(&engine), 2);
        assert_eq!(transaction_depth(&engine), 0);
    }

    #[test]
    fn test_batch_transaction() {
        let engine = engine();
        batch_transaction(&engine, &[]).unwrap();
        assert_eq!(transaction_depth(&engine), 0);

        batch_transaction(&engine, &[insert("a"), insert("b")]).unwrap();
        assert_eq!(count(&engine), 2);

        let bad = Query::raw("INSERT INTO missing (x) VALUES (?)", vec![Value::Integer(1)]);
        assert!(batch_transaction(&engine, &[insert("c"), bad]).is_err());
        assert_eq!(count(&engine), 2);
    }

    #[test]
    fn test_batch_inserter_chunks_and_progress() {
        let engine = engine();
        let progress = RefCell::new(Vec::new());
        let mut inserter = create_batch_inserter(
            &engine,
            BatchOptions {
                batch_size: 2,
                on_progress: Some(Box::new(|done, total| {
                    progress.borrow_mut().push((done, total));
                })),
            },
        );

        for i in 0..5 {
            inserter.add(insert(&format!("row{i}"))).unwrap();
        }
        assert_eq!(inserter.pending(), 5);
        assert_eq!(count(&engine), 0);

        assert_eq!(inserter.commit().unwrap(), 5);
        drop(inserter);
        assert_eq!(count(&engine), 5);
        assert_eq!(progress.into_inner(), vec![(2, 5), (4, 5), (5, 5)]);
    }

    #[test]
    fn test_batch_inserter_terminal_states() {
        let engine = engine();
        let mut inserter = create_batch_inserter(&engine, BatchOptions::default());
        inserter.add(insert("a")).unwrap();
        inserter.commit().unwrap();

        assert!(matches!(inserter.commit(), Err(Error::BatchCommitted)));
        assert!(matches!(inserter.add(insert("b")), Err(Error::BatchCommitted)));

        let mut discarded = create_batch_inserter(&engine, BatchOptions::default());
        discarded.add_many([insert("x"), insert("y")]).unwrap();
        discarded.discard();
        assert_eq!(discarded.pending(), 0);
        assert!(discarded.is_committed());
        assert!(matches!(discarded.commit(), Err(Error::BatchCommitted)));
        assert_eq!(count(&engine), 1);
    }
}
