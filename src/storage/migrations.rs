//! Schema migrations compiled into the binary.
//!
//! Each migration is a plain function keyed by the version it produces.
//! Every step is additive and guarded (`IF NOT EXISTS`, live column checks),
//! so running one twice changes nothing.
//!
//! The stored version is written once, after the whole pending batch has
//! applied. A failure anywhere rolls the batch back and the next open runs
//! it again from the start.

use crate::error::{Error, Result};
use crate::storage::engine::Engine;
use crate::storage::schema::{
    column_exists, table_ddl, table_exists, CURRENT_SCHEMA_VERSION, SCHEMA_VERSION_DDL,
};
use crate::storage::transaction::transaction;
use rusqlite::types::Value;
use serde::Serialize;
use tracing::{debug, info};

/// Version assumed for images written before the version table existed.
pub const BASELINE_SCHEMA_VERSION: u32 = 1;

struct Migration {
    version: u32,
    description: &'static str,
    apply: fn(&Engine) -> Result<()>,
}

/// All migrations in ascending version order.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 2,
        description: "icons and colors on areas and categories",
        apply: add_area_and_category_icons,
    },
    Migration {
        version: 3,
        description: "tags and item_tags",
        apply: add_tags,
    },
    Migration {
        version: 4,
        description: "folder ordering and pinned items",
        apply: add_ordering_and_pins,
    },
    Migration {
        version: 5,
        description: "activity log",
        apply: add_activity_log,
    },
];

/// Outcome of a [`run_migrations`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    pub applied: Vec<u32>,
}

impl MigrationReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Read the stored schema version.
///
/// A missing version table (or an empty one) means the baseline version.
///
/// # Errors
///
/// Any other read failure is returned instead of being treated as baseline.
pub fn get_schema_version(engine: &Engine) -> Result<u32> {
    if !table_exists(engine, "schema_version")? {
        return Ok(BASELINE_SCHEMA_VERSION);
    }

    match engine.scalar("SELECT version FROM schema_version WHERE id = 1", &[])? {
        None => Ok(BASELINE_SCHEMA_VERSION),
        Some(Value::Integer(v)) => u32::try_from(v).map_err(|_| Error::Migration {
            version: 0,
            message: format!("stored schema version {v} is out of range"),
        }),
        Some(other) => Err(Error::Migration {
            version: 0,
            message: format!("stored schema version is not an integer: {other:?}"),
        }),
    }
}

/// Store the schema version, creating the version table if needed.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn set_schema_version(engine: &Engine, version: u32) -> Result<()> {
    engine.run(SCHEMA_VERSION_DDL, &[])?;
    engine.run(
        "INSERT OR REPLACE INTO schema_version (id, version, updated_at) VALUES (1, ?, ?)",
        &[
            Value::Integer(i64::from(version)),
            Value::Integer(chrono::Utc::now().timestamp_millis()),
        ],
    )
}

/// Versions newer than `current` and not past the target, ascending.
#[must_use]
pub fn pending_migrations(current: u32) -> Vec<u32> {
    MIGRATIONS
        .iter()
        .map(|m| m.version)
        .filter(|v| *v > current && *v <= CURRENT_SCHEMA_VERSION)
        .collect()
}

/// Bring the schema up to [`CURRENT_SCHEMA_VERSION`].
///
/// Does nothing when already current. Otherwise applies each pending
/// migration in order inside one transaction, records the new version, and
/// then calls `on_done` (typically to persist a snapshot).
///
/// # Errors
///
/// Returns the first migration failure, wrapped with its version, or an
/// error from `on_done`.
pub fn run_migrations(
    engine: &Engine,
    on_done: Option<&mut dyn FnMut(&Engine) -> Result<()>>,
) -> Result<MigrationReport> {
    let from = get_schema_version(engine)?;
    let pending = pending_migrations(from);

    if pending.is_empty() {
        debug!(version = from, "Schema is current");
        return Ok(MigrationReport {
            from,
            to: from,
            applied: Vec::new(),
        });
    }

    info!(from, to = CURRENT_SCHEMA_VERSION, count = pending.len(), "Migrating schema");

    transaction(engine, |tx| {
        let engine = tx.engine()?;
        for migration in MIGRATIONS.iter().filter(|m| pending.contains(&m.version)) {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );
            (migration.apply)(engine).map_err(|e| Error::Migration {
                version: migration.version,
                message: e.to_string(),
            })?;
        }
        set_schema_version(engine, CURRENT_SCHEMA_VERSION)
    })
    .map_err(|e| match e {
        Error::Transaction { source, .. } if matches!(*source, Error::Migration { .. }) => *source,
        other => other,
    })?;

    info!(version = CURRENT_SCHEMA_VERSION, "Migrations complete");

    if let Some(callback) = on_done {
        callback(engine)?;
    }

    Ok(MigrationReport {
        from,
        to: CURRENT_SCHEMA_VERSION,
        applied: pending,
    })
}

fn add_column_if_missing(engine: &Engine, table: &str, column: &str, decl: &str) -> Result<()> {
    if column_exists(engine, table, column)? {
        debug!(table, column, "Column already present");
        return Ok(());
    }
    engine.run(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), &[])
}

fn create_table(engine: &Engine, name: &str) -> Result<()> {
    let ddl = table_ddl(name).ok_or_else(|| Error::Other(format!("no DDL for table {name}")))?;
    engine.run(ddl, &[])
}

fn add_area_and_category_icons(engine: &Engine) -> Result<()> {
    add_column_if_missing(engine, "areas", "icon", "TEXT")?;
    add_column_if_missing(engine, "areas", "color", "TEXT")?;
    add_column_if_missing(engine, "categories", "icon", "TEXT")
}

fn add_tags(engine: &Engine) -> Result<()> {
    create_table(engine, "tags")?;
    create_table(engine, "item_tags")?;
    engine.run(
        "CREATE INDEX IF NOT EXISTS idx_item_tags_tag ON item_tags(tag_id)",
        &[],
    )
}

fn add_ordering_and_pins(engine: &Engine) -> Result<()> {
    add_column_if_missing(engine, "folders", "sort_order", "INTEGER NOT NULL DEFAULT 0")?;
    add_column_if_missing(engine, "items", "is_pinned", "INTEGER NOT NULL DEFAULT 0")?;
    engine.run(
        "CREATE INDEX IF NOT EXISTS idx_items_pinned ON items(is_pinned)",
        &[],
    )
}

fn add_activity_log(engine: &Engine) -> Result<()> {
    create_table(engine, "activity_log")?;
    engine.run(
        "CREATE INDEX IF NOT EXISTS idx_activity_entity ON activity_log(entity_type, entity_id);
         CREATE INDEX IF NOT EXISTS idx_activity_created ON activity_log(created_at DESC);",
        &[],
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::engine::EngineModule;
    use crate::storage::schema::initialize_schema;

    /// Tables as they looked before versioning was introduced.
    pub(crate) const V1_SCHEMA: &str = "
        CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT NOT NULL, updated_at INTEGER NOT NULL);
        CREATE TABLE areas (id TEXT PRIMARY KEY, name TEXT NOT NULL UNIQUE, description TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0, created_at INTEGER NOT NULL, updated_at INTEGER NOT NULL);
        CREATE TABLE categories (id TEXT PRIMARY KEY, area_id TEXT NOT NULL, name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0, created_at INTEGER NOT NULL, updated_at INTEGER NOT NULL);
        CREATE TABLE folders (id TEXT PRIMARY KEY, category_id TEXT NOT NULL, name TEXT NOT NULL,
            path TEXT, created_at INTEGER NOT NULL, updated_at INTEGER NOT NULL);
        CREATE TABLE items (id TEXT PRIMARY KEY, folder_id TEXT NOT NULL, name TEXT NOT NULL,
            file_path TEXT, size INTEGER, created_at INTEGER NOT NULL, updated_at INTEGER NOT NULL);
        INSERT INTO areas (id, name, created_at, updated_at) VALUES ('a1', 'Legacy', 1, 1);
    ";

    fn engine() -> Engine {
        EngineModule::load().unwrap().open_empty().unwrap()
    }

    fn v1_engine() -> Engine {
        let engine = engine();
        engine.run(V1_SCHEMA, &[]).unwrap();
        engine
    }

    #[test]
    fn test_migrations_are_ordered() {
        let versions: Vec<u32> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        assert_eq!(versions, sorted);
        assert_eq!(versions.last(), Some(&CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_version_defaults_to_baseline() {
        let engine = engine();
        assert_eq!(get_schema_version(&engine).unwrap(), BASELINE_SCHEMA_VERSION);

        engine.run(SCHEMA_VERSION_DDL, &[]).unwrap();
        assert_eq!(get_schema_version(&engine).unwrap(), BASELINE_SCHEMA_VERSION);
    }

    #[test]
    fn test_set_schema_version_replaces() {
        let engine = engine();
        set_schema_version(&engine, 3).unwrap();
        set_schema_version(&engine, 4).unwrap();
        assert_eq!(get_schema_version(&engine).unwrap(), 4);

        let rows = engine
            .scalar("SELECT COUNT(*) FROM schema_version", &[])
            .unwrap();
        assert_eq!(rows, Some(Value::Integer(1)));
    }

    #[test]
    fn test_pending_migrations() {
        assert_eq!(pending_migrations(1), vec![2, 3, 4, 5]);
        assert_eq!(pending_migrations(3), vec![4, 5]);
        assert!(pending_migrations(CURRENT_SCHEMA_VERSION).is_empty());
        assert!(pending_migrations(99).is_empty());
    }

    #[test]
    fn test_upgrade_from_baseline() {
        let engine = v1_engine();
        let report = run_migrations(&engine, None).unwrap();

        assert_eq!(report.from, 1);
        assert_eq!(report.to, CURRENT_SCHEMA_VERSION);
        assert_eq!(report.applied, vec![2, 3, 4, 5]);
        assert_eq!(get_schema_version(&engine).unwrap(), CURRENT_SCHEMA_VERSION);

        assert!(column_exists(&engine, "areas", "icon").unwrap());
        assert!(column_exists(&engine, "items", "is_pinned").unwrap());
        assert!(table_exists(&engine, "tags").unwrap());
        assert!(table_exists(&engine, "activity_log").unwrap());

        let legacy = engine
            .scalar("SELECT name FROM areas WHERE id = 'a1'", &[])
            .unwrap();
        assert_eq!(legacy, Some(Value::Text("Legacy".into())));
    }

    #[test]
    fn test_second_run_applies_nothing() {
        let engine = v1_engine();
        run_migrations(&engine, None).unwrap();

        let mut calls = 0;
        let mut on_done = |_: &Engine| {
            calls += 1;
            Ok(())
        };
        let report = run_migrations(&engine, Some(&mut on_done)).unwrap();
        assert!(report.is_noop());
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_partial_upgrade_applies_only_pending() {
        let engine = v1_engine();
        add_area_and_category_icons(&engine).unwrap();
        add_tags(&engine).unwrap();
        set_schema_version(&engine, 3).unwrap();

        let mut calls = 0;
        let mut on_done = |_: &Engine| {
            calls += 1;
            Ok(())
        };
        let report = run_migrations(&engine, Some(&mut on_done)).unwrap();
        assert_eq!(report.applied, vec![4, 5]);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_migrations_are_idempotent_on_current_schema() {
        let engine = engine();
        initialize_schema(&engine).unwrap();
        for migration in MIGRATIONS {
            (migration.apply)(&engine).unwrap();
        }
    }

    #[test]
    fn test_stale_version_on_full_schema_reapplies_safely() {
        let engine = engine();
        initialize_schema(&engine).unwrap();
        set_schema_version(&engine, 1).unwrap();

        let report = run_migrations(&engine, None).unwrap();
        assert_eq!(report.applied, vec![2, 3, 4, 5]);
        assert_eq!(get_schema_version(&engine).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_non_integer_version_is_an_error() {
        let engine = engine();
        engine
            .run(
                "CREATE TABLE schema_version (id INTEGER PRIMARY KEY, version TEXT, updated_at INTEGER);
                 INSERT INTO schema_version VALUES (1, 'two', 0);",
                &[],
            )
            .unwrap();
        assert!(matches!(
            get_schema_version(&engine),
            Err(Error::Migration { .. })
        ));
    }
}
