//! Database schema definitions.
//!
//! Table DDL is kept as ordered `(name, DDL)` pairs so parents are created
//! before the tables that reference them. Everything uses `IF NOT EXISTS`,
//! so applying the schema twice is harmless.
//!
//! Timestamps are stored as INTEGER (Unix milliseconds).

use crate::error::Result;
use crate::storage::engine::Engine;
use crate::storage::migrations::set_schema_version;
use crate::storage::transaction::transaction;
use rusqlite::types::Value;
use tracing::info;

/// Schema version this build writes and migrates up to.
pub const CURRENT_SCHEMA_VERSION: u32 = 5;

/// Single-row version table. Snapshots from before versioning lack it.
pub const SCHEMA_VERSION_DDL: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)";

/// One table: its name and creation DDL.
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub ddl: &'static str,
}

/// All tables, ordered to satisfy foreign keys.
pub const TABLES: &[TableDef] = &[
    TableDef {
        name: "schema_version",
        ddl: SCHEMA_VERSION_DDL,
    },
    TableDef {
        name: "settings",
        ddl: "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    },
    TableDef {
        name: "areas",
        ddl: "CREATE TABLE IF NOT EXISTS areas (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            icon TEXT,
            color TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    },
    TableDef {
        name: "categories",
        ddl: "CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            area_id TEXT NOT NULL,
            name TEXT NOT NULL,
            icon TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (area_id) REFERENCES areas(id) ON DELETE CASCADE,
            UNIQUE(area_id, name)
        )",
    },
    TableDef {
        name: "folders",
        ddl: "CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY,
            category_id TEXT NOT NULL,
            name TEXT NOT NULL,
            path TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
        )",
    },
    TableDef {
        name: "items",
        ddl: "CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            folder_id TEXT NOT NULL,
            name TEXT NOT NULL,
            file_path TEXT,
            size INTEGER,
            is_pinned INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE CASCADE
        )",
    },
    TableDef {
        name: "tags",
        ddl: "CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            color TEXT,
            created_at INTEGER NOT NULL
        )",
    },
    TableDef {
        name: "item_tags",
        ddl: "CREATE TABLE IF NOT EXISTS item_tags (
            item_id TEXT NOT NULL,
            tag_id TEXT NOT NULL,
            PRIMARY KEY (item_id, tag_id),
            FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        )",
    },
    TableDef {
        name: "activity_log",
        ddl: "CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            action TEXT NOT NULL,
            detail TEXT,
            created_at INTEGER NOT NULL
        )",
    },
];

/// All indexes, created after the tables.
pub const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_categories_area ON categories(area_id)",
    "CREATE INDEX IF NOT EXISTS idx_folders_category ON folders(category_id)",
    "CREATE INDEX IF NOT EXISTS idx_items_folder ON items(folder_id)",
    "CREATE INDEX IF NOT EXISTS idx_items_name ON items(name)",
    "CREATE INDEX IF NOT EXISTS idx_items_pinned ON items(is_pinned)",
    "CREATE INDEX IF NOT EXISTS idx_item_tags_tag ON item_tags(tag_id)",
    "CREATE INDEX IF NOT EXISTS idx_activity_entity ON activity_log(entity_type, entity_id)",
    "CREATE INDEX IF NOT EXISTS idx_activity_created ON activity_log(created_at DESC)",
];

const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("theme", "system"),
    ("locale", "en"),
    ("scan_interval_minutes", "30"),
];

const DEFAULT_AREAS: &[(&str, &str)] = &[("Personal", "#4f9d69"), ("Work", "#3b6ea8")];

/// Creation DDL for one table.
#[must_use]
pub fn table_ddl(name: &str) -> Option<&'static str> {
    TABLES.iter().find(|t| t.name == name).map(|t| t.ddl)
}

/// Create every table.
///
/// # Errors
///
/// Returns an error if any DDL statement fails.
pub fn create_tables(engine: &Engine) -> Result<()> {
    for table in TABLES {
        engine.run(table.ddl, &[])?;
    }
    Ok(())
}

/// Create every index.
///
/// # Errors
///
/// Returns an error if any DDL statement fails.
pub fn create_indexes(engine: &Engine) -> Result<()> {
    for index in INDEXES {
        engine.run(index, &[])?;
    }
    Ok(())
}

/// First-run setup: tables, indexes and the initial schema version, atomically.
///
/// # Errors
///
/// Returns an error if any step fails; nothing is left behind in that case.
pub fn initialize_schema(engine: &Engine) -> Result<()> {
    transaction(engine, |tx| {
        let engine = tx.engine()?;
        create_tables(engine)?;
        create_indexes(engine)?;
        set_schema_version(engine, CURRENT_SCHEMA_VERSION)
    })?;

    info!(
        tables = TABLES.len(),
        indexes = INDEXES.len(),
        version = CURRENT_SCHEMA_VERSION,
        "Schema initialized"
    );
    Ok(())
}

/// Insert baseline rows. Existing rows with the same keys are left alone.
///
/// # Errors
///
/// Returns an error if an insert fails.
pub fn seed_data(engine: &Engine) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis();

    transaction(engine, |tx| {
        for (key, value) in DEFAULT_SETTINGS {
            tx.run(
                "INSERT OR IGNORE INTO settings (key, value, updated_at) VALUES (?, ?, ?)",
                &[
                    Value::Text((*key).to_string()),
                    Value::Text((*value).to_string()),
                    Value::Integer(now),
                ],
            )?;
        }

        for (order, (name, color)) in (0_i64..).zip(DEFAULT_AREAS) {
            tx.run(
                "INSERT OR IGNORE INTO areas (id, name, color, sort_order, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                &[
                    Value::Text(uuid::Uuid::new_v4().to_string()),
                    Value::Text((*name).to_string()),
                    Value::Text((*color).to_string()),
                    Value::Integer(order),
                    Value::Integer(now),
                    Value::Integer(now),
                ],
            )?;
        }
        Ok(())
    })
}

/// Check if a table exists.
///
/// # Errors
///
/// Returns an error if the catalog query fails.
pub fn table_exists(engine: &Engine, table: &str) -> Result<bool> {
    Ok(engine
        .scalar(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[Value::Text(table.to_string())],
        )?
        .is_some())
}

/// Check if a column exists in a table, using live schema metadata.
///
/// # Errors
///
/// Returns an error if the metadata query fails.
pub fn column_exists(engine: &Engine, table: &str, column: &str) -> Result<bool> {
    Ok(engine
        .scalar(
            "SELECT 1 FROM pragma_table_info(?) WHERE name = ?",
            &[Value::Text(table.to_string()), Value::Text(column.to_string())],
        )?
        .is_some())
}

/// Names of user tables, sorted.
///
/// # Errors
///
/// Returns an error if the catalog query fails.
pub fn list_tables(engine: &Engine) -> Result<Vec<String>> {
    let sets = engine.exec(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
        &[],
    )?;

    Ok(sets
        .into_iter()
        .flat_map(|set| set.values)
        .filter_map(|row| match row.into_iter().next() {
            Some(Value::Text(name)) => Some(name),
            _ => None,
        })
        .collect())
}
