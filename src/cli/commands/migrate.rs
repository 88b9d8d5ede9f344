//! Inspect and apply schema migrations on the stored snapshot.

use crate::cli::commands::open_store;
use crate::error::{Error, Result};
use crate::storage::migrations::{get_schema_version, pending_migrations, run_migrations};
use crate::storage::schema::CURRENT_SCHEMA_VERSION;
use crate::storage::snapshot::{SnapshotStore, SNAPSHOT_KEY};
use crate::storage::{Engine, EngineModule};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct MigrateOutput {
    from: u32,
    target: u32,
    pending: Vec<u32>,
    applied: Vec<u32>,
}

/// Execute the migrate command.
///
/// With `check`, only reports the stored and target versions.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] when no snapshot exists, or any
/// restore, migration or save error.
pub fn execute(check: bool, data_dir: Option<&Path>, json: bool) -> Result<()> {
    let store = open_store(data_dir)?;
    let bytes = store.get(SNAPSHOT_KEY)?.ok_or(Error::NotInitialized)?;
    let engine = EngineModule::load()?.open_from_bytes(&bytes)?;

    let from = get_schema_version(&engine)?;
    let pending = pending_migrations(from);

    let applied = if check {
        Vec::new()
    } else {
        let mut save = |e: &Engine| store.set(SNAPSHOT_KEY, &e.export()?);
        run_migrations(&engine, Some(&mut save))?.applied
    };

    let output = MigrateOutput {
        from,
        target: CURRENT_SCHEMA_VERSION,
        pending,
        applied,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("Schema version: {} (target {})", output.from, output.target);
    if output.pending.is_empty() {
        println!("{}", "Up to date".green());
    } else if check {
        println!("{} {:?}", "Pending:".yellow(), output.pending);
    } else {
        println!("{} {:?}", "Applied:".green(), output.applied);
    }
    Ok(())
}
