//! Initialize (or restore) the database.
//!
//! First run creates the schema, seeds defaults and writes the first
//! snapshot. Later runs restore the snapshot and migrate it if it is behind.

use crate::cli::commands::open_database;
use crate::error::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    data_dir: PathBuf,
    schema_version: Option<u32>,
    tables: usize,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be restored or written.
pub fn execute(data_dir: Option<&Path>, json: bool) -> Result<()> {
    let db = open_database(data_dir)?;
    let output = InitOutput {
        data_dir: db.store().dir().to_path_buf(),
        schema_version: db.schema_version()?,
        tables: db.get_tables()?.len(),
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{} {}", "Database ready:".green(), output.data_dir.display());
        if let Some(version) = output.schema_version {
            println!("  Schema version: {version}");
        }
        println!("  Tables: {}", output.tables);
    }

    Ok(())
}
