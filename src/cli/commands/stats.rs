//! Read-only introspection: `stats` and `tables`.

use crate::cli::commands::open_database;
use crate::error::Result;
use colored::Colorize;
use std::path::Path;

/// Execute the stats command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or queried.
pub fn execute(data_dir: Option<&Path>, json: bool) -> Result<()> {
    let db = open_database(data_dir)?;
    let Some(stats) = db.get_database_stats()? else {
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string(&stats)?);
        return Ok(());
    }

    println!("{}", "Database".cyan().bold());
    println!("  Schema version: {}", stats.schema_version);
    println!("  SQLite:         {}", stats.sqlite_version);
    println!(
        "  Size:           {} bytes ({} pages x {})",
        stats.size_bytes, stats.page_count, stats.page_size
    );
    println!();
    println!("{}", "Tables".cyan().bold());
    let width = stats.tables.iter().map(|t| t.name.len()).max().unwrap_or(0);
    for table in &stats.tables {
        println!("  {:<width$}  {}", table.name, table.row_count);
    }
    Ok(())
}

/// Execute the tables command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or queried.
pub fn execute_tables(data_dir: Option<&Path>, json: bool) -> Result<()> {
    let db = open_database(data_dir)?;
    let tables = db.get_tables()?;

    if json {
        println!("{}", serde_json::to_string(&tables)?);
    } else {
        for table in tables {
            println!("{table}");
        }
    }
    Ok(())
}
