//! Reset the database to a freshly seeded state.

use crate::cli::commands::open_database;
use crate::error::{Error, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ResetOutput {
    reset: bool,
    schema_version: Option<u32>,
}

/// Execute the reset command. Refuses to run without `--force`.
///
/// # Errors
///
/// Returns an error without `--force`, or if rebuilding or saving fails.
pub fn execute(force: bool, data_dir: Option<&Path>, json: bool) -> Result<()> {
    if !force {
        return Err(Error::InvalidArgument(
            "reset discards all data; pass --force to confirm".to_string(),
        ));
    }

    let mut db = open_database(data_dir)?;
    db.reset_database()?;

    let output = ResetOutput {
        reset: true,
        schema_version: db.schema_version()?,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{}", "Database reset to defaults".yellow());
    }
    Ok(())
}
