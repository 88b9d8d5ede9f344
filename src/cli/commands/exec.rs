//! Execute one raw SQL statement.

use crate::cli::commands::{open_database, parse_param, print_result_sets};
use crate::error::Result;
use crate::storage::mapper::map_rows;
use rusqlite::types::Value;
use std::path::Path;

/// Execute the exec command, then save the snapshot.
///
/// # Errors
///
/// Returns an error if the statement fails or the snapshot cannot be saved.
pub fn execute(sql: &str, params: &[String], data_dir: Option<&Path>, json: bool) -> Result<()> {
    let db = open_database(data_dir)?;
    let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();

    let sets = db.execute_sql(sql, &params)?;
    db.save_database()?;

    if json {
        let mut records = Vec::new();
        for set in &sets {
            records.extend(map_rows(set)?);
        }
        println!("{}", serde_json::to_string(&records)?);
    } else {
        print_result_sets(&sets);
    }
    Ok(())
}
