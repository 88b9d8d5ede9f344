//! Command implementations.

pub mod completions;
pub mod exec;
pub mod init;
pub mod migrate;
pub mod query;
pub mod reset;
pub mod stats;
pub mod version;

use crate::config::{resolve_data_dir, CacheSettings};
use crate::error::{Error, Result};
use crate::storage::{Database, FileStore, ResultSet};
use colored::Colorize;
use rusqlite::types::Value;
use std::path::Path;

/// Snapshot store for the resolved data directory.
///
/// # Errors
///
/// Returns a config error if no data directory can be determined.
pub fn open_store(data_dir: Option<&Path>) -> Result<FileStore> {
    let dir = resolve_data_dir(data_dir)
        .ok_or_else(|| Error::Config("Could not determine a data directory".to_string()))?;
    Ok(FileStore::new(dir))
}

/// Open and initialize the database in the resolved data directory.
///
/// # Errors
///
/// Returns an error if configuration is invalid or initialization fails.
pub fn open_database(data_dir: Option<&Path>) -> Result<Database<FileStore>> {
    let settings = CacheSettings::from_env()?;
    let mut db = Database::with_cache_settings(open_store(data_dir)?, &settings);
    db.init_database()?;
    Ok(db)
}

/// Interpret a command-line parameter: integer, real, `null`, else text.
#[must_use]
pub fn parse_param(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        Value::Null
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Real(f)
    } else {
        Value::Text(raw.to_string())
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".dimmed().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Print result sets as aligned text columns.
pub fn print_result_sets(sets: &[ResultSet]) {
    if sets.is_empty() {
        println!("{}", "(no rows)".dimmed());
        return;
    }

    for set in sets {
        let rows: Vec<Vec<String>> = set
            .values
            .iter()
            .map(|row| row.iter().map(render_cell).collect())
            .collect();

        let widths: Vec<usize> = set
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                rows.iter()
                    .map(|r| console_width(&r[i]))
                    .chain(std::iter::once(name.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = set
            .columns
            .iter()
            .zip(&widths)
            .map(|(name, w)| format!("{name:<w$}"))
            .collect();
        println!("{}", header.join("  ").bold());

        for row in &rows {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| {
                    let pad = w.saturating_sub(console_width(cell));
                    format!("{cell}{}", " ".repeat(pad))
                })
                .collect();
            println!("{}", line.join("  "));
        }
        println!("{}", format!("({} row(s))", rows.len()).dimmed());
    }
}

/// Visible width, ignoring ANSI color sequences.
fn console_width(s: &str) -> usize {
    let mut width = 0;
    let mut in_escape = false;
    for c in s.chars() {
        match (in_escape, c) {
            (false, '\u{1b}') => in_escape = true,
            (true, 'm') => in_escape = false,
            (true, _) => {}
            (false, _) => width += 1,
        }
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("42"), Value::Integer(42));
        assert_eq!(parse_param("1.5"), Value::Real(1.5));
        assert_eq!(parse_param("NULL"), Value::Null);
        assert_eq!(parse_param("hello"), Value::Text("hello".into()));
    }

    #[test]
    fn test_console_width_skips_escapes() {
        assert_eq!(console_width("\u{1b}[2mNULL\u{1b}[0m"), 4);
        assert_eq!(console_width("abc"), 3);
    }
}
