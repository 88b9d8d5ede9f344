//! Select rows through the validated query builder.

use crate::cli::commands::{open_database, parse_param, print_result_sets};
use crate::cli::QueryArgs;
use crate::error::{Error, Result};
use crate::storage::mapper::{map_rows, table_columns};
use crate::storage::query::{validate_table, Query, QueryBuilder};
use rusqlite::types::Value;
use std::path::Path;

/// Turn the command-line arguments into a built `SELECT`.
///
/// Parameters are handed to conditions in order, each taking as many as it
/// has `?` placeholders.
///
/// # Errors
///
/// Returns a validation error for bad tables, columns, conditions or
/// parameter counts.
pub fn build_query(args: &QueryArgs) -> Result<Query> {
    let table = validate_table(&args.table)?;

    let columns: Vec<&str> = if args.columns.is_empty() {
        table_columns(table).map(<[&str]>::to_vec).unwrap_or_default()
    } else {
        args.columns.iter().map(String::as_str).collect()
    };

    let mut builder = QueryBuilder::new();
    builder.select(&columns)?.from(table)?;

    let mut params = args.params.iter().map(|p| parse_param(p));
    for condition in &args.conditions {
        let wanted = condition.matches('?').count();
        let taken: Vec<Value> = params.by_ref().take(wanted).collect();
        builder.and_where(condition, taken)?;
    }
    if params.next().is_some() {
        return Err(Error::InvalidArgument(
            "more --param values than placeholders".to_string(),
        ));
    }

    if let Some(order) = &args.order_by {
        let (column, direction) = order.split_once(':').unwrap_or((order.as_str(), "asc"));
        builder.order_by(column, direction)?;
    }
    if let Some(limit) = args.limit {
        builder.limit(limit)?;
    }
    if let Some(offset) = args.offset {
        builder.offset(offset)?;
    }

    builder.build()
}

/// Execute the query command.
///
/// # Errors
///
/// Returns an error if the query is invalid or fails to run.
pub fn execute(args: &QueryArgs, data_dir: Option<&Path>, json: bool) -> Result<()> {
    let query = build_query(args)?;
    let db = open_database(data_dir)?;
    let sets = db.with_engine(|engine| engine.exec_query(&query))?;

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

#[cfg(test)]
mod tests {
    use super::*;

    fn args(table: &str) -> QueryArgs {
        QueryArgs {
            table: table.to_string(),
            columns: Vec::new(),
            conditions: Vec::new(),
            params: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    #[test]
    fn test_default_columns_come_from_table() {
        let query = build_query(&args("tags")).unwrap();
        assert_eq!(query.sql, "SELECT id, name, color, created_at FROM tags");
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_conditions_take_params_in_order() {
        let mut a = args("items");
        a.columns = vec!["id".into()];
        a.conditions = vec!["size > ?".into(), "name = ?".into()];
        a.params = vec!["10".into(), "report".into()];
        a.order_by = Some("name:desc".into());
        a.limit = Some(3);

        let query = build_query(&a).unwrap();
        assert_eq!(
            query.sql,
            "SELECT id FROM items WHERE size > ? AND name = ? ORDER BY name DESC LIMIT 3"
        );
        assert_eq!(
            query.params,
            vec![Value::Integer(10), Value::Text("report".into())]
        );
    }

    #[test]
    fn test_rejects_extra_params() {
        let mut a = args("items");
        a.params = vec!["1".into()];
        assert!(matches!(build_query(&a), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_unknown_table() {
        assert!(matches!(
            build_query(&args("sqlite_master")),
            Err(Error::InvalidTable(_))
        ));
    }
}
