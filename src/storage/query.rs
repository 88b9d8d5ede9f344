//! Parameterized query construction.
//!
//! [`QueryBuilder`] assembles `SELECT`/`INSERT`/`UPDATE`/`DELETE` statements
//! against a closed set of tables. Identifiers are checked before any SQL
//! text exists and every value travels as a `?` parameter, so untrusted
//! input never lands in the statement itself.
//!
//! ```
//! use ostore::storage::query::QueryBuilder;
//! use rusqlite::types::Value;
//!
//! let query = QueryBuilder::new()
//!     .select(&["id", "name"])?
//!     .from("areas")?
//!     .where_("name = ?", vec![Value::from("Work".to_string())])?
//!     .order_by("name", "asc")?
//!     .limit(10)?
//!     .build()?;
//!
//! assert_eq!(
//!     query.sql,
//!     "SELECT id, name FROM areas WHERE name = ? ORDER BY name ASC LIMIT 10"
//! );
//! # Ok::<(), ostore::Error>(())
//! ```

use crate::error::{Error, Result};
use regex::Regex;
use rusqlite::types::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Tables a query may touch. Matching is case-insensitive.
pub const ALLOWED_TABLES: &[&str] = &[
    "settings",
    "areas",
    "categories",
    "folders",
    "items",
    "tags",
    "item_tags",
    "activity_log",
    "schema_version",
];

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("identifier pattern is valid")
});

static AGGREGATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(COUNT|SUM|AVG|MIN|MAX|COALESCE|LOWER|UPPER|LENGTH)\(\s*(\*|DISTINCT\s+[A-Za-z_][A-Za-z0-9_.]*|[A-Za-z_][A-Za-z0-9_.]*(\s*,\s*[A-Za-z_][A-Za-z0-9_.]*)*)\s*\)$",
    )
    .expect("aggregate pattern is valid")
});

static ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\S+)\s+AS\s+(\S+)$").expect("alias pattern is valid")
});

/// An immutable statement plus its positional parameters.
///
/// Building one has no effect; hand it to [`Engine::run_query`] or
/// [`Engine::exec_query`](crate::storage::engine::Engine::exec_query).
///
/// [`Engine::run_query`]: crate::storage::engine::Engine::run_query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Query {
    /// Wrap raw SQL and parameters, e.g. for batch operations.
    #[must_use]
    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Sort direction for `ORDER BY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(Error::InvalidQuery(format!(
                "ORDER BY direction must be ASC or DESC, got '{s}'"
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl QueryKind {
    const fn verb(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connector {
    And,
    Or,
}

#[derive(Debug, Clone)]
struct WhereFragment {
    connector: Option<Connector>,
    condition: String,
}

/// Check a table name against the allow-list, returning its canonical form.
///
/// # Errors
///
/// Returns `InvalidTable` for anything not on the list.
pub fn validate_table(table: &str) -> Result<&'static str> {
    ALLOWED_TABLES
        .iter()
        .find(|allowed| allowed.eq_ignore_ascii_case(table))
        .copied()
        .ok_or_else(|| Error::InvalidTable(table.to_string()))
}

/// Check a plain column identifier (optionally table-qualified).
///
/// # Errors
///
/// Returns `InvalidIdentifier` if the name is not a bare identifier.
pub fn validate_identifier(column: &str) -> Result<()> {
    if IDENTIFIER.is_match(column) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(column.to_string()))
    }
}

/// Check a selectable column expression: identifier, `*`, aggregate call or `X AS Y`.
///
/// # Errors
///
/// Returns `InvalidIdentifier` for any other shape.
pub fn validate_column(column: &str) -> Result<()> {
    let column = column.trim();
    if column == "*" || IDENTIFIER.is_match(column) || AGGREGATE.is_match(column) {
        return Ok(());
    }

    if let Some(caps) = ALIAS.captures(column) {
        if IDENTIFIER.is_match(&caps[1]) && IDENTIFIER.is_match(&caps[2]) {
            return Ok(());
        }
    }

    Err(Error::InvalidIdentifier(column.to_string()))
}

fn validate_condition(condition: &str, params: &[Value]) -> Result<()> {
    let trimmed = condition.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidQuery("WHERE condition is empty".to_string()));
    }
    if trimmed.contains(';') || trimmed.contains("--") || trimmed.contains("/*") {
        return Err(Error::InvalidQuery(format!(
            "WHERE condition contains a statement separator or comment: '{trimmed}'"
        )));
    }

    let placeholders = trimmed.matches('?').count();
    if placeholders != params.len() {
        return Err(Error::InvalidQuery(format!(
            "WHERE condition has {placeholders} placeholder(s) but {} parameter(s) were given",
            params.len()
        )));
    }
    Ok(())
}

fn non_negative(clause: &str, n: i64) -> Result<u64> {
    u64::try_from(n).map_err(|_| {
        Error::InvalidQuery(format!("{clause} must be a non-negative integer, got {n}"))
    })
}

/// Single-shot builder for one statement.
///
/// Each mutator validates its input immediately and returns the same builder,
/// so calls chain with `?`. The first verb (`select`, `insert`, `update`,
/// `delete`) fixes the statement type; a second verb is rejected.
#[derive(Debug, Default, Clone)]
pub struct QueryBuilder {
    kind: Option<QueryKind>,
    table: Option<&'static str>,
    columns: Vec<String>,
    values: Option<Vec<Value>>,
    sets: Vec<(String, Value)>,
    wheres: Vec<WhereFragment>,
    where_params: Vec<Value>,
    order_by: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl QueryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn set_kind(&mut self, kind: QueryKind) -> Result<()> {
        if let Some(existing) = self.kind {
            return Err(Error::InvalidQuery(format!(
                "query type already set to {}, cannot start {}",
                existing.verb(),
                kind.verb()
            )));
        }
        self.kind = Some(kind);
        Ok(())
    }

    fn require_kind(&self, clause: &str, allowed: &[QueryKind]) -> Result<()> {
        match self.kind {
            Some(kind) if allowed.contains(&kind) => Ok(()),
            Some(kind) => Err(Error::InvalidQuery(format!(
                "{clause} is not valid for {}",
                kind.verb()
            ))),
            None => Err(Error::InvalidQuery(format!(
                "{clause} called before a query type was set"
            ))),
        }
    }

    /// Start a `SELECT`. No columns selects `*`.
    ///
    /// # Errors
    ///
    /// Fails if a verb is already set or a column is malformed.
    pub fn select(&mut self, columns: &[&str]) -> Result<&mut Self> {
        for column in columns {
            validate_column(column)?;
        }
        self.set_kind(QueryKind::Select)?;
        self.columns = if columns.is_empty() {
            vec!["*".to_string()]
        } else {
            columns.iter().map(|c| c.trim().to_string()).collect()
        };
        Ok(self)
    }

    /// Set the table of a `SELECT`.
    ///
    /// # Errors
    ///
    /// Fails for tables off the allow-list or when not building a `SELECT`.
    pub fn from(&mut self, table: &str) -> Result<&mut Self> {
        let table = validate_table(table)?;
        self.require_kind("FROM", &[QueryKind::Select])?;
        self.table = Some(table);
        Ok(self)
    }

    /// Start an `INSERT` into `columns` of `table`.
    ///
    /// # Errors
    ///
    /// Fails for an unknown table, malformed or missing columns, or a second verb.
    pub fn insert(&mut self, table: &str, columns: &[&str]) -> Result<&mut Self> {
        let table = validate_table(table)?;
        if columns.is_empty() {
            return Err(Error::InvalidQuery(
                "INSERT needs at least one column".to_string(),
            ));
        }
        for column in columns {
            validate_identifier(column)?;
        }
        self.set_kind(QueryKind::Insert)?;
        self.table = Some(table);
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        Ok(self)
    }

    /// Supply the row for an `INSERT`.
    ///
    /// # Errors
    ///
    /// Fails unless building an `INSERT` and `values.len()` equals the column count.
    pub fn values(&mut self, values: Vec<Value>) -> Result<&mut Self> {
        self.require_kind("VALUES", &[QueryKind::Insert])?;
        if values.len() != self.columns.len() {
            return Err(Error::InvalidQuery(format!(
                "INSERT has {} column(s) but {} value(s)",
                self.columns.len(),
                values.len()
            )));
        }
        self.values = Some(values);
        Ok(self)
    }

    /// Start an `UPDATE` of `table`.
    ///
    /// # Errors
    ///
    /// Fails for an unknown table or a second verb.
    pub fn update(&mut self, table: &str) -> Result<&mut Self> {
        let table = validate_table(table)?;
        self.set_kind(QueryKind::Update)?;
        self.table = Some(table);
        Ok(self)
    }

    /// Add one `SET column = ?` assignment.
    ///
    /// # Errors
    ///
    /// Fails unless building an `UPDATE` with a valid column.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.require_kind("SET", &[QueryKind::Update])?;
        validate_identifier(column)?;
        self.sets.push((column.to_string(), value.into()));
        Ok(self)
    }

    /// Add several assignments in iteration order.
    ///
    /// # Errors
    ///
    /// See [`QueryBuilder::set`].
    pub fn set_many<I, K, V>(&mut self, assignments: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (column, value) in assignments {
            self.set(column.as_ref(), value)?;
        }
        Ok(self)
    }

    /// Start a `DELETE FROM table`.
    ///
    /// # Errors
    ///
    /// Fails for an unknown table or a second verb.
    pub fn delete(&mut self, table: &str) -> Result<&mut Self> {
        let table = validate_table(table)?;
        self.set_kind(QueryKind::Delete)?;
        self.table = Some(table);
        Ok(self)
    }

    fn push_where(
        &mut self,
        connector: Connector,
        condition: &str,
        params: Vec<Value>,
    ) -> Result<&mut Self> {
        self.require_kind(
            "WHERE",
            &[QueryKind::Select, QueryKind::Update, QueryKind::Delete],
        )?;
        validate_condition(condition, &params)?;

        let connector = if self.wheres.is_empty() {
            None
        } else {
            Some(connector)
        };
        self.wheres.push(WhereFragment {
            connector,
            condition: condition.trim().to_string(),
        });
        self.where_params.extend(params);
        Ok(self)
    }

    /// Add a condition; joined with `AND` if others exist.
    ///
    /// # Errors
    ///
    /// Fails for `INSERT`, for separators/comments in the condition, or when
    /// the `?` count differs from `params.len()`.
    pub fn where_(&mut self, condition: &str, params: Vec<Value>) -> Result<&mut Self> {
        self.push_where(Connector::And, condition, params)
    }

    /// Add a condition joined with `AND`.
    ///
    /// # Errors
    ///
    /// See [`QueryBuilder::where_`].
    pub fn and_where(&mut self, condition: &str, params: Vec<Value>) -> Result<&mut Self> {
        self.push_where(Connector::And, condition, params)
    }

    /// Add a condition joined with `OR`.
    ///
    /// # Errors
    ///
    /// See [`QueryBuilder::where_`].
    pub fn or_where(&mut self, condition: &str, params: Vec<Value>) -> Result<&mut Self> {
        self.push_where(Connector::Or, condition, params)
    }

    /// Append an `ORDER BY` term; `direction` is `ASC` or `DESC` in any case.
    ///
    /// # Errors
    ///
    /// Fails outside a `SELECT`, for a malformed column or an unknown direction.
    pub fn order_by(&mut self, column: &str, direction: &str) -> Result<&mut Self> {
        self.require_kind("ORDER BY", &[QueryKind::Select])?;
        validate_identifier(column)?;
        let direction = direction.parse::<Direction>()?;
        self.order_by.push((column.to_string(), direction));
        Ok(self)
    }

    /// # Errors
    ///
    /// Fails outside a `SELECT` or for a negative count.
    pub fn limit(&mut self, n: i64) -> Result<&mut Self> {
        self.require_kind("LIMIT", &[QueryKind::Select])?;
        self.limit = Some(non_negative("LIMIT", n)?);
        Ok(self)
    }

    /// # Errors
    ///
    /// Fails outside a `SELECT` or for a negative count.
    pub fn offset(&mut self, n: i64) -> Result<&mut Self> {
        self.require_kind("OFFSET", &[QueryKind::Select])?;
        self.offset = Some(non_negative("OFFSET", n)?);
        Ok(self)
    }

    fn where_sql(&self) -> String {
        if self.wheres.is_empty() {
            return String::new();
        }

        let mut sql = String::from(" WHERE ");
        for fragment in &self.wheres {
            match fragment.connector {
                Some(Connector::And) => sql.push_str(" AND "),
                Some(Connector::Or) => sql.push_str(" OR "),
                None => {}
            }
            sql.push_str(&fragment.condition);
        }
        sql
    }

    /// Render the statement.
    ///
    /// # Errors
    ///
    /// Fails if no verb or table was set, an `INSERT` has no values, or an
    /// `UPDATE` has no `SET` clause.
    pub fn build(&self) -> Result<Query> {
        let kind = self
            .kind
            .ok_or_else(|| Error::InvalidQuery("no query type set".to_string()))?;
        let table = self.table.ok_or_else(|| {
            Error::InvalidQuery(format!("{} has no table", kind.verb()))
        })?;

        match kind {
            QueryKind::Select => {
                let mut sql = format!(
                    "SELECT {} FROM {table}{}",
                    self.columns.join(", "),
                    self.where_sql()
                );
                if !self.order_by.is_empty() {
                    let terms: Vec<String> = self
                        .order_by
                        .iter()
                        .map(|(column, dir)| format!("{column} {dir}"))
                        .collect();
                    sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
                }
                match (self.limit, self.offset) {
                    (Some(limit), Some(offset)) => {
                        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
                    }
                    (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
                    // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
                    (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
                    (None, None) => {}
                }
                Ok(Query {
                    sql,
                    params: self.where_params.clone(),
                })
            }
            QueryKind::Insert => {
                let values = self.values.clone().ok_or_else(|| {
                    Error::InvalidQuery("INSERT has no VALUES".to_string())
                })?;
                let placeholders = vec!["?"; values.len()].join(", ");
                Ok(Query {
                    sql: format!(
                        "INSERT INTO {table} ({}) VALUES ({placeholders})",
                        self.columns.join(", ")
                    ),
                    params: values,
                })
            }
            QueryKind::Update => {
                if self.sets.is_empty() {
                    return Err(Error::InvalidQuery("UPDATE has no SET clause".to_string()));
                }
                let assignments: Vec<String> = self
                    .sets
                    .iter()
                    .map(|(column, _)| format!("{column} = ?"))
                    .collect();
                let mut params: Vec<Value> =
                    self.sets.iter().map(|(_, value)| value.clone()).collect();
                params.extend(self.where_params.iter().cloned());
                Ok(Query {
                    sql: format!(
                        "UPDATE {table} SET {}{}",
                        assignments.join(", "),
                        self.where_sql()
                    ),
                    params,
                })
            }
            QueryKind::Delete => Ok(Query {
                sql: format!("DELETE FROM {table}{}", self.where_sql()),
                params: self.where_params.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_select_clause_order_and_params() {
        let query = QueryBuilder::new()
            .select(&["id", "name", "COUNT(*)"])
            .unwrap()
            .from("ITEMS")
            .unwrap()
            .where_("folder_id = ?", vec![text("f1")])
            .unwrap()
            .and_where("size > ?", vec![Value::Integer(10)])
            .unwrap()
            .or_where("name LIKE ?", vec![text("%x%")])
            .unwrap()
            .order_by("name", "desc")
            .unwrap()
            .order_by("id", "Asc")
            .unwrap()
            .limit(20)
            .unwrap()
            .offset(40)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            query.sql,
            "SELECT id, name, COUNT(*) FROM items WHERE folder_id = ? AND size > ? \
             OR name LIKE ? ORDER BY name DESC, id ASC LIMIT 20 OFFSET 40"
        );
        assert_eq!(
            query.params,
            vec![text("f1"), Value::Integer(10), text("%x%")]
        );
    }

    #[test]
    fn test_select_without_columns_selects_star() {
        let query = QueryBuilder::new()
            .select(&[])
            .unwrap()
            .from("areas")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(query.sql, "SELECT * FROM areas");
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_offset_without_limit() {
        let query = QueryBuilder::new()
            .select(&["id"])
            .unwrap()
            .from("tags")
            .unwrap()
            .offset(5)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(query.sql, "SELECT id FROM tags LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_disallowed_tables_rejected() {
        for table in ["users", "items; DROP TABLE items", "sqlite_master", ""] {
            let err = QueryBuilder::new()
                .select(&["id"])
                .unwrap()
                .from(table)
                .unwrap_err();
            assert!(matches!(err, Error::InvalidTable(_)), "{table}");
        }

        assert!(matches!(
            QueryBuilder::new().delete("areas;").unwrap_err(),
            Error::InvalidTable(_)
        ));
    }

    #[test]
    fn test_column_shapes() {
        for ok in [
            "id",
            "items.name",
            "*",
            "count(*)",
            "MAX(updated_at)",
            "COUNT(DISTINCT folder_id)",
            "name AS label",
        ] {
            assert!(validate_column(ok).is_ok(), "{ok}");
        }
        for bad in [
            "id; DROP TABLE items",
            "name AS",
            "1abc",
            "COUNT(*) AS total",
            "name AS la bel",
            "EVIL(id)",
            "MAX(id) -- x",
            "a.b.c",
        ] {
            assert!(validate_column(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_insert_value_count_must_match() {
        let mut builder = QueryBuilder::new();
        builder.insert("areas", &["id", "name"]).unwrap();
        let err = builder.values(vec![text("a1")]).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));

        let query = builder
            .values(vec![text("a1"), text("Work")])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(query.sql, "INSERT INTO areas (id, name) VALUES (?, ?)");
        assert_eq!(query.params, vec![text("a1"), text("Work")]);
    }

    #[test]
    fn test_insert_without_values_fails_build() {
        let mut builder = QueryBuilder::new();
        builder.insert("tags", &["id"]).unwrap();
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_update_set_params_precede_where_params() {
        let query = QueryBuilder::new()
            .update("folders")
            .unwrap()
            .set("name", "Renamed".to_string())
            .unwrap()
            .set_many([("sort_order", Value::Integer(3))])
            .unwrap()
            .where_("id = ?", vec![text("f9")])
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            query.sql,
            "UPDATE folders SET name = ?, sort_order = ? WHERE id = ?"
        );
        assert_eq!(
            query.params,
            vec![text("Renamed"), Value::Integer(3), text("f9")]
        );
    }

    #[test]
    fn test_update_without_set_fails() {
        let mut builder = QueryBuilder::new();
        builder
            .update("items")
            .unwrap()
            .where_("id = ?", vec![text("x")])
            .unwrap();
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("SET"));
    }

    #[test]
    fn test_delete() {
        let query = QueryBuilder::new()
            .delete("item_tags")
            .unwrap()
            .where_("item_id = ?", vec![text("i1")])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(query.sql, "DELETE FROM item_tags WHERE item_id = ?");
        assert_eq!(query.params, vec![text("i1")]);
    }

    #[test]
    fn test_second_verb_rejected() {
        let mut builder = QueryBuilder::new();
        builder.select(&["id"]).unwrap();
        let err = builder.insert("areas", &["id"]).unwrap_err();
        assert!(err.to_string().contains("query type already set"));

        // The in-progress SELECT is untouched.
        let query = builder.from("areas").unwrap().build().unwrap();
        assert_eq!(query.sql, "SELECT id FROM areas");
    }

    #[test]
    fn test_invalid_order_limit_offset() {
        let mut builder = QueryBuilder::new();
        builder.select(&["id"]).unwrap().from("areas").unwrap();
        assert!(builder.order_by("id", "sideways").is_err());
        assert!(builder.order_by("id; --", "ASC").is_err());
        assert!(builder.limit(-1).is_err());
        assert!(builder.offset(-5).is_err());
        assert!(builder.limit(0).is_ok());
    }

    #[test]
    fn test_where_condition_checks() {
        let mut builder = QueryBuilder::new();
        builder.select(&["id"]).unwrap().from("items").unwrap();

        assert!(builder.where_("id = ?", vec![]).is_err());
        assert!(builder.where_("id = 1; DROP TABLE items", vec![]).is_err());
        assert!(builder.where_("id = 1 -- trailing", vec![]).is_err());
        assert!(builder.where_("  ", vec![]).is_err());

        let query = builder.where_("is_pinned = 1", vec![]).unwrap().build().unwrap();
        assert_eq!(query.sql, "SELECT id FROM items WHERE is_pinned = 1");
    }

    #[test]
    fn test_clause_on_wrong_verb() {
        let mut builder = QueryBuilder::new();
        builder.insert("areas", &["id"]).unwrap();
        assert!(builder.where_("id = ?", vec![text("a")]).is_err());
        assert!(builder.limit(1).is_err());
        assert!(QueryBuilder::new().values(vec![]).is_err());
        assert!(QueryBuilder::new().build().is_err());
    }

    #[test]
    fn test_built_queries_execute() {
        let engine = crate::storage::engine::EngineModule::load()
            .unwrap()
            .open_empty()
            .unwrap();
        engine
            .run("CREATE TABLE tags (id TEXT PRIMARY KEY, name TEXT)", &[])
            .unwrap();

        let insert = QueryBuilder::new()
            .insert("tags", &["id", "name"])
            .unwrap()
            .values(vec![text("t1"), text("urgent")])
            .unwrap()
            .build()
            .unwrap();
        engine.run_query(&insert).unwrap();

        let select = QueryBuilder::new()
            .select(&["name"])
            .unwrap()
            .from("tags")
            .unwrap()
            .where_("id = ?", vec![text("t1")])
            .unwrap()
            .build()
            .unwrap();
        let sets = engine.exec_query(&select).unwrap();
        assert_eq!(sets[0].values[0][0], text("urgent"));
    }
}
