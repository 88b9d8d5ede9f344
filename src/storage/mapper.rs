//! Row mapping from positional result arrays to named records.
//!
//! The engine hands back rows as value arrays. Each table's column list is
//! declared once, next to the typed record that reads it, so the two cannot
//! drift apart silently.

use crate::error::{Error, Result};
use crate::storage::engine::ResultSet;
use rusqlite::types::Value;
use serde::Serialize;

/// A row keyed by column name, in column order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Convert an engine value into JSON. Blobs become byte arrays.
#[must_use]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(f) => serde_json::Value::from(*f),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(b) => serde_json::Value::from(b.clone()),
    }
}

/// Pair one positional row with its column names.
///
/// # Errors
///
/// Returns an error if the row width differs from the column count.
pub fn map_row<S: AsRef<str>>(columns: &[S], row: &[Value]) -> Result<Record> {
    if columns.len() != row.len() {
        return Err(Error::Other(format!(
            "row has {} value(s) for {} column(s)",
            row.len(),
            columns.len()
        )));
    }

    Ok(columns
        .iter()
        .zip(row)
        .map(|(name, value)| (name.as_ref().to_string(), value_to_json(value)))
        .collect())
}

/// Map every row of a result set using the set's own column names.
///
/// # Errors
///
/// See [`map_row`].
pub fn map_rows(set: &ResultSet) -> Result<Vec<Record>> {
    set.values
        .iter()
        .map(|row| map_row(&set.columns, row))
        .collect()
}

/// Column list for an allow-listed table, if it has a typed record.
#[must_use]
pub fn table_columns(table: &str) -> Option<&'static [&'static str]> {
    match table.to_ascii_lowercase().as_str() {
        "settings" => Some(Setting::COLUMNS),
        "areas" => Some(Area::COLUMNS),
        "categories" => Some(Category::COLUMNS),
        "folders" => Some(Folder::COLUMNS),
        "items" => Some(Item::COLUMNS),
        "tags" => Some(Tag::COLUMNS),
        _ => None,
    }
}

/// A typed row with its table and column list declared alongside it.
pub trait TableRecord: Sized {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    /// Build the record from values ordered as [`Self::COLUMNS`].
    ///
    /// # Errors
    ///
    /// Returns an error on arity or type mismatch.
    fn from_row(row: &[Value]) -> Result<Self>;

    /// Map every row of the first result set.
    ///
    /// # Errors
    ///
    /// See [`TableRecord::from_row`].
    fn from_result_sets(sets: &[ResultSet]) -> Result<Vec<Self>> {
        sets.first()
            .map(|set| set.values.iter().map(|row| Self::from_row(row)).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

struct Cells<'a> {
    table: &'static str,
    columns: &'static [&'static str],
    row: &'a [Value],
}

impl<'a> Cells<'a> {
    fn new<R: TableRecord>(row: &'a [Value]) -> Result<Self> {
        if row.len() != R::COLUMNS.len() {
            return Err(Error::Other(format!(
                "{}: row has {} value(s) for {} column(s)",
                R::TABLE,
                row.len(),
                R::COLUMNS.len()
            )));
        }
        Ok(Self {
            table: R::TABLE,
            columns: R::COLUMNS,
            row,
        })
    }

    fn mismatch(&self, idx: usize, expected: &str) -> Error {
        Error::Other(format!(
            "{}.{}: expected {expected}, got {:?}",
            self.table, self.columns[idx], self.row[idx]
        ))
    }

    fn text(&self, idx: usize) -> Result<String> {
        match &self.row[idx] {
            Value::Text(s) => Ok(s.clone()),
            _ => Err(self.mismatch(idx, "text")),
        }
    }

    fn opt_text(&self, idx: usize) -> Result<Option<String>> {
        match &self.row[idx] {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            _ => Err(self.mismatch(idx, "text or null")),
        }
    }

    fn int(&self, idx: usize) -> Result<i64> {
        match &self.row[idx] {
            Value::Integer(i) => Ok(*i),
            _ => Err(self.mismatch(idx, "integer")),
        }
    }

    fn opt_int(&self, idx: usize) -> Result<Option<i64>> {
        match &self.row[idx] {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(*i)),
            _ => Err(self.mismatch(idx, "integer or null")),
        }
    }

    fn flag(&self, idx: usize) -> Result<bool> {
        Ok(self.int(idx)? != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: i64,
}

impl TableRecord for Setting {
    const TABLE: &'static str = "settings";
    const COLUMNS: &'static [&'static str] = &["key", "value", "updated_at"];

    fn from_row(row: &[Value]) -> Result<Self> {
        let c = Cells::new::<Self>(row)?;
        Ok(Self {
            key: c.text(0)?,
            value: c.text(1)?,
            updated_at: c.int(2)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Area {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub sort_order: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TableRecord for Area {
    const TABLE: &'static str = "areas";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "description",
        "icon",
        "color",
        "sort_order",
        "created_at",
        "updated_at",
    ];

    fn from_row(row: &[Value]) -> Result<Self> {
        let c = Cells::new::<Self>(row)?;
        Ok(Self {
            id: c.text(0)?,
            name: c.text(1)?,
            description: c.opt_text(2)?,
            icon: c.opt_text(3)?,
            color: c.opt_text(4)?,
            sort_order: c.int(5)?,
            created_at: c.int(6)?,
            updated_at: c.int(7)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: String,
    pub area_id: String,
    pub name: String,
    pub icon: Option<String>,
    pub sort_order: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TableRecord for Category {
    const TABLE: &'static str = "categories";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "area_id",
        "name",
        "icon",
        "sort_order",
        "created_at",
        "updated_at",
    ];

    fn from_row(row: &[Value]) -> Result<Self> {
        let c = Cells::new::<Self>(row)?;
        Ok(Self {
            id: c.text(0)?,
            area_id: c.text(1)?,
            name: c.text(2)?,
            icon: c.opt_text(3)?,
            sort_order: c.int(4)?,
            created_at: c.int(5)?,
            updated_at: c.int(6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Folder {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub path: Option<String>,
    pub sort_order: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TableRecord for Folder {
    const TABLE: &'static str = "folders";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "category_id",
        "name",
        "path",
        "sort_order",
        "created_at",
        "updated_at",
    ];

    fn from_row(row: &[Value]) -> Result<Self> {
        let c = Cells::new::<Self>(row)?;
        Ok(Self {
            id: c.text(0)?,
            category_id: c.text(1)?,
            name: c.text(2)?,
            path: c.opt_text(3)?,
            sort_order: c.int(4)?,
            created_at: c.int(5)?,
            updated_at: c.int(6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: String,
    pub folder_id: String,
    pub name: String,
    pub file_path: Option<String>,
    pub size: Option<i64>,
    pub is_pinned: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TableRecord for Item {
    const TABLE: &'static str = "items";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "folder_id",
        "name",
        "file_path",
        "size",
        "is_pinned",
        "created_at",
        "updated_at",
    ];

    fn from_row(row: &[Value]) -> Result<Self> {
        let c = Cells::new::<Self>(row)?;
        Ok(Self {
            id: c.text(0)?,
            folder_id: c.text(1)?,
            name: c.text(2)?,
            file_path: c.opt_text(3)?,
            size: c.opt_int(4)?,
            is_pinned: c.flag(5)?,
            created_at: c.int(6)?,
            updated_at: c.int(7)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub created_at: i64,
}

impl TableRecord for Tag {
    const TABLE: &'static str = "tags";
    const COLUMNS: &'static [&'static str] = &["id", "name", "color", "created_at"];

    fn from_row(row: &[Value]) -> Result<Self> {
        let c = Cells::new::<Self>(row)?;
        Ok(Self {
            id: c.text(0)?,
            name: c.text(1)?,
            color: c.opt_text(2)?,
            created_at: c.int(3)?,
        })
    }
}
