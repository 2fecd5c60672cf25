use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde_json::Value as JsonValue;

use super::loader;

/// Reserved value marking a missing or unreachable travel metric.
pub const SENTINEL: i64 = -1;

// ---------------------------------------------------------------------------
// FieldValue – a single cell in an attribute column
// ---------------------------------------------------------------------------

/// A dynamically-typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{s}"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Null => write!(f, "<null>"),
        }
    }
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Integer view; floats qualify only when they carry no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// `true` for the -1 sentinel, whether stored as an integer or a float.
    pub fn is_sentinel(&self) -> bool {
        match self {
            FieldValue::Integer(i) => *i == SENTINEL,
            FieldValue::Float(v) => *v == SENTINEL as f64,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Row – one feature of a table
// ---------------------------------------------------------------------------

/// One record: an optional geometry plus its attribute values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// GeoJSON geometry object, carried through untouched.
    pub geometry: Option<JsonValue>,
    /// Attribute columns: column_name → value.
    pub values: BTreeMap<String, FieldValue>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values.get(column)
    }
}

// ---------------------------------------------------------------------------
// Table – a loaded attribute table with geometry
// ---------------------------------------------------------------------------

/// An ordered attribute table. Geometry travels with each row, the CRS with
/// the table as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Attribute column names in output order (geometry excluded).
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Coordinate reference system descriptor, copied verbatim on write.
    pub crs: Option<JsonValue>,
}

impl Table {
    /// Build a table from rows given as ordered `(column, value)` pairs.
    /// Columns are ordered by first appearance across all rows; a row that
    /// lacks a column simply has no cell for it.
    pub fn from_rows<R, P>(rows: R, crs: Option<JsonValue>) -> Table
    where
        R: IntoIterator<Item = (Option<JsonValue>, P)>,
        P: IntoIterator<Item = (String, FieldValue)>,
    {
        let mut columns: Vec<String> = Vec::new();
        let rows = rows
            .into_iter()
            .map(|(geometry, pairs)| {
                let mut values = BTreeMap::new();
                for (name, value) in pairs {
                    if !columns.contains(&name) {
                        columns.push(name.clone());
                    }
                    values.insert(name, value);
                }
                Row { geometry, values }
            })
            .collect();
        Table { columns, rows, crs }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `column` in the output order.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&FieldValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Remove the named columns from the header and every row. Names that
    /// are not present are ignored.
    pub fn drop_columns(&mut self, names: &[&str]) {
        self.columns.retain(|c| !names.contains(&c.as_str()));
        for row in &mut self.rows {
            for name in names {
                row.values.remove(*name);
            }
        }
    }

    /// Attach (or replace) a column holding one value per row.
    pub fn push_column(&mut self, name: &str, values: Vec<FieldValue>) -> Result<()> {
        if values.len() != self.rows.len() {
            bail!(
                "column '{name}' has {} values but the table has {} rows",
                values.len(),
                self.rows.len()
            );
        }
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.values.insert(name.to_string(), value);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TableRef – a table given either by value or by location
// ---------------------------------------------------------------------------

/// Input accepted by the comparator: a table already in memory or a
/// persisted table that still has to be read.
#[derive(Debug, Clone)]
pub enum TableRef {
    InMemory(Table),
    Persisted(PathBuf),
}

impl TableRef {
    /// Materialise the table. The path is returned for persisted inputs so
    /// callers can write back to the same location.
    pub fn resolve(self) -> Result<(Table, Option<PathBuf>)> {
        match self {
            TableRef::InMemory(table) => Ok((table, None)),
            TableRef::Persisted(path) => {
                let table = loader::load_table(&path)?;
                Ok((table, Some(path)))
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            TableRef::InMemory(_) => None,
            TableRef::Persisted(path) => Some(path),
        }
    }
}

impl From<Table> for TableRef {
    fn from(table: Table) -> Self {
        TableRef::InMemory(table)
    }
}

impl From<PathBuf> for TableRef {
    fn from(path: PathBuf) -> Self {
        TableRef::Persisted(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, FieldValue)]) -> Table {
        Table {
            columns: pairs.iter().map(|(k, _)| k.to_string()).collect(),
            rows: vec![Row {
                geometry: None,
                values: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            }],
            crs: None,
        }
    }

    #[test]
    fn sentinel_matches_integer_and_float_forms() {
        assert!(FieldValue::Integer(-1).is_sentinel());
        assert!(FieldValue::Float(-1.0).is_sentinel());
        assert!(!FieldValue::Integer(0).is_sentinel());
        assert!(!FieldValue::Null.is_sentinel());
        assert!(!FieldValue::String("-1".into()).is_sentinel());
    }

    #[test]
    fn as_i64_rejects_fractional_floats() {
        assert_eq!(FieldValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(FieldValue::Float(3.5).as_i64(), None);
        assert_eq!(FieldValue::String("3".into()).as_i64(), None);
    }

    #[test]
    fn from_rows_orders_columns_by_first_appearance() {
        let t = Table::from_rows(
            vec![
                (
                    None,
                    vec![
                        ("YKR_ID".to_string(), FieldValue::Integer(1)),
                        ("b".to_string(), FieldValue::Integer(2)),
                    ],
                ),
                (
                    Some(serde_json::json!({"type": "Point", "coordinates": [0, 0]})),
                    vec![
                        ("a".to_string(), FieldValue::Bool(true)),
                        ("YKR_ID".to_string(), FieldValue::Integer(2)),
                    ],
                ),
            ],
            None,
        );
        assert_eq!(t.columns, vec!["YKR_ID", "b", "a"]);
        assert_eq!(t.column_index("a"), Some(2));
        assert_eq!(t.column_index("z"), None);
        assert!(t.value(1, "b").is_none());
        assert_eq!(t.value(1, "a"), Some(&FieldValue::Bool(true)));
        assert!(t.rows[0].geometry.is_none() && t.rows[1].geometry.is_some());
    }

    #[test]
    fn drop_columns_removes_header_and_cells() {
        let mut t = table(&[("x", FieldValue::Float(1.0)), ("keep", FieldValue::Integer(7))]);
        t.drop_columns(&["x", "missing"]);
        assert_eq!(t.columns, vec!["keep"]);
        assert!(t.rows[0].get("x").is_none());
        assert_eq!(t.value(0, "keep"), Some(&FieldValue::Integer(7)));
    }

    #[test]
    fn push_column_rejects_length_mismatch() {
        let mut t = table(&[("a", FieldValue::Integer(1))]);
        assert!(t.push_column("d", vec![]).is_err());
        t.push_column("d", vec![FieldValue::Integer(4)]).unwrap();
        assert_eq!(t.columns, vec!["a", "d"]);
        assert_eq!(t.value(0, "d"), Some(&FieldValue::Integer(4)));
    }
}
