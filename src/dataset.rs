//! Dataset - Schema metadata and dynamically typed result rows
//!
//! Rows come back from the engine with arbitrary columns, so each cell keeps
//! an explicit variant (numeric, text, temporal) that the visualization
//! fallback can inspect at runtime.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Column name and engine type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// Metadata about a loaded table, not the data itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub id: String,
    pub table_name: String,
    pub row_count: usize,
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl DatasetSchema {
    pub fn new(table_name: impl Into<String>, row_count: usize, columns: Vec<ColumnInfo>) -> Self {
        let table_name = table_name.into();
        Self {
            id: table_name.clone(),
            table_name,
            row_count,
            columns,
            summary: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn column_type(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.data_type.as_str())
    }

    /// Render the schema the way the generation prompt expects it
    pub fn context_for_llm(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.name, c.data_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Table: {} | Columns: {} | Rows: {}",
            self.table_name, cols, self.row_count
        )
    }
}

/// A single dynamically typed cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Dates and timestamps, already rendered as text by the engine
    Temporal(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Integer(_) | CellValue::Float(_))
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, CellValue::Text(_) | CellValue::Temporal(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) | CellValue::Temporal(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "null"),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(x) => write!(f, "{}", x),
            CellValue::Text(s) | CellValue::Temporal(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

/// One result row: column name to value, in engine column order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, replacing an existing column of the same name
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &CellValue> {
        self.cells.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Serialize a row sample for a prompt
pub fn rows_to_json(rows: &[Row]) -> String {
    serde_json::to_string(rows).unwrap_or_else(|_| format!("{:?}", rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_for_llm() {
        let schema = DatasetSchema::new(
            "sales",
            42,
            vec![
                ColumnInfo { name: "month".to_string(), data_type: "str".to_string() },
                ColumnInfo { name: "amount".to_string(), data_type: "f64".to_string() },
            ],
        );
        assert_eq!(
            schema.context_for_llm(),
            "Table: sales | Columns: month (str), amount (f64) | Rows: 42"
        );
        assert_eq!(schema.column_type("amount"), Some("f64"));
    }

    #[test]
    fn test_row_keeps_column_order() {
        let row = Row::new().with("b", 1i64).with("a", "x").with("b", 2i64);
        let columns: Vec<_> = row.columns().collect();
        assert_eq!(columns, vec!["b", "a"]);
        assert_eq!(row.get("b"), Some(&CellValue::Integer(2)));
    }

    #[test]
    fn test_row_serializes_as_object() {
        let row = Row::new()
            .with("month", "Jan")
            .with("sales", 1000i64)
            .with("day", CellValue::Temporal("2024-01-01".to_string()))
            .with("missing", CellValue::Null);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(
            json,
            r#"{"month":"Jan","sales":1000,"day":"2024-01-01","missing":null}"#
        );
    }

    #[test]
    fn test_cell_kinds() {
        assert!(CellValue::Float(1.5).is_numeric());
        assert!(CellValue::Temporal("2024".to_string()).is_textual());
        assert!(!CellValue::Bool(true).is_numeric());
        assert_eq!(CellValue::Integer(3).as_f64(), Some(3.0));
    }
}
