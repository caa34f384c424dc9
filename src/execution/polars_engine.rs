//! Polars Execution Engine
//!
//! In-memory tables queried through polars' SQL context. Each query runs on
//! a blocking thread against a snapshot of the registered frames.

use crate::dataset::{CellValue, ColumnInfo, DatasetSchema, Row};
use crate::error::{AnalystError, Result};
use crate::execution::engine::DataEngine;
use async_trait::async_trait;
use polars::prelude::*;
use polars::sql::SQLContext;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::info;

pub struct PolarsEngine {
    tables: RwLock<HashMap<String, DataFrame>>,
}

impl PolarsEngine {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or replace) a table from an in-memory frame
    pub fn register_frame(&self, table_name: &str, frame: DataFrame) -> Result<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| AnalystError::Execution("engine table lock poisoned".to_string()))?;
        tables.insert(table_name.to_string(), frame);
        Ok(())
    }

    /// Load a CSV file into `table_name`, replacing any previous table
    pub async fn load_file(&self, path: &Path, table_name: &str) -> Result<DatasetSchema> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if extension != "csv" {
            return Err(AnalystError::Execution(format!(
                "Unsupported file format: '{}' ({})",
                extension,
                path.display()
            )));
        }

        let owned_path: PathBuf = path.to_path_buf();
        let frame = tokio::task::spawn_blocking(move || read_csv(&owned_path))
            .await
            .map_err(|e| AnalystError::Execution(format!("CSV loader task failed: {}", e)))?
            .map_err(|e| {
                AnalystError::Execution(format!("Error loading file {}: {}", path.display(), e))
            })?;

        info!(table = table_name, rows = frame.height(), "Loaded dataset");
        self.register_frame(table_name, frame)?;
        self.get_schema(table_name).await
    }

    fn snapshot(&self) -> Result<HashMap<String, DataFrame>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| AnalystError::Execution("engine table lock poisoned".to_string()))?;
        Ok(tables.clone())
    }
}

impl Default for PolarsEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn read_csv(path: &Path) -> PolarsResult<DataFrame> {
    let mut frame = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_try_parse_dates(true)
        .finish()?
        .collect()?;

    let names: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| normalize_column_name(name))
        .collect();
    frame.set_column_names(&names)?;
    Ok(frame)
}

/// Trim, replace spaces and dashes with underscores, lowercase
pub fn normalize_column_name(name: &str) -> String {
    name.trim().replace([' ', '-'], "_").to_lowercase()
}

fn run_on_snapshot(tables: HashMap<String, DataFrame>, sql: &str) -> PolarsResult<DataFrame> {
    let mut ctx = SQLContext::new();
    for (name, frame) in tables {
        ctx.register(&name, frame.lazy());
    }
    ctx.execute(sql)?.collect()
}

/// Convert a result frame to rows, rendering temporal columns as text
pub fn frame_to_rows(frame: &DataFrame) -> Result<Vec<Row>> {
    let mut columns: Vec<(String, Vec<CellValue>)> = Vec::with_capacity(frame.width());
    for series in frame.get_columns() {
        columns.push((series.name().to_string(), series_to_cells(series)?));
    }

    let rows = (0..frame.height())
        .map(|idx| {
            let mut row = Row::new();
            for (name, cells) in &columns {
                let value = cells.get(idx).cloned().unwrap_or(CellValue::Null);
                row.insert(name.clone(), value);
            }
            row
        })
        .collect();
    Ok(rows)
}

fn series_to_cells(series: &Series) -> PolarsResult<Vec<CellValue>> {
    let dtype = series.dtype();

    if dtype.is_temporal() {
        let text = series.cast(&DataType::String)?;
        return Ok(text
            .str()?
            .into_iter()
            .map(|v| v.map_or(CellValue::Null, |s| CellValue::Temporal(s.to_string())))
            .collect());
    }

    if dtype.is_integer() {
        let ints = series.cast(&DataType::Int64)?;
        return Ok(ints
            .i64()?
            .into_iter()
            .map(|v| v.map_or(CellValue::Null, CellValue::Integer))
            .collect());
    }

    if dtype.is_float() {
        let floats = series.cast(&DataType::Float64)?;
        return Ok(floats
            .f64()?
            .into_iter()
            .map(|v| v.map_or(CellValue::Null, CellValue::Float))
            .collect());
    }

    match dtype {
        DataType::Boolean => Ok(series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(CellValue::Null, CellValue::Bool))
            .collect()),
        DataType::String => Ok(series
            .str()?
            .into_iter()
            .map(|v| v.map_or(CellValue::Null, |s| CellValue::Text(s.to_string())))
            .collect()),
        _ => match series.cast(&DataType::String) {
            Ok(text) => Ok(text
                .str()?
                .into_iter()
                .map(|v| v.map_or(CellValue::Null, |s| CellValue::Text(s.to_string())))
                .collect()),
            Err(_) => Ok(vec![CellValue::Null; series.len()]),
        },
    }
}

#[async_trait]
impl DataEngine for PolarsEngine {
    fn name(&self) -> &'static str {
        "polars"
    }

    async fn get_schema(&self, table_name: &str) -> Result<DatasetSchema> {
        let tables = self.snapshot()?;
        let frame = tables.get(table_name).ok_or_else(|| {
            AnalystError::Execution(format!("Table not found: {}", table_name))
        })?;

        let columns = frame
            .get_columns()
            .iter()
            .map(|s| ColumnInfo {
                name: s.name().to_string(),
                data_type: s.dtype().to_string(),
            })
            .collect();

        Ok(DatasetSchema::new(table_name, frame.height(), columns)
            .with_summary(format!("Dataset {} loaded into the analytic engine", table_name)))
    }

    async fn run_sql(&self, sql: &str) -> Result<Vec<Row>> {
        let tables = self.snapshot()?;
        let sql = sql.trim().trim_end_matches(';').to_string();
        info!(engine = "polars", "Executing query: {}", sql);

        let frame = tokio::task::spawn_blocking(move || run_on_snapshot(tables, &sql))
            .await
            .map_err(|e| AnalystError::Execution(format!("Query task failed: {}", e)))?
            .map_err(|e| AnalystError::Execution(format!("Database error: {}", e)))?;

        frame_to_rows(&frame)
    }
}
