//! Visualization - Chart spec inference
//!
//! Deterministic rules first (no rows, KPI rows, sentinel rows), then the
//! model, then a type-driven bar chart fallback. Always yields a spec.

use crate::agent_prompts::viz_prompt;
use crate::dataset::{rows_to_json, CellValue, Row};
use crate::extraction::{extract_json_object, JsonShape};
use crate::llm::{ChatMessage, ChatProvider};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{info, warn};

pub const NO_DATA_MARKER: &str = "NO_DATA";
pub const FALLBACK_TITLE: &str = "Data Analysis";
pub const VIZ_SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartType {
    Bar,
    Line,
    Scatter,
    Pie,
    Histogram,
    BoxPlot,
    None,
    /// Anything outside the allowed set, kept as the model wrote it
    Other(String),
}

impl ChartType {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "bar" => ChartType::Bar,
            "line" => ChartType::Line,
            "scatter" => ChartType::Scatter,
            "pie" => ChartType::Pie,
            "histogram" => ChartType::Histogram,
            "box" => ChartType::BoxPlot,
            "none" => ChartType::None,
            other => ChartType::Other(other.to_string()),
        }
    }
}

/// Chart specification as a JSON object that always carries `chart_type`.
/// Model output is kept verbatim, typed accessors read the known keys.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec(Map<String, Value>);

impl ChartSpec {
    pub fn none() -> Self {
        let mut map = Map::new();
        map.insert("chart_type".to_string(), Value::from("none"));
        ChartSpec(map)
    }

    pub fn bar(x_column: &str, y_column: &str, title: &str) -> Self {
        let mut map = Map::new();
        map.insert("chart_type".to_string(), Value::from("bar"));
        map.insert("x_column".to_string(), Value::from(x_column));
        map.insert("y_column".to_string(), Value::from(y_column));
        map.insert("title".to_string(), Value::from(title));
        ChartSpec(map)
    }

    /// Accept any object that has a `chart_type` key
    pub fn from_object(map: Map<String, Value>) -> Option<Self> {
        map.contains_key("chart_type").then_some(ChartSpec(map))
    }

    pub fn chart_type(&self) -> ChartType {
        match self.0.get("chart_type") {
            Some(Value::String(s)) => ChartType::parse(s),
            Some(Value::Null) | None => ChartType::None,
            Some(other) => ChartType::Other(other.to_string()),
        }
    }

    pub fn is_none(&self) -> bool {
        self.chart_type() == ChartType::None
    }

    pub fn x_column(&self) -> Option<&str> {
        self.0.get("x_column").and_then(|v| v.as_str())
    }

    pub fn y_column(&self) -> Option<&str> {
        self.0.get("y_column").and_then(|v| v.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(|v| v.as_str())
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl Default for ChartSpec {
    fn default() -> Self {
        Self::none()
    }
}

impl Serialize for ChartSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChartSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        ChartSpec::from_object(map).ok_or_else(|| D::Error::missing_field("chart_type"))
    }
}

pub fn chart_spec_shape() -> JsonShape {
    JsonShape::new(&["chart_type", "x_column", "y_column", "title"], "chart_type")
}

/// Rules that decide without asking the model
pub fn early_decision(rows: &[Row]) -> Option<ChartSpec> {
    let first = match rows.first() {
        None => return Some(ChartSpec::none()),
        Some(first) => first,
    };

    // Single rows are KPIs, never charted
    if rows.len() == 1 {
        info!("Single-row result treated as KPIs, skipping chart");
        return Some(ChartSpec::none());
    }

    if first.values().any(|v| v.to_string().contains(NO_DATA_MARKER)) {
        return Some(ChartSpec::none());
    }

    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Textual,
    Numeric,
    Other,
}

fn column_kind(rows: &[Row], column: &str) -> ColumnKind {
    let values: Vec<&CellValue> = rows
        .iter()
        .filter_map(|row| row.get(column))
        .filter(|v| !v.is_null())
        .collect();

    if values.iter().any(|v| v.is_textual()) {
        ColumnKind::Textual
    } else if !values.is_empty() && values.iter().all(|v| v.is_numeric()) {
        ColumnKind::Numeric
    } else {
        ColumnKind::Other
    }
}

/// Bar chart of the first textual column against the first numeric one,
/// inferred over the leading sample rows
pub fn fallback_chart_spec(rows: &[Row]) -> ChartSpec {
    let first = match rows.first() {
        Some(first) => first,
        None => return ChartSpec::none(),
    };

    let columns: Vec<&str> = first.columns().collect();
    if columns.len() < 2 {
        return ChartSpec::none();
    }

    let sample = &rows[..rows.len().min(VIZ_SAMPLE_ROWS)];
    let x_column = columns
        .iter()
        .find(|c| column_kind(sample, c) == ColumnKind::Textual)
        .unwrap_or(&columns[0]);
    let y_column = columns
        .iter()
        .find(|c| column_kind(sample, c) == ColumnKind::Numeric)
        .unwrap_or(&columns[1]);

    ChartSpec::bar(x_column, y_column, FALLBACK_TITLE)
}

pub async fn infer_chart_spec(provider: &dyn ChatProvider, rows: &[Row], question: &str) -> ChartSpec {
    if let Some(spec) = early_decision(rows) {
        return spec;
    }

    let sample = rows_to_json(&rows[..rows.len().min(VIZ_SAMPLE_ROWS)]);
    let prompt = viz_prompt(question, &sample);

    match provider.complete(&[ChatMessage::system(prompt)], 0.0).await {
        Ok(text) => {
            if let Some(spec) = extract_json_object(&text, &chart_spec_shape()).and_then(ChartSpec::from_object) {
                return spec;
            }
            warn!("No chart spec found in model output, using fallback");
        }
        Err(e) => warn!("Chart spec generation failed, using fallback: {}", e),
    }

    fallback_chart_spec(rows)
}
