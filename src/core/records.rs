use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::error::{FireError, FireResult};

/// One cell of a row record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Integer(i64),
    Text(String),
    Flag(bool),
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<u32> for CellValue {
    fn from(value: u32) -> Self {
        CellValue::Integer(i64::from(value))
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<usize> for CellValue {
    fn from(value: usize) -> Self {
        CellValue::Integer(value as i64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Flag(value)
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

/// Flat keyed record that keeps its columns in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRecord {
    cells: Vec<(String, CellValue)>,
}

impl RowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<CellValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Replaces the value if the key exists, appends otherwise.
    pub fn set(&mut self, key: &str, value: impl Into<CellValue>) {
        let value = value.into();
        match self.cells.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.cells.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            CellValue::Number(v) => Some(*v),
            CellValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for RowRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (key, value) in &self.cells {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Ordered union of the keys of every row.
pub fn column_names(rows: &[RowRecord]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.to_string());
            }
        }
    }
    names
}

/// Turns row records into a concrete tabular representation.
pub trait TableRenderer: Send + Sync {
    fn name(&self) -> &str;
    fn render(&self, rows: &[RowRecord]) -> FireResult<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTableRenderer {
    pub pretty: bool,
}

impl TableRenderer for JsonTableRenderer {
    fn name(&self) -> &str {
        "json"
    }

    fn render(&self, rows: &[RowRecord]) -> FireResult<String> {
        let out = if self.pretty {
            serde_json::to_string_pretty(rows)
        } else {
            serde_json::to_string(rows)
        };
        out.map_err(|e| FireError::invalid("rows", e.to_string()))
    }
}

pub fn render_rows(rows: &[RowRecord], renderer: Option<&dyn TableRenderer>) -> FireResult<String> {
    let renderer = renderer.ok_or_else(|| {
        FireError::RendererUnavailable("no table renderer configured".to_string())
    })?;
    renderer.render(rows)
}
