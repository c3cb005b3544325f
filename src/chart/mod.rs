
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PhysioError, Result};

/// Dates are rendered month-first, matching the negotiation prompt.
pub const CANONICAL_DATE_FORMAT: &str = "%m-%d-%Y";

/// Wire contract between the negotiation stage and the presentation layer.
/// Externally tagged: exactly one of `table`/`bar`/`line`/`answer` as the
/// single top-level key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartDescriptor {
    Table(ChartData),
    Bar(ChartData),
    Line(ChartData),
    Answer(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Value>>,
}

/// Validated, renderable form of a descriptor. The presentation layer
/// consumes this without re-checking shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartFrame {
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Plot {
        kind: PlotKind,
        x_label: String,
        x_values: Vec<String>,
        series: Vec<Series>,
    },
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotKind {
    Bar,
    Line,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

/// First balanced `{...}` block in `text`, tracking string literals and
/// escapes so braces inside JSON strings do not end the block early. The
/// model is not trusted to emit only JSON.
#[inline]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if start.is_none() {
                    start = Some(index);
                }
                depth += 1;
            }
            '}' => {
                if let Some(begin) = start {
                    depth -= 1;
                    if depth == 0 {
                        return text.get(begin..index + ch.len_utf8());
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse the first JSON block of a raw model reply into a descriptor.
#[inline]
pub fn parse_descriptor(raw: &str) -> Result<ChartDescriptor> {
    let block = extract_json_object(raw).ok_or_else(|| {
        PhysioError::MalformedResponse("No balanced JSON object found in model output".to_string())
    })?;

    serde_json::from_str(block)
        .map_err(|e| PhysioError::MalformedResponse(format!("Invalid chart JSON: {}", e)))
}

/// Accepts the canonical MM-DD-YYYY form verbatim, then DD-MM-YYYY, then
/// the store's own YYYY-MM-DD, converting the latter two. Returns None for
/// values that are not dates at all.
#[inline]
pub fn normalize_date(value: &str) -> Option<String> {
    if NaiveDate::parse_from_str(value, CANONICAL_DATE_FORMAT).is_ok() {
        return Some(value.to_string());
    }

    NaiveDate::parse_from_str(value, "%d-%m-%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
        .map(|date| date.format(CANONICAL_DATE_FORMAT).to_string())
}

impl ChartDescriptor {
    /// Shape-check and convert into a renderable frame.
    ///
    /// Every row must match the column count. The first column doubles as
    /// the x axis for bar/line charts: date-like values are normalized,
    /// anything else becomes a plain category label. Remaining bar/line
    /// cells must coerce to numbers. Tables pass cell values through as
    /// display text.
    #[inline]
    pub fn validate(self) -> Result<ChartFrame> {
        match self {
            ChartDescriptor::Answer(text) => Ok(ChartFrame::Text(text)),
            ChartDescriptor::Table(data) => {
                check_shape(&data)?;
                let rows = data
                    .data
                    .iter()
                    .map(|row| {
                        row.iter()
                            .enumerate()
                            .map(|(column, cell)| {
                                let text = display_cell(cell)?;
                                if column == 0 {
                                    Ok(normalize_date(&text).unwrap_or(text))
                                } else {
                                    Ok(text)
                                }
                            })
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ChartFrame::Table {
                    columns: data.columns,
                    rows,
                })
            }
            ChartDescriptor::Bar(data) => build_plot(PlotKind::Bar, data),
            ChartDescriptor::Line(data) => build_plot(PlotKind::Line, data),
        }
    }
}

fn check_shape(data: &ChartData) -> Result<()> {
    for (index, row) in data.data.iter().enumerate() {
        if row.len() != data.columns.len() {
            return Err(PhysioError::SchemaMismatch(format!(
                "Row {} has {} values but there are {} columns",
                index,
                row.len(),
                data.columns.len()
            )));
        }
    }
    Ok(())
}

fn build_plot(kind: PlotKind, data: ChartData) -> Result<ChartFrame> {
    check_shape(&data)?;

    if data.columns.len() < 2 {
        return Err(PhysioError::SchemaMismatch(
            "A chart needs an x-axis column and at least one value column".to_string(),
        ));
    }

    let mut x_values = Vec::with_capacity(data.data.len());
    for row in &data.data {
        let text = display_cell(&row[0])?;
        x_values.push(normalize_date(&text).unwrap_or(text));
    }

    let mut series = Vec::with_capacity(data.columns.len() - 1);
    for (column, name) in data.columns.iter().enumerate().skip(1) {
        let mut values = Vec::with_capacity(data.data.len());
        for (row_index, row) in data.data.iter().enumerate() {
            values.push(numeric_cell(&row[column]).ok_or_else(|| {
                PhysioError::SchemaMismatch(format!(
                    "Cell at row {} column '{}' is not numeric",
                    row_index, name
                ))
            })?);
        }
        series.push(Series {
            name: name.clone(),
            values,
        });
    }

    Ok(ChartFrame::Plot {
        kind,
        x_label: data.columns[0].clone(),
        x_values,
        series,
    })
}

fn display_cell(value: &Value) -> Result<String> {
    match *value {
        Value::String(ref s) => Ok(s.clone()),
        Value::Number(ref n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(PhysioError::SchemaMismatch(
            "Nested values are not allowed in chart data".to_string(),
        )),
    }
}

fn numeric_cell(value: &Value) -> Option<f64> {
    match *value {
        Value::Number(ref n) => n.as_f64(),
        Value::String(ref s) => s.trim().parse().ok(),
        _ => None,
    }
}
