use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// One recorded exercise set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Entry {
    #[sqlx(rename = "ID")]
    pub id: i64,
    #[sqlx(rename = "Datetime")]
    pub datetime: NaiveDateTime,
    #[sqlx(rename = "Count")]
    pub count: i64,
    #[sqlx(rename = "Physio_Type")]
    pub physio_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub datetime: NaiveDateTime,
    pub count: i64,
    pub physio_type: String,
}

/// Filter shared by the history and delete paths. All fields optional;
/// an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub physio_type: Option<String>,
    pub id: Option<i64>,
}

impl EntryFilter {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.physio_type.is_none() && self.id.is_none()
    }
}

/// A single SQLite value from a dynamically typed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Real(f64),
    Null,
}

impl fmt::Display for Scalar {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Scalar::Text(ref s) => write!(f, "{}", s),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Real(x) => write!(f, "{}", x),
            Scalar::Null => Ok(()),
        }
    }
}

/// Tabular result of an agent-issued SELECT. Column order and row order are
/// preserved exactly as the store returned them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl QueryResult {
    /// Compact text form for the agent scratchpad and the visualization
    /// stage input. Every row is included, untruncated.
    #[inline]
    pub fn to_display_string(&self) -> String {
        let mut out = self.columns.join(" | ");
        for row in &self.rows {
            out.push('\n');
            let mut first = true;
            for cell in row {
                if !first {
                    out.push_str(" | ");
                }
                first = false;
                out.push_str(&cell.to_string());
            }
        }
        out
    }

    /// Columns rendered as a bracketed list, e.g. `[date, total_exercises]`.
    #[inline]
    pub fn columns_display(&self) -> String {
        format!("[{}]", self.columns.join(", "))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
