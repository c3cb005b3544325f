use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Executor, QueryBuilder, Row, Sqlite, SqlitePool, Statement, TypeInfo, ValueRef};
use tracing::{debug, warn};

use crate::PhysioError;
use crate::database::models::{Entry, EntryFilter, NewEntry, QueryResult, Scalar};

/// Storage format for the Datetime column, sub-second precision included.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub struct EntryQueries;

impl EntryQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_entry: NewEntry) -> Result<Entry> {
        let datetime = new_entry.datetime.format(DATETIME_FORMAT).to_string();
        let id = sqlx::query(
            "INSERT INTO physio_table (Datetime, Count, Physio_Type) VALUES (?, ?, ?)",
        )
        .bind(datetime)
        .bind(new_entry.count)
        .bind(&new_entry.physio_type)
        .execute(pool)
        .await
        .context("Failed to insert entry")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created entry"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Entry>> {
        let result = sqlx::query_as::<_, Entry>(
            "SELECT ID, Datetime, Count, Physio_Type FROM physio_table WHERE ID = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get entry by id")?;

        Ok(result)
    }

    /// Filtered read, newest first.
    #[inline]
    pub async fn list_filtered(pool: &SqlitePool, filter: &EntryFilter) -> Result<Vec<Entry>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT ID, Datetime, Count, Physio_Type FROM physio_table WHERE 1=1",
        );
        Self::push_filter(&mut builder, filter);
        builder.push(" ORDER BY Datetime DESC");

        let entries = builder
            .build_query_as::<Entry>()
            .fetch_all(pool)
            .await
            .context("Failed to list entries")?;

        debug!("Listed {} entries", entries.len());
        Ok(entries)
    }

    /// Filtered delete. Refuses to run with an empty filter so a bare
    /// `delete` can never clear the whole table; use [`Self::delete_all`]
    /// for that.
    #[inline]
    pub async fn delete_filtered(pool: &SqlitePool, filter: &EntryFilter) -> Result<u64> {
        if filter.is_empty() {
            warn!("Refusing to delete entries without any filter");
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM physio_table WHERE 1=1");
        Self::push_filter(&mut builder, filter);

        let deleted = builder
            .build()
            .execute(pool)
            .await
            .context("Failed to delete entries")?
            .rows_affected();

        debug!("Deleted {} entries", deleted);
        Ok(deleted)
    }

    /// Clears the table and resets the AUTOINCREMENT sequence.
    #[inline]
    pub async fn delete_all(pool: &SqlitePool) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM physio_table")
            .execute(pool)
            .await
            .context("Failed to clear table")?
            .rows_affected();

        // sqlite_sequence only exists once an AUTOINCREMENT insert has
        // happened, so a failed reset on a fresh database is not an error.
        if let Err(e) = sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'physio_table'")
            .execute(pool)
            .await
        {
            debug!("Skipped autoincrement reset: {}", e);
        }

        debug!("Cleared table, {} entries removed", deleted);
        Ok(deleted)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM physio_table")
            .fetch_one(pool)
            .await
            .context("Failed to count entries")?;
        row.try_get(0).context("Failed to read entry count")
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &EntryFilter) {
        if let Some(start) = filter.start {
            builder
                .push(" AND Datetime >= ")
                .push_bind(start.format(DATETIME_FORMAT).to_string());
        }
        if let Some(end) = filter.end {
            builder
                .push(" AND Datetime <= ")
                .push_bind(end.format(DATETIME_FORMAT).to_string());
        }
        if let Some(ref physio_type) = filter.physio_type {
            builder
                .push(" AND Physio_Type = ")
                .push_bind(physio_type.clone());
        }
        if let Some(id) = filter.id {
            builder.push(" AND ID = ").push_bind(id);
        }
    }
}

/// True when the statement's first keyword is SELECT and it contains no
/// statement separator that could smuggle a second statement.
#[inline]
pub fn statement_is_select(sql: &str) -> bool {
    let trimmed = sql.trim();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed);
    if body.contains(';') {
        return false;
    }

    let starts_with_select = body
        .get(..6)
        .is_some_and(|kw| kw.eq_ignore_ascii_case("select"));
    let keyword_ends = body
        .chars()
        .nth(6)
        .is_none_or(|c| c.is_whitespace() || c == '*' || c == '(');

    starts_with_select && keyword_ends
}

/// Execute an agent-generated SELECT and return its full, dynamically typed
/// result set. Column names are taken from the prepared statement so an
/// empty result still carries its header.
#[inline]
pub async fn execute_select(pool: &SqlitePool, sql: &str) -> Result<QueryResult, PhysioError> {
    debug!("Executing agent query: {}", sql);

    let statement = pool
        .prepare(sql)
        .await
        .map_err(|e| PhysioError::Execution(e.to_string()))?;

    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let rows = statement
        .query()
        .fetch_all(pool)
        .await
        .map_err(|e| PhysioError::Execution(e.to_string()))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut cells = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            cells.push(decode_scalar(row, index)?);
        }
        out.push(cells);
    }

    debug!("Agent query returned {} rows", out.len());
    Ok(QueryResult { columns, rows: out })
}

fn decode_scalar(row: &SqliteRow, index: usize) -> Result<Scalar, PhysioError> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| PhysioError::Execution(e.to_string()))?;

    if raw.is_null() {
        return Ok(Scalar::Null);
    }

    let scalar = match raw.type_info().name() {
        "INTEGER" => Scalar::Int(
            row.try_get::<i64, _>(index)
                .map_err(|e| PhysioError::Execution(e.to_string()))?,
        ),
        "REAL" => Scalar::Real(
            row.try_get::<f64, _>(index)
                .map_err(|e| PhysioError::Execution(e.to_string()))?,
        ),
        _ => Scalar::Text(
            row.try_get::<String, _>(index)
                .map_err(|e| PhysioError::Execution(e.to_string()))?,
        ),
    };

    Ok(scalar)
}
