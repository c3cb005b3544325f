use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::models::{Entry, EntryFilter, NewEntry, QueryResult};
use crate::database::queries::EntryQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// CREATE statement shown to the model as table info. Kept in sync with the
/// migration by the schema test.
pub const TABLE_SCHEMA: &str = "CREATE TABLE physio_table (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    Datetime TEXT NOT NULL,
    Count INTEGER NOT NULL,
    Physio_Type TEXT NOT NULL
)";

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    // Record operations

    #[inline]
    pub async fn insert_entry(&self, entry: NewEntry) -> Result<Entry> {
        EntryQueries::create(&self.pool, entry).await
    }

    #[inline]
    pub async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<Entry>> {
        EntryQueries::list_filtered(&self.pool, filter).await
    }

    #[inline]
    pub async fn delete_entries(&self, filter: &EntryFilter) -> Result<u64> {
        EntryQueries::delete_filtered(&self.pool, filter).await
    }

    #[inline]
    pub async fn delete_all_entries(&self) -> Result<u64> {
        EntryQueries::delete_all(&self.pool).await
    }

    #[inline]
    pub async fn entry_count(&self) -> Result<i64> {
        EntryQueries::count(&self.pool).await
    }

    /// Read path used by the agent pipeline.
    #[inline]
    pub async fn execute_select(&self, sql: &str) -> Result<QueryResult, crate::PhysioError> {
        queries::execute_select(&self.pool, sql).await
    }
}
