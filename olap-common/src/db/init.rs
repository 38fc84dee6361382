//! Database initialization
//!
//! Schema creation is idempotent; opening an existing database re-runs the
//! `CREATE TABLE IF NOT EXISTS` statements and leaves data untouched.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) a database file and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Private in-memory database
///
/// Every SQLite `:memory:` connection is its own database, so the pool is
/// pinned to a single connection that is never recycled.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_dimensions_table(pool).await?;
    create_elements_table(pool).await?;
    create_components_table(pool).await?;
    create_cubes_table(pool).await?;
    create_cells_table(pool).await?;
    Ok(())
}

async fn create_dimensions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dimensions (
            name TEXT PRIMARY KEY,
            attributes TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_elements_table(pool: &SqlitePool) -> Result<()> {
    // seq preserves insertion order for "all elements" selections
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS elements (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            dimension TEXT NOT NULL REFERENCES dimensions(name),
            name TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 1.0,
            attributes TEXT NOT NULL DEFAULT '{}',
            UNIQUE (dimension, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_components_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS components (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            dimension TEXT NOT NULL,
            parent TEXT NOT NULL,
            child TEXT NOT NULL,
            UNIQUE (dimension, parent, child),
            FOREIGN KEY (dimension, parent) REFERENCES elements(dimension, name),
            FOREIGN KEY (dimension, child) REFERENCES elements(dimension, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_components_parent ON components(dimension, parent)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_cubes_table(pool: &SqlitePool) -> Result<()> {
    // dimensions: JSON array of dimension names in coordinate order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cubes (
            name TEXT PRIMARY KEY,
            dimensions TEXT NOT NULL,
            attributes TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_cells_table(pool: &SqlitePool) -> Result<()> {
    // coordinate: JSON array of element names
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cells (
            cube TEXT NOT NULL REFERENCES cubes(name),
            coordinate TEXT NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY (cube, coordinate)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
