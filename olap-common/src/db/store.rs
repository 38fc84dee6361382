//! `Storage` implementation over a SQLite pool

use super::init::{init_database, init_memory_database};
use crate::error::{EntityKind, Error};
use crate::model::{element_key, Attributes, Cell, Component, Cube, Dimension, Element};
use crate::storage::Storage;
use crate::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::debug;

type ElementRow = (String, String, f64, String);

/// Storage backend persisting metadata and cells in SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create a database file
    pub async fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::from_pool(init_database(db_path).await?))
    }

    /// Non-persistent database, mostly for tests
    pub async fn in_memory() -> Result<Self> {
        Ok(Self::from_pool(init_memory_database().await?))
    }

    /// Wrap an existing pool; the schema must already exist
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn element_exists(&self, dimension: &str, name: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM elements WHERE dimension = ? AND name = ?")
                .bind(dimension)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn ensure_element(&self, dimension: &str, name: &str) -> Result<()> {
        if self.element_exists(dimension, name).await? {
            Ok(())
        } else {
            Err(Error::not_found(
                EntityKind::Element,
                element_key(dimension, name),
            ))
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn decode_attributes(text: &str) -> Result<Attributes> {
    Ok(serde_json::from_str(text)?)
}

fn element_from_row((name, dimension, weight, attributes): ElementRow) -> Result<Element> {
    Ok(Element {
        name,
        dimension,
        weight,
        attributes: decode_attributes(&attributes)?,
    })
}

#[async_trait]
impl Storage for SqliteStore {
    async fn add_cube(&self, cube: Cube) -> Result<()> {
        let taken: Option<i64> = sqlx::query_scalar("SELECT 1 FROM cubes WHERE name = ?")
            .bind(&cube.name)
            .fetch_optional(&self.pool)
            .await?;
        if taken.is_some() {
            return Err(Error::already_exists(EntityKind::Cube, cube.name));
        }
        for dimension in &cube.dimensions {
            self.get_dimension(dimension).await?;
        }

        let result = sqlx::query("INSERT INTO cubes (name, dimensions, attributes) VALUES (?, ?, ?)")
            .bind(&cube.name)
            .bind(serde_json::to_string(&cube.dimensions)?)
            .bind(serde_json::to_string(&cube.attributes)?)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(Error::already_exists(EntityKind::Cube, cube.name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_cube(&self, name: &str) -> Result<Cube> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT name, dimensions, attributes FROM cubes WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        let (name, dimensions, attributes) =
            row.ok_or_else(|| Error::not_found(EntityKind::Cube, name))?;
        Ok(Cube {
            name,
            dimensions: serde_json::from_str(&dimensions)?,
            attributes: decode_attributes(&attributes)?,
        })
    }

    async fn add_dimension(&self, dimension: Dimension) -> Result<()> {
        let result = sqlx::query("INSERT INTO dimensions (name, attributes) VALUES (?, ?)")
            .bind(&dimension.name)
            .bind(serde_json::to_string(&dimension.attributes)?)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::already_exists(
                EntityKind::Dimension,
                dimension.name,
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_dimension(&self, name: &str) -> Result<Dimension> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT name, attributes FROM dimensions WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        let (name, attributes) =
            row.ok_or_else(|| Error::not_found(EntityKind::Dimension, name))?;
        Ok(Dimension {
            name,
            attributes: decode_attributes(&attributes)?,
        })
    }

    async fn add_element(&self, element: Element) -> Result<()> {
        self.get_dimension(&element.dimension).await?;
        let result = sqlx::query(
            "INSERT INTO elements (dimension, name, weight, attributes) VALUES (?, ?, ?, ?)",
        )
        .bind(&element.dimension)
        .bind(&element.name)
        .bind(element.weight)
        .bind(serde_json::to_string(&element.attributes)?)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(Error::already_exists(EntityKind::Element, element.key()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_element(&self, dimension: &str, name: &str) -> Result<Element> {
        let row: Option<ElementRow> = sqlx::query_as(
            "SELECT name, dimension, weight, attributes FROM elements WHERE dimension = ? AND name = ?",
        )
        .bind(dimension)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => element_from_row(row),
            None => Err(Error::not_found(
                EntityKind::Element,
                element_key(dimension, name),
            )),
        }
    }

    async fn elements(&self, dimension: &str) -> Result<Vec<Element>> {
        self.get_dimension(dimension).await?;
        let rows: Vec<ElementRow> = sqlx::query_as(
            "SELECT name, dimension, weight, attributes FROM elements WHERE dimension = ? ORDER BY seq",
        )
        .bind(dimension)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(element_from_row).collect()
    }

    async fn add_component(&self, component: Component) -> Result<()> {
        self.ensure_element(&component.dimension, &component.parent)
            .await?;
        self.ensure_element(&component.dimension, &component.child)
            .await?;

        let result =
            sqlx::query("INSERT INTO components (dimension, parent, child) VALUES (?, ?, ?)")
                .bind(&component.dimension)
                .bind(&component.parent)
                .bind(&component.child)
                .execute(&self.pool)
                .await;
        match result {
            Ok(_) => {
                debug!("Stored component {}", component.key());
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                Err(Error::already_exists(EntityKind::Component, component.key()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_component(
        &self,
        dimension: &str,
        parent: &str,
        child: &str,
    ) -> Result<Component> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM components WHERE dimension = ? AND parent = ? AND child = ?",
        )
        .bind(dimension)
        .bind(parent)
        .bind(child)
        .fetch_optional(&self.pool)
        .await?;
        let component = Component::new(dimension, parent, child);
        match found {
            Some(_) => Ok(component),
            None => Err(Error::not_found(EntityKind::Component, component.key())),
        }
    }

    async fn children(&self, dimension: &str, parent: &str) -> Result<Vec<Element>> {
        self.ensure_element(dimension, parent).await?;
        let rows: Vec<ElementRow> = sqlx::query_as(
            r#"
            SELECT e.name, e.dimension, e.weight, e.attributes
            FROM components c
            JOIN elements e ON e.dimension = c.dimension AND e.name = c.child
            WHERE c.dimension = ? AND c.parent = ?
            ORDER BY c.seq
            "#,
        )
        .bind(dimension)
        .bind(parent)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(element_from_row).collect()
    }

    async fn add_cell(&self, cell: Cell) -> Result<()> {
        self.get_cube(&cell.cube).await?;
        sqlx::query(
            r#"
            INSERT INTO cells (cube, coordinate, value) VALUES (?, ?, ?)
            ON CONFLICT (cube, coordinate) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(&cell.cube)
        .bind(serde_json::to_string(&cell.coordinate)?)
        .bind(cell.value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_cell(&self, cube: &str, coordinate: &[String]) -> Result<Cell> {
        let value: Option<f64> =
            sqlx::query_scalar("SELECT value FROM cells WHERE cube = ? AND coordinate = ?")
                .bind(cube)
                .bind(serde_json::to_string(coordinate)?)
                .fetch_optional(&self.pool)
                .await?;
        value
            .map(|value| Cell::new(cube, coordinate.to_vec(), value))
            .ok_or_else(|| {
                Error::not_found(EntityKind::Cell, format!("{}{:?}", cube, coordinate))
            })
    }
}
