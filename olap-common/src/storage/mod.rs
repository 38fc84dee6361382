//! Metadata and cell store contract
//!
//! Backends enforce existence and uniqueness of cubes, dimensions, elements
//! and component edges. They do not check hierarchies for cycles; that is
//! the hierarchy resolver's job, done under its per-dimension lock.

use crate::model::{Cell, Component, Cube, Dimension, Element};
use crate::Result;
use async_trait::async_trait;

mod memory;

pub use memory::MemoryStore;

#[cfg(feature = "sqlx")]
pub use crate::db::SqliteStore;

/// Backing store for metadata definitions and stored leaf cells
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fails with `AlreadyExists(Cube)` on a duplicate name and
    /// `NotFound(Dimension)` when a referenced dimension is missing
    async fn add_cube(&self, cube: Cube) -> Result<()>;
    async fn get_cube(&self, name: &str) -> Result<Cube>;

    async fn add_dimension(&self, dimension: Dimension) -> Result<()>;
    async fn get_dimension(&self, name: &str) -> Result<Dimension>;

    /// Fails with `NotFound(Dimension)` if the element's dimension is missing
    async fn add_element(&self, element: Element) -> Result<()>;
    async fn get_element(&self, dimension: &str, name: &str) -> Result<Element>;
    /// All elements of a dimension, in insertion order
    async fn elements(&self, dimension: &str) -> Result<Vec<Element>>;

    /// Links `parent -> child`; duplicate edges fail with `AlreadyExists(Component)`
    async fn add_component(&self, component: Component) -> Result<()>;
    async fn get_component(&self, dimension: &str, parent: &str, child: &str)
        -> Result<Component>;
    /// Direct children of an element in edge insertion order; empty for a leaf
    async fn children(&self, dimension: &str, parent: &str) -> Result<Vec<Element>>;

    /// Upsert of a stored cell value
    async fn add_cell(&self, cell: Cell) -> Result<()>;
    /// Fails with `NotFound(Cell)` when nothing is stored at the coordinate
    async fn get_cell(&self, cube: &str, coordinate: &[String]) -> Result<Cell>;
}
