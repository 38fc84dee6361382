//! # OLAP Common Library
//!
//! Shared code for the OLAP engine crates including:
//! - Data model (cubes, dimensions, elements, components, cells)
//! - Error taxonomy
//! - Configuration loading and tracing bootstrap
//! - Event types and EventBus
//! - The `Storage` collaborator contract with in-memory and SQLite backends

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod storage;

pub use error::{EntityKind, Error, Result};
pub use model::{Attributes, Cell, Component, Coordinate, Cube, Dimension, Element};
pub use storage::{MemoryStore, Storage};
