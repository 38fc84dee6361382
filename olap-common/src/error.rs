//! Common error types for the OLAP engine

use std::fmt;
use thiserror::Error;

/// Common result type for OLAP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Entity named by a `NotFound` or `AlreadyExists` error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Cube,
    Dimension,
    Element,
    Component,
    Cell,
    Process,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Cube => "cube",
            EntityKind::Dimension => "dimension",
            EntityKind::Element => "element",
            EntityKind::Component => "component",
            EntityKind::Cell => "cell",
            EntityKind::Process => "process",
        };
        f.write_str(name)
    }
}

/// Error taxonomy shared by the storage backends and the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Lookup of a named entity failed
    #[error("{0} not found: {1}")]
    NotFound(EntityKind, String),

    /// Creation of an entity whose key is already taken
    #[error("{0} already exists: {1}")]
    AlreadyExists(EntityKind, String),

    /// Linking `parent -> child` would make an element its own ancestor
    #[error("cycle detected in dimension {dimension}: {child} is an ancestor of {parent}")]
    CycleDetected {
        dimension: String,
        parent: String,
        child: String,
    },

    /// A coordinate was revisited within one resolution chain
    #[error("rule cycle in cube {cube} at {coordinate:?}")]
    RuleCycle {
        cube: String,
        coordinate: Vec<String>,
    },

    /// Direct write to a coordinate containing a consolidated element
    #[error("cannot write consolidated coordinate {coordinate:?} in cube {cube}")]
    ConsolidatedWrite {
        cube: String,
        coordinate: Vec<String>,
    },

    /// The caller's cancellation token fired mid-operation
    #[error("operation cancelled")]
    Cancelled,

    /// Wrong arity or unusable element for the cube's dimensions
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Malformed cube, element, view or rule definition
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// Resolution nested deeper than the configured ceiling
    #[error("resolution depth exceeded limit of {0}")]
    DepthExceeded(usize),

    /// A process body returned an error
    #[error("process {name} failed: {message}")]
    Process { name: String, message: String },

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON encoding of attributes or coordinates
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn not_found(kind: EntityKind, key: impl Into<String>) -> Self {
        Error::NotFound(kind, key.into())
    }

    pub fn already_exists(kind: EntityKind, key: impl Into<String>) -> Self {
        Error::AlreadyExists(kind, key.into())
    }

    /// True when this is a `NotFound` for the given entity kind
    pub fn is_not_found(&self, kind: EntityKind) -> bool {
        matches!(self, Error::NotFound(k, _) if *k == kind)
    }

    pub fn is_already_exists(&self, kind: EntityKind) -> bool {
        matches!(self, Error::AlreadyExists(k, _) if *k == kind)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
