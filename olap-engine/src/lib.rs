//! # OLAP Engine
//!
//! Cell resolution and tabular queries over a multidimensional store:
//! - Hierarchy resolution with cycle rejection at edge insertion
//! - Per-cube rule lists (first match wins) evaluated ahead of storage
//! - Weighted consolidation across any number of dimensions at once
//! - Streaming view queries over coordinate cross products
//! - Named processes run under a cancellation token
//!
//! `Server` is the entry point; the other modules are its parts.

pub mod hierarchy;
pub mod odometer;
pub mod process;
pub mod resolver;
pub mod rules;
pub mod server;
pub mod view;

pub use hierarchy::HierarchyResolver;
pub use process::{Process, ProcessRunner};
pub use resolver::CellResolver;
pub use rules::{CellRef, CoordinatePattern, DeclarativeRule, EvalContext, Expr, Matcher, Rule, RuleEngine};
pub use server::Server;
pub use view::{QueryEngine, Row, Rows, View};

pub use olap_common::{Error, Result};
pub use tokio_util::sync::CancellationToken;
