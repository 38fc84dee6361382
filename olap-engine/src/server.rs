//! Server facade
//!
//! Validates metadata definitions, routes single-cell reads and writes to
//! the cell resolver, views to the query engine, and processes to the
//! runner. All failures come back as typed errors.

use crate::hierarchy::HierarchyResolver;
use crate::process::{process_error, Process, ProcessRunner};
use crate::resolver::CellResolver;
use crate::rules::{Rule, RuleEngine};
use crate::view::{QueryEngine, Rows, View};
use chrono::Utc;
use olap_common::config::{EngineConfig, StorageBackend};
use olap_common::events::{EventBus, OlapEvent};
use olap_common::model::{Cell, Component, Cube, Dimension, Element};
use olap_common::{Error, MemoryStore, Result, Storage};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub struct Server {
    store: Arc<dyn Storage>,
    hierarchy: Arc<HierarchyResolver>,
    rules: Arc<RuleEngine>,
    resolver: Arc<CellResolver>,
    queries: QueryEngine,
    processes: ProcessRunner,
    events: EventBus,
}

fn owned<S: AsRef<str>>(parts: &[S]) -> Vec<String> {
    parts.iter().map(|s| s.as_ref().to_string()).collect()
}

impl Server {
    /// Fails with `Config` when the configuration does not validate
    pub fn new(store: Arc<dyn Storage>, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let events = EventBus::new(config.event_capacity)?;
        Ok(Self::assemble(store, config.max_resolution_depth, events))
    }

    /// Server over a fresh `MemoryStore` with default settings
    pub fn in_memory() -> Self {
        Self::assemble(
            Arc::new(MemoryStore::new()),
            EngineConfig::default().max_resolution_depth,
            EventBus::default(),
        )
    }

    /// Build the storage backend named by the configuration
    pub async fn open(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn Storage> = match config.storage {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Sqlite => {
                let path = config.database_path.as_deref().ok_or_else(|| {
                    Error::Config("database_path is required for sqlite storage".to_string())
                })?;
                Arc::new(olap_common::db::SqliteStore::open(path).await?)
            }
        };
        info!("Server opened with {:?} storage", config.storage);
        Self::new(store, config)
    }

    fn assemble(store: Arc<dyn Storage>, max_depth: usize, events: EventBus) -> Self {
        let hierarchy = Arc::new(HierarchyResolver::new(store.clone()));
        let rules = Arc::new(RuleEngine::new());
        let resolver = Arc::new(CellResolver::new(
            store.clone(),
            hierarchy.clone(),
            rules.clone(),
            max_depth,
        ));
        let queries = QueryEngine::new(store.clone(), resolver.clone());
        Self {
            store,
            hierarchy,
            rules,
            resolver,
            queries,
            processes: ProcessRunner::new(),
            events,
        }
    }

    pub fn hierarchy(&self) -> &HierarchyResolver {
        &self.hierarchy
    }

    pub fn rule_engine(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn resolver(&self) -> &Arc<CellResolver> {
        &self.resolver
    }

    pub fn processes(&self) -> &ProcessRunner {
        &self.processes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OlapEvent> {
        self.events.subscribe()
    }

    // ========================================
    // Metadata
    // ========================================

    pub async fn add_dimension(&self, dimension: Dimension) -> Result<()> {
        let name = dimension.name.clone();
        self.store.add_dimension(dimension).await?;
        info!("Added dimension {}", name);
        Ok(())
    }

    pub async fn get_dimension(&self, name: &str) -> Result<Dimension> {
        self.store.get_dimension(name).await
    }

    /// Fails with `InvalidDefinition` on a non-finite weight
    pub async fn add_element(&self, element: Element) -> Result<()> {
        if !element.weight.is_finite() {
            return Err(Error::InvalidDefinition(format!(
                "element {} has non-finite weight {}",
                element.key(),
                element.weight
            )));
        }
        self.store.add_element(element).await
    }

    pub async fn get_element(&self, dimension: &str, name: &str) -> Result<Element> {
        self.store.get_element(dimension, name).await
    }

    pub async fn elements(&self, dimension: &str) -> Result<Vec<Element>> {
        self.store.elements(dimension).await
    }

    /// Fails with `InvalidDefinition` for an empty or repeating dimension list
    pub async fn add_cube(&self, cube: Cube) -> Result<()> {
        if cube.dimensions.is_empty() {
            return Err(Error::InvalidDefinition(format!(
                "cube {} has no dimensions",
                cube.name
            )));
        }
        let mut seen = HashSet::new();
        if let Some(repeated) = cube.dimensions.iter().find(|d| !seen.insert(d.as_str())) {
            return Err(Error::InvalidDefinition(format!(
                "cube {} lists dimension {} more than once",
                cube.name, repeated
            )));
        }

        let (name, dimensions) = (cube.name.clone(), cube.dimensions.clone());
        self.store.add_cube(cube).await?;
        info!("Added cube {} over {:?}", name, dimensions);
        self.events.emit_lossy(OlapEvent::CubeCreated {
            cube: name,
            dimensions,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn get_cube(&self, name: &str) -> Result<Cube> {
        self.store.get_cube(name).await
    }

    /// Link `parent -> child`, rejecting cycles and duplicate edges
    pub async fn add_component(&self, component: Component) -> Result<()> {
        self.hierarchy.add_component(component.clone()).await?;
        self.events.emit_lossy(OlapEvent::ComponentAdded {
            dimension: component.dimension,
            parent: component.parent,
            child: component.child,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn get_component(
        &self,
        dimension: &str,
        parent: &str,
        child: &str,
    ) -> Result<Component> {
        self.store.get_component(dimension, parent, child).await
    }

    pub async fn children(&self, dimension: &str, element: &str) -> Result<Vec<Element>> {
        self.hierarchy.children(dimension, element).await
    }

    // ========================================
    // Cells
    // ========================================

    /// Resolve one cell
    pub async fn get<S: AsRef<str>>(
        &self,
        cancel: &CancellationToken,
        cube: &str,
        coordinate: &[S],
    ) -> Result<f64> {
        self.resolver.get(cancel, cube, &owned(coordinate)).await
    }

    /// Write one leaf cell (upsert)
    pub async fn put<S: AsRef<str>>(
        &self,
        cancel: &CancellationToken,
        value: f64,
        cube: &str,
        coordinate: &[S],
    ) -> Result<()> {
        let coordinate = owned(coordinate);
        self.resolver.put(cancel, value, cube, &coordinate).await?;
        self.events.emit_lossy(OlapEvent::CellWritten {
            cube: cube.to_string(),
            coordinate,
            value,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Same validation as `put`
    pub async fn add_cell(&self, cell: Cell) -> Result<()> {
        self.put(&CancellationToken::new(), cell.value, &cell.cube, &cell.coordinate)
            .await
    }

    /// Stored cell only; `NotFound(Cell)` when nothing was written
    pub async fn get_cell<S: AsRef<str>>(&self, cube: &str, coordinate: &[S]) -> Result<Cell> {
        self.store.get_cell(cube, &owned(coordinate)).await
    }

    // ========================================
    // Views
    // ========================================

    pub async fn new_view<I, J, S>(
        &self,
        cancel: &CancellationToken,
        cube: &str,
        slices: I,
    ) -> Result<View>
    where
        I: IntoIterator<Item = J>,
        J: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slices = slices
            .into_iter()
            .map(|slice| slice.into_iter().map(Into::into).collect())
            .collect();
        self.queries.new_view(cancel, cube, slices).await
    }

    pub async fn query(&self, cancel: &CancellationToken, view: &View) -> Result<Rows> {
        self.queries.query(cancel, view).await
    }

    // ========================================
    // Rules
    // ========================================

    /// Append rules to a cube's list
    pub async fn add_rules<I, R>(&self, cube: &str, rules: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<Arc<dyn Rule>>,
    {
        self.store.get_cube(cube).await?;
        let count = self
            .rules
            .add_rules(cube, rules.into_iter().map(Into::into).collect());
        self.rules_replaced(cube, count);
        Ok(())
    }

    /// Replace a cube's whole rule list
    pub async fn set_rules<I, R>(&self, cube: &str, rules: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<Arc<dyn Rule>>,
    {
        self.store.get_cube(cube).await?;
        let count = self
            .rules
            .set_rules(cube, rules.into_iter().map(Into::into).collect());
        self.rules_replaced(cube, count);
        Ok(())
    }

    fn rules_replaced(&self, cube: &str, rule_count: usize) {
        info!("Cube {} now has {} rules", cube, rule_count);
        self.events.emit_lossy(OlapEvent::RulesReplaced {
            cube: cube.to_string(),
            rule_count,
            timestamp: Utc::now(),
        });
    }

    // ========================================
    // Processes
    // ========================================

    pub fn add_process<P: Process + 'static>(&self, process: P) -> Result<()> {
        let name = process.name().to_string();
        self.processes.add(Arc::new(process))?;
        info!("Registered process {}", name);
        Ok(())
    }

    /// Run a process to completion or until `cancel` fires
    pub async fn execute_process(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let process = self.processes.get(name)?;
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!("Starting process {} ({})", name, run_id);
        self.events.emit_lossy(OlapEvent::ProcessStarted {
            name: name.to_string(),
            run_id,
            timestamp: Utc::now(),
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = process.run(self, cancel.child_token()) => {
                result.map_err(|e| process_error(name, e))
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(()) => info!("Process {} finished in {} ms", name, elapsed_ms),
            Err(e) => warn!("Process {} failed after {} ms: {}", name, elapsed_ms, e),
        }
        self.events.emit_lossy(OlapEvent::ProcessFinished {
            name: name.to_string(),
            run_id,
            success: outcome.is_ok(),
            elapsed_ms,
            timestamp: Utc::now(),
        });
        outcome
    }
}
