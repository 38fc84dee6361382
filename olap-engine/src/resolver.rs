//! Cell resolution
//!
//! For a coordinate, in order:
//! 1. validate arity and element existence (and learn each element's children)
//! 2. the cube's first matching rule, if any
//! 3. the stored cell when every element is a leaf (absent cell reads as 0)
//! 4. otherwise the weighted sum over the cross product of the children of
//!    every consolidated position, each child coordinate resolved recursively
//!
//! Every nested resolution, whether reached through consolidation or from a
//! rule reading another cell, runs on one `Chain` that records the
//! coordinates currently in flight. Revisiting one is a `RuleCycle`.

use crate::hierarchy::HierarchyResolver;
use crate::odometer::Odometer;
use crate::rules::{EvalContext, RuleEngine};
use futures::future::BoxFuture;
use olap_common::model::{Cell, Cube, Element};
use olap_common::{EntityKind, Error, Result, Storage};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Coordinates in flight for one top-level resolution
pub(crate) struct Chain {
    in_flight: HashSet<(String, Vec<String>)>,
    max_depth: usize,
    cancel: CancellationToken,
}

impl Chain {
    pub(crate) fn new(max_depth: usize, cancel: CancellationToken) -> Self {
        Self {
            in_flight: HashSet::new(),
            max_depth,
            cancel,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn enter(&mut self, cube: &str, coordinate: &[String]) -> Result<()> {
        if self.in_flight.len() >= self.max_depth {
            return Err(Error::DepthExceeded(self.max_depth));
        }
        if !self
            .in_flight
            .insert((cube.to_string(), coordinate.to_vec()))
        {
            warn!("Rule cycle at {}{:?}", cube, coordinate);
            return Err(Error::RuleCycle {
                cube: cube.to_string(),
                coordinate: coordinate.to_vec(),
            });
        }
        Ok(())
    }

    fn leave(&mut self, cube: &str, coordinate: &[String]) {
        self.in_flight
            .remove(&(cube.to_string(), coordinate.to_vec()));
    }
}

pub struct CellResolver {
    store: Arc<dyn Storage>,
    hierarchy: Arc<HierarchyResolver>,
    rules: Arc<RuleEngine>,
    max_depth: usize,
}

impl CellResolver {
    pub fn new(
        store: Arc<dyn Storage>,
        hierarchy: Arc<HierarchyResolver>,
        rules: Arc<RuleEngine>,
        max_depth: usize,
    ) -> Self {
        Self {
            store,
            hierarchy,
            rules,
            max_depth,
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    /// Resolve one cell of a named cube
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        cube: &str,
        coordinate: &[String],
    ) -> Result<f64> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let cube = self.store.get_cube(cube).await?;
        self.get_in_cube(cancel, &cube, coordinate.to_vec()).await
    }

    /// Resolve one cell when the cube definition is already loaded
    pub async fn get_in_cube(
        &self,
        cancel: &CancellationToken,
        cube: &Cube,
        coordinate: Vec<String>,
    ) -> Result<f64> {
        let mut chain = Chain::new(self.max_depth, cancel.clone());
        self.resolve_in(&mut chain, cube, coordinate).await
    }

    /// Write a leaf cell; consolidated coordinates and non-finite values
    /// are rejected
    ///
    /// The leaf check and the write are not atomic with respect to
    /// `add_component`. An edge added concurrently under one of the
    /// coordinate's elements leaves the same state as writing first and
    /// linking afterwards: the stored cell stays, and reads at that
    /// coordinate consolidate instead of returning it.
    pub async fn put(
        &self,
        cancel: &CancellationToken,
        value: f64,
        cube: &str,
        coordinate: &[String],
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !value.is_finite() {
            return Err(Error::InvalidDefinition(format!(
                "cannot write non-finite value {} to cube {} at {:?}",
                value, cube, coordinate
            )));
        }
        let cube = self.store.get_cube(cube).await?;
        let expansions = self.classify(&cube, coordinate).await?;
        if expansions.iter().any(|children| !children.is_empty()) {
            warn!(
                "Rejected write to consolidated coordinate {}{:?}",
                cube.name, coordinate
            );
            return Err(Error::ConsolidatedWrite {
                cube: cube.name,
                coordinate: coordinate.to_vec(),
            });
        }

        self.store
            .add_cell(Cell::new(cube.name, coordinate.to_vec(), value))
            .await
    }

    /// True when every element of the coordinate is a leaf
    pub async fn is_leaf_coordinate(&self, cube: &Cube, coordinate: &[String]) -> Result<bool> {
        Ok(self
            .classify(cube, coordinate)
            .await?
            .iter()
            .all(Vec::is_empty))
    }

    pub(crate) fn resolve_in<'a>(
        &'a self,
        chain: &'a mut Chain,
        cube: &'a Cube,
        coordinate: Vec<String>,
    ) -> BoxFuture<'a, Result<f64>> {
        Box::pin(async move {
            if chain.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let expansions = self.classify(cube, &coordinate).await?;

            chain.enter(&cube.name, &coordinate)?;
            let result = self
                .resolve_classified(&mut *chain, cube, &coordinate, expansions)
                .await;
            chain.leave(&cube.name, &coordinate);
            result
        })
    }

    async fn resolve_classified(
        &self,
        chain: &mut Chain,
        cube: &Cube,
        coordinate: &[String],
        expansions: Vec<Vec<Element>>,
    ) -> Result<f64> {
        {
            let mut ctx = EvalContext::new(self, &mut *chain, cube);
            if let Some(value) = self.rules.resolve(&mut ctx, coordinate).await? {
                return Ok(value);
            }
        }

        if expansions.iter().all(Vec::is_empty) {
            return self.read_leaf(cube, coordinate).await;
        }
        self.consolidate(chain, cube, coordinate, &expansions).await
    }

    /// Stored value, or 0 for a never-written leaf
    async fn read_leaf(&self, cube: &Cube, coordinate: &[String]) -> Result<f64> {
        match self.store.get_cell(&cube.name, coordinate).await {
            Ok(cell) => Ok(cell.value),
            Err(e) if e.is_not_found(EntityKind::Cell) => Ok(0.0),
            Err(e) => Err(e),
        }
    }

    /// Weighted sum over the children cross product
    ///
    /// A leaf position contributes itself with weight 1.
    async fn consolidate(
        &self,
        chain: &mut Chain,
        cube: &Cube,
        coordinate: &[String],
        expansions: &[Vec<Element>],
    ) -> Result<f64> {
        let axes: Vec<Vec<(&str, f64)>> = expansions
            .iter()
            .zip(coordinate)
            .map(|(children, element)| {
                if children.is_empty() {
                    vec![(element.as_str(), 1.0)]
                } else {
                    children
                        .iter()
                        .map(|child| (child.name.as_str(), child.weight))
                        .collect()
                }
            })
            .collect();

        let mut odometer = Odometer::new(axes.iter().map(Vec::len).collect());
        let mut total = 0.0;
        while odometer.advance() {
            let mut weight = 1.0;
            let mut child_coordinate = Vec::with_capacity(axes.len());
            for (axis, &index) in axes.iter().zip(odometer.digits()) {
                let (name, w) = axis[index];
                weight *= w;
                child_coordinate.push(name.to_string());
            }
            let value = self
                .resolve_in(&mut *chain, cube, child_coordinate)
                .await?;
            total += weight * value;
        }

        debug!("Consolidated {}{:?} = {}", cube.name, coordinate, total);
        Ok(total)
    }

    /// Validate a coordinate and fetch the children of each element
    async fn classify(&self, cube: &Cube, coordinate: &[String]) -> Result<Vec<Vec<Element>>> {
        if coordinate.len() != cube.arity() {
            return Err(Error::InvalidCoordinate(format!(
                "cube {} expects {} elements, got {}",
                cube.name,
                cube.arity(),
                coordinate.len()
            )));
        }

        let mut expansions = Vec::with_capacity(coordinate.len());
        for (dimension, element) in cube.dimensions.iter().zip(coordinate) {
            expansions.push(self.hierarchy.children(dimension, element).await?);
        }
        Ok(expansions)
    }
}
