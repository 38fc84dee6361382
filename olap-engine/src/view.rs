//! Views and streaming queries
//!
//! A `View` is a selection, not data: per cube dimension, an ordered list of
//! element names, where an empty list selects every element of the
//! dimension as of query time. `Rows` walks the cross product one
//! coordinate at a time and resolves each cell on demand, so memory stays
//! bounded by the selection lists, never by their product.

use crate::odometer::Odometer;
use crate::resolver::CellResolver;
use futures::Stream;
use olap_common::model::Cube;
use olap_common::{Error, Result, Storage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Name of the trailing value column
pub const VALUE_COLUMN: &str = "value";

/// Per-dimension element selection over a cube
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub cube: String,
    /// Cube dimensions in coordinate order
    pub dimensions: Vec<String>,
    /// One selection per dimension; empty selects all elements
    pub slices: Vec<Vec<String>>,
}

impl View {
    /// Selection for a dimension
    ///
    /// `None` if the dimension is not in the cube or the view carries no
    /// selection for it.
    pub fn slice(&self, dimension: &str) -> Option<&[String]> {
        self.dimensions
            .iter()
            .position(|d| d == dimension)
            .and_then(|pos| self.slices.get(pos))
            .map(Vec::as_slice)
    }

    /// Dimension columns followed by the value column
    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.dimensions.clone();
        columns.push(VALUE_COLUMN.to_string());
        columns
    }
}

/// One resolved cell of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub coordinate: Vec<String>,
    pub value: f64,
}

impl Row {
    /// Element in the given dimension column
    pub fn element(&self, column: usize) -> Option<&str> {
        self.coordinate.get(column).map(String::as_str)
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Builds views and starts queries
pub struct QueryEngine {
    store: Arc<dyn Storage>,
    resolver: Arc<CellResolver>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn Storage>, resolver: Arc<CellResolver>) -> Self {
        Self { store, resolver }
    }

    /// Validate a selection against a cube
    ///
    /// Requires one list per cube dimension and every named element to
    /// exist. Empty lists stay empty and expand at query time.
    pub async fn new_view(
        &self,
        cancel: &CancellationToken,
        cube: &str,
        slices: Vec<Vec<String>>,
    ) -> Result<View> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let cube = self.store.get_cube(cube).await?;
        if slices.len() != cube.arity() {
            return Err(Error::InvalidCoordinate(format!(
                "cube {} has {} dimensions, view selects {}",
                cube.name,
                cube.arity(),
                slices.len()
            )));
        }
        for (dimension, slice) in cube.dimensions.iter().zip(&slices) {
            for element in slice {
                self.store.get_element(dimension, element).await?;
            }
        }

        info!("Created view over cube {}", cube.name);
        Ok(View {
            cube: cube.name,
            dimensions: cube.dimensions,
            slices,
        })
    }

    /// Start a forward-only pass over the view
    pub async fn query(&self, cancel: &CancellationToken, view: &View) -> Result<Rows> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let cube = self.store.get_cube(&view.cube).await?;
        if view.slices.len() != cube.arity() {
            return Err(Error::InvalidCoordinate(format!(
                "view selects {} dimensions, cube {} has {}",
                view.slices.len(),
                cube.name,
                cube.arity()
            )));
        }

        let mut axes = Vec::with_capacity(view.slices.len());
        for (dimension, slice) in cube.dimensions.iter().zip(&view.slices) {
            if slice.is_empty() {
                let all = self.store.elements(dimension).await?;
                axes.push(all.into_iter().map(|e| e.name).collect());
            } else {
                axes.push(slice.clone());
            }
        }

        let rows = Rows::new(self.resolver.clone(), cube, axes, cancel.clone());
        debug!(
            "Query over {} started, {:?} rows expected",
            rows.cube.name,
            rows.odometer.total()
        );
        Ok(rows)
    }
}

/// Forward-only, single-pass row cursor
///
/// Not restartable: run `query` on the same view again for a second pass.
/// Once an error is returned the cursor is finished.
pub struct Rows {
    resolver: Arc<CellResolver>,
    cube: Cube,
    columns: Vec<String>,
    axes: Vec<Vec<String>>,
    odometer: Odometer,
    cancel: CancellationToken,
    current: Option<Row>,
    emitted: u64,
    finished: bool,
}

impl Rows {
    fn new(
        resolver: Arc<CellResolver>,
        cube: Cube,
        axes: Vec<Vec<String>>,
        cancel: CancellationToken,
    ) -> Self {
        let mut columns = cube.dimensions.clone();
        columns.push(VALUE_COLUMN.to_string());
        let odometer = Odometer::new(axes.iter().map(Vec::len).collect());
        Self {
            resolver,
            cube,
            columns,
            axes,
            odometer,
            cancel,
            current: None,
            emitted: 0,
            finished: false,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Advance to the next row
    ///
    /// `Ok(false)` at the end. Cancellation is checked before every row and
    /// surfaces as `Err(Cancelled)`.
    pub async fn next(&mut self) -> Result<bool> {
        self.current = None;
        if self.finished {
            return Ok(false);
        }
        if self.cancel.is_cancelled() {
            self.finished = true;
            warn!(
                "Query over {} cancelled after {} rows",
                self.cube.name, self.emitted
            );
            return Err(Error::Cancelled);
        }
        if !self.odometer.advance() {
            self.finished = true;
            return Ok(false);
        }

        let coordinate: Vec<String> = self
            .axes
            .iter()
            .zip(self.odometer.digits())
            .map(|(axis, &index)| axis[index].clone())
            .collect();
        match self
            .resolver
            .get_in_cube(&self.cancel, &self.cube, coordinate.clone())
            .await
        {
            Ok(value) => {
                self.emitted += 1;
                self.current = Some(Row { coordinate, value });
                Ok(true)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    /// Row reached by the last successful `next`
    pub fn row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    /// Rows produced so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Size of the selection's cross product, `None` on overflow
    pub fn total(&self) -> Option<u128> {
        self.odometer.total()
    }

    /// Drain the cursor as a stream; an error ends the stream
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Row>> {
        async_stream::try_stream! {
            while self.next().await? {
                if let Some(row) = self.current.take() {
                    yield row;
                }
            }
        }
    }
}
