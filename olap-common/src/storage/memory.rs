//! In-process storage backend

use super::Storage;
use crate::error::{EntityKind, Error};
use crate::model::{element_key, Cell, Component, Cube, Dimension, Element};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Metadata {
    dimensions: HashMap<String, Dimension>,
    /// dimension -> element name -> element
    elements: HashMap<String, HashMap<String, Element>>,
    /// dimension -> element names in insertion order
    element_order: HashMap<String, Vec<String>>,
    /// (dimension, parent) -> child names in insertion order
    children: HashMap<(String, String), Vec<String>>,
    cubes: HashMap<String, Cube>,
}

impl Metadata {
    fn element(&self, dimension: &str, name: &str) -> Result<&Element> {
        self.elements
            .get(dimension)
            .and_then(|els| els.get(name))
            .ok_or_else(|| Error::not_found(EntityKind::Element, element_key(dimension, name)))
    }
}

/// Storage backend holding everything in memory
///
/// Metadata and cells sit behind separate locks so cell writes never wait
/// on metadata readers.
#[derive(Default)]
pub struct MemoryStore {
    metadata: RwLock<Metadata>,
    /// cube -> coordinate -> value
    cells: RwLock<HashMap<String, HashMap<Vec<String>, f64>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn add_cube(&self, cube: Cube) -> Result<()> {
        let mut meta = self.metadata.write().await;
        if meta.cubes.contains_key(&cube.name) {
            return Err(Error::already_exists(EntityKind::Cube, cube.name));
        }
        if let Some(missing) = cube
            .dimensions
            .iter()
            .find(|d| !meta.dimensions.contains_key(d.as_str()))
        {
            return Err(Error::not_found(EntityKind::Dimension, missing.clone()));
        }
        meta.cubes.insert(cube.name.clone(), cube);
        Ok(())
    }

    async fn get_cube(&self, name: &str) -> Result<Cube> {
        let meta = self.metadata.read().await;
        meta.cubes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(EntityKind::Cube, name))
    }

    async fn add_dimension(&self, dimension: Dimension) -> Result<()> {
        let mut meta = self.metadata.write().await;
        if meta.dimensions.contains_key(&dimension.name) {
            return Err(Error::already_exists(EntityKind::Dimension, dimension.name));
        }
        meta.elements.insert(dimension.name.clone(), HashMap::new());
        meta.element_order.insert(dimension.name.clone(), Vec::new());
        meta.dimensions.insert(dimension.name.clone(), dimension);
        Ok(())
    }

    async fn get_dimension(&self, name: &str) -> Result<Dimension> {
        let meta = self.metadata.read().await;
        meta.dimensions
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(EntityKind::Dimension, name))
    }

    async fn add_element(&self, element: Element) -> Result<()> {
        let mut meta = self.metadata.write().await;
        let key = element.key();
        let Metadata {
            elements,
            element_order,
            ..
        } = &mut *meta;
        let (Some(by_name), Some(order)) = (
            elements.get_mut(&element.dimension),
            element_order.get_mut(&element.dimension),
        ) else {
            return Err(Error::not_found(EntityKind::Dimension, element.dimension));
        };
        if by_name.contains_key(&element.name) {
            return Err(Error::already_exists(EntityKind::Element, key));
        }
        order.push(element.name.clone());
        by_name.insert(element.name.clone(), element);
        Ok(())
    }

    async fn get_element(&self, dimension: &str, name: &str) -> Result<Element> {
        let meta = self.metadata.read().await;
        meta.element(dimension, name).cloned()
    }

    async fn elements(&self, dimension: &str) -> Result<Vec<Element>> {
        let meta = self.metadata.read().await;
        let order = meta
            .element_order
            .get(dimension)
            .ok_or_else(|| Error::not_found(EntityKind::Dimension, dimension))?;
        order
            .iter()
            .map(|name| meta.element(dimension, name).cloned())
            .collect()
    }

    async fn add_component(&self, component: Component) -> Result<()> {
        let mut meta = self.metadata.write().await;
        meta.element(&component.dimension, &component.parent)?;
        meta.element(&component.dimension, &component.child)?;

        let key = component.key();
        let children = meta
            .children
            .entry((component.dimension, component.parent))
            .or_default();
        if children.contains(&component.child) {
            return Err(Error::already_exists(EntityKind::Component, key));
        }
        children.push(component.child);
        Ok(())
    }

    async fn get_component(
        &self,
        dimension: &str,
        parent: &str,
        child: &str,
    ) -> Result<Component> {
        let meta = self.metadata.read().await;
        let linked = meta
            .children
            .get(&(dimension.to_string(), parent.to_string()))
            .is_some_and(|children| children.iter().any(|c| c == child));
        if linked {
            Ok(Component::new(dimension, parent, child))
        } else {
            Err(Error::not_found(
                EntityKind::Component,
                Component::new(dimension, parent, child).key(),
            ))
        }
    }

    async fn children(&self, dimension: &str, parent: &str) -> Result<Vec<Element>> {
        let meta = self.metadata.read().await;
        meta.element(dimension, parent)?;
        match meta
            .children
            .get(&(dimension.to_string(), parent.to_string()))
        {
            Some(names) => names
                .iter()
                .map(|name| meta.element(dimension, name).cloned())
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    async fn add_cell(&self, cell: Cell) -> Result<()> {
        if !self.metadata.read().await.cubes.contains_key(&cell.cube) {
            return Err(Error::not_found(EntityKind::Cube, cell.cube));
        }
        let mut cells = self.cells.write().await;
        cells
            .entry(cell.cube)
            .or_default()
            .insert(cell.coordinate, cell.value);
        Ok(())
    }

    async fn get_cell(&self, cube: &str, coordinate: &[String]) -> Result<Cell> {
        let cells = self.cells.read().await;
        cells
            .get(cube)
            .and_then(|by_coord| by_coord.get(coordinate))
            .map(|value| Cell::new(cube, coordinate.to_vec(), *value))
            .ok_or_else(|| {
                Error::not_found(EntityKind::Cell, format!("{}{:?}", cube, coordinate))
            })
    }
}
