//! Dimension hierarchy traversal and edge insertion
//!
//! An element is a leaf when it has no children. Edges are inserted only
//! after an ancestor search proves the new edge keeps the dimension acyclic.
//! The search and the insert run under one per-dimension lock, so two
//! concurrent inserts cannot jointly close a cycle.

use olap_common::model::{Component, Element};
use olap_common::{Error, Result, Storage};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

pub struct HierarchyResolver {
    store: Arc<dyn Storage>,
    /// dimension -> insertion lock
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl HierarchyResolver {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Direct children of `element` in edge order, each carrying its weight
    ///
    /// Fails with `NotFound(Element)` for an unknown element; a leaf yields
    /// an empty list.
    pub async fn children(&self, dimension: &str, element: &str) -> Result<Vec<Element>> {
        self.store.children(dimension, element).await
    }

    pub async fn is_leaf(&self, dimension: &str, element: &str) -> Result<bool> {
        Ok(self.children(dimension, element).await?.is_empty())
    }

    /// Link `parent -> child`, rejecting edges that would close a cycle
    pub async fn add_component(&self, component: Component) -> Result<()> {
        let lock = self.dimension_lock(&component.dimension);
        let _guard = lock.lock().await;

        self.store
            .get_element(&component.dimension, &component.parent)
            .await?;
        self.store
            .get_element(&component.dimension, &component.child)
            .await?;

        if component.parent == component.child
            || self
                .reaches(&component.dimension, &component.child, &component.parent)
                .await?
        {
            warn!("Rejected component {}: would create a cycle", component.key());
            return Err(Error::CycleDetected {
                dimension: component.dimension,
                parent: component.parent,
                child: component.child,
            });
        }

        debug!("Adding component {}", component.key());
        self.store.add_component(component).await
    }

    /// Depth-first search for `target` among the descendants of `from`
    async fn reaches(&self, dimension: &str, from: &str, target: &str) -> Result<bool> {
        let mut stack = vec![from.to_string()];
        let mut visited = HashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            for child in self.store.children(dimension, &current).await? {
                if child.name == target {
                    return Ok(true);
                }
                if !visited.contains(&child.name) {
                    stack.push(child.name);
                }
            }
        }
        Ok(false)
    }

    fn dimension_lock(&self, dimension: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(dimension.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olap_common::model::Dimension;
    use olap_common::{EntityKind, MemoryStore};

    async fn resolver_with(names: &[&str]) -> HierarchyResolver {
        let store = Arc::new(MemoryStore::new());
        store.add_dimension(Dimension::new("D")).await.unwrap();
        for name in names {
            store.add_element(Element::new("D", *name)).await.unwrap();
        }
        HierarchyResolver::new(store)
    }

    #[tokio::test]
    async fn test_leaf_has_no_children() {
        let h = resolver_with(&["A"]).await;
        assert!(h.children("D", "A").await.unwrap().is_empty());
        assert!(h.is_leaf("D", "A").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_element() {
        let h = resolver_with(&["A"]).await;
        let err = h.children("D", "Z").await.unwrap_err();
        assert!(err.is_not_found(EntityKind::Element));
    }

    #[tokio::test]
    async fn test_direct_cycle_rejected() {
        let h = resolver_with(&["A", "B"]).await;
        h.add_component(Component::new("D", "A", "B")).await.unwrap();
        let err = h
            .add_component(Component::new("D", "B", "A"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
        assert!(h.is_leaf("D", "B").await.unwrap());
    }

    #[tokio::test]
    async fn test_transitive_cycle_rejected() {
        let h = resolver_with(&["A", "B", "C"]).await;
        h.add_component(Component::new("D", "A", "B")).await.unwrap();
        h.add_component(Component::new("D", "B", "C")).await.unwrap();
        let err = h
            .add_component(Component::new("D", "C", "A"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[tokio::test]
    async fn test_self_edge_rejected() {
        let h = resolver_with(&["A"]).await;
        let err = h
            .add_component(Component::new("D", "A", "A"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[tokio::test]
    async fn test_diamond_is_allowed() {
        let h = resolver_with(&["Top", "L", "R", "Leaf"]).await;
        h.add_component(Component::new("D", "Top", "L")).await.unwrap();
        h.add_component(Component::new("D", "Top", "R")).await.unwrap();
        h.add_component(Component::new("D", "L", "Leaf")).await.unwrap();
        h.add_component(Component::new("D", "R", "Leaf")).await.unwrap();
        let names: Vec<String> = h
            .children("D", "Top")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["L", "R"]);
    }
}
