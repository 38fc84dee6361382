//! Data model shared by the storage backends and the engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String-keyed attributes carried by dimensions, elements and cubes
pub type Attributes = BTreeMap<String, String>;

/// One element name per cube dimension, in the cube's dimension order
pub type Coordinate = Vec<String>;

fn default_weight() -> f64 {
    1.0
}

/// A named classification axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Dimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A coordinate value within exactly one dimension
///
/// `weight` is the factor this element contributes to every parent it is a
/// component of. It lives on the element, not on the edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    pub dimension: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Element {
    /// Create an element with the default weight of 1.0
    pub fn new(dimension: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimension: dimension.into(),
            weight: default_weight(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// `dimension/name`, used in error messages
    pub fn key(&self) -> String {
        element_key(&self.dimension, &self.name)
    }
}

pub fn element_key(dimension: &str, name: &str) -> String {
    format!("{}/{}", dimension, name)
}

/// A parent -> child edge within one dimension's hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Component {
    pub dimension: String,
    pub parent: String,
    pub child: String,
}

impl Component {
    pub fn new(
        dimension: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> Self {
        Self {
            dimension: dimension.into(),
            parent: parent.into(),
            child: child.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}->{}", self.dimension, self.parent, self.child)
    }
}

/// A named fact container over an ordered list of dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cube {
    pub name: String,
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Cube {
    pub fn new<I, S>(name: impl Into<String>, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Number of dimensions (coordinate length)
    pub fn arity(&self) -> usize {
        self.dimensions.len()
    }

    /// Position of a dimension in this cube's coordinate order
    pub fn position_of(&self, dimension: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d == dimension)
    }
}

/// A stored leaf fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub cube: String,
    pub coordinate: Coordinate,
    pub value: f64,
}

impl Cell {
    pub fn new(cube: impl Into<String>, coordinate: Coordinate, value: f64) -> Self {
        Self {
            cube: cube.into(),
            coordinate,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_default_weight() {
        let el = Element::new("Region", "North");
        assert_eq!(el.weight, 1.0);
        assert_eq!(el.key(), "Region/North");
    }

    #[test]
    fn test_element_weight_defaults_when_deserialized() {
        let el: Element = serde_json::from_str(r#"{"name":"North","dimension":"Region"}"#).unwrap();
        assert_eq!(el.weight, 1.0);
        assert!(el.attributes.is_empty());
    }

    #[test]
    fn test_cube_position_of() {
        let cube = Cube::new("Sales", ["Region", "Month", "Measure"]);
        assert_eq!(cube.arity(), 3);
        assert_eq!(cube.position_of("Month"), Some(1));
        assert_eq!(cube.position_of("Product"), None);
    }

    #[test]
    fn test_component_key() {
        let c = Component::new("Region", "Total", "North");
        assert_eq!(c.key(), "Region/Total->North");
    }
}
