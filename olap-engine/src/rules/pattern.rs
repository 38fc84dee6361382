//! Coordinate match predicates

use olap_common::model::Cube;
use olap_common::{Error, Result};

/// Predicate on a single coordinate position
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Any element
    Any,
    Exact(String),
    OneOf(Vec<String>),
}

impl Matcher {
    pub fn exact(element: impl Into<String>) -> Self {
        Matcher::Exact(element.into())
    }

    pub fn one_of<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::OneOf(elements.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, element: &str) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Exact(expected) => expected == element,
            Matcher::OneOf(options) => options.iter().any(|o| o == element),
        }
    }
}

/// One matcher per cube dimension, in coordinate order
///
/// A coordinate of a different length never matches.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatePattern {
    matchers: Vec<Matcher>,
}

impl CoordinatePattern {
    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self { matchers }
    }

    /// Matches every coordinate of the given arity
    pub fn any(arity: usize) -> Self {
        Self::new(vec![Matcher::Any; arity])
    }

    /// Matches one coordinate only
    pub fn exact(coordinate: &[&str]) -> Self {
        Self::new(coordinate.iter().map(|e| Matcher::exact(*e)).collect())
    }

    /// Wildcard everywhere except the named dimensions
    ///
    /// Fails with `InvalidDefinition` if a dimension is not part of the cube.
    pub fn for_cube(cube: &Cube, constraints: &[(&str, Matcher)]) -> Result<Self> {
        let mut pattern = Self::any(cube.arity());
        for (dimension, matcher) in constraints {
            let pos = cube.position_of(dimension).ok_or_else(|| {
                Error::InvalidDefinition(format!(
                    "cube {} has no dimension {}",
                    cube.name, dimension
                ))
            })?;
            pattern.matchers[pos] = matcher.clone();
        }
        Ok(pattern)
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    pub fn matches(&self, coordinate: &[String]) -> bool {
        coordinate.len() == self.matchers.len()
            && self
                .matchers
                .iter()
                .zip(coordinate)
                .all(|(m, element)| m.matches(element))
    }
}
