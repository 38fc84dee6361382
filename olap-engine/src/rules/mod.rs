//! Rule engine
//!
//! Each cube owns an ordered rule list. For a coordinate the first rule
//! whose `matches` holds is evaluated in place of storage or consolidation.
//! Lists are immutable snapshots swapped atomically on update, so readers
//! in flight keep the list they started with.

mod expr;
mod pattern;

pub use expr::{CellRef, Expr};
pub use pattern::{CoordinatePattern, Matcher};

use crate::resolver::{CellResolver, Chain};
use async_trait::async_trait;
use olap_common::model::Cube;
use olap_common::Result;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// A computed-cell override
#[async_trait]
pub trait Rule: Send + Sync {
    /// Label used in logs
    fn name(&self) -> &str {
        "rule"
    }

    fn matches(&self, coordinate: &[String]) -> bool;

    /// Compute the value; other cells are read back through `ctx`
    async fn eval(&self, ctx: &mut EvalContext<'_>, coordinate: &[String]) -> Result<f64>;
}

pub type RuleList = Arc<Vec<Arc<dyn Rule>>>;

/// Handle a rule uses to read other cells during evaluation
///
/// Reads go through the cell resolver on the same resolution chain, so a
/// rule that ends up depending on its own coordinate fails with `RuleCycle`.
pub struct EvalContext<'a> {
    resolver: &'a CellResolver,
    chain: &'a mut Chain,
    cube: &'a Cube,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(resolver: &'a CellResolver, chain: &'a mut Chain, cube: &'a Cube) -> Self {
        Self {
            resolver,
            chain,
            cube,
        }
    }

    /// Cube whose cell is being evaluated
    pub fn cube(&self) -> &Cube {
        self.cube
    }

    /// Resolve a coordinate in the cube being evaluated
    pub async fn get(&mut self, coordinate: &[String]) -> Result<f64> {
        self.resolver
            .resolve_in(&mut *self.chain, self.cube, coordinate.to_vec())
            .await
    }

    /// Resolve a coordinate in another (or the same) cube
    pub async fn get_in(&mut self, cube: &Cube, coordinate: &[String]) -> Result<f64> {
        self.resolver
            .resolve_in(&mut *self.chain, cube, coordinate.to_vec())
            .await
    }

    /// Look up a cube definition by name
    pub async fn cube_named(&self, name: &str) -> Result<Cube> {
        if name == self.cube.name {
            return Ok(self.cube.clone());
        }
        self.resolver.store().get_cube(name).await
    }

    pub fn is_cancelled(&self) -> bool {
        self.chain.is_cancelled()
    }
}

/// Per-cube rule lists
#[derive(Default)]
pub struct RuleEngine {
    rules: RwLock<HashMap<String, RuleList>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a cube's rules; empty when none are registered
    pub fn rules_for(&self, cube: &str) -> RuleList {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        rules.get(cube).cloned().unwrap_or_default()
    }

    /// Append rules after the existing ones; returns the new list length
    pub fn add_rules(&self, cube: &str, added: Vec<Arc<dyn Rule>>) -> usize {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<Arc<dyn Rule>> = rules
            .get(cube)
            .map(|current| current.iter().cloned().collect())
            .unwrap_or_default();
        next.extend(added);
        let len = next.len();
        rules.insert(cube.to_string(), Arc::new(next));
        len
    }

    /// Replace a cube's rules wholesale
    pub fn set_rules(&self, cube: &str, replacement: Vec<Arc<dyn Rule>>) -> usize {
        let len = replacement.len();
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        rules.insert(cube.to_string(), Arc::new(replacement));
        len
    }

    /// First rule matching the coordinate, in registration order
    pub fn first_match(&self, cube: &str, coordinate: &[String]) -> Option<Arc<dyn Rule>> {
        self.rules_for(cube)
            .iter()
            .find(|rule| rule.matches(coordinate))
            .cloned()
    }

    /// Evaluate the first matching rule; `None` when no rule matches
    pub async fn resolve(
        &self,
        ctx: &mut EvalContext<'_>,
        coordinate: &[String],
    ) -> Result<Option<f64>> {
        let Some(rule) = self.first_match(&ctx.cube().name, coordinate) else {
            return Ok(None);
        };
        debug!(
            "Rule '{}' matched {}{:?}",
            rule.name(),
            ctx.cube().name,
            coordinate
        );
        rule.eval(ctx, coordinate).await.map(Some)
    }
}

/// Pattern-matched rule computing an expression
pub struct DeclarativeRule {
    name: String,
    pattern: CoordinatePattern,
    expr: Expr,
}

impl DeclarativeRule {
    pub fn new(name: impl Into<String>, pattern: CoordinatePattern, expr: Expr) -> Self {
        Self {
            name: name.into(),
            pattern,
            expr,
        }
    }

    pub fn pattern(&self) -> &CoordinatePattern {
        &self.pattern
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

#[async_trait]
impl Rule for DeclarativeRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, coordinate: &[String]) -> bool {
        self.pattern.matches(coordinate)
    }

    async fn eval(&self, ctx: &mut EvalContext<'_>, coordinate: &[String]) -> Result<f64> {
        self.expr.eval(ctx, coordinate).await
    }
}

impl From<DeclarativeRule> for Arc<dyn Rule> {
    fn from(rule: DeclarativeRule) -> Self {
        Arc::new(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn constant(name: &str, pattern: CoordinatePattern, value: f64) -> Arc<dyn Rule> {
        DeclarativeRule::new(name, pattern, Expr::Const(value)).into()
    }

    #[test]
    fn test_first_match_wins_in_registration_order() {
        let engine = RuleEngine::new();
        engine.add_rules(
            "Sales",
            vec![
                constant("north", CoordinatePattern::exact(&["North", "Jan"]), 1.0),
                constant(
                    "any-jan",
                    CoordinatePattern::new(vec![Matcher::Any, Matcher::exact("Jan")]),
                    2.0,
                ),
            ],
        );

        let hit = engine.first_match("Sales", &coord(&["North", "Jan"])).unwrap();
        assert_eq!(hit.name(), "north");
        let hit = engine.first_match("Sales", &coord(&["South", "Jan"])).unwrap();
        assert_eq!(hit.name(), "any-jan");
        assert!(engine.first_match("Sales", &coord(&["South", "Feb"])).is_none());
    }

    #[test]
    fn test_no_rules_for_unknown_cube() {
        let engine = RuleEngine::new();
        assert!(engine.rules_for("Nothing").is_empty());
        assert!(engine.first_match("Nothing", &coord(&["a"])).is_none());
    }

    #[test]
    fn test_add_appends_and_set_replaces() {
        let engine = RuleEngine::new();
        assert_eq!(
            engine.add_rules("C", vec![constant("a", CoordinatePattern::any(1), 1.0)]),
            1
        );
        assert_eq!(
            engine.add_rules("C", vec![constant("b", CoordinatePattern::any(1), 2.0)]),
            2
        );
        let names: Vec<String> = engine
            .rules_for("C")
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        assert_eq!(engine.set_rules("C", Vec::new()), 0);
        assert!(engine.rules_for("C").is_empty());
    }

    #[test]
    fn test_snapshot_survives_swap() {
        let engine = RuleEngine::new();
        engine.add_rules("C", vec![constant("a", CoordinatePattern::any(1), 1.0)]);
        let snapshot = engine.rules_for("C");
        engine.add_rules("C", vec![constant("b", CoordinatePattern::any(1), 2.0)]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(engine.rules_for("C").len(), 2);
    }
}
