//! Expression trees evaluated by declarative rules

use super::EvalContext;
use futures::future::BoxFuture;
use olap_common::model::Cube;
use olap_common::{Error, Result};
use std::ops;

/// Reference to another cell, relative to the coordinate being evaluated
///
/// The target coordinate takes each dimension's element from `overrides`
/// when present, else from the same-named dimension of the current
/// coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRef {
    /// Target cube; `None` means the cube being evaluated
    pub cube: Option<String>,
    /// (dimension, element) replacements
    pub overrides: Vec<(String, String)>,
}

impl CellRef {
    pub fn here(overrides: &[(&str, &str)]) -> Self {
        Self {
            cube: None,
            overrides: to_owned_pairs(overrides),
        }
    }

    pub fn in_cube(cube: impl Into<String>, overrides: &[(&str, &str)]) -> Self {
        Self {
            cube: Some(cube.into()),
            overrides: to_owned_pairs(overrides),
        }
    }

    /// Build the coordinate this reference points at in `target`
    pub fn target_coordinate(
        &self,
        source: &Cube,
        target: &Cube,
        coordinate: &[String],
    ) -> Result<Vec<String>> {
        if let Some((dimension, _)) = self
            .overrides
            .iter()
            .find(|(dimension, _)| target.position_of(dimension).is_none())
        {
            return Err(Error::InvalidDefinition(format!(
                "cube {} has no dimension {}",
                target.name, dimension
            )));
        }

        target
            .dimensions
            .iter()
            .map(|dimension| {
                if let Some((_, element)) = self.overrides.iter().find(|(d, _)| d == dimension) {
                    return Ok(element.clone());
                }
                source
                    .position_of(dimension)
                    .and_then(|pos| coordinate.get(pos))
                    .cloned()
                    .ok_or_else(|| {
                        Error::InvalidCoordinate(format!(
                            "no element for dimension {} of cube {} in {:?}",
                            dimension, target.name, coordinate
                        ))
                    })
            })
            .collect()
    }
}

fn to_owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(d, e)| (d.to_string(), e.to_string()))
        .collect()
}

/// Arithmetic over constants and cell references
///
/// Division by zero evaluates to zero.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Cell(CellRef),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

impl Expr {
    /// Cell in the same cube with some dimensions replaced
    pub fn cell(overrides: &[(&str, &str)]) -> Self {
        Expr::Cell(CellRef::here(overrides))
    }

    /// Cell in another cube
    pub fn cell_in(cube: impl Into<String>, overrides: &[(&str, &str)]) -> Self {
        Expr::Cell(CellRef::in_cube(cube, overrides))
    }

    pub fn eval<'a, 'b: 'a>(
        &'a self,
        ctx: &'a mut EvalContext<'b>,
        coordinate: &'a [String],
    ) -> BoxFuture<'a, Result<f64>> {
        Box::pin(async move {
            match self {
                Expr::Const(value) => Ok(*value),
                Expr::Cell(reference) => match &reference.cube {
                    None => {
                        let target =
                            reference.target_coordinate(ctx.cube(), ctx.cube(), coordinate)?;
                        ctx.get(&target).await
                    }
                    Some(name) => {
                        let cube = ctx.cube_named(name).await?;
                        let target = reference.target_coordinate(ctx.cube(), &cube, coordinate)?;
                        ctx.get_in(&cube, &target).await
                    }
                },
                Expr::Add(l, r) => {
                    let l = l.eval(&mut *ctx, coordinate).await?;
                    Ok(l + r.eval(&mut *ctx, coordinate).await?)
                }
                Expr::Sub(l, r) => {
                    let l = l.eval(&mut *ctx, coordinate).await?;
                    Ok(l - r.eval(&mut *ctx, coordinate).await?)
                }
                Expr::Mul(l, r) => {
                    let l = l.eval(&mut *ctx, coordinate).await?;
                    Ok(l * r.eval(&mut *ctx, coordinate).await?)
                }
                Expr::Div(l, r) => {
                    let numerator = l.eval(&mut *ctx, coordinate).await?;
                    let denominator = r.eval(&mut *ctx, coordinate).await?;
                    if denominator == 0.0 {
                        Ok(0.0)
                    } else {
                        Ok(numerator / denominator)
                    }
                }
                Expr::Neg(inner) => Ok(-inner.eval(&mut *ctx, coordinate).await?),
            }
        })
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}
