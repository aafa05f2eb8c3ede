use serde::{Deserialize, Serialize};

use crate::{errors::{CombiError, Result}, rules::{InterpolationKind, NodeRuleKind}, tables::{clenshaw_curtis_table::{cc_nodes, cc_weights}, gauss_legendre_table::GL_TABLE}};

/// Node counts beyond this cannot be represented with distinct `f64` ratios.
const MAX_INTERVALS: u64 = 1 << 40;

///
/// Ordered nodes and weights of one rule at one level. `unit_x` and `weights`
/// refer to the unit interval, `x` holds the coordinates mapped into the domain.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneDimensionalNodes
{
    pub level: u32,
    pub unit_x: Vec<f64>,
    pub x: Vec<f64>,
    pub weights: Vec<f64>,
}

impl OneDimensionalNodes
{
    pub fn len(&self) -> usize
    {
        self.x.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

#[inline]
fn checked_pow(base: u32, exp: u32) -> Result<u64>
{
    (base as u64).checked_pow(exp).filter(|&n| n <= MAX_INTERVALS)
        .ok_or_else(|| CombiError::NumericalDegeneracy(format!("{base}^{exp} nodes exceed the representable range")))
}

///
/// A one-dimensional node rule: a pure function from level to an ordered
/// set of (coordinate, weight) pairs on `[lower, upper]`.
///
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeRule
{
    pub kind: NodeRuleKind,
    pub growth_factor: u32,
    pub lower: f64,
    pub upper: f64,
}

impl NodeRule
{
    pub fn new(kind: NodeRuleKind, growth_factor: u32, lower: f64, upper: f64) -> Self
    {
        Self { kind, growth_factor, lower, upper }
    }

    /// Rule on the unit interval with the default growth factor of two.
    pub fn unit(kind: NodeRuleKind) -> Self
    {
        Self::new(kind, 2, 0.0, 1.0)
    }

    #[inline]
    pub fn is_nested(&self) -> bool
    {
        self.kind.is_nested()
    }

    #[inline]
    pub fn interpolation(&self) -> InterpolationKind
    {
        self.kind.interpolation()
    }

    #[inline]
    pub fn width(&self) -> f64
    {
        self.upper - self.lower
    }

    /// Number of intervals `m` of the equispaced/cosine grids (nodes at k/m).
    fn intervals(&self, level: u32) -> Result<u64>
    {
        let g = self.growth_factor;
        match self.kind
        {
            NodeRuleKind::Trapezoidal => checked_pow(g, level),
            NodeRuleKind::ClenshawCurtis => if level == 0 { Ok(0) } else { checked_pow(g, level) },
            NodeRuleKind::Symmetric => checked_pow(g, level + 1),
            NodeRuleKind::GaussLegendre => Ok(0),
        }
    }

    pub fn num_nodes(&self, level: u32) -> Result<usize>
    {
        let n = match self.kind
        {
            NodeRuleKind::Trapezoidal => self.intervals(level)? + 1,
            NodeRuleKind::ClenshawCurtis => if level == 0 { 1 } else { self.intervals(level)? + 1 },
            NodeRuleKind::Symmetric => self.intervals(level)? - 1,
            NodeRuleKind::GaussLegendre => 1 + self.growth_factor as u64 * level as u64,
        };
        Ok(n as usize)
    }

    ///
    /// Highest polynomial degree integrated exactly at `level`.
    ///
    pub fn quadrature_exactness(&self, level: u32) -> Result<u32>
    {
        let n = self.num_nodes(level)? as u32;
        Ok(match self.kind
        {
            NodeRuleKind::Trapezoidal | NodeRuleKind::Symmetric => 1,
            NodeRuleKind::ClenshawCurtis => if n % 2 == 1 { n } else { n - 1 },
            NodeRuleKind::GaussLegendre => 2 * n - 1,
        })
    }

    ///
    /// Unit-interval nodes and weights for `level`.
    ///
    fn unit_nodes(&self, level: u32) -> Result<(Vec<f64>, Vec<f64>)>
    {
        match self.kind
        {
            NodeRuleKind::Trapezoidal =>
            {
                let m = self.intervals(level)? as usize;
                let h = 1.0 / m as f64;
                let x: Vec<f64> = (0..=m).map(|k| k as f64 / m as f64).collect();
                let mut w = vec![h; m + 1];
                w[0] *= 0.5;
                w[m] *= 0.5;
                Ok((x, w))
            },
            NodeRuleKind::ClenshawCurtis =>
            {
                let m = self.intervals(level)? as usize;
                Ok((cc_nodes(m), cc_weights(m)))
            },
            NodeRuleKind::Symmetric =>
            {
                let m = self.intervals(level)? as usize;
                let n = m - 1;
                let x: Vec<f64> = (1..m).map(|k| k as f64 / m as f64).collect();
                if n == 1
                {
                    return Ok((x, vec![1.0]));
                }
                // open trapezoidal rule, exact for linear functions
                let h = 1.0 / m as f64;
                let mut w = vec![h; n];
                w[0] = 1.5 * h;
                w[n - 1] = 1.5 * h;
                Ok((x, w))
            },
            NodeRuleKind::GaussLegendre => Ok(GL_TABLE.rule(self.num_nodes(level)?)),
        }
    }

    ///
    /// Ordered nodes for `level`, mapped into `[lower, upper]`. Fails with
    /// `NumericalDegeneracy` if the produced coordinates are not strictly increasing.
    ///
    pub fn nodes(&self, level: u32) -> Result<OneDimensionalNodes>
    {
        let (unit_x, weights) = self.unit_nodes(level)?;
        let x: Vec<f64> = unit_x.iter().map(|&u| self.lower + self.width() * u).collect();
        if x.windows(2).any(|pair| pair[0] >= pair[1]) || unit_x.windows(2).any(|pair| pair[0] >= pair[1])
        {
            return Err(CombiError::NumericalDegeneracy(format!(
                "{:?} rule produces non-distinct nodes at level {level}", self.kind)));
        }
        if x.iter().chain(&weights).any(|v| !v.is_finite())
        {
            return Err(CombiError::NumericalDegeneracy(format!(
                "{:?} rule produces non-finite nodes or weights at level {level}", self.kind)));
        }
        Ok(OneDimensionalNodes { level, unit_x, x, weights })
    }
}

#[cfg(test)]
fn is_subset(coarse: &[f64], fine: &[f64]) -> bool
{
    coarse.iter().all(|a| fine.iter().any(|b| a.to_bits() == b.to_bits()))
}

#[test]
fn check_node_counts()
{
    let trapezoidal = NodeRule::unit(NodeRuleKind::Trapezoidal);
    let cc = NodeRule::unit(NodeRuleKind::ClenshawCurtis);
    let gauss = NodeRule::unit(NodeRuleKind::GaussLegendre);
    let symmetric = NodeRule::unit(NodeRuleKind::Symmetric);
    let counts = |rule: &NodeRule| (0..4).map(|l| rule.num_nodes(l).unwrap()).collect::<Vec<_>>();
    assert_eq!(counts(&trapezoidal), vec![2, 3, 5, 9]);
    assert_eq!(counts(&cc), vec![1, 3, 5, 9]);
    assert_eq!(counts(&gauss), vec![1, 3, 5, 7]);
    assert_eq!(counts(&symmetric), vec![1, 3, 7, 15]);
    for rule in [trapezoidal, cc, gauss, symmetric]
    {
        for level in 0..6
        {
            let nodes = rule.nodes(level).unwrap();
            assert_eq!(nodes.len(), rule.num_nodes(level).unwrap());
            assert!((nodes.weights.iter().sum::<f64>() - 1.0).abs() < 1e-13);
        }
    }
}

#[test]
fn check_nesting_law()
{
    // Nested rules must reproduce every coarse node bit for bit, on any domain.
    for kind in [NodeRuleKind::Trapezoidal, NodeRuleKind::ClenshawCurtis, NodeRuleKind::Symmetric]
    {
        for growth in [2, 4]
        {
            let rule = NodeRule::new(kind, growth, -1.3, 2.7);
            for level in 0..5
            {
                let coarse = rule.nodes(level).unwrap();
                let fine = rule.nodes(level + 1).unwrap();
                assert!(fine.len() > coarse.len());
                assert!(is_subset(&coarse.x, &fine.x), "{kind:?} growth {growth} level {level}");
            }
        }
    }
    // Gauss-Legendre shares only the midpoint between odd rules.
    let gauss = NodeRule::unit(NodeRuleKind::GaussLegendre);
    assert!(!is_subset(&gauss.nodes(1).unwrap().x, &gauss.nodes(2).unwrap().x));
}

#[test]
fn check_center_node()
{
    let symmetric = NodeRule::unit(NodeRuleKind::Symmetric);
    for level in 0..6
    {
        let nodes = symmetric.nodes(level).unwrap();
        assert_eq!(nodes.len() % 2, 1);
        assert_eq!(nodes.x[nodes.len() / 2], 0.5);
    }
    assert_eq!(NodeRule::unit(NodeRuleKind::ClenshawCurtis).nodes(0).unwrap().x, vec![0.5]);
}

#[test]
fn check_domain_mapping()
{
    let rule = NodeRule::new(NodeRuleKind::Trapezoidal, 2, 2.0, 6.0);
    let nodes = rule.nodes(2).unwrap();
    assert_eq!(nodes.x, vec![2.0, 3.0, 4.0, 5.0, 6.0]);
    // weights stay on the unit interval, integrals are scaled by the caller
    assert_eq!(nodes.weights, vec![0.125, 0.25, 0.25, 0.25, 0.125]);
}

#[test]
fn check_exactness()
{
    for kind in [NodeRuleKind::ClenshawCurtis, NodeRuleKind::GaussLegendre]
    {
        let rule = NodeRule::unit(kind);
        for level in 0..5
        {
            let nodes = rule.nodes(level).unwrap();
            let p = rule.quadrature_exactness(level).unwrap() as i32;
            let q: f64 = nodes.x.iter().zip(&nodes.weights).map(|(x, w)| w * x.powi(p)).sum();
            assert!((q - 1.0 / (p as f64 + 1.0)).abs() < 1e-12, "{kind:?} level {level}");
        }
    }
}

#[test]
fn check_degenerate_levels()
{
    let rule = NodeRule::unit(NodeRuleKind::Trapezoidal);
    assert!(matches!(rule.nodes(60), Err(CombiError::NumericalDegeneracy(_))));
}
