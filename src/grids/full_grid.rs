use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{algorithms::{lagrange::{lagrange_coeffs, lagrange_weights, piecewise_linear_weights}, legendre::orthonormal_legendre_all}, errors::{CombiError, Result}, multi_index::LevelVector, one_dimensional_nodes::{NodeRule, OneDimensionalNodes}, rules::InterpolationKind};

/// Spectral coefficients keyed by the per-dimension polynomial degree.
pub type SpectralCoefficients = BTreeMap<Vec<u32>, Vec<f64>>;

///
/// Odometer over the tensor product `0..shape[0] x ... x 0..shape[d-1]`,
/// last dimension fastest.
///
#[derive(Clone, Debug)]
pub struct TensorProductIterator
{
    shape: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl TensorProductIterator
{
    pub fn new(shape: &[usize]) -> Self
    {
        Self { shape: shape.to_owned(), current: vec![0; shape.len()], done: shape.is_empty() || shape.contains(&0) }
    }
}

impl Iterator for TensorProductIterator
{
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.done
        {
            return None;
        }
        let item = self.current.clone();
        for dim in (0..self.shape.len()).rev()
        {
            self.current[dim] += 1;
            if self.current[dim] < self.shape[dim]
            {
                return Some(item);
            }
            self.current[dim] = 0;
        }
        self.done = true;
        Some(item)
    }
}

///
/// Nodes of one dimension of a full grid, plus the data needed to
/// interpolate along it.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodesAndCoefficientsForLevel
{
    pub nodes: OneDimensionalNodes,
    pub interpolation: InterpolationKind,
    /// Barycentric coefficients, empty for piecewise linear interpolation.
    pub coefficients: Vec<f64>,
    /// Highest degree of the orthonormal basis resolved by this level.
    pub max_degree: u32,
}

impl NodesAndCoefficientsForLevel
{
    fn basis_weights(&self, x: f64) -> Vec<f64>
    {
        match self.interpolation
        {
            InterpolationKind::Lagrange => lagrange_weights(x, &self.coefficients, &self.nodes.x),
            InterpolationKind::PiecewiseLinear => piecewise_linear_weights(x, &self.nodes.x),
        }
    }
}

///
/// Tensor-product grid of one level vector. Points are enumerated with the
/// last dimension running fastest; value arrays follow that order with the
/// outputs of one point stored contiguously.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullGrid
{
    pub level: LevelVector,
    pub lweights: Vec<NodesAndCoefficientsForLevel>,
    volume: f64,
}

impl FullGrid
{
    ///
    /// Create the full grid of `level` from one node rule per dimension.
    ///
    pub fn new(rules: &[NodeRule], level: &[u32]) -> Result<Self>
    {
        if rules.len() != level.len()
        {
            return Err(CombiError::DimensionMismatch { expected: rules.len(), found: level.len() });
        }
        let mut lweights = Vec::with_capacity(level.len());
        let mut num_points: usize = 1;
        for (rule, &l) in rules.iter().zip(level)
        {
            let nodes = rule.nodes(l)?;
            num_points = num_points.checked_mul(nodes.len())
                .ok_or_else(|| CombiError::NumericalDegeneracy(format!("full grid {level:?} has too many points")))?;
            let interpolation = rule.interpolation();
            let coefficients = match interpolation
            {
                InterpolationKind::Lagrange => lagrange_coeffs(&nodes.x),
                InterpolationKind::PiecewiseLinear => Vec::new(),
            };
            let max_degree = rule.quadrature_exactness(l)? / 2;
            lweights.push(NodesAndCoefficientsForLevel { nodes, interpolation, coefficients, max_degree });
        }
        let volume = rules.iter().map(|r| r.width()).product();
        Ok(Self { level: level.to_owned(), lweights, volume })
    }

    ///
    /// Number of dimensions
    ///
    pub fn ndim(&self) -> usize
    {
        self.level.len()
    }

    /// Number of nodes in each dimension.
    pub fn shape(&self) -> Vec<usize>
    {
        self.lweights.iter().map(|l| l.nodes.len()).collect()
    }

    pub fn len(&self) -> usize
    {
        self.lweights.iter().map(|l| l.nodes.len()).product()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    pub fn indices(&self) -> TensorProductIterator
    {
        TensorProductIterator::new(&self.shape())
    }

    /// Coordinates of the node with per-dimension `index`.
    pub fn point(&self, index: &[usize]) -> Vec<f64>
    {
        index.iter().zip(&self.lweights).map(|(&i, l)| l.nodes.x[i]).collect()
    }

    /// All points in enumeration order.
    pub fn points(&self) -> impl Iterator<Item = Vec<f64>> + '_
    {
        self.indices().map(|index| self.point(&index))
    }

    /// Tensor-product quadrature weight on the unit cube.
    #[inline]
    pub fn quadrature_weight(&self, index: &[usize]) -> f64
    {
        index.iter().zip(&self.lweights).map(|(&i, l)| l.nodes.weights[i]).product()
    }

    ///
    /// Integral over the domain of the function with point `values`.
    ///
    pub fn integral(&self, values: &[f64], num_outputs: usize) -> Vec<f64>
    {
        let mut result = vec![0.0; num_outputs];
        for (index, values) in self.indices().zip(values.chunks_exact(num_outputs))
        {
            let weight = self.quadrature_weight(&index);
            result.iter_mut().zip(values).for_each(|(r, &v)| *r += weight * v);
        }
        result.iter_mut().for_each(|r| *r *= self.volume);
        result
    }

    ///
    /// Computes the per-dimension basis weights for a given `x` coordinate.
    /// Returns the starting offset of each dimension and the weights across all dimensions.
    ///
    fn basis_weights(&self, x: &[f64]) -> (Vec<usize>, Vec<f64>)
    {
        let mut weights: Vec<f64> = Vec::with_capacity(self.lweights.iter().map(|l| l.nodes.len()).sum());
        let mut offsets: Vec<usize> = vec![0; self.ndim()];
        for dim in 0..self.ndim()
        {
            offsets[dim] = weights.len();
            weights.extend(self.lweights[dim].basis_weights(x[dim]));
        }
        (offsets, weights)
    }

    ///
    /// Interpolate at `x` and add `scale` times the result to `y`.
    ///
    #[inline]
    pub fn interpolate(&self, x: &[f64], values: &[f64], y: &mut [f64], scale: f64)
    {
        let (offsets, weights) = self.basis_weights(x);
        let num_outputs = y.len();
        for (index, values) in self.indices().zip(values.chunks_exact(num_outputs))
        {
            let mut combined_weight = scale;
            for dim in 0..self.ndim()
            {
                combined_weight *= weights[offsets[dim] + index[dim]];
            }
            if combined_weight == 0.0
            {
                continue;
            }
            y.iter_mut().zip(values).for_each(|(y, &v)| *y += combined_weight * v);
        }
    }

    ///
    /// Project onto the orthonormal Legendre basis of the unit cube, using the
    /// grid's quadrature. Degrees are limited per dimension so that products
    /// of basis functions are still integrated exactly.
    ///
    pub fn spectral(&self, values: &[f64], num_outputs: usize) -> SpectralCoefficients
    {
        // basis[dim][i] holds all polynomial values at node i
        let basis: Vec<Vec<Vec<f64>>> = self.lweights.iter()
            .map(|l| l.nodes.unit_x.iter().map(|&u| orthonormal_legendre_all(l.max_degree, u)).collect())
            .collect();
        let degree_shape: Vec<usize> = self.lweights.iter().map(|l| l.max_degree as usize + 1).collect();
        let degrees: Vec<Vec<usize>> = TensorProductIterator::new(&degree_shape).collect();
        let mut coefficients = vec![vec![0.0; num_outputs]; degrees.len()];
        for (index, values) in self.indices().zip(values.chunks_exact(num_outputs))
        {
            let weight = self.quadrature_weight(&index);
            for (degree, coefficient) in degrees.iter().zip(coefficients.iter_mut())
            {
                let phi: f64 = (0..self.ndim()).map(|dim| basis[dim][index[dim]][degree[dim]]).product();
                coefficient.iter_mut().zip(values).for_each(|(c, &v)| *c += weight * phi * v);
            }
        }
        degrees.into_iter().map(|d| d.into_iter().map(|k| k as u32).collect()).zip(coefficients).collect()
    }
}

///
/// Evaluate a spectral expansion at the unit-cube coordinate `unit_x`.
///
pub fn evaluate_expansion(coefficients: &SpectralCoefficients, unit_x: &[f64], num_outputs: usize) -> Vec<f64>
{
    let mut result = vec![0.0; num_outputs];
    for (degree, coefficient) in coefficients
    {
        let phi: f64 = degree.iter().zip(unit_x).map(|(&k, &u)| crate::algorithms::legendre::orthonormal_legendre(k, u)).product();
        result.iter_mut().zip(coefficient).for_each(|(r, &c)| *r += phi * c);
    }
    result
}

#[cfg(test)]
use crate::rules::NodeRuleKind;

#[cfg(test)]
fn sample(grid: &FullGrid, f: impl Fn(&[f64]) -> f64) -> Vec<f64>
{
    grid.points().map(|p| f(&p)).collect()
}

#[test]
fn check_enumeration_order()
{
    let indices: Vec<Vec<usize>> = TensorProductIterator::new(&[2, 3]).collect();
    assert_eq!(indices, vec![vec![0, 0], vec![0, 1], vec![0, 2], vec![1, 0], vec![1, 1], vec![1, 2]]);
    assert_eq!(TensorProductIterator::new(&[4, 1, 2]).count(), 8);
    assert_eq!(TensorProductIterator::new(&[]).count(), 0);
}

#[test]
fn check_full_grid_points()
{
    let rules = [NodeRule::unit(NodeRuleKind::Trapezoidal), NodeRule::new(NodeRuleKind::ClenshawCurtis, 2, -1.0, 1.0)];
    let grid = FullGrid::new(&rules, &[1, 0]).unwrap();
    assert_eq!(grid.shape(), vec![3, 1]);
    let points: Vec<Vec<f64>> = grid.points().collect();
    assert_eq!(points, vec![vec![0.0, 0.0], vec![0.5, 0.0], vec![1.0, 0.0]]);
    assert!(FullGrid::new(&rules, &[1]).is_err());
}

#[test]
fn check_integral()
{
    let rules = [NodeRule::new(NodeRuleKind::GaussLegendre, 2, 0.0, 2.0), NodeRule::new(NodeRuleKind::ClenshawCurtis, 2, -1.0, 1.0)];
    let grid = FullGrid::new(&rules, &[2, 3]).unwrap();
    // x^3 y^4 over [0,2]x[-1,1]
    let values = sample(&grid, |x| x[0].powi(3) * x[1].powi(4));
    let integral = grid.integral(&values, 1);
    assert!((integral[0] - 4.0 * 0.4).abs() < 1e-13);
}

#[test]
fn check_interpolation()
{
    let rules = [NodeRule::unit(NodeRuleKind::ClenshawCurtis), NodeRule::unit(NodeRuleKind::Trapezoidal)];
    let grid = FullGrid::new(&rules, &[3, 2]).unwrap();
    // polynomial in x, linear in y: reproduced exactly
    let f = |x: &[f64]| (1.0 + x[0] * x[0] * x[0]) * (2.0 - x[1]);
    let values: Vec<f64> = grid.points().flat_map(|p| [f(&p), -f(&p)]).collect();
    let mut y = [0.0; 2];
    grid.interpolate(&[0.3, 0.6], &values, &mut y, 1.0);
    assert!((y[0] - f(&[0.3, 0.6])).abs() < 1e-13);
    assert!((y[1] + f(&[0.3, 0.6])).abs() < 1e-13);
    let mut y = [1.0];
    let values = sample(&grid, f);
    grid.interpolate(&[0.25, 0.5], &values, &mut y, -2.0);
    assert!((y[0] - (1.0 - 2.0 * f(&[0.25, 0.5]))).abs() < 1e-13);
}

#[test]
fn check_spectral_projection()
{
    let rules = [NodeRule::new(NodeRuleKind::GaussLegendre, 2, -1.0, 1.0); 2];
    let grid = FullGrid::new(&rules, &[2, 2]).unwrap();
    assert_eq!(grid.lweights[0].max_degree, 4);
    let f = |x: &[f64]| 1.0 + x[0] * x[1] - x[1] * x[1];
    let coefficients = grid.spectral(&sample(&grid, f), 1);
    assert_eq!(coefficients.len(), 25);
    // constant term is the mean over the domain
    let mean = 1.0 - 1.0 / 3.0;
    assert!((coefficients[&vec![0, 0]][0] - mean).abs() < 1e-13);
    for point in [[0.1, -0.7], [0.9, 0.3]]
    {
        let u = [(point[0] + 1.0) / 2.0, (point[1] + 1.0) / 2.0];
        let y = evaluate_expansion(&coefficients, &u, 1);
        assert!((y[0] - f(&point)).abs() < 1e-12);
    }
}
