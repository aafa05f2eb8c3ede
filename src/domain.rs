use serde::{Deserialize, Serialize};

use crate::errors::{CombiError, Result};

///
/// Axis-aligned integration/interpolation domain. Node rules are defined
/// on the unit interval and mapped into this box.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox
{
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl BoundingBox
{
    pub fn new(lower: &[f64], upper: &[f64]) -> Self
    {
        Self { lower: lower.to_owned(), upper: upper.to_owned() }
    }

    pub fn unit(ndim: usize) -> Self
    {
        Self { lower: vec![0.0; ndim], upper: vec![1.0; ndim] }
    }

    ///
    /// Build from per-dimension `[lower, upper]` pairs.
    ///
    pub fn from_bounds(bounds: &[[f64; 2]]) -> Self
    {
        Self { lower: bounds.iter().map(|b| b[0]).collect(), upper: bounds.iter().map(|b| b[1]).collect() }
    }

    #[inline]
    pub fn ndim(&self) -> usize
    {
        self.lower.len()
    }

    #[inline]
    pub fn width(&self, dim: usize) -> f64
    {
        self.upper[dim] - self.lower[dim]
    }

    ///
    /// Volume of hypercube (width(dim1)*...*width(dim_n))
    ///
    pub fn volume(&self) -> f64
    {
        (0..self.ndim()).map(|d| self.width(d)).product()
    }

    pub fn to_unit_coordinate(&self, point: &[f64]) -> Vec<f64>
    {
        point.iter().enumerate().map(|(d, &x)| (x - self.lower[d]) / self.width(d)).collect()
    }

    #[inline]
    pub fn real_coordinate(&self, x: f64, dim: usize) -> f64
    {
        self.lower[dim] + self.width(dim) * x
    }

    pub fn contains(&self, point: &[f64]) -> bool
    {
        point.iter().enumerate().all(|(d, &x)| self.lower[d] <= x && x <= self.upper[d])
    }

    pub fn validate(&self) -> Result<()>
    {
        if self.lower.len() != self.upper.len()
        {
            return Err(CombiError::DimensionMismatch { expected: self.lower.len(), found: self.upper.len() });
        }
        for d in 0..self.ndim()
        {
            if !self.lower[d].is_finite() || !self.upper[d].is_finite() || self.lower[d] >= self.upper[d]
            {
                return Err(CombiError::InvalidConfiguration(format!(
                    "bounds of dimension {d} must be finite with lower < upper, found [{}, {}]", self.lower[d], self.upper[d])));
            }
        }
        Ok(())
    }
}

#[test]
fn check_bounding_box()
{
    let bbox = BoundingBox::from_bounds(&[[-1.0, 1.0], [0.0, 4.0]]);
    assert_eq!(bbox.volume(), 8.0);
    assert_eq!(bbox.real_coordinate(0.5, 1), 2.0);
    assert_eq!(bbox.to_unit_coordinate(&[0.0, 1.0]), vec![0.5, 0.25]);
    assert!(bbox.contains(&[1.0, 4.0]));
    assert!(!bbox.contains(&[1.5, 0.0]));
    assert!(BoundingBox::new(&[1.0], &[1.0]).validate().is_err());
}
