use std::collections::BTreeSet;

use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashMap};
use tracing::debug;

use crate::{bounded_sum_iterator::BoundedSumIterator, errors::{CombiError, Result}, utilities::multi_index_manipulation::weight_modifiers};

/// Per-dimension resolution levels identifying one full grid.
pub type LevelVector = Vec<u32>;

///
/// Result of one activation: the level vectors that became admissible and
/// every combination coefficient that changed (as `(level, new value)`).
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationDelta
{
    pub newly_admissible: Vec<LevelVector>,
    pub coefficient_changes: Vec<(LevelVector, i64)>,
}

impl ActivationDelta
{
    pub fn is_empty(&self) -> bool
    {
        self.newly_admissible.is_empty() && self.coefficient_changes.is_empty()
    }
}

///
/// Corners `(level - e, (-1)^|e|)` of the unit cube below `level`, with `e`
/// ranging over the subsets of dimensions where `level` lies above `minimum`.
/// The unshifted corner comes first.
///
pub(crate) fn lower_corners(level: &[u32], minimum: &[u32]) -> Vec<(LevelVector, i64)>
{
    let mut corners = vec![(level.to_owned(), 1)];
    for d in (0..level.len()).filter(|&d| level[d] > minimum[d])
    {
        let shifted: Vec<_> = corners.iter().map(|(l, sign)| {
            let mut l = l.clone();
            l[d] -= 1;
            (l, -sign)
        }).collect();
        corners.extend(shifted);
    }
    corners
}

///
/// Downward-closed set of active level vectors together with their
/// combination coefficients and the admissible frontier.
///
/// Coefficients follow the inclusion-exclusion rule
/// `c(l) = sum_{e in {0,1}^d} (-1)^|e| [l + e active]` and are updated
/// incrementally on every activation.
///
#[derive(Debug, Clone)]
pub struct MultiIndexSet
{
    ndim: usize,
    minimum: LevelVector,
    level_limits: Option<Vec<u32>>,
    active: IndexSet<LevelVector, FxBuildHasher>,
    coefficients: FxHashMap<LevelVector, i64>,
    frontier: BTreeSet<LevelVector>,
}

impl MultiIndexSet
{
    ///
    /// Empty set whose only admissible vector is the zero level vector.
    ///
    pub fn new(ndim: usize) -> Self
    {
        Self::with_minimum(vec![0; ndim])
    }

    pub fn with_minimum(minimum: LevelVector) -> Self
    {
        let ndim = minimum.len();
        let mut frontier = BTreeSet::new();
        frontier.insert(minimum.clone());
        Self { ndim, minimum, level_limits: None, active: IndexSet::with_hasher(FxBuildHasher), coefficients: FxHashMap::default(), frontier }
    }

    ///
    /// Restrict the frontier to level vectors with `l[d] <= limits[d]`. Already
    /// admissible vectors beyond the limits are dropped from the frontier.
    ///
    pub fn set_level_limits(&mut self, limits: Option<Vec<u32>>) -> Result<()>
    {
        if let Some(limits) = &limits
        {
            if limits.len() != self.ndim
            {
                return Err(CombiError::DimensionMismatch { expected: self.ndim, found: limits.len() });
            }
        }
        self.level_limits = limits;
        let limits = self.level_limits.clone();
        self.frontier.retain(|l| Self::within(limits.as_deref(), l));
        Ok(())
    }

    #[inline]
    fn within(limits: Option<&[u32]>, level: &[u32]) -> bool
    {
        limits.map_or(true, |limits| level.iter().zip(limits).all(|(l, m)| l <= m))
    }

    #[inline]
    pub fn ndim(&self) -> usize
    {
        self.ndim
    }

    pub fn minimum(&self) -> &[u32]
    {
        &self.minimum
    }

    pub fn level_limits(&self) -> Option<&[u32]>
    {
        self.level_limits.as_deref()
    }

    pub fn len(&self) -> usize
    {
        self.active.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    pub fn contains(&self, level: &[u32]) -> bool
    {
        self.active.contains(level)
    }

    /// Active level vectors in activation order.
    pub fn active(&self) -> impl Iterator<Item = &LevelVector>
    {
        self.active.iter()
    }

    /// Admissible, not yet active level vectors in lexicographic order.
    pub fn frontier(&self) -> &BTreeSet<LevelVector>
    {
        &self.frontier
    }

    /// Combination coefficient of `level`, zero for inactive vectors.
    pub fn coefficient(&self, level: &[u32]) -> i64
    {
        self.coefficients.get(level).copied().unwrap_or(0)
    }

    ///
    /// Coefficient of every active level vector, in activation order.
    ///
    pub fn combination_coefficients(&self) -> Vec<(LevelVector, i64)>
    {
        self.active.iter().map(|l| (l.clone(), self.coefficient(l))).collect()
    }

    fn check_dimension(&self, level: &[u32]) -> Result<()>
    {
        if level.len() != self.ndim
        {
            return Err(CombiError::DimensionMismatch { expected: self.ndim, found: level.len() });
        }
        Ok(())
    }

    /// Level vectors obtained by decrementing one coordinate, staying above the minimum.
    pub fn downward_neighbors(&self, level: &[u32]) -> Vec<LevelVector>
    {
        (0..self.ndim).filter(|&d| level[d] > self.minimum[d]).map(|d| {
            let mut neighbor = level.to_owned();
            neighbor[d] -= 1;
            neighbor
        }).collect()
    }

    pub fn upward_neighbors(&self, level: &[u32]) -> Vec<LevelVector>
    {
        (0..self.ndim).map(|d| {
            let mut neighbor = level.to_owned();
            neighbor[d] += 1;
            neighbor
        }).collect()
    }

    /// First downward neighbor of `level` that is not active.
    fn missing_neighbor(&self, level: &[u32]) -> Option<LevelVector>
    {
        self.downward_neighbors(level).into_iter().find(|n| !self.active.contains(n))
    }

    ///
    /// Whether `level` is inactive and all of its downward neighbors are active.
    ///
    pub fn is_admissible(&self, level: &[u32]) -> bool
    {
        level.len() == self.ndim
            && level.iter().zip(&self.minimum).all(|(l, m)| l >= m)
            && !self.active.contains(level)
            && self.missing_neighbor(level).is_none()
    }

    ///
    /// The error [`MultiIndexSet::activate`] would return for `level`, without
    /// changing anything. Active vectors pass.
    ///
    pub fn check_admissible(&self, level: &[u32]) -> Result<()>
    {
        self.check_dimension(level)?;
        if level.iter().zip(&self.minimum).any(|(l, m)| l < m)
        {
            return Err(CombiError::InvalidConfiguration(format!("{level:?} lies below the minimum level {:?}", self.minimum)));
        }
        if self.active.contains(level)
        {
            return Ok(());
        }
        match self.missing_neighbor(level)
        {
            Some(missing) => Err(CombiError::InvalidRefinementOrder { level: level.to_owned(), missing }),
            None => Ok(()),
        }
    }

    ///
    /// Activate `level`. Fails with `InvalidRefinementOrder` (leaving the set
    /// untouched) if a downward neighbor is inactive. Activating an already
    /// active vector is a no-op returning an empty delta.
    ///
    pub fn activate(&mut self, level: &[u32]) -> Result<ActivationDelta>
    {
        if self.active.contains(level)
        {
            return Ok(ActivationDelta::default());
        }
        self.check_admissible(level)?;

        // compute every change first so that an overflow leaves the set untouched
        let mut coefficient_changes = Vec::new();
        for (below, sign) in lower_corners(level, &self.minimum)
        {
            let updated = self.coefficient(&below).checked_add(sign)
                .ok_or_else(|| CombiError::NumericalDegeneracy(format!("combination coefficient of {below:?} overflows")))?;
            coefficient_changes.push((below, updated));
        }

        self.active.insert(level.to_owned());
        for (below, value) in &coefficient_changes
        {
            self.coefficients.insert(below.clone(), *value);
        }
        self.frontier.remove(level);

        let mut newly_admissible = Vec::new();
        for up in self.upward_neighbors(level)
        {
            if Self::within(self.level_limits.as_deref(), &up) && !self.frontier.contains(&up) && self.is_admissible(&up)
            {
                self.frontier.insert(up.clone());
                newly_admissible.push(up);
            }
        }
        debug!("activated {level:?}, {} newly admissible", newly_admissible.len());
        Ok(ActivationDelta { newly_admissible, coefficient_changes })
    }

    ///
    /// Remove `level` from the frontier without activating it. It will not be
    /// proposed again.
    ///
    pub fn reject(&mut self, level: &[u32]) -> bool
    {
        self.frontier.remove(level)
    }

    ///
    /// Every active vector has all of its downward neighbors active.
    ///
    pub fn is_downward_closed(&self) -> bool
    {
        self.active.iter().all(|l| self.missing_neighbor(l).is_none())
    }

    ///
    /// Coefficients recomputed from scratch by inclusion-exclusion, in activation order.
    ///
    pub fn recompute_coefficients(&self) -> Vec<(LevelVector, i64)>
    {
        self.active.iter().map(|level| {
            // l + e can only be active if every l + e_d with d in e is
            let mut corners = vec![(level.clone(), 1i64)];
            for d in (0..self.ndim).filter(|&d| self.active.contains(&Self::raised(level, d)))
            {
                let shifted: Vec<_> = corners.iter().map(|(l, sign)| (Self::raised(l, d), -sign)).collect();
                corners.extend(shifted);
            }
            let coefficient = corners.iter().filter(|(l, _)| self.active.contains(l)).map(|(_, sign)| sign).sum();
            (level.clone(), coefficient)
        }).collect()
    }

    #[inline]
    fn raised(level: &[u32], d: usize) -> LevelVector
    {
        let mut up = level.to_owned();
        up[d] += 1;
        up
    }

    ///
    /// Verify the incrementally maintained coefficients against both the
    /// inclusion-exclusion rule and the line-sweep algorithm of
    /// [`weight_modifiers`]. Fails with `NumericalDegeneracy` on disagreement.
    ///
    pub fn cross_check_coefficients(&self) -> Result<()>
    {
        let flattened: Vec<u32> = self.active.iter()
            .flat_map(|l| l.iter().zip(&self.minimum).map(|(l, m)| l - m)).collect();
        let swept = weight_modifiers(&flattened, self.ndim)?;
        for ((level, exact), swept) in self.recompute_coefficients().into_iter().zip(swept)
        {
            let stored = self.coefficient(&level);
            if stored != exact || exact as f64 != swept
            {
                return Err(CombiError::NumericalDegeneracy(format!(
                    "coefficient of {level:?}: stored {stored}, inclusion-exclusion {exact}, line sweep {swept}")));
            }
        }
        Ok(())
    }

    ///
    /// Classical regular sparse grid index set `|l - minimum|_1 <= level`, in
    /// lexicographic order (a valid activation order).
    ///
    pub fn regular_simplex(ndim: usize, level: u32) -> Vec<LevelVector>
    {
        BoundedSumIterator::simplex(ndim, level).collect()
    }
}

#[cfg(test)]
fn binomial(n: i64, k: i64) -> i64
{
    (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

#[test]
fn check_invalid_refinement_order()
{
    let mut set = MultiIndexSet::new(2);
    set.activate(&[0, 0]).unwrap();
    set.activate(&[1, 0]).unwrap();
    let frontier = set.frontier().clone();
    let coefficients = set.combination_coefficients();
    let err = set.activate(&[1, 1]).unwrap_err();
    assert_eq!(err, CombiError::InvalidRefinementOrder { level: vec![1, 1], missing: vec![0, 1] });
    assert_eq!(set.len(), 2);
    assert_eq!(set.frontier(), &frontier);
    assert_eq!(set.combination_coefficients(), coefficients);
    assert!(set.is_downward_closed());
    assert!(matches!(set.activate(&[0, 0, 0]), Err(CombiError::DimensionMismatch { .. })));
}

#[test]
fn check_duplicate_activation()
{
    let mut set = MultiIndexSet::new(3);
    let delta = set.activate(&[0, 0, 0]).unwrap();
    assert_eq!(delta.newly_admissible, vec![vec![1, 0, 0], vec![0, 1, 0], vec![0, 0, 1]]);
    assert_eq!(delta.coefficient_changes, vec![(vec![0, 0, 0], 1)]);
    assert!(set.activate(&[0, 0, 0]).unwrap().is_empty());
    assert_eq!(set.len(), 1);
}

#[test]
fn check_frontier()
{
    let mut set = MultiIndexSet::new(2);
    assert_eq!(set.frontier().iter().cloned().collect::<Vec<_>>(), vec![vec![0, 0]]);
    set.activate(&[0, 0]).unwrap();
    set.activate(&[1, 0]).unwrap();
    // (1,1) needs (0,1) first
    assert_eq!(set.frontier().iter().cloned().collect::<Vec<_>>(), vec![vec![0, 1], vec![2, 0]]);
    let delta = set.activate(&[0, 1]).unwrap();
    assert_eq!(delta.newly_admissible, vec![vec![1, 1], vec![0, 2]]);
    assert!(set.is_admissible(&[1, 1]));
    assert!(!set.is_admissible(&[1, 2]));
    assert!(!set.is_admissible(&[0, 1]));
}

#[test]
fn check_level_limits()
{
    let mut set = MultiIndexSet::new(2);
    set.set_level_limits(Some(vec![1, 0])).unwrap();
    set.activate(&[0, 0]).unwrap();
    set.activate(&[1, 0]).unwrap();
    assert!(set.frontier().is_empty());
    assert!(set.set_level_limits(Some(vec![1])).is_err());
}

#[test]
fn check_simplex_coefficients()
{
    // classical identity: c(l) = (-1)^q binomial(d-1, q) on |l| = n - q, and the sum is one
    for ndim in 1..5
    {
        for level in 0..5
        {
            let mut set = MultiIndexSet::new(ndim);
            for l in MultiIndexSet::regular_simplex(ndim, level)
            {
                set.activate(&l).unwrap();
            }
            assert!(set.is_downward_closed());
            let coefficients = set.combination_coefficients();
            assert_eq!(coefficients.iter().map(|(_, c)| c).sum::<i64>(), 1);
            for (l, c) in &coefficients
            {
                let q = level as i64 - l.iter().sum::<u32>() as i64;
                let expected = if q < ndim as i64 { (-1i64).pow(q as u32) * binomial(ndim as i64 - 1, q) } else { 0 };
                assert_eq!(*c, expected, "d={ndim} n={level} l={l:?}");
            }
            assert_eq!(set.recompute_coefficients(), coefficients);
            set.cross_check_coefficients().unwrap();
        }
    }
}

#[test]
fn check_irregular_coefficients()
{
    // dimension adaptive, non-simplex set
    let mut set = MultiIndexSet::new(3);
    for l in [[0, 0, 0], [1, 0, 0], [2, 0, 0], [0, 1, 0], [1, 1, 0], [0, 0, 1], [3, 0, 0], [0, 0, 2], [1, 0, 1], [2, 1, 0]]
    {
        set.activate(&l).unwrap();
        assert!(set.is_downward_closed());
        assert_eq!(set.combination_coefficients().iter().map(|(_, c)| c).sum::<i64>(), 1);
        set.cross_check_coefficients().unwrap();
    }
}

#[test]
fn check_shifted_minimum()
{
    let mut set = MultiIndexSet::with_minimum(vec![1, 1]);
    assert!(matches!(set.activate(&[0, 1]), Err(CombiError::InvalidConfiguration(_))));
    set.activate(&[1, 1]).unwrap();
    set.activate(&[2, 1]).unwrap();
    set.activate(&[1, 2]).unwrap();
    assert_eq!(set.coefficient(&[1, 1]), -1);
    assert_eq!(set.coefficient(&[2, 1]), 1);
    set.cross_check_coefficients().unwrap();
}

#[test]
fn check_high_dimensional_activation()
{
    let ndim = 32;
    let mut set = MultiIndexSet::new(ndim);
    let unit = |d: usize| {
        let mut l = vec![0; ndim];
        l[d] = 1;
        l
    };
    set.activate(&vec![0; ndim]).unwrap();
    set.activate(&unit(0)).unwrap();
    let delta = set.activate(&unit(1)).unwrap();
    // only the vectors below (0,1,0,...) are touched
    assert_eq!(delta.coefficient_changes.len(), 2);
    let mut mixed = unit(0);
    mixed[1] = 1;
    assert!(set.frontier().contains(&mixed));
    let delta = set.activate(&mixed).unwrap();
    assert_eq!(delta.coefficient_changes.len(), 4);
    assert_eq!(set.coefficient(&mixed), 1);
    assert_eq!(set.coefficient(&unit(0)), 0);
    assert_eq!(set.coefficient(&unit(1)), 0);
    assert_eq!(set.coefficient(&vec![0; ndim]), 0);
    // the remaining unit vectors plus (2,0,...) and (0,2,...)
    assert_eq!(set.frontier().len(), ndim);
    set.cross_check_coefficients().unwrap();

    for l in MultiIndexSet::regular_simplex(ndim, 2)
    {
        set.activate(&l).unwrap();
    }
    assert_eq!(set.len(), 1 + ndim + ndim * (ndim + 1) / 2);
    assert_eq!(set.combination_coefficients().iter().map(|(_, c)| c).sum::<i64>(), 1);
    set.cross_check_coefficients().unwrap();
}
