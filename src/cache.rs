use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};

use crate::errors::{CombiError, Result};

/// Bit pattern of a full-dimensional coordinate.
pub type CacheKey = Vec<u64>;

///
/// Bit-exact key of a point. Node rules reproduce coordinates bit for bit,
/// so exact equality is sufficient; `-0.0` is folded onto `0.0`.
///
#[inline]
pub fn point_key(point: &[f64]) -> CacheKey
{
    point.iter().map(|&x| if x == 0.0 { 0 } else { x.to_bits() }).collect()
}

/// One persisted cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry
{
    pub point: Vec<f64>,
    pub value: Vec<f64>,
}

///
/// Point-keyed table of objective values shared by every full grid of one
/// engine. Entries are never evicted or overwritten. Every lookup through
/// [`EvaluationCache::get`] counts as either a hit or a miss.
///
#[derive(Debug, Clone)]
pub struct EvaluationCache
{
    ndim: usize,
    num_outputs: usize,
    values: IndexMap<CacheKey, (Vec<f64>, Vec<f64>), FxBuildHasher>,
    hits: usize,
    misses: usize,
}

impl EvaluationCache
{
    pub fn new(ndim: usize, num_outputs: usize) -> Self
    {
        Self { ndim, num_outputs, values: IndexMap::with_hasher(FxBuildHasher), hits: 0, misses: 0 }
    }

    #[inline]
    pub fn ndim(&self) -> usize
    {
        self.ndim
    }

    #[inline]
    pub fn num_outputs(&self) -> usize
    {
        self.num_outputs
    }

    /// Number of stored points.
    pub fn len(&self) -> usize
    {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    pub fn hits(&self) -> usize
    {
        self.hits
    }

    pub fn misses(&self) -> usize
    {
        self.misses
    }

    /// Total number of lookups.
    pub fn requests(&self) -> usize
    {
        self.hits + self.misses
    }

    ///
    /// Look up the value at `point`, counting a hit or a miss.
    ///
    pub fn get(&mut self, point: &[f64]) -> Option<&[f64]>
    {
        match self.values.get(&point_key(point))
        {
            Some((_, value)) =>
            {
                self.hits += 1;
                Some(value.as_slice())
            },
            None =>
            {
                self.misses += 1;
                None
            }
        }
    }

    /// Look up without touching the statistics.
    pub fn peek(&self, point: &[f64]) -> Option<&[f64]>
    {
        self.values.get(&point_key(point)).map(|(_, value)| value.as_slice())
    }

    pub fn contains(&self, point: &[f64]) -> bool
    {
        self.values.contains_key(&point_key(point))
    }

    ///
    /// Store `value` at `point`. An existing entry is kept, since the objective
    /// is deterministic.
    ///
    pub fn put(&mut self, point: &[f64], value: Vec<f64>) -> Result<()>
    {
        if point.len() != self.ndim
        {
            return Err(CombiError::DimensionMismatch { expected: self.ndim, found: point.len() });
        }
        if value.len() != self.num_outputs
        {
            return Err(CombiError::DimensionMismatch { expected: self.num_outputs, found: value.len() });
        }
        self.values.entry(point_key(point)).or_insert_with(|| (point.to_vec(), value));
        Ok(())
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&[f64], &[f64])>
    {
        self.values.values().map(|(point, value)| (point.as_slice(), value.as_slice()))
    }

    pub fn export(&self) -> Vec<CacheEntry>
    {
        self.entries().map(|(point, value)| CacheEntry { point: point.to_vec(), value: value.to_vec() }).collect()
    }

    ///
    /// Rebuild a cache from persisted entries and statistics.
    ///
    pub fn import(ndim: usize, num_outputs: usize, entries: &[CacheEntry], hits: usize, misses: usize) -> Result<Self>
    {
        let mut cache = Self::new(ndim, num_outputs);
        for entry in entries
        {
            cache.put(&entry.point, entry.value.clone())?;
        }
        cache.set_statistics(hits, misses);
        Ok(cache)
    }

    pub(crate) fn set_statistics(&mut self, hits: usize, misses: usize)
    {
        self.hits = hits;
        self.misses = misses;
    }
}

#[test]
fn check_hit_and_miss_accounting()
{
    let mut cache = EvaluationCache::new(2, 1);
    assert!(cache.get(&[0.5, 0.25]).is_none());
    cache.put(&[0.5, 0.25], vec![1.0]).unwrap();
    assert_eq!(cache.get(&[0.5, 0.25]), Some(&[1.0][..]));
    assert_eq!(cache.get(&[0.5, 0.25]), Some(&[1.0][..]));
    assert!(cache.get(&[0.25, 0.5]).is_none());
    assert_eq!((cache.hits(), cache.misses(), cache.requests()), (2, 2, 4));
    assert!(cache.peek(&[0.25, 0.5]).is_none());
    assert_eq!(cache.requests(), 4);
}

#[test]
fn check_keys()
{
    let mut cache = EvaluationCache::new(1, 1);
    cache.put(&[-0.0], vec![3.0]).unwrap();
    assert!(cache.contains(&[0.0]));
    // no approximate matching
    assert!(!cache.contains(&[1e-300]));
    cache.put(&[0.0], vec![4.0]).unwrap();
    assert_eq!(cache.peek(&[0.0]), Some(&[3.0][..]));
    assert!(cache.put(&[0.0, 1.0], vec![1.0]).is_err());
    assert!(cache.put(&[1.0], vec![1.0, 2.0]).is_err());
}

#[test]
fn check_export_import()
{
    let mut cache = EvaluationCache::new(1, 2);
    cache.put(&[0.1], vec![1.0, 2.0]).unwrap();
    cache.put(&[0.2], vec![3.0, 4.0]).unwrap();
    let entries = cache.export();
    let restored = EvaluationCache::import(1, 2, &entries, 5, 2).unwrap();
    assert_eq!(restored.export(), entries);
    assert_eq!(restored.hits(), 5);
    assert_eq!(restored.misses(), 2);
}
