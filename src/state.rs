use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{cache::CacheEntry, config::CombiConfig, multi_index::LevelVector};

///
/// Plain-data snapshot of an engine, enough to resume a refinement run:
/// active level vectors with their coefficients, the evaluation cache and
/// the run counters.
///
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState
{
    pub config: CombiConfig,
    pub num_outputs: usize,
    #[serde_as(as = "Vec<(_, _)>")]
    pub active: BTreeMap<LevelVector, i64>,
    pub cache: Vec<CacheEntry>,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub iterations: usize,
    /// Candidates dropped after failed evaluations.
    pub rejected: Vec<LevelVector>,
}

impl EngineState
{
    /// Number of objective evaluations spent so far.
    pub fn evaluations(&self) -> usize
    {
        self.cache_misses
    }

    ///
    /// Active level vectors in an order that keeps every prefix downward
    /// closed: by level sum, then lexicographically.
    ///
    pub fn activation_order(&self) -> Vec<LevelVector>
    {
        let mut levels: Vec<LevelVector> = self.active.keys().cloned().collect();
        levels.sort_by(|a, b| a.iter().sum::<u32>().cmp(&b.iter().sum::<u32>()).then_with(|| a.cmp(b)));
        levels
    }
}

#[test]
fn check_activation_order()
{
    let state = EngineState
    {
        config: CombiConfig::new(2, crate::rules::NodeRuleKind::Trapezoidal),
        num_outputs: 1,
        active: [(vec![0, 0], 0), (vec![0, 1], 0), (vec![2, 0], 1), (vec![1, 0], 0), (vec![1, 1], 1), (vec![0, 2], 1)].into_iter().collect(),
        cache: Vec::new(),
        cache_hits: 0,
        cache_misses: 0,
        iterations: 5,
        rejected: Vec::new(),
    };
    assert_eq!(state.activation_order(), vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![0, 2], vec![1, 1], vec![2, 0]]);
    // maps with vector keys survive a JSON round trip as a list of pairs
    let json = serde_json::to_string(&state).unwrap();
    assert!(json.contains("\"active\":[[[0,0],0]"));
    let restored: EngineState = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, state);
}
