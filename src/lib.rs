pub mod algorithms;
pub mod bounded_sum_iterator;
pub mod cache;
pub mod combination;
pub mod config;
pub mod domain;
pub mod errors;
pub mod estimator;
pub mod evaluator;
pub mod grids;
pub mod logger;
pub mod multi_index;
pub mod objective;
pub mod one_dimensional_nodes;
pub mod refinement;
pub mod rules;
pub mod serialization;
pub mod state;
pub(crate) mod tables;
pub mod utilities;

pub use crate::{cache::EvaluationCache, combination::{Aggregate, CombinationOperator}, config::{ApproximationMode, CandidateSelection, CombiConfig, ErrorStrategy}, domain::BoundingBox, errors::{CombiError, Result}, estimator::{ErrorEstimator, ReferenceSolution}, evaluator::{FullGridEvaluator, PartialResult}, multi_index::{ActivationDelta, LevelVector, MultiIndexSet}, objective::{FallibleFunction, Objective, ObjectiveError, ScalarFunction, VectorFunction}, one_dimensional_nodes::NodeRule, refinement::{AdaptiveCombinationGrid, RefinementState, RunReport}, rules::NodeRuleKind, serialization::SerializationFormat, state::EngineState};
