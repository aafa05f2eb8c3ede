use serde::{Deserialize, Serialize};

use crate::{domain::BoundingBox, errors::{CombiError, Result}, one_dimensional_nodes::NodeRule, rules::NodeRuleKind};

/// Prefix of environment variables overriding file settings, e.g. `SGCOMBI_TOLERANCE`.
pub const ENV_PREFIX: &str = "SGCOMBI";

/// Largest supported dimension.
pub const MAX_DIMENSION: usize = 32;

/// How candidates are scored.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorStrategy
{
    /// Magnitude of the contribution a candidate adds to the combination.
    #[default]
    Surplus,
    /// Error reduction measured against a reference solution.
    Analytic,
}

/// Which frontier candidates are evaluated before one is picked.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CandidateSelection
{
    /// Every admissible candidate is evaluated and ranked by its own score.
    #[default]
    Evaluated,
    /// Candidates are ranked by the average surplus of their downward
    /// neighbors; only the chosen one is evaluated.
    Estimated,
}

/// What the combined sparse grid approximates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApproximationMode
{
    #[default]
    Quadrature,
    Interpolation,
    /// Projection onto an orthonormal Legendre basis.
    Spectral,
}

///
/// Engine settings. Keys are snake_case in configuration files, the camelCase
/// spellings are accepted as aliases.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombiConfig
{
    pub dimension: usize,
    #[serde(alias = "nodeRule")]
    pub node_rule: NodeRuleKind,
    #[serde(alias = "growthFactor")]
    pub growth_factor: u32,
    /// Per-dimension `[lower, upper]`; empty means the unit cube.
    #[serde(alias = "domainBounds")]
    pub domain_bounds: Vec<[f64; 2]>,
    pub tolerance: f64,
    /// Cap on the number of objective evaluations.
    #[serde(alias = "evaluationBudget")]
    pub evaluation_budget: usize,
    #[serde(alias = "errorStrategy")]
    pub error_strategy: ErrorStrategy,
    #[serde(alias = "candidateSelection")]
    pub candidate_selection: CandidateSelection,
    pub mode: ApproximationMode,
    /// Weight between surplus magnitude and cost, in `[0, 1]`. One scores by surplus only.
    #[serde(alias = "costWeight")]
    pub cost_weight: f64,
    #[serde(alias = "levelLimits")]
    pub level_limits: Option<Vec<u32>>,
    #[serde(alias = "maxIterations")]
    pub max_iterations: Option<usize>,
    /// Activate every evaluated frontier candidate when the run terminates.
    #[serde(alias = "absorbFrontier")]
    pub absorb_frontier: bool,
    /// Drop candidates whose evaluation fails instead of failing the run.
    #[serde(alias = "skipFailedCandidates")]
    pub skip_failed_candidates: bool,
    /// Evaluate the points of one full grid on the rayon thread pool.
    pub parallel: bool,
    /// `EnvFilter` directive used by [`crate::logger::setup_log`].
    #[serde(alias = "logLevel")]
    pub log_level: String,
}

impl Default for CombiConfig
{
    fn default() -> Self
    {
        Self
        {
            dimension: 1,
            node_rule: NodeRuleKind::default(),
            growth_factor: 2,
            domain_bounds: Vec::new(),
            tolerance: 1e-6,
            evaluation_budget: 10_000,
            error_strategy: ErrorStrategy::default(),
            candidate_selection: CandidateSelection::default(),
            mode: ApproximationMode::default(),
            cost_weight: 1.0,
            level_limits: None,
            max_iterations: None,
            absorb_frontier: true,
            skip_failed_candidates: false,
            parallel: false,
            log_level: "info".to_string(),
        }
    }
}

impl CombiConfig
{
    /// Default settings for `dimension` on the unit cube.
    pub fn new(dimension: usize, node_rule: NodeRuleKind) -> Self
    {
        Self { dimension, node_rule, ..Default::default() }
    }

    ///
    /// Load settings from a file (format inferred from the extension) layered
    /// with `SGCOMBI_*` environment overrides, then validate them.
    ///
    pub fn from_file(path: &str) -> Result<Self>
    {
        let parsed = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let settings: CombiConfig = parsed.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse and validate settings from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self>
    {
        let parsed = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?;
        let settings: CombiConfig = parsed.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn bounding_box(&self) -> BoundingBox
    {
        if self.domain_bounds.is_empty()
        {
            BoundingBox::unit(self.dimension)
        }
        else
        {
            BoundingBox::from_bounds(&self.domain_bounds)
        }
    }

    /// One node rule per dimension, mapped onto the domain.
    pub fn node_rules(&self) -> Vec<NodeRule>
    {
        let bbox = self.bounding_box();
        (0..self.dimension).map(|d| NodeRule::new(self.node_rule, self.growth_factor, bbox.lower[d], bbox.upper[d])).collect()
    }

    pub fn validate(&self) -> Result<()>
    {
        let invalid = |message: String| Err(CombiError::InvalidConfiguration(message));
        if self.dimension == 0 || self.dimension > MAX_DIMENSION
        {
            return invalid(format!("dimension must lie in 1..={MAX_DIMENSION}, found {}", self.dimension));
        }
        if !self.domain_bounds.is_empty() && self.domain_bounds.len() != self.dimension
        {
            return invalid(format!("{} domain bounds given for dimension {}", self.domain_bounds.len(), self.dimension));
        }
        self.bounding_box().validate()?;
        if !self.tolerance.is_finite() || self.tolerance <= 0.0
        {
            return invalid(format!("tolerance must be positive, found {}", self.tolerance));
        }
        match self.node_rule
        {
            NodeRuleKind::GaussLegendre if self.growth_factor < 1 =>
                return invalid("growth factor of the gauss rule must be at least 1".to_string()),
            NodeRuleKind::Trapezoidal if self.growth_factor < 2 =>
                return invalid("growth factor of nested rules must be at least 2".to_string()),
            NodeRuleKind::ClenshawCurtis | NodeRuleKind::Symmetric if self.growth_factor < 2 || self.growth_factor % 2 != 0 =>
                return invalid(format!("{:?} needs an even growth factor to keep the center node, found {}", self.node_rule, self.growth_factor)),
            _ => {},
        }
        if self.error_strategy == ErrorStrategy::Analytic && self.candidate_selection == CandidateSelection::Estimated
        {
            return invalid("the analytic strategy scores evaluated candidates only".to_string());
        }
        if !(0.0..=1.0).contains(&self.cost_weight)
        {
            return invalid(format!("cost weight must lie in [0, 1], found {}", self.cost_weight));
        }
        if let Some(limits) = &self.level_limits
        {
            if limits.len() != self.dimension
            {
                return invalid(format!("{} level limits given for dimension {}", limits.len(), self.dimension));
            }
        }
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.log_level)
        {
            return invalid(format!("invalid log level {:?}: {e}", self.log_level));
        }
        Ok(())
    }
}

#[test]
fn check_defaults()
{
    let settings = CombiConfig::default();
    settings.validate().unwrap();
    assert_eq!(settings.growth_factor, 2);
    assert_eq!(settings.tolerance, 1e-6);
    assert_eq!(settings.evaluation_budget, 10_000);
    assert!(settings.absorb_frontier);
    assert!(!settings.skip_failed_candidates);
    assert_eq!(settings.bounding_box(), BoundingBox::unit(1));
}

#[test]
fn check_toml()
{
    let settings = CombiConfig::from_toml(r#"
        dimension = 2
        node_rule = "clenshawCurtis"
        domain_bounds = [[-1.0, 1.0], [0.0, 2.0]]
        tolerance = 1e-4
        evaluation_budget = 800
        error_strategy = "surplus"
        mode = "interpolation"
        level_limits = [4, 6]
        candidate_selection = "estimated"
        log_level = "sgcombi=debug"
    "#).unwrap();
    assert_eq!(settings.candidate_selection, CandidateSelection::Estimated);
    assert_eq!(settings.log_level, "sgcombi=debug");
    assert_eq!(settings.node_rule, NodeRuleKind::ClenshawCurtis);
    assert_eq!(settings.mode, ApproximationMode::Interpolation);
    assert_eq!(settings.evaluation_budget, 800);
    assert_eq!(settings.level_limits, Some(vec![4, 6]));
    assert_eq!(settings.bounding_box().volume(), 4.0);
    let rules = settings.node_rules();
    assert_eq!((rules[1].lower, rules[1].upper), (0.0, 2.0));
}

#[test]
fn check_camel_case_json()
{
    let settings: CombiConfig = serde_json::from_str(r#"{"dimension": 3, "nodeRule": "gauss", "growthFactor": 1, "evaluationBudget": 50}"#).unwrap();
    assert_eq!(settings.node_rule, NodeRuleKind::GaussLegendre);
    assert_eq!(settings.evaluation_budget, 50);
    settings.validate().unwrap();
}

#[test]
fn check_validation()
{
    let invalid = |settings: CombiConfig| matches!(settings.validate(), Err(CombiError::InvalidConfiguration(_)));
    assert!(invalid(CombiConfig { dimension: 0, ..Default::default() }));
    assert!(invalid(CombiConfig { tolerance: -1.0, ..Default::default() }));
    assert!(invalid(CombiConfig { domain_bounds: vec![[1.0, 0.0]], ..Default::default() }));
    assert!(invalid(CombiConfig { domain_bounds: vec![[0.0, 1.0]; 2], ..Default::default() }));
    assert!(invalid(CombiConfig { node_rule: NodeRuleKind::ClenshawCurtis, growth_factor: 3, ..Default::default() }));
    assert!(invalid(CombiConfig { cost_weight: 1.5, ..Default::default() }));
    assert!(invalid(CombiConfig { level_limits: Some(vec![1, 2]), ..Default::default() }));
    assert!(invalid(CombiConfig { error_strategy: ErrorStrategy::Analytic, candidate_selection: CandidateSelection::Estimated, ..Default::default() }));
    assert!(invalid(CombiConfig { log_level: "sgcombi=notalevel".to_string(), ..Default::default() }));
    assert!(CombiConfig { node_rule: NodeRuleKind::Trapezoidal, growth_factor: 3, ..Default::default() }.validate().is_ok());
}
