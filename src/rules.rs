use serde::{Deserialize, Serialize};

/// Closed set of one-dimensional node rules. Selected once at configuration time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeRuleKind
{
    /// Equispaced nodes including both ends, trapezoidal weights. Nested.
    #[default]
    Trapezoidal,
    /// Classic nested rule using Chebyshev extrema with very low Lebesgue constant.
    ClenshawCurtis,
    /// Gauss-Legendre nodes. Not nested, highest polynomial exactness.
    #[serde(rename = "gauss", alias = "gaussLegendre")]
    GaussLegendre,
    /// Open equispaced nodes whose count grows geometrically while keeping the center node.
    Symmetric,
}

impl NodeRuleKind
{
    pub fn is_nested(&self) -> bool
    {
        !matches!(self, NodeRuleKind::GaussLegendre)
    }

    pub fn interpolation(&self) -> InterpolationKind
    {
        match self
        {
            NodeRuleKind::Trapezoidal | NodeRuleKind::Symmetric => InterpolationKind::PiecewiseLinear,
            NodeRuleKind::ClenshawCurtis | NodeRuleKind::GaussLegendre => InterpolationKind::Lagrange,
        }
    }
}

/// How a single full grid is interpolated along one dimension.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationKind
{
    /// Hat functions on the nodes, constant outside the outermost nodes.
    PiecewiseLinear,
    /// Global polynomial through all nodes (barycentric form).
    Lagrange,
}

#[test]
fn check_rule_names()
{
    let kind: NodeRuleKind = serde_json::from_str("\"clenshawCurtis\"").unwrap();
    assert_eq!(kind, NodeRuleKind::ClenshawCurtis);
    let kind: NodeRuleKind = serde_json::from_str("\"gauss\"").unwrap();
    assert_eq!(kind, NodeRuleKind::GaussLegendre);
    assert!(!kind.is_nested());
    assert_eq!(serde_json::to_string(&NodeRuleKind::Symmetric).unwrap(), "\"symmetric\"");
}
