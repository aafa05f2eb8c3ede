use thiserror::Error;

pub type Result<T> = std::result::Result<T, CombiError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CombiError
{
    /// Attempted to activate a level vector whose downward neighbor `missing` is not active.
    #[error("invalid refinement order: {level:?} requires {missing:?} to be active")]
    InvalidRefinementOrder { level: Vec<u32>, missing: Vec<u32> },
    /// The objective failed (or returned an unusable value) at `point`.
    #[error("evaluation failed at {point:?}: {cause}")]
    EvaluationFailed { point: Vec<f64>, cause: String },
    /// Non-distinct nodes, overflowing coefficients or inconsistent persisted coefficients.
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("serialization failed")]
    SerializationFailed,
    #[error("deserialization failed")]
    DeserializationFailed,
    #[error("LZ4 decompression failed")]
    LZ4DecompressionFailed,
    #[error("file I/O error: {0}")]
    FileIOError(String),
}

impl CombiError
{
    /// The offending point, if this error originates from the objective.
    pub fn point(&self) -> Option<&[f64]>
    {
        match self
        {
            CombiError::EvaluationFailed { point, .. } => Some(point),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CombiError
{
    fn from(value: std::io::Error) -> Self {
        CombiError::FileIOError(value.to_string())
    }
}

impl From<config::ConfigError> for CombiError
{
    fn from(value: config::ConfigError) -> Self {
        CombiError::InvalidConfiguration(value.to_string())
    }
}

#[test]
fn check_error_messages()
{
    let err = CombiError::InvalidRefinementOrder { level: vec![1, 1], missing: vec![0, 1] };
    assert_eq!(err.to_string(), "invalid refinement order: [1, 1] requires [0, 1] to be active");
    assert!(err.point().is_none());
    let err = CombiError::EvaluationFailed { point: vec![0.5], cause: "boom".to_string() };
    assert_eq!(err.point(), Some(&[0.5][..]));
}
