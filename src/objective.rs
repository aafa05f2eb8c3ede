use thiserror::Error;

///
/// Failure reported by an objective function. The evaluator attaches the
/// offending point and turns it into `CombiError::EvaluationFailed`.
///
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ObjectiveError(pub String);

impl ObjectiveError
{
    pub fn new(message: impl Into<String>) -> Self
    {
        Self(message.into())
    }
}

///
/// Deterministic, pure target function `f: R^d -> R^m`. Values are cached by
/// point, so repeated calls with the same point must return the same result.
///
pub trait Objective: Sync
{
    /// Number of outputs `m`.
    fn num_outputs(&self) -> usize
    {
        1
    }

    fn eval(&self, point: &[f64]) -> Result<Vec<f64>, ObjectiveError>;
}

/// Scalar objective from a plain closure.
pub struct ScalarFunction<F>(pub F);

impl<F: Fn(&[f64]) -> f64 + Sync> Objective for ScalarFunction<F>
{
    fn eval(&self, point: &[f64]) -> Result<Vec<f64>, ObjectiveError>
    {
        Ok(vec![(self.0)(point)])
    }
}

/// Scalar objective that may fail.
pub struct FallibleFunction<F>(pub F);

impl<F: Fn(&[f64]) -> Result<f64, ObjectiveError> + Sync> Objective for FallibleFunction<F>
{
    fn eval(&self, point: &[f64]) -> Result<Vec<f64>, ObjectiveError>
    {
        (self.0)(point).map(|v| vec![v])
    }
}

/// Vector-valued objective with a fixed number of outputs.
pub struct VectorFunction<F>
{
    pub num_outputs: usize,
    pub function: F,
}

impl<F: Fn(&[f64]) -> Vec<f64> + Sync> VectorFunction<F>
{
    pub fn new(num_outputs: usize, function: F) -> Self
    {
        Self { num_outputs, function }
    }
}

impl<F: Fn(&[f64]) -> Vec<f64> + Sync> Objective for VectorFunction<F>
{
    fn num_outputs(&self) -> usize
    {
        self.num_outputs
    }

    fn eval(&self, point: &[f64]) -> Result<Vec<f64>, ObjectiveError>
    {
        Ok((self.function)(point))
    }
}

///
/// Objective that is never available. Used to rebuild grids purely from
/// cached values, any cache miss becomes an evaluation failure.
///
pub(crate) struct CacheOnly
{
    pub num_outputs: usize,
}

impl Objective for CacheOnly
{
    fn num_outputs(&self) -> usize
    {
        self.num_outputs
    }

    fn eval(&self, _point: &[f64]) -> Result<Vec<f64>, ObjectiveError>
    {
        Err(ObjectiveError::new("point is missing from the restored evaluation cache"))
    }
}

#[test]
fn check_objective_wrappers()
{
    let f = ScalarFunction(|x: &[f64]| x[0] + x[1]);
    assert_eq!(f.eval(&[1.0, 2.0]).unwrap(), vec![3.0]);
    assert_eq!(f.num_outputs(), 1);
    let g = FallibleFunction(|x: &[f64]| if x[0] < 0.0 { Err(ObjectiveError::new("negative")) } else { Ok(x[0].sqrt()) });
    assert_eq!(g.eval(&[-1.0]).unwrap_err().to_string(), "negative");
    let h = VectorFunction::new(2, |x: &[f64]| vec![x[0], 2.0 * x[0]]);
    assert_eq!(h.num_outputs(), 2);
    assert_eq!(h.eval(&[0.5]).unwrap(), vec![0.5, 1.0]);
    assert!(CacheOnly { num_outputs: 1 }.eval(&[0.0]).is_err());
}
