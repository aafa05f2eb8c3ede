// Barycentric Lagrange interpolation along one dimension.

///
/// Compute the Lagrange basis polynomials at a given point `x` for
/// interpolation `points` with barycentric coefficients `coeffs`.
///
#[inline]
pub fn lagrange_weights(x: f64, coeffs: &[f64], points: &[f64]) -> Vec<f64>
{
    let mut weights = vec![0.0; points.len()];
    let mut normalization_factor = 0.0;

    // handle case where point coincides with one of our nodes...
    for (&point, weight) in points.iter().zip(weights.iter_mut())
    {
        if point == x
        {
            *weight = 1.0;
            return weights;
        }
    }
    coeffs.iter().zip(points).zip(weights.iter_mut()).for_each(|((&coeff, &xi), weight)|
    {
        *weight = coeff / (x - xi);
        normalization_factor += *weight;
    });
    weights.iter_mut().for_each(|w| *w /= normalization_factor);
    weights
}

/// Barycentric coefficients 1/prod_{j != i}(x_i - x_j). Requires distinct points.
pub fn lagrange_coeffs(points: &[f64]) -> Vec<f64>
{
    let mut coeffs = Vec::with_capacity(points.len());
    for i in 0..points.len()
    {
        let mut li = 1.0;
        for j in 0..points.len()
        {
            if i != j
            {
                li *= points[i] - points[j];
            }
        }
        coeffs.push(1.0 / li);
    }
    coeffs
}

///
/// Hat-function weights on ascending `points`. Outside the outermost
/// nodes the nearest node value is used.
///
pub fn piecewise_linear_weights(x: f64, points: &[f64]) -> Vec<f64>
{
    let n = points.len();
    let mut weights = vec![0.0; n];
    if n == 0
    {
        return weights;
    }
    if x <= points[0]
    {
        weights[0] = 1.0;
        return weights;
    }
    if x >= points[n - 1]
    {
        weights[n - 1] = 1.0;
        return weights;
    }
    // first node strictly greater than x, in 1..n
    let right = points.partition_point(|&p| p <= x);
    let left = right - 1;
    let t = (x - points[left]) / (points[right] - points[left]);
    weights[left] = 1.0 - t;
    weights[right] = t;
    weights
}

#[test]
fn test_lagrange_weights()
{
    use crate::tables::clenshaw_curtis_table::cc_nodes;
    let points = cc_nodes(8);
    let weights = lagrange_weights(0.2, &lagrange_coeffs(&points), &points);
    assert!((1.0 - weights.iter().zip(&points).map(|(&w, x)| w * x * x).sum::<f64>() / (0.2 * 0.2)).abs() < 1e-14);
    let weights = lagrange_weights(points[3], &lagrange_coeffs(&points), &points);
    assert_eq!(weights[3], 1.0);
    assert_eq!(weights.iter().sum::<f64>(), 1.0);
}

#[test]
fn test_single_point()
{
    let weights = lagrange_weights(0.9, &lagrange_coeffs(&[0.5]), &[0.5]);
    assert_eq!(weights, vec![1.0]);
}

#[test]
fn test_piecewise_linear()
{
    let points = [0.0, 0.25, 0.5, 0.75, 1.0];
    let weights = piecewise_linear_weights(0.3, &points);
    assert!((weights[1] - 0.8).abs() < 1e-15);
    assert!((weights[2] - 0.2).abs() < 1e-15);
    assert_eq!(piecewise_linear_weights(0.5, &points)[2], 1.0);
    assert_eq!(piecewise_linear_weights(-1.0, &points)[0], 1.0);
    assert_eq!(piecewise_linear_weights(2.0, &points)[4], 1.0);
    // linear functions are reproduced
    let y: f64 = piecewise_linear_weights(0.61, &points).iter().zip(&points).map(|(w, x)| w * (3.0 * x + 1.0)).sum();
    assert!((y - (3.0 * 0.61 + 1.0)).abs() < 1e-14);
}
