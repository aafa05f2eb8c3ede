use std::f64::consts::PI;

use rustfft::{FftPlanner, num_complex::Complex};

///
/// Unit-interval Clenshaw-Curtis node `k` of a rule with `intervals` intervals.
/// The node only depends on the correctly rounded ratio `k / intervals`, so the
/// same ratio reproduces the same bits on every level (nesting).
///
#[inline]
pub(crate) fn cc_node(k: usize, intervals: usize) -> f64
{
    if intervals == 0
    {
        return 0.5;
    }
    if 2 * k == intervals
    {
        return 0.5;
    }
    if 2 * k > intervals
    {
        // mirror so that the rule is exactly symmetric around the center
        return 1.0 - cc_node(intervals - k, intervals);
    }
    let t = k as f64 / intervals as f64;
    0.5 * (1.0 - f64::cos(PI * t))
}

/// Ascending Clenshaw-Curtis nodes over (0,1). Zero intervals is the single midpoint.
pub(crate) fn cc_nodes(intervals: usize) -> Vec<f64>
{
    if intervals == 0
    {
        return vec![0.5];
    }
    (0..=intervals).map(|k| cc_node(k, intervals)).collect()
}

///
/// Compute Clenshaw-Curtis weights using approach by J. Waldvogel (2006)
/// "Fast construction of the Fejer and Clenshaw-Curtis quadrature rules".
/// Weights are for the (0,1) interval and sum to one.
///
pub(crate) fn cc_weights(intervals: usize) -> Vec<f64>
{
    let n = intervals;
    match n
    {
        0 => return vec![1.0],
        1 => return vec![0.5, 0.5],
        _ => {}
    }
    let n_vals: Vec<f64> = (1..n).step_by(2).map(|v| v as f64).collect();
    let l = n_vals.len();
    let m = n - l;
    let mut v0: Vec<f64> = n_vals.iter()
        .map(|&i| 2.0 / (i * (i - 2.0)))
        .collect();
    // n >= 2 so there is at least one odd value below n
    v0.push(1.0 / n_vals[l - 1]);
    v0.extend(vec![0.0; m]);

    let end = v0.len();
    let v2: Vec<f64> = (0..end - 1).map(|i| -v0[i] - v0[end - i - 1]).collect();

    let mut weights = vec![Complex::new(-1.0, 0.0); n];
    weights[l] += n as f64;
    weights[m] += n as f64;

    let g_scale = (n * n - 1 + n % 2) as f64;
    for (g, w) in weights.iter_mut().zip(v2)
    {
        g.re = g.re / g_scale + w;
    }
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_inverse(n);
    fft.process(&mut weights);
    let mut r: Vec<f64> = weights.iter().map(|w| w.re * 0.5 / n as f64).collect();
    r.push(r[0]);
    r
}

#[test]
fn check_weights()
{
    for n in [0, 1, 2, 4, 6, 8, 16, 64]
    {
        let w = cc_weights(n);
        assert_eq!(w.len(), n + 1);
        assert!((1.0 - w.iter().sum::<f64>()).abs() < 1e-14);
        assert!(w.iter().all(|&w| w > 0.0));
    }
    // Weights computed from CLENSHAW_CURTIS_RULE by J. Burkardt. These are computed over a (-1,+1) interval, so we multiply
    // these values by 0.5 to correct weighting for our (0,1) interval.
    let weights5 = [0.06666666666666668, 0.5333333333333333, 0.7999999999999999, 0.5333333333333334, 0.06666666666666668];
    let cc = cc_weights(4);
    for i in 0..5
    {
        assert!((1.0 - cc[i] / (0.5 * weights5[i])).abs() < 1e-14);
    }
}

#[test]
fn check_polynomial_exactness()
{
    for n in [2, 4, 6, 8, 16]
    {
        let nodes = cc_nodes(n);
        let weights = cc_weights(n);
        for p in 0..=n as i32
        {
            let q: f64 = nodes.iter().zip(&weights).map(|(x, w)| w * x.powi(p)).sum();
            assert!((q - 1.0 / (p as f64 + 1.0)).abs() < 1e-13, "n={n} p={p}");
        }
    }
}

#[test]
fn check_nodes_are_bit_nested()
{
    for level in 1..10
    {
        let coarse = cc_nodes(1 << level);
        let fine = cc_nodes(1 << (level + 1));
        for (k, x) in coarse.iter().enumerate()
        {
            assert_eq!(x.to_bits(), fine[2 * k].to_bits());
        }
    }
    assert_eq!(cc_nodes(0)[0].to_bits(), cc_nodes(2)[1].to_bits());
}
