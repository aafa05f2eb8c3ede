use std::f64::consts::PI;

use static_init::dynamic;

/// Largest number of points kept in the pre-computed table.
pub const GL_MAX_POINTS: usize = 128;

/// Compute the Legendre polynomial P_n(x) and its derivative using recurrence
pub(crate) fn legendre_and_derivative(n: usize, x: f64) -> (f64, f64)
{
    if n == 0
    {
        return (1.0, 0.0);
    }
    let mut p0 = 1.0;
    let mut p1 = x;
    let mut dp0 = 0.0;
    let mut dp1 = 1.0;

    for k in 2..=n
    {
        let kf = k as f64;
        let pk = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        let dpk = ((2.0 * kf - 1.0) * (p1 + x * dp1) - (kf - 1.0) * dp0) / kf;

        p0 = p1;
        p1 = pk;
        dp0 = dp1;
        dp1 = dpk;
    }

    (p1, dp1)
}

/// Compute `n` Gauss-Legendre nodes and weights on the interval (0, 1), sorted by node.
pub(crate) fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>)
{
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);
    let eps = 1e-15;

    for i in 0..n
    {
        // Initial guess: Chebyshev-like nodes
        let theta = PI * (i as f64 + 0.75) / (n as f64 + 0.5);
        let mut x = theta.cos();

        // Newton-Raphson refinement
        for _ in 0..100
        {
            let (p, dp) = legendre_and_derivative(n, x);
            let dx = -p / dp;
            x += dx;
            if dx.abs() < eps
            {
                break;
            }
        }

        let (_, dp) = legendre_and_derivative(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        // Map from (-1, 1) to (0, 1)
        pairs.push((0.5 * (x + 1.0), 0.5 * w));
    }

    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    pairs.into_iter().unzip()
}

/// Degree-indexed table of Gauss-Legendre rules, built once on first use.
pub struct GaussLegendreTable
{
    nodes: Vec<Vec<f64>>,
    weights: Vec<Vec<f64>>,
}

impl GaussLegendreTable
{
    pub fn new(max_points: usize) -> Self
    {
        let mut nodes = vec![Vec::new()];
        let mut weights = vec![Vec::new()];
        for n in 1..=max_points
        {
            let (x, w) = gauss_legendre(n);
            nodes.push(x);
            weights.push(w);
        }
        Self { nodes, weights }
    }

    pub fn len(&self) -> usize
    {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// Nodes and weights of the `n`-point rule; rules beyond the table are computed on demand.
    pub fn rule(&self, n: usize) -> (Vec<f64>, Vec<f64>)
    {
        if n < self.len()
        {
            (self.nodes[n].clone(), self.weights[n].clone())
        }
        else
        {
            gauss_legendre(n)
        }
    }
}

#[dynamic]
pub(crate) static GL_TABLE: GaussLegendreTable = GaussLegendreTable::new(GL_MAX_POINTS);

#[test]
fn test_gauss_legendre()
{
    let (nodes, weights) = GL_TABLE.rule(10);
    let expected_nodes = [0.0130467357414145,0.067468316655508,0.160295215850488,0.283302302935377,0.425562830509185,0.574437169490815,0.716697697064624,0.839704784149512,0.932531683344492,0.986953264258586];
    let expected_weights = [0.033335672154344,0.07472567457529,0.109543181257991,0.134633359654998,0.147762112357376,0.147762112357376,0.134633359654998,0.109543181257991,0.07472567457529,0.033335672154344];

    for (n1, n2) in nodes.iter().zip(expected_nodes.iter())
    {
        assert!((n1 - n2).abs() < 1e-12);
    }
    for (w1, w2) in weights.iter().zip(expected_weights.iter())
    {
        assert!((w1 - w2).abs() < 1e-12);
    }
}

#[test]
fn check_gauss_exactness()
{
    for n in [1, 2, 3, 7, 20]
    {
        let (x, w) = GL_TABLE.rule(n);
        for p in 0..(2 * n) as i32
        {
            let q: f64 = x.iter().zip(&w).map(|(x, w)| w * x.powi(p)).sum();
            assert!((q - 1.0 / (p as f64 + 1.0)).abs() < 1e-13, "n={n} p={p}");
        }
    }
    // beyond the table
    let (x, w) = GL_TABLE.rule(GL_MAX_POINTS + 3);
    assert_eq!(x.len(), GL_MAX_POINTS + 3);
    assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
}
