use crate::tables::gauss_legendre_table::legendre_and_derivative;

///
/// Orthonormal Legendre polynomial of `degree` on the unit interval, i.e.
/// `sqrt(2k+1) P_k(2u-1)`, so that the integral of `phi_j * phi_k` over (0,1) is `delta_jk`.
///
#[inline]
pub fn orthonormal_legendre(degree: u32, u: f64) -> f64
{
    let (p, _) = legendre_and_derivative(degree as usize, 2.0 * u - 1.0);
    (2.0 * degree as f64 + 1.0).sqrt() * p
}

/// Values of all orthonormal polynomials up to `max_degree` at `u`.
pub fn orthonormal_legendre_all(max_degree: u32, u: f64) -> Vec<f64>
{
    (0..=max_degree).map(|k| orthonormal_legendre(k, u)).collect()
}

#[test]
fn check_orthonormality()
{
    use crate::tables::gauss_legendre_table::gauss_legendre;
    let (x, w) = gauss_legendre(12);
    for j in 0..6
    {
        for k in 0..6
        {
            let s: f64 = x.iter().zip(&w).map(|(&x, &w)| w * orthonormal_legendre(j, x) * orthonormal_legendre(k, x)).sum();
            let expected = if j == k { 1.0 } else { 0.0 };
            assert!((s - expected).abs() < 1e-13);
        }
    }
    assert_eq!(orthonormal_legendre_all(2, 1.0).len(), 3);
}
