pub mod lagrange;
pub mod legendre;
