pub(crate) mod clenshaw_curtis_table;
pub(crate) mod gauss_legendre_table;
