pub mod full_grid;
