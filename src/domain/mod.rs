pub mod ids;
pub mod models;
pub mod placement;
pub mod time_grid;
