//! Mesh topology transforms operating on a live mesh between timesteps.

pub mod remove_cells;

pub use remove_cells::{remove_cells, remove_cells_from_selection, remove_cells_negative_volume};
