//! Transport utilities stitched from the core services: bad-cell
//! regularisation, wall distance, vertex-to-cell interpolation.

pub mod regularization;
pub mod vertex_to_cell;
pub mod wall_distance;
