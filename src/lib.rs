#![cfg_attr(docsrs, feature(doc_cfg))]
//! # fv-mesh
//!
//! fv-mesh is a modular Rust library for unstructured finite-volume mesh
//! management and cell-centered transport, designed for CFD and PDE codes.
//! It provides the mesh-topology and linear-operator layer that physical
//! models plug into: polyhedral mesh storage, halo/ghost exchange with
//! periodicity, mesh topology transforms (face joining, cell removal),
//! canonical boundary-condition coefficients, finite-volume operators with
//! matrix assembly, transport utilities (bad-cell regularisation, wall
//! distance, vertex-to-cell interpolation) and a zero-copy in-situ export
//! tree.
//!
//! ## Features
//! - Struct-of-arrays polyhedral mesh with CSR face connectivity and an
//!   epoch counter signalling stale derived data
//! - Standard (face-adjacent) and extended (vertex-adjacent) halos with
//!   synchronous and split start/wait exchange, rotational periodicity
//! - Pluggable communication backends (serial, thread mailbox, MPI)
//! - Face joining with tolerance-driven vertex fusion and cell removal
//!   with boundary-face promotion
//! - Scalar/vector/tensor finite-volume operators and an opaque sparse
//!   solver seam with a built-in matrix-free conjugate gradient
//!
//! ## Usage
//! Add `fv-mesh` as a dependency in your `Cargo.toml` and enable features
//! as needed:
//!
//! ```toml
//! [dependencies]
//! fv-mesh = "0.3"
//! # Optional features:
//! # features = ["rayon", "mpi-support"]
//! ```

// Re-export our major subsystems:
pub mod comm;
pub mod error;
pub mod field;
pub mod geometry;
pub mod halo;
pub mod insitu;
pub mod join;
pub mod math;
pub mod meshgen;
pub mod operators;
pub mod parall;
pub mod solver;
pub mod topology;
pub mod transform;
pub mod transport;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::comm::{Communicator, LocalComm, NoComm, Wait};
    pub use crate::error::FvMeshError;
    pub use crate::field::BoundaryType;
    pub use crate::field::bc::BcCoeffs;
    pub use crate::geometry::MeshQuantities;
    pub use crate::halo::{Halo, HaloKind, HaloState};
    pub use crate::join::{JoinParam, ToleranceMode};
    pub use crate::operators::equation::EquationParams;
    pub use crate::solver::{NativeSolver, SolverContext, SparseSolver};
    pub use crate::topology::interface::InterfaceSet;
    pub use crate::topology::mesh::Mesh;
    pub use crate::topology::periodicity::{Periodicity, Transform};
    pub use crate::transport::vertex_to_cell::{VertexToCell, VertexToCellMethod};
}
