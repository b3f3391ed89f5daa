//! FvMeshError: unified error type for fv-mesh public APIs
//!
//! Non-local failures (communication mismatch, topology inconsistency,
//! convergence breakdown) are surfaced through this type; local clippings
//! are counted and logged by the operation that produced them and never
//! abort a run.

use thiserror::Error;

/// Unified error type for fv-mesh operations.
#[derive(Debug, Error)]
pub enum FvMeshError {
    /// Invalid parameter combination detected before any work was done.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed user input (profile, selection, file contents).
    #[error("input error: {0}")]
    Input(String),

    /// Mesh connectivity violates a structural invariant.
    #[error("topology error: {0}")]
    Topology(String),

    /// An edge lookup found no stored edge for the requested vertex pair.
    #[error("topology error: no edge joins vertices {v1} and {v2}")]
    EdgeLookup { v1: usize, v2: usize },

    /// A face ring dropped below 3 vertices during simplification.
    #[error(
        "face {face} (global {gnum}) simplified to fewer than 3 vertices; \
         loosen the joining tolerance"
    )]
    DegenerateFace { face: usize, gnum: u64 },

    /// An iterative solve exhausted its budget without converging.
    #[error("convergence error in `{name}`: {iterations} iterations, residual {residual:e}")]
    Convergence {
        name: String,
        iterations: usize,
        residual: f64,
    },

    /// Communication with a neighbouring rank failed or was inconsistent.
    #[error("communication error with rank {neighbor}: {detail}")]
    Comm { neighbor: usize, detail: String },

    /// A pack or exchange size exceeded addressable bounds.
    #[error("size overflow: {0}")]
    SizeOverflow(String),

    /// A halo was driven by an interface set that does not match the mesh.
    #[error("mismatched interface set: {0}")]
    MismatchedInterface(String),

    /// The external in-situ runtime returned a non-OK status.
    #[error("in-situ runtime error: {0}")]
    Runtime(String),
}

impl FvMeshError {
    /// Shorthand for a [`FvMeshError::Config`] from anything displayable.
    pub fn config(msg: impl Into<String>) -> Self {
        FvMeshError::Config(msg.into())
    }

    /// Shorthand for a [`FvMeshError::Topology`] from anything displayable.
    pub fn topology(msg: impl Into<String>) -> Self {
        FvMeshError::Topology(msg.into())
    }
}
