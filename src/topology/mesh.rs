//! `Mesh`: canonical struct-of-arrays storage for an unstructured
//! polyhedral mesh partition.
//!
//! The mesh owns its arrays; derived services (quantities, halos,
//! interpolation caches) record the `epoch` they were built against and
//! re-acquire their views when it changes. Structural mutators are used
//! only by loaders, generators and the topology transforms.

use crate::halo::Halo;
use crate::topology::INVALID_ID;
use crate::topology::adjacency::Csr;
use crate::topology::interface::InterfaceSet;
use crate::topology::periodicity::Periodicity;
use once_cell::sync::OnceCell;

/// Family id every element starts from; group reassignment replaces it.
pub const DEFAULT_FAMILY_ID: i32 = 1;

/// Structural-change flags raised by mutators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModifiedFlags(u8);

impl ModifiedFlags {
    /// Face/cell geometry is stale and quantities must be recomputed.
    pub const GEOMETRY: ModifiedFlags = ModifiedFlags(1);
    /// Load balance degraded; repartitioning is advised.
    pub const BALANCE: ModifiedFlags = ModifiedFlags(2);

    #[inline]
    pub fn contains(self, other: ModifiedFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: ModifiedFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// How the mesh evolves over the computation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeDependency {
    /// Geometry and connectivity fixed for the whole run.
    #[default]
    Fixed,
    /// Coordinates move, connectivity is fixed.
    TransientCoords,
    /// Connectivity itself changes between timesteps.
    TransientConnectivity,
}

/// Unstructured polyhedral mesh partition.
#[derive(Debug, Default)]
pub struct Mesh {
    // Vertices
    pub vtx_coord: Vec<[f64; 3]>,
    pub global_vtx_num: Vec<u64>,

    // Interior faces (two adjacent cell slots each)
    pub i_face_vtx: Csr,
    pub i_face_cells: Vec<[usize; 2]>,
    pub i_face_family: Vec<i32>,
    pub global_i_face_num: Option<Vec<u64>>,

    // Boundary faces (one owner cell each)
    pub b_face_vtx: Csr,
    pub b_face_cells: Vec<usize>,
    pub b_face_family: Vec<i32>,
    pub global_b_face_num: Option<Vec<u64>>,

    // Cells
    pub n_cells: usize,
    pub n_cells_with_ghosts: usize,
    pub cell_family: Vec<i32>,
    pub global_cell_num: Option<Vec<u64>>,
    pub n_g_cells: u64,

    // Group-name table: family id `i + 2` maps to `families[i]`;
    // id 1 is the default family.
    pub families: Vec<String>,

    // Parallel / periodic structure
    pub periodicity: Option<Periodicity>,
    pub halo: Option<Halo>,
    pub interfaces: Option<InterfaceSet>,

    pub time_dep: TimeDependency,
    pub verbosity: i32,

    modified: ModifiedFlags,
    epoch: u64,
    cell_vtx: OnceCell<Csr>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn n_vertices(&self) -> usize {
        self.vtx_coord.len()
    }

    #[inline]
    pub fn n_i_faces(&self) -> usize {
        self.i_face_cells.len()
    }

    #[inline]
    pub fn n_b_faces(&self) -> usize {
        self.b_face_cells.len()
    }

    #[inline]
    pub fn n_ghost_cells(&self) -> usize {
        self.n_cells_with_ghosts - self.n_cells
    }

    /// Monotonic structure version; derived data caches key off this.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[inline]
    pub fn modified(&self) -> ModifiedFlags {
        self.modified
    }

    /// Raise modification flags and advance the epoch, dropping cached
    /// derived adjacencies.
    pub fn mark_modified(&mut self, flags: ModifiedFlags) {
        self.modified.insert(flags);
        self.epoch += 1;
        self.cell_vtx = OnceCell::new();
    }

    /// Acknowledge the flags once derived data has been rebuilt.
    pub fn clear_modified(&mut self) {
        self.modified = ModifiedFlags::default();
    }

    /// Family id for a group name, registering the group if new.
    pub fn family_id(&mut self, group_name: &str) -> i32 {
        if let Some(pos) = self.families.iter().position(|g| g == group_name) {
            return pos as i32 + 2;
        }
        self.families.push(group_name.to_string());
        self.families.len() as i32 + 1
    }

    /// Group name for a family id (`None` for the default family).
    pub fn group_name(&self, family: i32) -> Option<&str> {
        if family < 2 {
            return None;
        }
        self.families.get(family as usize - 2).map(String::as_str)
    }

    /// Assign a group to a set of boundary faces.
    pub fn group_b_faces_add(&mut self, group_name: &str, faces: &[usize]) {
        let fam = self.family_id(group_name);
        for &f in faces {
            self.b_face_family[f] = fam;
        }
    }

    /// Cell→vertex adjacency derived from the face rings, cached until the
    /// next structural change. Ghost cells get empty rows.
    pub fn cell_vertices(&self) -> &Csr {
        self.cell_vtx.get_or_init(|| {
            let mut per_cell: Vec<Vec<usize>> = vec![Vec::new(); self.n_cells_with_ghosts];
            for (f, cells) in self.i_face_cells.iter().enumerate() {
                for &c in cells {
                    if c != INVALID_ID && c < per_cell.len() {
                        per_cell[c].extend_from_slice(self.i_face_vtx.row(f));
                    }
                }
            }
            for (f, &c) in self.b_face_cells.iter().enumerate() {
                if c != INVALID_ID && c < per_cell.len() {
                    per_cell[c].extend_from_slice(self.b_face_vtx.row(f));
                }
            }
            for row in &mut per_cell {
                row.sort_unstable();
                row.dedup();
            }
            Csr::from_rows(per_cell)
        })
    }

    /// Append a boundary face; returns its id.
    pub fn push_boundary_face(&mut self, vtx_ids: &[usize], cell: usize, family: i32) -> usize {
        let id = self.b_face_cells.len();
        self.b_face_vtx.ids.extend_from_slice(vtx_ids);
        self.b_face_vtx.idx.push(self.b_face_vtx.ids.len());
        self.b_face_cells.push(cell);
        self.b_face_family.push(family);
        if let Some(g) = self.global_b_face_num.as_mut() {
            // Provisional: global boundary-face numbering is rebuilt by the
            // caller after a batch of insertions.
            g.push(0);
        }
        id
    }

    /// Drop boundary faces whose owner slot is unset and interior faces
    /// with both cell slots unset, compacting the CSR arrays.
    pub fn discard_free_faces(&mut self) {
        // Boundary faces
        let keep_b: Vec<usize> = (0..self.n_b_faces())
            .filter(|&f| self.b_face_cells[f] != INVALID_ID)
            .collect();
        if keep_b.len() != self.n_b_faces() {
            let mut vtx = Vec::with_capacity(keep_b.len());
            for &f in &keep_b {
                vtx.push(self.b_face_vtx.row(f).to_vec());
            }
            self.b_face_vtx = Csr::from_rows(vtx);
            self.b_face_cells = keep_b.iter().map(|&f| self.b_face_cells[f]).collect();
            self.b_face_family = keep_b.iter().map(|&f| self.b_face_family[f]).collect();
            if let Some(g) = self.global_b_face_num.take() {
                self.global_b_face_num = Some(keep_b.iter().map(|&f| g[f]).collect());
            }
        }

        // Interior faces
        let keep_i: Vec<usize> = (0..self.n_i_faces())
            .filter(|&f| {
                self.i_face_cells[f][0] != INVALID_ID || self.i_face_cells[f][1] != INVALID_ID
            })
            .collect();
        if keep_i.len() != self.n_i_faces() {
            let mut vtx = Vec::with_capacity(keep_i.len());
            for &f in &keep_i {
                vtx.push(self.i_face_vtx.row(f).to_vec());
            }
            self.i_face_vtx = Csr::from_rows(vtx);
            self.i_face_cells = keep_i.iter().map(|&f| self.i_face_cells[f]).collect();
            self.i_face_family = keep_i.iter().map(|&f| self.i_face_family[f]).collect();
            if let Some(g) = self.global_i_face_num.take() {
                self.global_i_face_num = Some(keep_i.iter().map(|&f| g[f]).collect());
            }
        }
    }

    /// Structural sanity checks used by tests and debug builds.
    pub fn validate(&self) -> Result<(), crate::error::FvMeshError> {
        use crate::error::FvMeshError;
        for f in 0..self.n_i_faces() {
            if self.i_face_vtx.row_len(f) < 3 {
                return Err(FvMeshError::topology(format!(
                    "interior face {f} has fewer than 3 vertices"
                )));
            }
            for &c in &self.i_face_cells[f] {
                if c != INVALID_ID && c >= self.n_cells_with_ghosts {
                    return Err(FvMeshError::topology(format!(
                        "interior face {f} references cell {c} out of range"
                    )));
                }
            }
        }
        for f in 0..self.n_b_faces() {
            let c = self.b_face_cells[f];
            if c != INVALID_ID && c >= self.n_cells_with_ghosts {
                return Err(FvMeshError::topology(format!(
                    "boundary face {f} references cell {c} out of range"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_registration_is_idempotent() {
        let mut m = Mesh::new();
        let a = m.family_id("inlet");
        let b = m.family_id("outlet");
        let a2 = m.family_id("inlet");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(m.group_name(a), Some("inlet"));
        assert_eq!(m.group_name(DEFAULT_FAMILY_ID), None);
    }

    #[test]
    fn epoch_advances_on_modification() {
        let mut m = Mesh::new();
        let e0 = m.epoch();
        m.mark_modified(ModifiedFlags::GEOMETRY);
        assert!(m.epoch() > e0);
        assert!(m.modified().contains(ModifiedFlags::GEOMETRY));
        assert!(!m.modified().contains(ModifiedFlags::BALANCE));
        m.clear_modified();
        assert!(m.modified().is_empty());
    }
}
