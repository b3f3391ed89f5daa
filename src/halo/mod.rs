//! Halo descriptors: which local elements shadow remote or periodic
//! elements, and where incoming ghost values land.
//!
//! A halo is built from an [`InterfaceSet`] and stays valid for one mesh
//! epoch. The send side lists owned elements per destination rank, split
//! into the standard (face-adjacent) shell and the extended
//! (vertex-adjacent) shell — the standard list is a prefix of the extended
//! one. The receive side records, per source rank, where each shell lands
//! in the ghost tail `[n_local .. n_local + n_ghosts)`. Per-transform
//! sub-ranges allow rotational periodicity to be applied during unpack.

mod exchange;

pub use exchange::{
    CommMode, HaloState, InFlight, PackMode, comm_mode, pack_mode, set_comm_mode, set_pack_mode,
};

use crate::error::FvMeshError;
use crate::topology::interface::{InterfaceElt, InterfaceSet};
use crate::topology::periodicity::Periodicity;

/// Which neighbourhood shell an exchange covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaloKind {
    /// Face-adjacent ghosts.
    Standard,
    /// Vertex-adjacent ghosts (superset of standard).
    Extended,
}

/// Per-transform ghost sub-range: `[std_start, std_n, ext_start, ext_n]`,
/// offsets counted from the start of the ghost tail.
pub(crate) type PerioRange = [usize; 4];

/// Halo descriptor for one mesh.
#[derive(Clone, Debug, Default)]
pub struct Halo {
    pub(crate) n_local_elts: usize,

    /// Communicating neighbour ranks (self allowed, for periodicity).
    pub(crate) c_domain_rank: Vec<usize>,

    /// Index on `send_list`: two slots per neighbour (end of standard,
    /// end of extended), `2 * n_domains + 1` entries.
    pub(crate) send_index: Vec<usize>,
    /// Local element ids to gather, per neighbour and shell.
    pub(crate) send_list: Vec<usize>,
    /// Ghost-tail offsets: two slots per neighbour, like `send_index`.
    pub(crate) index: Vec<usize>,

    /// Standard / standard+extended send totals.
    pub(crate) n_send_elts: [usize; 2],
    /// Standard / standard+extended ghost totals.
    pub(crate) n_elts: [usize; 2],

    /// Per transform and per neighbour: send-side sub-ranges.
    pub(crate) send_perio_lst: Vec<PerioRange>,
    /// Per transform and per neighbour: ghost-tail sub-ranges.
    pub(crate) perio_lst: Vec<PerioRange>,

    pub(crate) n_transforms: usize,
    pub(crate) n_rotations: usize,
    pub(crate) periodicity: Option<Periodicity>,
}

impl Halo {
    /// Build a halo from an interface set.
    ///
    /// Within each interface, entries are regrouped by transform id
    /// (untransformed first); ghost slots are assigned contiguously in
    /// interface order, standard shell before extended shell per
    /// neighbour.
    pub fn from_interface_set(
        n_local_elts: usize,
        ifs: &InterfaceSet,
        periodicity: Option<&Periodicity>,
    ) -> Result<Self, FvMeshError> {
        let n_domains = ifs.interfaces.len();
        let n_transforms = periodicity.map_or(0, Periodicity::n_transforms);

        let mut halo = Halo {
            n_local_elts,
            c_domain_rank: Vec::with_capacity(n_domains),
            send_index: vec![0; 2 * n_domains + 1],
            send_list: Vec::new(),
            index: vec![0; 2 * n_domains + 1],
            n_send_elts: [0, 0],
            n_elts: [0, 0],
            send_perio_lst: vec![[0; 4]; n_transforms * n_domains],
            perio_lst: vec![[0; 4]; n_transforms * n_domains],
            n_transforms,
            n_rotations: periodicity.map_or(0, Periodicity::n_rotations),
            periodicity: periodicity.cloned(),
        };

        let group = |elts: &[InterfaceElt]| -> Result<Vec<InterfaceElt>, FvMeshError> {
            let mut sorted = elts.to_vec();
            sorted.sort_by_key(|e| e.transform.map_or(0, |t| t + 1));
            for e in &sorted {
                if let Some(t) = e.transform {
                    if t >= n_transforms {
                        return Err(FvMeshError::MismatchedInterface(format!(
                            "transform id {t} out of range ({n_transforms} transforms)"
                        )));
                    }
                }
            }
            Ok(sorted)
        };

        for (d, iface) in ifs.interfaces.iter().enumerate() {
            halo.c_domain_rank.push(iface.rank);

            let send_std = group(&iface.send_std)?;
            let send_ext = group(&iface.send_ext)?;
            let recv_std = group(&iface.recv_std)?;
            let recv_ext = group(&iface.recv_ext)?;

            // Send side
            let base = halo.send_list.len();
            for e in &send_std {
                if e.id >= n_local_elts {
                    return Err(FvMeshError::MismatchedInterface(format!(
                        "send element {} out of local range {n_local_elts}",
                        e.id
                    )));
                }
                halo.send_list.push(e.id);
            }
            halo.send_index[2 * d + 1] = halo.send_list.len();
            for e in &send_ext {
                if e.id >= n_local_elts {
                    return Err(FvMeshError::MismatchedInterface(format!(
                        "send element {} out of local range {n_local_elts}",
                        e.id
                    )));
                }
                halo.send_list.push(e.id);
            }
            halo.send_index[2 * d + 2] = halo.send_list.len();
            halo.n_send_elts[0] += send_std.len();
            halo.n_send_elts[1] += send_std.len() + send_ext.len();

            Self::fill_perio_ranges(
                &mut halo.send_perio_lst,
                n_transforms,
                n_domains,
                d,
                base,
                &send_std,
                &send_ext,
            );

            // Receive side
            let ghost_base = halo.n_elts[1];
            halo.index[2 * d + 1] = ghost_base + recv_std.len();
            halo.index[2 * d + 2] = ghost_base + recv_std.len() + recv_ext.len();
            halo.n_elts[0] += recv_std.len();
            halo.n_elts[1] += recv_std.len() + recv_ext.len();

            Self::fill_perio_ranges(
                &mut halo.perio_lst,
                n_transforms,
                n_domains,
                d,
                ghost_base,
                &recv_std,
                &recv_ext,
            );
        }

        Ok(halo)
    }

    fn fill_perio_ranges(
        ranges: &mut [PerioRange],
        n_transforms: usize,
        n_domains: usize,
        domain: usize,
        base: usize,
        std_elts: &[InterfaceElt],
        ext_elts: &[InterfaceElt],
    ) {
        for t in 0..n_transforms {
            let slot = &mut ranges[t * n_domains + domain];
            let std_start = std_elts
                .iter()
                .position(|e| e.transform == Some(t))
                .map(|p| base + p);
            let std_n = std_elts.iter().filter(|e| e.transform == Some(t)).count();
            let ext_start = ext_elts
                .iter()
                .position(|e| e.transform == Some(t))
                .map(|p| base + std_elts.len() + p);
            let ext_n = ext_elts.iter().filter(|e| e.transform == Some(t)).count();
            *slot = [
                std_start.unwrap_or(0),
                std_n,
                ext_start.unwrap_or(0),
                ext_n,
            ];
        }
    }

    #[inline]
    pub fn n_local_elts(&self) -> usize {
        self.n_local_elts
    }

    /// Ghost-element count for the given shell.
    #[inline]
    pub fn n_ghosts(&self, kind: HaloKind) -> usize {
        match kind {
            HaloKind::Standard => self.n_elts[0],
            HaloKind::Extended => self.n_elts[1],
        }
    }

    #[inline]
    pub fn n_domains(&self) -> usize {
        self.c_domain_rank.len()
    }

    #[inline]
    pub fn n_rotations(&self) -> usize {
        self.n_rotations
    }

    /// Send segment of `send_list` for one neighbour and shell.
    #[inline]
    pub(crate) fn send_range(&self, d: usize, kind: HaloKind) -> std::ops::Range<usize> {
        match kind {
            HaloKind::Standard => self.send_index[2 * d]..self.send_index[2 * d + 1],
            HaloKind::Extended => self.send_index[2 * d]..self.send_index[2 * d + 2],
        }
    }

    /// Ghost-tail segment for one neighbour and shell.
    #[inline]
    pub(crate) fn recv_range(&self, d: usize, kind: HaloKind) -> std::ops::Range<usize> {
        match kind {
            HaloKind::Standard => self.index[2 * d]..self.index[2 * d + 1],
            HaloKind::Extended => self.index[2 * d]..self.index[2 * d + 2],
        }
    }

    /// Apply a local renumbering to the send list (old id → new id).
    pub fn renumber_cells(&mut self, old_to_new: &[usize]) {
        for id in &mut self.send_list {
            *id = old_to_new[*id];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::interface::{Interface, InterfaceElt, InterfaceSet};

    fn simple_ifs() -> InterfaceSet {
        let mut ifs = InterfaceSet::new();
        let mut iface = Interface::new(1);
        iface.send_std = vec![InterfaceElt::plain(1)];
        iface.send_ext = vec![InterfaceElt::plain(0)];
        iface.recv_std = vec![InterfaceElt::plain(0)];
        iface.recv_ext = vec![InterfaceElt::plain(1)];
        ifs.push(iface);
        ifs
    }

    #[test]
    fn standard_is_prefix_of_extended() {
        let halo = Halo::from_interface_set(2, &simple_ifs(), None).unwrap();
        assert_eq!(halo.n_ghosts(HaloKind::Standard), 1);
        assert_eq!(halo.n_ghosts(HaloKind::Extended), 2);
        assert_eq!(halo.send_range(0, HaloKind::Standard), 0..1);
        assert_eq!(halo.send_range(0, HaloKind::Extended), 0..2);
        assert_eq!(halo.send_list, vec![1, 0]);
    }

    #[test]
    fn out_of_range_send_is_rejected() {
        let mut ifs = InterfaceSet::new();
        let mut iface = Interface::new(0);
        iface.send_std = vec![InterfaceElt::plain(5)];
        ifs.push(iface);
        assert!(Halo::from_interface_set(2, &ifs, None).is_err());
    }

    #[test]
    fn renumbering_rewrites_the_send_list() {
        let mut halo = Halo::from_interface_set(2, &simple_ifs(), None).unwrap();
        // Swap the two local elements.
        halo.renumber_cells(&[1, 0]);
        assert_eq!(halo.send_list, vec![0, 1]);
    }
}
