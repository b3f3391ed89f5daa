//! Pairwise interface sets: which local elements are mirrored where.
//!
//! An interface set is the durable description the halo is rebuilt from
//! after a topology change. Each interface pairs this rank with one
//! neighbour (possibly itself, for periodicity) and lists the elements to
//! send and the shadows to receive, split into the standard
//! (face-adjacent) and extended (vertex-adjacent) shells. Within each
//! shell, entries must be grouped by transform id (untransformed entries
//! first), which is how the per-transform halo sub-ranges are recovered.

use crate::topology::INVALID_ID;

/// One matched element on an interface: the element id on the owning side
/// and the periodicity transform carrying it across (if any).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfaceElt {
    pub id: usize,
    pub transform: Option<usize>,
}

impl InterfaceElt {
    pub fn plain(id: usize) -> Self {
        Self {
            id,
            transform: None,
        }
    }

    pub fn periodic(id: usize, transform: usize) -> Self {
        Self {
            id,
            transform: Some(transform),
        }
    }
}

/// Matched element lists between this rank and one neighbour rank.
#[derive(Clone, Debug, Default)]
pub struct Interface {
    pub rank: usize,
    /// Local owned elements whose shadows live on `rank`, standard shell.
    pub send_std: Vec<InterfaceElt>,
    /// Additional elements for the extended shell.
    pub send_ext: Vec<InterfaceElt>,
    /// Incoming standard-shell shadows: the transform each arrives under.
    pub recv_std: Vec<InterfaceElt>,
    /// Incoming extended-shell shadows.
    pub recv_ext: Vec<InterfaceElt>,
}

impl Interface {
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            ..Default::default()
        }
    }
}

/// All interfaces of the local rank, in neighbour-rank order.
#[derive(Clone, Debug, Default)]
pub struct InterfaceSet {
    pub interfaces: Vec<Interface>,
}

impl InterfaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interface: Interface) {
        self.interfaces.push(interface);
    }

    /// Total number of incoming shadows (standard + extended).
    pub fn n_recv(&self) -> usize {
        self.interfaces
            .iter()
            .map(|i| i.recv_std.len() + i.recv_ext.len())
            .sum()
    }

    /// Rewrite send-side element ids through an old→new renumbering,
    /// dropping pairs whose owned element disappeared. The receive side is
    /// filtered symmetrically by the neighbour, so positions stay matched:
    /// both sides drop the k-th pair exactly when the k-th owned element
    /// was removed, which the caller guarantees by exchanging removal
    /// flags through the halo before renumbering.
    pub fn renumber_sends(&mut self, old_to_new: &[usize], dropped_recv: &[Vec<bool>]) {
        for (iface, dropped) in self.interfaces.iter_mut().zip(dropped_recv) {
            iface.send_std.retain_mut(|e| {
                let n = old_to_new[e.id];
                if n == INVALID_ID {
                    false
                } else {
                    e.id = n;
                    true
                }
            });
            iface.send_ext.retain_mut(|e| {
                let n = old_to_new[e.id];
                if n == INVALID_ID {
                    false
                } else {
                    e.id = n;
                    true
                }
            });
            let n_std = iface.recv_std.len();
            let mut k = 0;
            iface.recv_std.retain(|_| {
                let drop = dropped[k];
                k += 1;
                !drop
            });
            let mut k = n_std;
            iface.recv_ext.retain(|_| {
                let drop = dropped[k];
                k += 1;
                !drop
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renumber_drops_removed_pairs() {
        let mut ifs = InterfaceSet::new();
        let mut iface = Interface::new(1);
        iface.send_std = vec![InterfaceElt::plain(0), InterfaceElt::plain(2)];
        iface.recv_std = vec![InterfaceElt::plain(0), InterfaceElt::plain(1)];
        ifs.push(iface);

        // Element 0 removed locally; neighbour's first shadow removed too.
        let old_to_new = vec![INVALID_ID, 0, 1];
        let dropped = vec![vec![true, false]];
        ifs.renumber_sends(&old_to_new, &dropped);

        let iface = &ifs.interfaces[0];
        assert_eq!(iface.send_std, vec![InterfaceElt::plain(1)]);
        assert_eq!(iface.recv_std, vec![InterfaceElt::plain(1)]);
    }
}
