use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fv_mesh::comm::NoComm;
use fv_mesh::halo::{Halo, HaloKind};
use fv_mesh::topology::interface::{Interface, InterfaceElt, InterfaceSet};

/// Periodic self-halo mirroring a slab of `n` elements onto itself.
fn slab_halo(n: usize) -> Halo {
    let mut ifs = InterfaceSet::new();
    let mut iface = Interface::new(0);
    iface.send_std = (0..n).map(InterfaceElt::plain).collect();
    iface.recv_std = (0..n).map(InterfaceElt::plain).collect();
    ifs.push(iface);
    Halo::from_interface_set(n, &ifs, None).unwrap()
}

fn bench_halo_sync(c: &mut Criterion) {
    let n = 100_000;
    let halo = slab_halo(n);
    let comm = NoComm;

    c.bench_function("halo_sync_scalar_100k", |b| {
        let mut values = vec![1.0f64; 2 * n];
        b.iter(|| {
            halo.sync_var(&comm, HaloKind::Standard, black_box(&mut values))
                .unwrap();
        })
    });

    c.bench_function("halo_pack_vector_100k", |b| {
        let values = vec![1.0f64; 2 * n * 3];
        let mut packed = vec![0.0f64; halo.pack_len(HaloKind::Standard, 3)];
        b.iter(|| {
            halo.pack(HaloKind::Standard, 3, black_box(&values), &mut packed);
        })
    });
}

criterion_group!(benches, bench_halo_sync);
criterion_main!(benches);
