//! In-situ bridge: zero-copy export of the mesh and field snapshots into
//! a hierarchical tree consumed by an external co-processing runtime.
//!
//! The tree mirrors the usual coordsets/topologies/fields layout:
//! interlaced coordinates are exposed as strided views, polyhedral cells
//! as explicit shape/size/offset element arrays with a subelement table
//! for the face → vertex references, and non-interlaced field components
//! are mirrored into temporary contiguous single-precision buffers.
//! Initialization of the runtime is lazy and happens on the first flush;
//! the flush is collective over the mesh's communicator.

use crate::comm::Communicator;
use crate::error::FvMeshError;
use crate::topology::INVALID_ID;
use crate::topology::mesh::Mesh;
use num_traits::ToPrimitive;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Leaf payload of a tree node. Borrowed variants are zero-copy views
/// into the source arrays.
#[derive(Clone, Debug)]
pub enum Value<'a> {
    Str(String),
    I64(i64),
    F64(f64),
    I64Array(Vec<i64>),
    F64Array(Vec<f64>),
    F32Array(Vec<f32>),
    /// Borrowed contiguous view.
    F64View(&'a [f64]),
    /// Borrowed strided view: element `i` is `data[offset + i * stride]`.
    F64Strided {
        data: &'a [f64],
        offset: usize,
        stride: usize,
    },
}

impl Value<'_> {
    /// Number of scalar entries addressed by this leaf.
    pub fn len(&self) -> usize {
        match self {
            Value::Str(_) | Value::I64(_) | Value::F64(_) => 1,
            Value::I64Array(v) => v.len(),
            Value::F64Array(v) => v.len(),
            Value::F32Array(v) => v.len(),
            Value::F64View(v) => v.len(),
            Value::F64Strided { data, offset, stride } => {
                if *stride == 0 {
                    0
                } else {
                    (data.len().saturating_sub(*offset)).div_ceil(*stride)
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hierarchical string-keyed tree with typed leaves.
#[derive(Clone, Debug, Default)]
pub struct Node<'a> {
    children: BTreeMap<String, Node<'a>>,
    value: Option<Value<'a>>,
}

impl<'a> Node<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the leaf at a `/`-separated path, creating intermediate nodes.
    pub fn set(&mut self, path: &str, value: Value<'a>) {
        let mut node = self;
        for part in path.split('/') {
            node = node.children.entry(part.to_string()).or_default();
        }
        node.value = Some(value);
    }

    /// Leaf lookup at a `/`-separated path.
    pub fn get(&self, path: &str) -> Option<&Value<'a>> {
        let mut node = self;
        for part in path.split('/') {
            node = node.children.get(part)?;
        }
        node.value.as_ref()
    }

    /// Child node lookup.
    pub fn child(&self, path: &str) -> Option<&Node<'a>> {
        let mut node = self;
        for part in path.split('/') {
            node = node.children.get(part)?;
        }
        Some(node)
    }

    /// Number of leaves in the subtree.
    pub fn n_leaves(&self) -> usize {
        let own = usize::from(self.value.is_some());
        own + self.children.values().map(Node::n_leaves).sum::<usize>()
    }
}

/// Association of a field with the mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Association {
    Cell,
    Vertex,
}

impl Association {
    fn as_str(self) -> &'static str {
        match self {
            Association::Cell => "element",
            Association::Vertex => "vertex",
        }
    }
}

/// Conventional component suffixes per stride.
fn component_names(stride: usize) -> Option<&'static [&'static str]> {
    match stride {
        1 => Some(&[""]),
        3 => Some(&["x", "y", "z"]),
        6 => Some(&["xx", "yy", "zz", "xy", "yz", "xz"]),
        9 => Some(&["xx", "xy", "xz", "yx", "yy", "yz", "zx", "zy", "zz"]),
        _ => None,
    }
}

/// Expose the mesh as coordsets plus a polyhedral topology.
///
/// Coordinates are strided views into the interlaced vertex array; the
/// element table references faces (interior first, then boundary) and
/// the subelement table carries each face's vertex ring.
pub fn export_mesh<'a>(mesh: &'a Mesh, root: &mut Node<'a>) {
    let coords: &[f64] = bytemuck::cast_slice(&mesh.vtx_coord);
    root.set("coordsets/coords/type", Value::Str("explicit".into()));
    for (k, axis) in ["x", "y", "z"].iter().enumerate() {
        root.set(
            &format!("coordsets/coords/values/{axis}"),
            Value::F64Strided {
                data: coords,
                offset: k,
                stride: 3,
            },
        );
    }

    root.set("topologies/mesh/type", Value::Str("unstructured".into()));
    root.set("topologies/mesh/coordset", Value::Str("coords".into()));
    root.set(
        "topologies/mesh/elements/shape",
        Value::Str("polyhedral".into()),
    );

    // Cell -> face adjacency; interior faces come first in the global
    // face numbering, boundary faces after.
    let n_i = mesh.n_i_faces();
    let mut per_cell: Vec<Vec<i64>> = vec![Vec::new(); mesh.n_cells];
    for (f, cells) in mesh.i_face_cells.iter().enumerate() {
        for &c in cells {
            if c != INVALID_ID && c < mesh.n_cells {
                per_cell[c].push(f as i64);
            }
        }
    }
    for (f, &c) in mesh.b_face_cells.iter().enumerate() {
        if c != INVALID_ID && c < mesh.n_cells {
            per_cell[c].push((n_i + f) as i64);
        }
    }

    let mut connectivity = Vec::new();
    let mut sizes = Vec::with_capacity(mesh.n_cells);
    let mut offsets = Vec::with_capacity(mesh.n_cells);
    let mut shapes = Vec::with_capacity(mesh.n_cells);
    for faces in &per_cell {
        offsets.push(connectivity.len() as i64);
        sizes.push(faces.len() as i64);
        shapes.push(0i64);
        connectivity.extend_from_slice(faces);
    }
    root.set(
        "topologies/mesh/elements/connectivity",
        Value::I64Array(connectivity),
    );
    root.set("topologies/mesh/elements/shapes", Value::I64Array(shapes));
    root.set("topologies/mesh/elements/sizes", Value::I64Array(sizes));
    root.set("topologies/mesh/elements/offsets", Value::I64Array(offsets));

    // Subelements: face -> vertex rings, interior then boundary.
    root.set(
        "topologies/mesh/subelements/shape",
        Value::Str("polygonal".into()),
    );
    let mut sub_conn = Vec::new();
    let mut sub_sizes = Vec::new();
    let mut sub_offsets = Vec::new();
    for f in 0..n_i {
        sub_offsets.push(sub_conn.len() as i64);
        let ring = mesh.i_face_vtx.row(f);
        sub_sizes.push(ring.len() as i64);
        sub_conn.extend(ring.iter().map(|&v| v as i64));
    }
    for f in 0..mesh.n_b_faces() {
        sub_offsets.push(sub_conn.len() as i64);
        let ring = mesh.b_face_vtx.row(f);
        sub_sizes.push(ring.len() as i64);
        sub_conn.extend(ring.iter().map(|&v| v as i64));
    }
    root.set(
        "topologies/mesh/subelements/connectivity",
        Value::I64Array(sub_conn),
    );
    root.set(
        "topologies/mesh/subelements/sizes",
        Value::I64Array(sub_sizes),
    );
    root.set(
        "topologies/mesh/subelements/offsets",
        Value::I64Array(sub_offsets),
    );
}

/// Expose an interlaced field as strided zero-copy component views.
pub fn export_field<'a>(
    root: &mut Node<'a>,
    name: &str,
    association: Association,
    stride: usize,
    values: &'a [f64],
) -> Result<(), FvMeshError> {
    let comps = component_names(stride)
        .ok_or_else(|| FvMeshError::config(format!("unsupported field stride {stride}")))?;
    let base = format!("fields/{name}");
    root.set(
        &format!("{base}/association"),
        Value::Str(association.as_str().into()),
    );
    root.set(&format!("{base}/topology"), Value::Str("mesh".into()));
    if stride == 1 {
        root.set(&format!("{base}/values"), Value::F64View(values));
    } else {
        for (k, comp) in comps.iter().enumerate() {
            root.set(
                &format!("{base}/values/{comp}"),
                Value::F64Strided {
                    data: values,
                    offset: k,
                    stride,
                },
            );
        }
    }
    Ok(())
}

/// Expose a non-interlaced field: each component is mirrored into a
/// temporary contiguous single-precision buffer.
pub fn export_field_components(
    root: &mut Node<'_>,
    name: &str,
    association: Association,
    components: &[&[f64]],
) -> Result<(), FvMeshError> {
    let comps = component_names(components.len())
        .ok_or_else(|| FvMeshError::config(format!("unsupported component count {}", components.len())))?;
    let base = format!("fields/{name}");
    root.set(
        &format!("{base}/association"),
        Value::Str(association.as_str().into()),
    );
    root.set(&format!("{base}/topology"), Value::Str("mesh".into()));
    for (k, comp) in comps.iter().enumerate() {
        let mirrored: Vec<f32> = components[k]
            .iter()
            .map(|v| v.to_f32().unwrap_or(f32::MAX))
            .collect();
        let path = if components.len() == 1 {
            format!("{base}/values")
        } else {
            format!("{base}/values/{comp}")
        };
        root.set(&path, Value::F32Array(mirrored));
    }
    Ok(())
}

/// Stamp the time state onto the tree.
pub fn export_state(root: &mut Node<'_>, cycle: i64, time: f64, domain: usize) {
    root.set("state/cycle", Value::I64(cycle));
    root.set("state/time", Value::F64(time));
    root.set("state/domain", Value::I64(domain as i64));
}

/// External co-processing runtime behind the bridge.
pub trait InSituRuntime {
    /// One-time initialization with the discovered configuration scripts.
    fn initialize(&mut self, scripts: &[PathBuf]) -> Result<(), FvMeshError>;
    /// Process one flushed tree; a non-OK status aborts the run.
    fn execute(&mut self, root: &Node<'_>) -> Result<(), FvMeshError>;
    fn finalize(&mut self) -> Result<(), FvMeshError> {
        Ok(())
    }
}

/// Logging stand-in runtime used when no co-processor is linked in.
#[derive(Debug, Default)]
pub struct LogRuntime;

impl InSituRuntime for LogRuntime {
    fn initialize(&mut self, scripts: &[PathBuf]) -> Result<(), FvMeshError> {
        log::info!("in-situ runtime initialized with {} script(s)", scripts.len());
        Ok(())
    }

    fn execute(&mut self, root: &Node<'_>) -> Result<(), FvMeshError> {
        log::debug!("in-situ flush: {} leaves", root.n_leaves());
        Ok(())
    }
}

/// Writer driving the runtime: lazy initialization on the first flush,
/// with configuration-script auto-discovery in the working directory.
pub struct InSituWriter<R: InSituRuntime> {
    runtime: R,
    initialized: bool,
    /// Explicit scripts; when empty, `*.py` files are discovered in the
    /// current working directory on first flush.
    pub scripts: Vec<PathBuf>,
}

impl<R: InSituRuntime> InSituWriter<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            initialized: false,
            scripts: Vec::new(),
        }
    }

    fn discover_scripts() -> Vec<PathBuf> {
        let mut found = Vec::new();
        if let Ok(entries) = std::fs::read_dir(".") {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "py") {
                    found.push(path);
                }
            }
        }
        found.sort();
        found
    }

    /// Flush one tree; collective over the communicator.
    pub fn flush<C: Communicator>(
        &mut self,
        _comm: &C,
        root: &Node<'_>,
    ) -> Result<(), FvMeshError> {
        if !self.initialized {
            if self.scripts.is_empty() {
                self.scripts = Self::discover_scripts();
            }
            self.runtime.initialize(&self.scripts)?;
            self.initialized = true;
        }
        self.runtime.execute(root)
    }

    pub fn finalize(&mut self) -> Result<(), FvMeshError> {
        if self.initialized {
            self.runtime.finalize()?;
        }
        Ok(())
    }
}
