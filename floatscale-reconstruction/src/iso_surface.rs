//! Crack-free isosurface extraction from the voxel octree
//!
//! Every leaf face is decomposed into the finest sub-faces seen by either
//! adjacent cell, and each sub-face boundary is walked through every voxel on
//! it. Both cells sharing a face therefore see the same crossings and pair
//! them the same way, which keeps the surface closed across depth changes.
//!
//! Face boundaries are walked counter-clockwise in the `(u, v)` plane of the
//! face, with `u = (axis + 1) % 3` and `v = (axis + 2) % 3`.

use crate::field::VoxelData;
use crate::interpolation::{self, CrossingFn, EdgeSample, Interpolation};
use crate::octree::{Cell, LatticeKey, Octree};
use crate::parallel;
use crate::triangulation;
use floatscale_core::{
    Color3f, Error, Point3d, Result, TriangleMesh, Vector3d, Vector3f, DUMMY_COLOR,
};
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Lattice edge an isovertex lies on, with `lo < hi`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub lo: LatticeKey,
    pub hi: LatticeKey,
}

impl EdgeKey {
    pub fn new(a: LatticeKey, b: LatticeKey) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }
}

/// A directed iso-segment across one sub-face
type Segment = (EdgeKey, EdgeKey);

/// Extracts the zero level set of a finalized octree
pub struct IsoSurfaceExtractor<'a> {
    octree: &'a Octree,
    crossing_fn: CrossingFn,
}

impl<'a> IsoSurfaceExtractor<'a> {
    pub fn new(octree: &'a Octree, interpolation: Interpolation) -> Self {
        assert!(
            octree.is_finalized(),
            "invariant violation: isosurface extraction requires computed voxels"
        );
        Self {
            octree,
            crossing_fn: interpolation.resolve(),
        }
    }

    /// Build the mesh. Vertices carry normals, confidences, scales and
    /// colors (the dummy color where a voxel had none).
    pub fn extract(&self) -> Result<TriangleMesh> {
        let leaves = self.octree.leaves();
        let loops_per_leaf = parallel::parallel_map(&leaves, |cell| self.leaf_loops(cell));

        let mut builder = MeshBuilder::default();
        for loops in &loops_per_leaf {
            for iso_loop in loops {
                let ids: Vec<usize> = iso_loop
                    .iter()
                    .map(|key| builder.vertex(key, |key| self.make_vertex(key)))
                    .collect();
                let positions: Vec<Point3d> = ids
                    .iter()
                    .map(|&id| builder.mesh.vertices[id].cast::<f64>())
                    .collect();
                for [a, b, c] in triangulation::triangulate(&positions) {
                    builder.mesh.add_face([ids[a], ids[b], ids[c]]);
                }
            }
        }

        let mesh = builder.finish();
        debug!(
            "Extracted {} vertices and {} faces from {} leaves",
            mesh.vertex_count(),
            mesh.face_count(),
            leaves.len()
        );
        if mesh.vertices.is_empty() {
            return Err(Error::EmptyResult);
        }
        Ok(mesh)
    }

    fn is_inside(&self, key: &LatticeKey) -> bool {
        self.octree.voxel(key).is_some_and(VoxelData::is_inside)
    }

    /// Closed loops of crossings for one leaf, oriented so that triangles
    /// face the outside (positive) region
    fn leaf_loops(&self, cell: &Cell) -> Vec<Vec<EdgeKey>> {
        let (min, extent) = self.octree.cell_lattice(cell);

        let mut next: HashMap<EdgeKey, EdgeKey> = HashMap::new();
        let mut starts = Vec::new();
        for axis in 0..3 {
            for side in 0..2 {
                for (from, to) in self.face_segments(min, extent, axis, side) {
                    if next.insert(from, to).is_some() {
                        trace!("Crossing {:?} starts two segments in leaf {:?}", from, cell);
                    }
                    starts.push(from);
                }
            }
        }

        let mut visited = HashSet::new();
        let mut loops = Vec::new();
        for &start in &starts {
            if visited.contains(&start) {
                continue;
            }
            let mut iso_loop = Vec::new();
            let mut current = start;
            let closed = loop {
                if !visited.insert(current) {
                    break false;
                }
                iso_loop.push(current);
                match next.get(&current) {
                    Some(&following) if following == start => break true,
                    Some(&following) => current = following,
                    None => break false,
                }
            };
            if !closed {
                trace!("Dropping open iso-loop in leaf {:?}", cell);
                continue;
            }
            if iso_loop.len() >= 3 {
                iso_loop.reverse();
                loops.push(iso_loop);
            }
        }
        loops
    }

    /// Iso-segments on one face of a leaf, with the inside on their left
    /// when viewed from outside the leaf
    fn face_segments(
        &self,
        min: LatticeKey,
        extent: u32,
        axis: usize,
        side: u32,
    ) -> Vec<Segment> {
        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;
        let origin = min.offset(axis, side * extent);

        let mut subfaces = Vec::new();
        self.split_face(origin, extent, u, v, &mut subfaces);

        let mut segments = Vec::new();
        for (corner, size) in subfaces {
            let boundary = self.subface_boundary(corner, size, u, v);
            for (from, to) in self.pair_crossings(&boundary) {
                if side == 0 {
                    segments.push((to, from));
                } else {
                    segments.push((from, to));
                }
            }
        }
        segments
    }

    /// Split a face while the neighbouring cell is finer, i.e. while a voxel
    /// exists at the face centre
    fn split_face(
        &self,
        corner: LatticeKey,
        size: u32,
        u: usize,
        v: usize,
        out: &mut Vec<(LatticeKey, u32)>,
    ) {
        if size >= 2 {
            let half = size / 2;
            let center = corner.offset(u, half).offset(v, half);
            if self.octree.has_voxel(&center) {
                for (du, dv) in [(0, 0), (half, 0), (0, half), (half, half)] {
                    self.split_face(corner.offset(u, du).offset(v, dv), half, u, v, out);
                }
                return;
            }
        }
        out.push((corner, size));
    }

    /// Every voxel on the sub-face boundary, counter-clockwise from `corner`
    fn subface_boundary(&self, corner: LatticeKey, size: u32, u: usize, v: usize) -> Vec<LatticeKey> {
        let c0 = corner;
        let c1 = c0.offset(u, size);
        let c2 = c1.offset(v, size);
        let c3 = c0.offset(v, size);

        let mut points = Vec::new();
        for (from, to) in [(c0, c1), (c1, c2), (c2, c3), (c3, c0)] {
            self.refine_edge(from, to, &mut points);
        }
        points
    }

    /// Push `from` and every voxel strictly between `from` and `to`
    fn refine_edge(&self, from: LatticeKey, to: LatticeKey, out: &mut Vec<LatticeKey>) {
        let length = (0..3).map(|a| from.0[a].abs_diff(to.0[a])).max().unwrap_or(0);
        if length >= 2 {
            let mid = LatticeKey([0, 1, 2].map(|a| (from.0[a] + to.0[a]) / 2));
            if self.octree.has_voxel(&mid) {
                self.refine_edge(from, mid, out);
                self.refine_edge(mid, to, out);
                return;
            }
        }
        out.push(from);
    }

    /// Pair each inside-to-outside crossing with the following
    /// outside-to-inside crossing along the boundary
    fn pair_crossings(&self, boundary: &[LatticeKey]) -> Vec<Segment> {
        let crossings: Vec<(EdgeKey, bool)> = boundary
            .iter()
            .circular_tuple_windows()
            .filter_map(|(a, b)| {
                let leaving = self.is_inside(a);
                (leaving != self.is_inside(b)).then(|| (EdgeKey::new(*a, *b), leaving))
            })
            .collect();

        let n = crossings.len();
        (0..n)
            .filter(|&i| crossings[i].1)
            .map(|i| (crossings[i].0, crossings[(i + 1) % n].0))
            .collect()
    }

    fn edge_sample(&self, key: &LatticeKey, voxel: &VoxelData) -> EdgeSample {
        EdgeSample {
            position: self.octree.lattice_position(key),
            value: f64::from(voxel.value),
            gradient: voxel.gradient.cast::<f64>(),
            scale: f64::from(voxel.scale),
        }
    }

    fn make_vertex(&self, key: &EdgeKey) -> IsoVertex {
        let empty = VoxelData::empty(0);
        let a = self.octree.voxel(&key.lo).unwrap_or(&empty);
        let b = self.octree.voxel(&key.hi).unwrap_or(&empty);

        let crossing = interpolation::locate_crossing(
            self.crossing_fn,
            &self.edge_sample(&key.lo, a),
            &self.edge_sample(&key.hi, b),
        );
        let t = crossing.t as f32;
        let lerp = |x: f32, y: f32| x + (y - x) * t;

        // A crossing next to an empty voxel is not backed by samples
        let confidence = if a.is_empty() || b.is_empty() {
            0.0
        } else {
            lerp(a.confidence, b.confidence)
        };
        let color = if a.color[0] < 0.0 || b.color[0] < 0.0 {
            DUMMY_COLOR
        } else {
            [0, 1, 2].map(|i| lerp(a.color[i], b.color[i]))
        };

        IsoVertex {
            position: crossing.position,
            normal: crossing.normal,
            confidence,
            scale: lerp(a.scale, b.scale),
            color,
        }
    }
}

struct IsoVertex {
    position: Point3d,
    normal: Vector3d,
    confidence: f32,
    scale: f32,
    color: Color3f,
}

/// Accumulates deduplicated vertices and their attributes
#[derive(Default)]
struct MeshBuilder {
    mesh: TriangleMesh,
    ids: HashMap<EdgeKey, usize>,
    normals: Vec<Vector3f>,
    confidences: Vec<f32>,
    values: Vec<f32>,
    colors: Vec<Color3f>,
}

impl MeshBuilder {
    fn vertex(&mut self, key: &EdgeKey, make: impl FnOnce(&EdgeKey) -> IsoVertex) -> usize {
        if let Some(&id) = self.ids.get(key) {
            return id;
        }
        let vertex = make(key);
        let id = self.mesh.add_vertex(vertex.position.cast::<f32>());
        self.normals.push(vertex.normal.cast::<f32>());
        self.confidences.push(vertex.confidence);
        self.values.push(vertex.scale);
        self.colors.push(vertex.color);
        self.ids.insert(*key, id);
        id
    }

    fn finish(self) -> TriangleMesh {
        let mut mesh = self.mesh;
        mesh.set_normals(self.normals);
        mesh.set_confidences(self.confidences);
        mesh.set_values(self.values);
        mesh.set_colors(self.colors);
        mesh
    }
}

/// Extract the isosurface of a finalized octree
pub fn extract_isosurface(octree: &Octree, interpolation: Interpolation) -> Result<TriangleMesh> {
    IsoSurfaceExtractor::new(octree, interpolation).extract()
}
