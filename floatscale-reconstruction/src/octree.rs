//! Adaptive octree over scale-annotated samples
//!
//! Nodes live in a flat arena; the eight children of a node occupy eight
//! consecutive slots and are indexed by octant (bit 0 = x, bit 1 = y,
//! bit 2 = z, set for the upper half). Depth and integer coordinates are not
//! stored per node but carried in a [`Cell`] while traversing.
//!
//! After [`Octree::compute_voxels`] the field is stored on the corners of the
//! leaf cells, addressed by [`LatticeKey`]s on the lattice of the deepest
//! leaf level, and the tree becomes read-only.

use crate::basis;
use crate::field::{FieldAccumulator, VoxelData};
use crate::parallel;
use floatscale_core::{Point3d, Sample, Vector3d};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::mem;
use tracing::debug;

/// Default bound on the octree depth
pub const DEFAULT_MAX_DEPTH: u8 = 20;

/// Deepest level whose lattice coordinates fit in `u32`
pub const MAX_SUPPORTED_DEPTH: u8 = 30;

/// Share of all samples that must sit at or above the depth bound
const DEPTH_LIMIT_FRACTION: f64 = 0.999;

#[derive(Debug, Clone, Default)]
struct Node {
    /// Index of the first of eight consecutive children
    children: Option<usize>,
    samples: Vec<Sample>,
}

/// A node together with its position in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub index: usize,
    pub depth: u8,
    /// Integer coordinates of the cell at its own depth
    pub coords: [u32; 3],
}

impl Cell {
    fn root() -> Self {
        Self {
            index: 0,
            depth: 0,
            coords: [0; 3],
        }
    }

    fn child(&self, first: usize, octant: usize) -> Self {
        let mut coords = self.coords;
        for (axis, c) in coords.iter_mut().enumerate() {
            *c = *c * 2 + ((octant >> axis) & 1) as u32;
        }
        Self {
            index: first + octant,
            depth: self.depth + 1,
            coords,
        }
    }
}

/// Integer corner position on the finest lattice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LatticeKey(pub [u32; 3]);

impl LatticeKey {
    /// Key displaced by `delta` lattice units along `axis`
    pub fn offset(self, axis: usize, delta: u32) -> Self {
        let mut coords = self.0;
        coords[axis] += delta;
        Self(coords)
    }
}

/// Shape statistics, logged before voxel computation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OctreeStats {
    pub num_nodes: usize,
    pub num_leaves: usize,
    pub num_samples: usize,
    pub depth: u8,
    pub samples_per_depth: Vec<usize>,
    pub num_voxels: usize,
}

impl fmt::Display for OctreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes, {} leaves, {} samples, depth {}, {} voxels",
            self.num_nodes, self.num_leaves, self.num_samples, self.depth, self.num_voxels
        )
    }
}

/// Adaptive octree holding samples and, once finalized, voxel data
#[derive(Debug, Clone)]
pub struct Octree {
    nodes: Vec<Node>,
    root_center: Point3d,
    root_size: f64,
    max_depth: u8,
    num_samples: usize,
    voxels: HashMap<LatticeKey, VoxelData>,
    lattice_depth: u8,
    finalized: bool,
    samples_cleared: bool,
}

impl Default for Octree {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl Octree {
    /// Create an empty tree; the root is placed at the first inserted sample
    pub fn new(max_depth: u8) -> Self {
        Self {
            nodes: Vec::new(),
            root_center: Point3d::origin(),
            root_size: 0.0,
            max_depth: max_depth.min(MAX_SUPPORTED_DEPTH),
            num_samples: 0,
            voxels: HashMap::new(),
            lattice_depth: 0,
            finalized: false,
            samples_cleared: false,
        }
    }

    /// Create an empty tree with explicit root bounds
    pub fn with_root(center: Point3d, size: f64, max_depth: u8) -> Self {
        assert!(
            size.is_finite() && size > 0.0,
            "invariant violation: root size must be positive, got {}",
            size
        );
        let mut tree = Self::new(max_depth);
        tree.root_center = center;
        tree.root_size = size;
        tree.nodes.push(Node::default());
        tree
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    pub fn root_center(&self) -> Point3d {
        self.root_center
    }

    pub fn root_size(&self) -> f64 {
        self.root_size
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn assert_mutable(&self, operation: &str) {
        assert!(
            !self.finalized && !self.samples_cleared,
            "invariant violation: {} called on an octree that is finalized or has cleared samples",
            operation
        );
    }

    /// Insert a sample, growing the root if it lies outside
    pub fn insert(&mut self, sample: Sample) {
        self.assert_mutable("insert");
        let position = sample.position.cast::<f64>();
        let scale = f64::from(sample.scale);
        assert!(
            position.coords.iter().all(|c| c.is_finite()) && scale > 0.0,
            "invariant violation: sample must have a finite position and positive scale"
        );

        if self.nodes.is_empty() {
            self.root_center = position;
            self.root_size = scale;
            self.nodes.push(Node::default());
        }
        while !self.root_contains(&position) {
            self.grow_root(&position);
            // Growth moves every node one level down
            self.collapse_below(self.max_depth);
        }

        let mut cell = Cell::root();
        let mut center = self.root_center;
        let mut size = self.root_size;
        while cell.depth < self.max_depth && size * 0.5 >= scale {
            let first = self.ensure_children(cell.index);
            let octant = octant_of(&center, &position);
            center = child_center(&center, size, octant);
            size *= 0.5;
            cell = cell.child(first, octant);
        }

        self.nodes[cell.index].samples.push(sample);
        self.num_samples += 1;
    }

    fn root_contains(&self, p: &Point3d) -> bool {
        let half = self.root_size * 0.5;
        (0..3).all(|axis| {
            p[axis] >= self.root_center[axis] - half && p[axis] <= self.root_center[axis] + half
        })
    }

    /// Double the root towards `p`; the old root becomes one octant
    fn grow_root(&mut self, p: &Point3d) {
        let half = self.root_size * 0.5;
        let mut octant = 0;
        let mut center = self.root_center;
        for axis in 0..3 {
            if p[axis] < self.root_center[axis] {
                octant |= 1 << axis;
                center[axis] -= half;
            } else {
                center[axis] += half;
            }
        }

        let old_root = mem::take(&mut self.nodes[0]);
        let first = self.nodes.len();
        self.nodes.resize_with(first + 8, Node::default);
        self.nodes[first + octant] = old_root;
        self.nodes[0].children = Some(first);
        self.root_center = center;
        self.root_size *= 2.0;
    }

    fn ensure_children(&mut self, index: usize) -> usize {
        if let Some(first) = self.nodes[index].children {
            return first;
        }
        let first = self.nodes.len();
        self.nodes.resize_with(first + 8, Node::default);
        self.nodes[index].children = Some(first);
        first
    }

    /// Split every leaf `levels` times, moving samples down by octant.
    /// Leaves at the maximum depth are left as they are.
    pub fn refine(&mut self, levels: u8) {
        self.assert_mutable("refine");
        for _ in 0..levels {
            for cell in self.leaves() {
                if cell.depth >= self.max_depth {
                    continue;
                }
                let center = self.cell_center(&cell);
                let samples = mem::take(&mut self.nodes[cell.index].samples);
                let first = self.ensure_children(cell.index);
                for sample in samples {
                    let octant = octant_of(&center, &sample.position.cast::<f64>());
                    self.nodes[first + octant].samples.push(sample);
                }
            }
        }
    }

    /// Collapse subtrees below the depth that already holds nearly all
    /// samples. Returns the depth bound that was applied.
    pub fn limit_depth(&mut self) -> u8 {
        self.assert_mutable("limit_depth");
        let per_depth = self.samples_per_depth();
        let total: usize = per_depth.iter().sum();
        if total == 0 {
            return self.depth();
        }

        let threshold = DEPTH_LIMIT_FRACTION * total as f64;
        let mut cumulative = 0;
        let mut bound = per_depth.len().saturating_sub(1) as u8;
        for (depth, count) in per_depth.iter().enumerate() {
            cumulative += count;
            if cumulative as f64 >= threshold {
                bound = depth as u8;
                break;
            }
        }
        let bound = bound.min(self.max_depth);

        let collapsed = self.collapse_below(bound);
        if collapsed > 0 {
            debug!("Collapsed {} subtrees below depth {}", collapsed, bound);
        }
        bound
    }

    /// Merge every subtree rooted at `bound` into that node and drop
    /// unreachable nodes. Returns the number of collapsed subtrees.
    fn collapse_below(&mut self, bound: u8) -> usize {
        let mut collapsed = 0;
        let mut stack = vec![(0usize, 0u8)];
        while let Some((index, depth)) = stack.pop() {
            let Some(first) = self.nodes[index].children else {
                continue;
            };
            if depth < bound {
                stack.extend((first..first + 8).map(|child| (child, depth + 1)));
                continue;
            }
            let mut samples = Vec::new();
            self.take_subtree_samples(index, &mut samples);
            self.nodes[index].samples = samples;
            collapsed += 1;
        }

        if collapsed > 0 {
            self.compact();
        }
        collapsed
    }

    /// Move all samples of the subtree into `out` and detach its children
    fn take_subtree_samples(&mut self, index: usize, out: &mut Vec<Sample>) {
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            out.append(&mut self.nodes[i].samples);
            if let Some(first) = self.nodes[i].children.take() {
                stack.extend(first..first + 8);
            }
        }
    }

    /// Rebuild the arena with only the reachable nodes
    fn compact(&mut self) {
        let mut old = mem::take(&mut self.nodes);
        if old.is_empty() {
            return;
        }
        let mut nodes = vec![Node {
            children: None,
            samples: mem::take(&mut old[0].samples),
        }];
        let mut queue = VecDeque::from([(0usize, 0usize)]);
        while let Some((old_index, new_index)) = queue.pop_front() {
            let Some(old_first) = old[old_index].children else {
                continue;
            };
            let new_first = nodes.len();
            nodes[new_index].children = Some(new_first);
            for octant in 0..8 {
                nodes.push(Node {
                    children: None,
                    samples: mem::take(&mut old[old_first + octant].samples),
                });
                queue.push_back((old_first + octant, new_first + octant));
            }
        }
        self.nodes = nodes;
    }

    /// Evaluate the field on every leaf corner and freeze the tree
    pub fn compute_voxels(&mut self) {
        self.assert_mutable("compute_voxels");
        self.finalized = true;
        if self.nodes.is_empty() {
            return;
        }

        // Canonical accumulation order regardless of insertion order
        for node in &mut self.nodes {
            node.samples.sort_by(Sample::total_cmp);
        }

        let leaves = self.leaves();
        let depth = leaves.iter().map(|cell| cell.depth).max().unwrap_or(0);
        assert!(
            depth <= MAX_SUPPORTED_DEPTH,
            "invariant violation: octree depth {} exceeds the supported lattice depth",
            depth
        );
        self.lattice_depth = depth;

        let mut keys: Vec<LatticeKey> = leaves
            .iter()
            .flat_map(|cell| (0..8).map(move |corner| (cell, corner)))
            .map(|(cell, corner)| self.corner_key(cell, corner))
            .collect();
        keys.sort_unstable();
        keys.dedup();

        let max_scales = self.subtree_max_scales();
        let tree = &*self;
        let values = parallel::parallel_map(&keys, |key| {
            tree.evaluate(tree.lattice_position(key), &max_scales)
        });
        self.voxels = keys.into_iter().zip(values).collect();

        debug!(
            "Computed {} voxels on lattice depth {}",
            self.voxels.len(),
            self.lattice_depth
        );
    }

    fn evaluate(&self, x: Point3d, max_scales: &[f32]) -> VoxelData {
        let mut acc = FieldAccumulator::new(x);
        let mut stack = vec![Cell::root()];
        while let Some(cell) = stack.pop() {
            let max_scale = f64::from(max_scales[cell.index]);
            if max_scale <= 0.0
                || self.distance_to_cell(&cell, &x) > basis::INFLUENCE_RADIUS * max_scale
            {
                continue;
            }
            let node = &self.nodes[cell.index];
            for sample in &node.samples {
                acc.add(sample);
            }
            if let Some(first) = node.children {
                stack.extend((0..8).rev().map(|octant| cell.child(first, octant)));
            }
        }
        acc.finish()
    }

    /// Largest sample scale in every subtree
    fn subtree_max_scales(&self) -> Vec<f32> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            order.push(index);
            if let Some(first) = self.nodes[index].children {
                stack.extend(first..first + 8);
            }
        }

        let mut max_scales = vec![0.0f32; self.nodes.len()];
        for &index in order.iter().rev() {
            let node = &self.nodes[index];
            let own = node.samples.iter().map(|s| s.scale).fold(0.0, f32::max);
            let children = node
                .children
                .map(|first| (first..first + 8).map(|c| max_scales[c]).fold(0.0, f32::max))
                .unwrap_or(0.0);
            max_scales[index] = own.max(children);
        }
        max_scales
    }

    /// Release sample storage, keeping shape and voxels
    pub fn clear_samples(&mut self) {
        for node in &mut self.nodes {
            node.samples = Vec::new();
        }
        self.samples_cleared = true;
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.children.is_none()).count()
    }

    /// Number of inserted samples (unaffected by [`Octree::clear_samples`])
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Sample count stored at each depth
    pub fn samples_per_depth(&self) -> Vec<usize> {
        let mut counts = Vec::new();
        if self.nodes.is_empty() {
            return counts;
        }
        let mut stack = vec![(0usize, 0usize)];
        while let Some((index, depth)) = stack.pop() {
            if counts.len() <= depth {
                counts.resize(depth + 1, 0);
            }
            counts[depth] += self.nodes[index].samples.len();
            if let Some(first) = self.nodes[index].children {
                stack.extend((first..first + 8).map(|child| (child, depth + 1)));
            }
        }
        counts
    }

    /// Depth of the deepest leaf
    pub fn depth(&self) -> u8 {
        self.leaves().iter().map(|c| c.depth).max().unwrap_or(0)
    }

    /// All leaf cells in depth-first, octant order
    pub fn leaves(&self) -> Vec<Cell> {
        let mut leaves = Vec::new();
        if self.nodes.is_empty() {
            return leaves;
        }
        let mut stack = vec![Cell::root()];
        while let Some(cell) = stack.pop() {
            match self.nodes[cell.index].children {
                Some(first) => stack.extend((0..8).rev().map(|octant| cell.child(first, octant))),
                None => leaves.push(cell),
            }
        }
        leaves
    }

    /// Samples stored at a node; empty after [`Octree::clear_samples`]
    pub fn samples(&self, cell: &Cell) -> &[Sample] {
        &self.nodes[cell.index].samples
    }

    pub fn cell_size(&self, depth: u8) -> f64 {
        self.root_size / (1u64 << depth) as f64
    }

    fn root_min(&self) -> Point3d {
        self.root_center - Vector3d::repeat(self.root_size * 0.5)
    }

    pub fn cell_center(&self, cell: &Cell) -> Point3d {
        let size = self.cell_size(cell.depth);
        let offset = Vector3d::new(
            (f64::from(cell.coords[0]) + 0.5) * size,
            (f64::from(cell.coords[1]) + 0.5) * size,
            (f64::from(cell.coords[2]) + 0.5) * size,
        );
        self.root_min() + offset
    }

    fn distance_to_cell(&self, cell: &Cell, x: &Point3d) -> f64 {
        let size = self.cell_size(cell.depth);
        let min = self.root_min();
        let mut dist2 = 0.0;
        for axis in 0..3 {
            let lo = min[axis] + f64::from(cell.coords[axis]) * size;
            let hi = lo + size;
            let d = (lo - x[axis]).max(x[axis] - hi).max(0.0);
            dist2 += d * d;
        }
        dist2.sqrt()
    }

    /// Depth of the voxel lattice, set by [`Octree::compute_voxels`]
    pub fn lattice_depth(&self) -> u8 {
        self.lattice_depth
    }

    /// Minimum corner and edge length of a cell in lattice units
    pub fn cell_lattice(&self, cell: &Cell) -> (LatticeKey, u32) {
        let shift = self.lattice_depth - cell.depth;
        let min = cell.coords.map(|c| c << shift);
        (LatticeKey(min), 1 << shift)
    }

    fn corner_key(&self, cell: &Cell, corner: usize) -> LatticeKey {
        let (min, extent) = self.cell_lattice(cell);
        let mut coords = min.0;
        for (axis, c) in coords.iter_mut().enumerate() {
            if (corner >> axis) & 1 == 1 {
                *c += extent;
            }
        }
        LatticeKey(coords)
    }

    /// World position of a lattice key
    pub fn lattice_position(&self, key: &LatticeKey) -> Point3d {
        let unit = self.cell_size(self.lattice_depth);
        let offset = Vector3d::new(
            f64::from(key.0[0]) * unit,
            f64::from(key.0[1]) * unit,
            f64::from(key.0[2]) * unit,
        );
        self.root_min() + offset
    }

    pub fn voxel(&self, key: &LatticeKey) -> Option<&VoxelData> {
        self.voxels.get(key)
    }

    pub fn has_voxel(&self, key: &LatticeKey) -> bool {
        self.voxels.contains_key(key)
    }

    pub fn num_voxels(&self) -> usize {
        self.voxels.len()
    }

    pub fn voxels(&self) -> impl Iterator<Item = (&LatticeKey, &VoxelData)> {
        self.voxels.iter()
    }

    pub fn stats(&self) -> OctreeStats {
        OctreeStats {
            num_nodes: self.num_nodes(),
            num_leaves: self.num_leaves(),
            num_samples: self.num_samples,
            depth: self.depth(),
            samples_per_depth: self.samples_per_depth(),
            num_voxels: self.voxels.len(),
        }
    }
}

fn octant_of(center: &Point3d, p: &Point3d) -> usize {
    (0..3)
        .filter(|&axis| p[axis] >= center[axis])
        .fold(0, |octant, axis| octant | (1 << axis))
}

fn child_center(center: &Point3d, size: f64, octant: usize) -> Point3d {
    let quarter = size * 0.25;
    let mut child = *center;
    for axis in 0..3 {
        if (octant >> axis) & 1 == 1 {
            child[axis] += quarter;
        } else {
            child[axis] -= quarter;
        }
    }
    child
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use floatscale_core::{Point3f, Vector3f};

    fn sample(x: f32, y: f32, z: f32, scale: f32) -> Sample {
        Sample::new(Point3f::new(x, y, z), Vector3f::z(), scale)
    }

    #[test]
    fn test_first_sample_creates_root() {
        let mut tree = Octree::default();
        tree.insert(sample(1.0, 2.0, 3.0, 0.5));
        assert_eq!(tree.root_center(), Point3d::new(1.0, 2.0, 3.0));
        assert_eq!(tree.root_size(), 0.5);
        assert_eq!(tree.num_nodes(), 1);
        assert_eq!(tree.num_leaves(), 1);
        assert_eq!(tree.samples_per_depth(), vec![1]);
    }

    #[test]
    fn test_insert_stops_at_scale() {
        let mut tree = Octree::with_root(Point3d::origin(), 8.0, DEFAULT_MAX_DEPTH);
        tree.insert(sample(0.3, -0.2, 1.7, 1.0));
        // Cell sizes 8, 4, 2, 1: the sample lands at depth 3
        assert_eq!(tree.samples_per_depth(), vec![0, 0, 0, 1]);
        assert_eq!(tree.num_nodes(), 1 + 3 * 8);
        assert_eq!(tree.num_leaves(), 22);

        let leaf = tree
            .leaves()
            .into_iter()
            .find(|c| !tree.samples(c).is_empty())
            .unwrap();
        assert_eq!(leaf.depth, 3);
        assert_eq!(leaf.coords, [4, 3, 5]);
        assert_eq!(tree.cell_center(&leaf), Point3d::new(0.5, -0.5, 1.5));
    }

    #[test]
    fn test_insert_respects_max_depth() {
        let mut tree = Octree::with_root(Point3d::origin(), 8.0, 2);
        tree.insert(sample(0.1, 0.1, 0.1, 0.01));
        assert_eq!(tree.samples_per_depth(), vec![0, 0, 1]);
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn test_root_growth_respects_max_depth() {
        let mut tree = Octree::new(4);
        tree.insert(sample(0.0, 0.0, 0.0, 0.01));
        tree.insert(sample(100.0, 0.0, 0.0, 0.01));
        assert!(tree.depth() <= tree.max_depth());
        assert_eq!(tree.num_samples(), 2);
        assert_eq!(tree.samples_per_depth().iter().sum::<usize>(), 2);

        let mut tree = Octree::default();
        tree.insert(sample(0.0, 0.0, 0.0, 1e-6));
        tree.insert(sample(1e4, 0.0, 0.0, 1e-6));
        assert!(tree.depth() <= tree.max_depth());
        tree.compute_voxels();
        assert!(tree.num_voxels() >= 8);
    }

    #[test]
    fn test_root_grows_towards_sample() {
        let mut tree = Octree::default();
        tree.insert(sample(0.0, 0.0, 0.0, 1.0));
        tree.insert(sample(3.0, 0.0, 0.0, 1.0));
        assert_eq!(tree.root_size(), 4.0);
        assert_eq!(tree.root_center(), Point3d::new(1.5, -0.5, -0.5));
        assert_eq!(tree.num_samples(), 2);
        assert_eq!(tree.samples_per_depth(), vec![0, 0, 2]);

        let mut leaves: Vec<_> = tree
            .leaves()
            .into_iter()
            .filter(|c| !tree.samples(c).is_empty())
            .collect();
        leaves.sort_by_key(|c| c.coords);
        assert_eq!(leaves[0].coords, [0, 2, 2]);
        assert_eq!(leaves[1].coords, [3, 2, 2]);
    }

    #[test]
    fn test_refine_is_monotonic() {
        let mut tree = Octree::with_root(Point3d::origin(), 4.0, DEFAULT_MAX_DEPTH);
        for i in 0..20 {
            let t = i as f32 / 20.0;
            tree.insert(sample(t * 3.0 - 1.5, (t * 7.0).sin(), (t * 5.0).cos(), 0.6 + t));
        }
        let mut leaves = tree.num_leaves();
        let mut depth = tree.depth();

        for _ in 0..3 {
            tree.refine(1);
            assert_eq!(tree.num_leaves(), leaves * 8);
            assert_eq!(tree.depth(), depth + 1);
            assert_eq!(tree.samples_per_depth().iter().sum::<usize>(), 20);
            assert_eq!(tree.num_samples(), 20);
            leaves = tree.num_leaves();
            depth = tree.depth();
        }
    }

    #[test]
    fn test_refine_keeps_max_depth_leaves() {
        let mut tree = Octree::with_root(Point3d::origin(), 1.0, 1);
        tree.insert(sample(0.1, 0.1, 0.1, 0.01));
        tree.refine(2);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.num_leaves(), 8);
    }

    #[test]
    fn test_limit_depth_collapses_outliers() {
        let mut tree = Octree::with_root(Point3d::origin(), 8.0, DEFAULT_MAX_DEPTH);
        for i in 0..1000 {
            let x = (i % 10) as f32 * 0.7 - 3.5;
            let y = ((i / 10) % 10) as f32 * 0.7 - 3.5;
            let z = (i / 100) as f32 * 0.7 - 3.5;
            tree.insert(sample(x, y, z, 1.0));
        }
        tree.insert(sample(0.01, 0.01, 0.01, 0.1));
        assert_eq!(tree.samples_per_depth().len(), 7);
        let nodes_before = tree.num_nodes();

        let bound = tree.limit_depth();
        assert_eq!(bound, 3);
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.samples_per_depth(), vec![0, 0, 0, 1001]);
        assert!(tree.num_nodes() < nodes_before);
        assert_eq!(tree.num_samples(), 1001);
    }

    #[test]
    fn test_single_leaf_voxels() {
        let mut tree = Octree::with_root(Point3d::origin(), 2.0, DEFAULT_MAX_DEPTH);
        tree.insert(sample(0.0, 0.0, 0.0, 1.5));
        tree.compute_voxels();

        assert!(tree.is_finalized());
        assert_eq!(tree.lattice_depth(), 0);
        assert_eq!(tree.num_voxels(), 8);
        let corner = LatticeKey([1, 0, 1]);
        assert_eq!(tree.lattice_position(&corner), Point3d::new(1.0, -1.0, 1.0));
        let voxel = tree.voxel(&corner).unwrap();
        assert!(voxel.confidence > 0.0);
        assert!(voxel.value > 0.0);
        assert!(tree.voxel(&LatticeKey([1, 1, 0])).unwrap().value < 0.0);
    }

    #[test]
    fn test_mixed_depth_lattice() {
        let mut tree = Octree::with_root(Point3d::origin(), 4.0, DEFAULT_MAX_DEPTH);
        tree.insert(sample(1.0, 1.0, 1.0, 2.0));
        tree.insert(sample(-1.5, -1.5, -1.5, 1.0));
        tree.compute_voxels();

        assert_eq!(tree.lattice_depth(), 2);
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 15);
        let (min, extent) = tree.cell_lattice(&leaves[0]);
        assert_eq!(min, LatticeKey([0, 0, 0]));
        assert_eq!(extent, 1);
        let (min, extent) = tree.cell_lattice(leaves.last().unwrap());
        assert_eq!(min, LatticeKey([2, 2, 2]));
        assert_eq!(extent, 2);
        // 27 corners of the depth-1 grid plus 19 new ones from the refined octant
        assert_eq!(tree.num_voxels(), 27 + 19);
        assert_relative_eq!(
            tree.lattice_position(&LatticeKey([4, 4, 4])),
            Point3d::new(2.0, 2.0, 2.0)
        );
    }

    #[test]
    fn test_voxels_independent_of_insertion_order() {
        let samples: Vec<Sample> = (0..30)
            .map(|i| {
                let t = i as f32 * 0.37;
                Sample::new(
                    Point3f::new(t.sin(), t.cos(), (t * 0.5).sin()),
                    Vector3f::new(t.sin(), t.cos(), 0.3).normalize(),
                    0.3 + (i % 3) as f32 * 0.2,
                )
                .with_confidence(0.5 + (i % 4) as f32 * 0.25)
            })
            .collect();

        let build = |samples: &[Sample]| {
            let mut tree = Octree::with_root(Point3d::origin(), 2.5, DEFAULT_MAX_DEPTH);
            for s in samples {
                tree.insert(*s);
            }
            tree.compute_voxels();
            tree
        };
        let forward = build(&samples);
        let reversed: Vec<_> = samples.iter().rev().copied().collect();
        let backward = build(&reversed);

        assert_eq!(forward.num_voxels(), backward.num_voxels());
        for (key, voxel) in forward.voxels() {
            assert_eq!(backward.voxel(key), Some(voxel));
        }
    }

    #[test]
    fn test_clear_samples_keeps_voxels() {
        let mut tree = Octree::with_root(Point3d::origin(), 2.0, DEFAULT_MAX_DEPTH);
        tree.insert(sample(0.0, 0.0, 0.0, 1.5));
        tree.compute_voxels();
        tree.clear_samples();
        assert_eq!(tree.num_voxels(), 8);
        assert_eq!(tree.num_samples(), 1);
        assert!(tree.samples(&tree.leaves()[0]).is_empty());
        assert_eq!(tree.stats().num_voxels, 8);
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn test_insert_after_finalize_panics() {
        let mut tree = Octree::default();
        tree.insert(sample(0.0, 0.0, 0.0, 1.0));
        tree.compute_voxels();
        tree.insert(sample(0.5, 0.0, 0.0, 1.0));
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn test_refine_after_clear_panics() {
        let mut tree = Octree::default();
        tree.insert(sample(0.0, 0.0, 0.0, 1.0));
        tree.clear_samples();
        tree.refine(1);
    }
}
