//! Arena-indexed Barnes-Hut tree (SPEC_FULL.md §4.2).
//!
//! Grounded on the teacher's `quadtree/mod.rs` subdivision algorithm
//! (leaf-to-node promotion, per-axis child selection) and `gravity/mod.rs`'s
//! tree traversal/opening-angle criterion, generalized from a fixed 2D
//! quadtree of `Box<[QuadTree; 4]>` children to a runtime-dimensioned octree
//! whose nodes live in a [`generational_arena::Arena`] (the arena pattern is
//! the teacher's own, see `voronoi/indexed_arena.rs`), and from MPI-rank
//! subtrees to a single shared-memory tree walked with `rayon`.

pub mod build;
pub mod gravity;
pub mod neighbor;

use generational_arena::{Arena, Index};
use glam::DVec3;

use crate::parameters::Dimension;
use crate::periodic::PeriodicBox;

pub type NodeIndex = Index;

/// An axis-aligned bounding box. Unused trailing axes of a lower-dimensional
/// run are pinned to `[0, 0]` and never consulted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min: DVec3,
    pub max: DVec3,
}

impl Extent {
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn side_lengths(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn max_side_length(&self, dim: Dimension) -> f64 {
        let s = self.side_lengths();
        match dim {
            Dimension::D1 => s.x,
            Dimension::D2 => s.x.max(s.y),
            Dimension::D3 => s.x.max(s.y).max(s.z),
        }
    }

    /// The octant (0..num_children) `pos` falls into, bisecting each active
    /// axis at the node's center; bit `k` of the result is set when `pos`'s
    /// component `k` is on the upper half of that axis.
    pub fn octant_index(&self, pos: DVec3, dim: Dimension) -> usize {
        let c = self.center();
        let mut idx = 0usize;
        if pos.x >= c.x {
            idx |= 1;
        }
        if dim.value() >= 2 && pos.y >= c.y {
            idx |= 2;
        }
        if dim.value() >= 3 && pos.z >= c.z {
            idx |= 4;
        }
        idx
    }

    pub fn child_extent(&self, octant: usize, dim: Dimension) -> Extent {
        let c = self.center();
        let mut min = self.min;
        let mut max = self.max;
        if octant & 1 != 0 {
            min.x = c.x;
        } else {
            max.x = c.x;
        }
        if dim.value() >= 2 {
            if octant & 2 != 0 {
                min.y = c.y;
            } else {
                max.y = c.y;
            }
        }
        if dim.value() >= 3 {
            if octant & 4 != 0 {
                min.z = c.z;
            } else {
                max.z = c.z;
            }
        }
        Extent { min, max }
    }

    /// Lower bound on the distance from `pos` to any point inside this box,
    /// accounting for the minimum-image convention when `periodic` is
    /// enabled (SPEC_FULL.md §4.2 "Neighbor search").
    pub fn min_distance(&self, pos: DVec3, dim: Dimension, periodic: &PeriodicBox) -> f64 {
        let axes = dim.value();
        let comps = [
            (pos.x, self.min.x, self.max.x, periodic.max.x - periodic.min.x),
            (pos.y, self.min.y, self.max.y, periodic.max.y - periodic.min.y),
            (pos.z, self.min.z, self.max.z, periodic.max.z - periodic.min.z),
        ];
        let mut d2 = 0.0;
        for comp in comps.iter().take(axes) {
            let (p, lo, hi, side) = *comp;
            let mut delta = if p < lo {
                lo - p
            } else if p > hi {
                p - hi
            } else {
                0.0
            };
            if periodic.enabled {
                delta = delta.min((side - delta).abs());
            }
            d2 += delta * delta;
        }
        d2.sqrt()
    }

    /// A cube aligned to the origin enclosing every particle position, or
    /// the periodic domain verbatim when periodicity is enabled
    /// (SPEC_FULL.md §4.2 "Build").
    pub fn root_extent<'a>(
        positions: impl Iterator<Item = &'a DVec3>,
        dim: Dimension,
        periodic: &PeriodicBox,
    ) -> Extent {
        if periodic.enabled {
            return Extent {
                min: periodic.min,
                max: periodic.max,
            };
        }
        let mut max_abs = 0.0_f64;
        for pos in positions {
            max_abs = max_abs.max(pos.x.abs());
            if dim.value() >= 2 {
                max_abs = max_abs.max(pos.y.abs());
            }
            if dim.value() >= 3 {
                max_abs = max_abs.max(pos.z.abs());
            }
        }
        if max_abs == 0.0 {
            max_abs = 1.0;
        }
        let half = max_abs * 1.01;
        Extent {
            min: DVec3::splat(-half),
            max: DVec3::splat(half),
        }
    }
}

#[derive(Debug, Default)]
pub struct TreeNode {
    pub extent: Extent,
    pub level: u32,
    /// `None` for a leaf.
    pub children: Option<Vec<NodeIndex>>,
    /// Particle indices held directly by this node; empty once subdivided.
    pub particles: Vec<usize>,
    pub mass: f64,
    pub center_of_mass: DVec3,
    /// Largest per-particle smoothing length anywhere in this subtree; the
    /// pruning radius used by the symmetric neighbor search (SPEC_FULL.md §4.2).
    pub kernel_size: f64,
}

impl TreeNode {
    fn empty_leaf(extent: Extent, level: u32) -> Self {
        Self {
            extent,
            level,
            children: None,
            particles: Vec::new(),
            mass: 0.0,
            center_of_mass: DVec3::ZERO,
            kernel_size: 0.0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Tree lifecycle (SPEC_FULL.md §4.2 "State machine").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
    Empty,
    Built,
    Stale,
}

pub struct Tree {
    pub arena: Arena<TreeNode>,
    pub root: Option<NodeIndex>,
    pub state: TreeState,
    pub dim: Dimension,
}

impl Default for Extent {
    fn default() -> Self {
        Extent {
            min: DVec3::ZERO,
            max: DVec3::ZERO,
        }
    }
}

impl Tree {
    pub fn empty(dim: Dimension, initial_arena_capacity: usize) -> Self {
        Self {
            arena: Arena::with_capacity(initial_arena_capacity),
            root: None,
            state: TreeState::Empty,
            dim,
        }
    }

    /// Marks the tree stale after particles have moved (SPEC_FULL.md §4.2,
    /// "each integrator step transitions Built→Stale at drift completion").
    pub fn mark_stale(&mut self) {
        if self.state == TreeState::Built {
            self.state = TreeState::Stale;
        }
    }

    pub fn node_count(&self) -> usize {
        self.arena.len()
    }
}
