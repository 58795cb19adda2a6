//! Tree construction (SPEC_FULL.md §4.2 "Build").

use glam::DVec3;
use log::debug;

use super::{Extent, NodeIndex, Tree, TreeNode, TreeState};
use crate::error::SphResult;
use crate::parameters::TreeParameters;
use crate::particle::Particle;
use crate::periodic::PeriodicBox;

/// Rebuilds `tree` from scratch over every particle in `particles` (fluid,
/// wall, and point-mass alike; walls and point masses still occupy space and
/// participate in neighbor search and direct gravity).
pub fn make(
    tree: &mut Tree,
    particles: &[Particle],
    params: &TreeParameters,
    periodic: &PeriodicBox,
) -> SphResult<()> {
    tree.arena.clear();
    let extent = Extent::root_extent(particles.iter().map(|p| &p.pos), tree.dim, periodic);
    let root = tree.arena.insert(TreeNode::empty_leaf(extent, 0));
    tree.root = Some(root);

    for i in 0..particles.len() {
        insert(tree, root, i, particles, params, 0)?;
    }
    compute_moments(tree, root, particles);
    tree.state = TreeState::Built;
    Ok(())
}

fn insert(
    tree: &mut Tree,
    node: NodeIndex,
    particle_i: usize,
    particles: &[Particle],
    params: &TreeParameters,
    depth: u32,
) -> SphResult<()> {
    if tree.arena[node].is_leaf() {
        let over_capacity = tree.arena[node].particles.len() >= params.leaf_particle_num;
        if over_capacity && depth < params.max_level {
            subdivide(tree, node, particles, params, depth)?;
        } else {
            tree.arena[node].particles.push(particle_i);
            return Ok(());
        }
    }
    let pos = particles[particle_i].pos;
    let extent = tree.arena[node].extent;
    let octant = extent.octant_index(pos, tree.dim);
    let child = tree.arena[node].children.as_ref().unwrap()[octant];
    insert(tree, child, particle_i, particles, params, depth + 1)
}

fn subdivide(
    tree: &mut Tree,
    node: NodeIndex,
    particles: &[Particle],
    params: &TreeParameters,
    depth: u32,
) -> SphResult<()> {
    let extent = tree.arena[node].extent;
    let num_children = tree.dim.num_children();
    let mut child_indices = Vec::with_capacity(num_children);
    for octant in 0..num_children {
        let child_extent = extent.child_extent(octant, tree.dim);
        if tree.arena.len() == tree.arena.capacity() {
            debug!(
                "tree arena at capacity {}, growing",
                tree.arena.capacity()
            );
        }
        child_indices.push(tree.arena.insert(TreeNode::empty_leaf(child_extent, depth + 1)));
    }
    let displaced = std::mem::take(&mut tree.arena[node].particles);
    tree.arena[node].children = Some(child_indices);
    for particle_i in displaced {
        insert(tree, node, particle_i, particles, params, depth)?;
    }
    Ok(())
}

/// Post-order pass computing total mass, center of mass, and the subtree's
/// maximum smoothing length ("kernel_size", used to prune symmetric
/// neighbor queries). Returns `(mass, center_of_mass, kernel_size)`.
fn compute_moments(tree: &mut Tree, node: NodeIndex, particles: &[Particle]) -> (f64, DVec3, f64) {
    let children = tree.arena[node].children.clone();
    let (mass, weighted_pos, kernel_size) = match children {
        Some(children) => {
            let mut mass = 0.0;
            let mut weighted_pos = DVec3::ZERO;
            let mut kernel_size = 0.0_f64;
            for child in children {
                let (m, com, ks) = compute_moments(tree, child, particles);
                mass += m;
                weighted_pos += com * m;
                kernel_size = kernel_size.max(ks);
            }
            (mass, weighted_pos, kernel_size)
        }
        None => {
            let mut mass = 0.0;
            let mut weighted_pos = DVec3::ZERO;
            let mut kernel_size = 0.0_f64;
            for &i in &tree.arena[node].particles {
                let p = &particles[i];
                mass += p.mass;
                weighted_pos += p.pos * p.mass;
                kernel_size = kernel_size.max(p.sml);
            }
            (mass, weighted_pos, kernel_size)
        }
    };
    let center_of_mass = if mass > 0.0 {
        weighted_pos / mass
    } else {
        tree.arena[node].extent.center()
    };
    let entry = &mut tree.arena[node];
    entry.mass = mass;
    entry.center_of_mass = center_of_mass;
    entry.kernel_size = kernel_size;
    (mass, center_of_mass, kernel_size)
}
