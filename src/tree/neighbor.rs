//! Neighbor search (SPEC_FULL.md §4.2 "Neighbor search").

use super::{NodeIndex, Tree, TreeState};
use crate::error::{SphError, SphResult};
use crate::particle::Particle;
use crate::periodic::PeriodicBox;

const DEFAULT_CAPACITY: usize = 512;
const MAX_CAPACITY: usize = 1 << 16;

/// Calls [`search`], doubling the buffer capacity and retrying on
/// `NeighborOverflow` up to a hard cap (SPEC_FULL.md §4.2 "Neighbor search":
/// "the default retry policy doubles the buffer size, capped at a
/// configurable maximum").
pub fn search_with_retry(
    tree: &Tree,
    particles: &[Particle],
    i: usize,
    symmetric: bool,
    periodic: &PeriodicBox,
    out: &mut Vec<usize>,
) -> SphResult<()> {
    let mut capacity = DEFAULT_CAPACITY;
    loop {
        match search(tree, particles, i, symmetric, periodic, capacity, out) {
            Ok(()) => return Ok(()),
            Err(SphError::NeighborOverflow { .. }) if capacity < MAX_CAPACITY => {
                capacity *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Finds every particle within the applicable cutoff of particle `i`,
/// appending their indices to `out` (which is cleared first). `symmetric`
/// selects between the asymmetric cutoff `h_i` and the symmetric cutoff
/// `max(h_i, h_j)` (SPEC_FULL.md §4.2, §4.4). Fails with `NeighborOverflow`
/// if more than `capacity` neighbors would be returned, so the caller can
/// retry with a larger buffer (SPEC_FULL.md §5).
pub fn search(
    tree: &Tree,
    particles: &[Particle],
    i: usize,
    symmetric: bool,
    periodic: &PeriodicBox,
    capacity: usize,
    out: &mut Vec<usize>,
) -> SphResult<()> {
    out.clear();
    if tree.state != TreeState::Built {
        debug_assert!(false, "neighbor search on a tree that is not Built");
        return Ok(());
    }
    let Some(root) = tree.root else { return Ok(()) };
    search_node(tree, particles, root, i, symmetric, periodic, capacity, out)
}

fn search_node(
    tree: &Tree,
    particles: &[Particle],
    node: NodeIndex,
    i: usize,
    symmetric: bool,
    periodic: &PeriodicBox,
    capacity: usize,
    out: &mut Vec<usize>,
) -> SphResult<()> {
    let entry = &tree.arena[node];
    let h_i = particles[i].sml;
    let prune_radius = if symmetric { h_i.max(entry.kernel_size) } else { h_i };
    let min_dist = entry.extent.min_distance(particles[i].pos, tree.dim, periodic);
    if min_dist > prune_radius {
        return Ok(());
    }
    match &entry.children {
        Some(children) => {
            for &child in children {
                search_node(tree, particles, child, i, symmetric, periodic, capacity, out)?;
            }
        }
        None => {
            for &j in &entry.particles {
                if j == i {
                    continue;
                }
                let cutoff = if symmetric { h_i.max(particles[j].sml) } else { h_i };
                let d = periodic.distance(particles[i].pos, particles[j].pos);
                if d <= cutoff {
                    out.push(j);
                    if out.len() > capacity {
                        return Err(SphError::NeighborOverflow { capacity });
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{Dimension, PeriodicParameters, TreeParameters};
    use crate::tree::build;
    use glam::DVec3;

    fn build_tree(particles: &mut [Particle], h: f64) -> (Tree, PeriodicBox) {
        for p in particles.iter_mut() {
            p.sml = h;
        }
        let params = TreeParameters {
            max_level: 20,
            leaf_particle_num: 1,
            initial_arena_capacity: 16,
        };
        let periodic = PeriodicBox::new(&PeriodicParameters::default(), Dimension::D3);
        let mut tree = Tree::empty(Dimension::D3, params.initial_arena_capacity);
        build::make(&mut tree, particles, &params, &periodic).unwrap();
        (tree, periodic)
    }

    #[test]
    fn finds_nearby_particles_and_excludes_self() {
        let mut particles = vec![
            Particle::new(0, DVec3::ZERO, 1.0),
            Particle::new(1, DVec3::new(0.1, 0.0, 0.0), 1.0),
            Particle::new(2, DVec3::new(5.0, 0.0, 0.0), 1.0),
        ];
        let (tree, periodic) = build_tree(&mut particles, 0.5);
        let mut out = Vec::new();
        search(&tree, &particles, 0, true, &periodic, 16, &mut out).unwrap();
        assert!(out.contains(&1));
        assert!(!out.contains(&0));
        assert!(!out.contains(&2));
    }

    #[test]
    fn overflow_is_reported() {
        let mut particles: Vec<Particle> = (0..10)
            .map(|i| Particle::new(i, DVec3::new(i as f64 * 0.01, 0.0, 0.0), 1.0))
            .collect();
        let (tree, periodic) = build_tree(&mut particles, 1.0);
        let mut out = Vec::new();
        let result = search(&tree, &particles, 0, true, &periodic, 3, &mut out);
        assert!(matches!(result, Err(SphError::NeighborOverflow { capacity: 3 })));
    }
}
