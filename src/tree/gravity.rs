//! Tree gravity (SPEC_FULL.md §4.2 "Gravity").
//!
//! Grounded on `gravity/mod.rs`'s `Solver::traverse_tree`/`should_be_opened`
//! for the tree-traversal/opening-angle shape, and on
//! `examples/original_source/src/gravity_force.cpp`'s `f(r, h)`/`g(r, h)`
//! piecewise spline-softening functions (the standard Springel et al.
//! spline-softened kernel) for the actual force/potential law, reproduced
//! literally rather than approximated with a Plummer softening (SPEC_FULL.md
//! §4.2: "the piecewise polynomial forms `f(r,h)` and `g(r,h)` used in the
//! source").

use glam::DVec3;

use super::{NodeIndex, Tree, TreeState};
use crate::parameters::GravityParameters;
use crate::particle::Particle;
use crate::periodic::PeriodicBox;

/// Softened 1/r^3 force-law factor: `a = -G m r_ij g(r, h)`. Piecewise in
/// `u = r / (h/2)`, matching `gravity_force.cpp`'s `g(r, h)` exactly.
fn g(r: f64, h: f64) -> f64 {
    let e = h * 0.5;
    let u = r / e;
    if u < 1.0 {
        (4.0 / 3.0 - 1.2 * u * u + 0.5 * u * u * u) / (e * e * e)
    } else if u < 2.0 {
        (-1.0 / 15.0 + 8.0 / 3.0 * u * u * u - 3.0 * u * u * u * u + 1.2 * u * u * u * u * u
            - u * u * u * u * u * u / 6.0)
            / (r * r * r)
    } else {
        1.0 / (r * r * r)
    }
}

/// Softened 1/r potential-law factor: `phi -= G m f(r, h)`. Piecewise in
/// `u = r / (h/2)`, matching `gravity_force.cpp`'s `f(r, h)` exactly.
fn f(r: f64, h: f64) -> f64 {
    let e = h * 0.5;
    let u = r / e;
    if u < 1.0 {
        (-0.5 * u * u * (1.0 / 3.0 - 3.0 / 20.0 * u * u + u * u * u / 20.0) + 1.4) / e
    } else if u < 2.0 {
        -1.0 / (15.0 * r)
            + (-u * u * (4.0 / 3.0 - u + 0.3 * u * u - u * u * u / 30.0) + 1.6) / e
    } else {
        1.0 / r
    }
}

/// Spline-softened acceleration and potential contribution of a mass `mass_j`
/// at `pos_j` acting on `pos_i`, with softening scale `h`.
fn softened_force_and_potential(
    pos_i: DVec3,
    pos_j: DVec3,
    mass_j: f64,
    h: f64,
    g_constant: f64,
    periodic: &PeriodicBox,
) -> (DVec3, f64) {
    let r_ij = periodic.distance_vec(pos_i, pos_j);
    let r = r_ij.length();
    if r < 1e-12 {
        return (DVec3::ZERO, 0.0);
    }
    let acc = -r_ij * (g_constant * mass_j * g(r, h));
    let phi = -g_constant * mass_j * f(r, h);
    (acc, phi)
}

/// The tree-approximated acceleration and potential on particle `i` from
/// every other fluid/wall particle in the tree, softened at `i`'s own
/// smoothing length (point masses are summed separately and directly, see
/// [`accumulate_point_masses`]).
pub fn force_and_potential(
    tree: &Tree,
    particles: &[Particle],
    i: usize,
    params: &GravityParameters,
    periodic: &PeriodicBox,
) -> (DVec3, f64) {
    if tree.state != TreeState::Built {
        debug_assert!(false, "gravity traversal on a tree that is not Built");
        return (DVec3::ZERO, 0.0);
    }
    let Some(root) = tree.root else {
        return (DVec3::ZERO, 0.0);
    };
    traverse(tree, particles, root, i, params, periodic)
}

/// Acceleration-only convenience wrapper over [`force_and_potential`].
pub fn acceleration(
    tree: &Tree,
    particles: &[Particle],
    i: usize,
    params: &GravityParameters,
    periodic: &PeriodicBox,
) -> DVec3 {
    force_and_potential(tree, particles, i, params, periodic).0
}

fn traverse(
    tree: &Tree,
    particles: &[Particle],
    node: NodeIndex,
    i: usize,
    params: &GravityParameters,
    periodic: &PeriodicBox,
) -> (DVec3, f64) {
    let entry = &tree.arena[node];
    if entry.mass <= 0.0 {
        return (DVec3::ZERO, 0.0);
    }
    let pos_i = particles[i].pos;
    let softening = particles[i].sml.max(1e-12);
    match &entry.children {
        None => entry
            .particles
            .iter()
            .filter(|&&j| j != i)
            .map(|&j| {
                softened_force_and_potential(
                    pos_i,
                    particles[j].pos,
                    particles[j].mass,
                    softening,
                    params.g_constant,
                    periodic,
                )
            })
            .fold((DVec3::ZERO, 0.0), |(acc, phi), (a, p)| (acc + a, phi + p)),
        Some(children) => {
            let dist = periodic.distance(pos_i, entry.extent.center()).max(1e-300);
            let edge = entry.extent.max_side_length(tree.dim);
            if edge / dist > params.opening_angle {
                children
                    .iter()
                    .map(|&c| traverse(tree, particles, c, i, params, periodic))
                    .fold((DVec3::ZERO, 0.0), |(acc, phi), (a, p)| (acc + a, phi + p))
            } else {
                softened_force_and_potential(
                    pos_i,
                    entry.center_of_mass,
                    entry.mass,
                    softening,
                    params.g_constant,
                    periodic,
                )
            }
        }
    }
}

/// Direct (non-tree-approximated) gravity from every point mass onto every
/// fluid particle (SPEC_FULL.md §4.2: "Point masses are additionally summed
/// directly ... so that they contribute to every fluid particle with no tree
/// approximation"). Softening blends both particles' smoothing lengths,
/// matching `gravity_force.cpp::apply_external_gravity`'s
/// `0.5 * (g(r, p_i.sml) + g(r, p_j.sml))`. Point masses themselves are not
/// accelerated by this pass, and potential is not updated here (the original
/// only resets/accumulates `phi` in the self-gravity pass).
pub fn accumulate_point_masses(
    particles: &mut [Particle],
    params: &GravityParameters,
    periodic: &PeriodicBox,
) {
    let point_masses: Vec<(DVec3, f64, f64)> = particles
        .iter()
        .filter(|p| p.is_point_mass)
        .map(|p| (p.pos, p.mass, p.sml.max(1e-12)))
        .collect();
    if point_masses.is_empty() {
        return;
    }
    for p in particles.iter_mut().filter(|p| p.is_fluid()) {
        let h_i = p.sml.max(1e-12);
        for &(pos_j, mass_j, h_j) in &point_masses {
            let r_ij = periodic.distance_vec(p.pos, pos_j);
            let r = r_ij.length();
            if r < 1e-12 {
                continue;
            }
            let g_avg = 0.5 * (g(r, h_i) + g(r, h_j));
            p.acc -= r_ij * (params.g_constant * mass_j * g_avg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{Dimension, PeriodicParameters, TreeParameters};
    use crate::tree::build;
    use crate::tree::Tree;

    fn default_gravity() -> GravityParameters {
        GravityParameters {
            enabled: true,
            g_constant: 1.0,
            opening_angle: 0.5,
        }
    }

    #[test]
    fn two_body_acceleration_points_toward_the_other_mass() {
        let mut particles = vec![
            Particle::new(0, DVec3::new(-1.0, 0.0, 0.0), 1.0),
            Particle::new(1, DVec3::new(1.0, 0.0, 0.0), 1.0),
        ];
        for p in particles.iter_mut() {
            p.sml = 1e-6;
        }
        let params = TreeParameters {
            max_level: 20,
            leaf_particle_num: 1,
            initial_arena_capacity: 16,
        };
        let periodic = PeriodicBox::new(&PeriodicParameters::default(), Dimension::D3);
        let mut tree = Tree::empty(Dimension::D3, params.initial_arena_capacity);
        build::make(&mut tree, &particles, &params, &periodic).unwrap();

        let acc = acceleration(&tree, &particles, 0, &default_gravity(), &periodic);
        assert!(acc.x > 0.0, "particle 0 should accelerate toward +x: {acc:?}");
    }

    #[test]
    fn spline_softening_is_finite_at_zero_separation_and_potential_is_negative() {
        // u = 0 lands in the inner (u < 1) branch of both f and g; the
        // Springel spline softening has no singularity there, unlike a bare
        // Newtonian 1/r law (SPEC_FULL.md §4.2).
        let h = 0.4;
        assert!(g(0.0, h).is_finite());
        assert!(f(0.0, h).is_finite());
        assert!(f(0.0, h) > 0.0);

        let (acc, phi) = softened_force_and_potential(
            DVec3::new(-0.05, 0.0, 0.0),
            DVec3::new(0.05, 0.0, 0.0),
            1.0,
            h,
            1.0,
            &PeriodicBox::new(&PeriodicParameters::default(), Dimension::D3),
        );
        assert!(acc.x.is_finite() && acc.x > 0.0, "{acc:?}");
        assert!(phi < 0.0, "potential must be negative for an attractive pair: {phi}");
    }

    #[test]
    fn tree_self_gravity_accumulates_a_negative_potential() {
        let mut particles = vec![
            Particle::new(0, DVec3::new(-1.0, 0.0, 0.0), 1.0),
            Particle::new(1, DVec3::new(1.0, 0.0, 0.0), 1.0),
        ];
        for p in particles.iter_mut() {
            p.sml = 1e-6;
        }
        let params = TreeParameters {
            max_level: 20,
            leaf_particle_num: 1,
            initial_arena_capacity: 16,
        };
        let periodic = PeriodicBox::new(&PeriodicParameters::default(), Dimension::D3);
        let mut tree = Tree::empty(Dimension::D3, params.initial_arena_capacity);
        build::make(&mut tree, &particles, &params, &periodic).unwrap();

        let (_, phi) = force_and_potential(&tree, &particles, 0, &default_gravity(), &periodic);
        assert!(phi < 0.0, "phi={phi}");
    }

    #[test]
    fn point_mass_pulls_fluid_particles() {
        let mut particles = vec![
            Particle::new(0, DVec3::new(1.0, 0.0, 0.0), 1.0),
            Particle::new(1, DVec3::ZERO, 100.0),
        ];
        particles[1].is_point_mass = true;
        for p in particles.iter_mut() {
            p.sml = 1e-3;
        }
        let periodic = PeriodicBox::new(&PeriodicParameters::default(), Dimension::D3);
        accumulate_point_masses(&mut particles, &default_gravity(), &periodic);
        assert!(particles[0].acc.x < 0.0);
        assert_eq!(particles[1].acc, DVec3::ZERO);
    }
}
