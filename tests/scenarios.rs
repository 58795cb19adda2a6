//! End-to-end scenario tests driving the public `Simulation`/`Integrator`
//! API the way a host application would (SPEC_FULL.md §8).
//!
//! The Sod shock tube is gated behind `#[ignore]`, matching the teacher's
//! own convention for full scenario runs in `test_examples.rs`'s
//! `run_all_examples` (expensive, numerically exact, run on demand with
//! `cargo test -- --ignored`). The conservation and neighbor-search
//! properties below are cheap structural checks and run every time.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sphcore::integrator::Integrator;
use sphcore::parameters::{
    AcParameters, AvParameters, CflParameters, CheckpointingParameters, Dimension,
    DensityRelaxationParameters, GravityParameters, GsphParameters, HeatingCoolingParameters,
    KernelKind, Parameters, PeriodicParameters, PhysicsParameters, ResumeParameters, SphVariant,
    TimeParameters, TreeParameters,
};
use sphcore::particle::Particle;
use sphcore::simulation::Simulation;
use sphcore::tree::{build, neighbor};

fn advance_to_ready(sim: &mut Simulation) {
    sim.rebuild_tree().unwrap();
    sim.run_pre_interaction().unwrap();
    sim.clear_forces();
    sim.run_fluid_force().unwrap();
    sim.run_gravity();
}

/// Equal-mass particles along x in [-0.5, 0.5], denser on the left to
/// reproduce the classic Sod (ρ=1.0, P=1.0) / (ρ=0.125, P=0.1) jump at
/// x = 0 with a single shared particle mass (SPEC_FULL.md §8.1).
fn sod_shock_tube_particles(n: usize) -> Vec<Particle> {
    let n_left = (n as f64 * (1.0 / 1.125)).round() as usize;
    let n_right = n - n_left;
    let gamma = 1.4;

    let mass = 0.5 / n_left as f64;
    let spacing_left = 0.5 / n_left as f64;
    let spacing_right = 0.5 / n_right as f64;

    let u_left = 1.0 / ((gamma - 1.0) * 1.0);
    let u_right = 0.1 / ((gamma - 1.0) * 0.125);

    let mut particles = Vec::with_capacity(n);
    let mut id = 0;
    for k in 0..n_left {
        let x = -0.5 + (k as f64 + 0.5) * spacing_left;
        let mut p = Particle::new(id, DVec3::new(x, 0.0, 0.0), mass);
        p.sml = 4.0 * spacing_left;
        p.ene = u_left;
        particles.push(p);
        id += 1;
    }
    for k in 0..n_right {
        let x = (k as f64 + 0.5) * spacing_right;
        let mut p = Particle::new(id, DVec3::new(x, 0.0, 0.0), mass);
        p.sml = 4.0 * spacing_right;
        p.ene = u_right;
        particles.push(p);
        id += 1;
    }
    particles
}

fn sod_params(end: f64) -> Parameters {
    Parameters {
        dim: Dimension::D1,
        variant: SphVariant::SSPH,
        kernel: KernelKind::CubicSpline,
        simulation_name: "sod".into(),
        time: TimeParameters {
            start: 0.0,
            end,
            initial_dt: 1e-4,
        },
        cfl: CflParameters::default(),
        av: AvParameters::default(),
        ac: AcParameters::default(),
        tree: TreeParameters {
            max_level: 24,
            leaf_particle_num: 4,
            initial_arena_capacity: 2048,
        },
        physics: PhysicsParameters {
            gamma: 1.4,
            neighbor_number: 5.0,
            two_and_half_sim: false,
        },
        periodic: PeriodicParameters {
            is_periodic: false,
            range_min: [-0.5, -0.5, -0.5],
            range_max: [0.5, 0.5, 0.5],
        },
        gravity: GravityParameters::default(),
        gsph: GsphParameters::default(),
        density_relaxation: DensityRelaxationParameters::default(),
        resume: ResumeParameters::default(),
        checkpointing: CheckpointingParameters::default(),
        heating_cooling: HeatingCoolingParameters::default(),
    }
}

/// SPEC_FULL.md §8.1: N=500 1D Sod tube run to t=0.2, checked against the
/// literal expected shock/contact/rarefaction positions and post-shock
/// state within 5%. Expensive and numerically exact enough to be worth
/// running deliberately rather than on every `cargo test`.
#[test]
#[ignore]
fn sod_shock_tube_matches_expected_profile_within_tolerance() {
    let particles = sod_shock_tube_particles(500);
    let mut sim = Simulation::new(particles, sod_params(0.2)).unwrap();
    advance_to_ready(&mut sim);

    let mut integrator = Integrator::new(Arc::new(AtomicBool::new(false)), None);
    integrator.run(&mut sim).unwrap();

    let shock_x = 0.17;
    let contact_x = 0.12;
    let rarefaction_head_x = -0.15;
    let post_shock_dens = 0.26;
    let post_shock_vel = 0.93;
    let tol = 0.05;

    // A thin sampling window just behind the shock front, i.e. in the
    // post-shock (shocked, not yet rarefied) plateau between the contact
    // discontinuity and the shock.
    let window: Vec<&Particle> = sim
        .particles
        .iter()
        .filter(|p| p.pos.x > contact_x + 0.01 && p.pos.x < shock_x - 0.01)
        .collect();
    assert!(!window.is_empty(), "no particles sampled in post-shock window");

    let mean_dens = window.iter().map(|p| p.dens).sum::<f64>() / window.len() as f64;
    let mean_vel = window.iter().map(|p| p.vel.x).sum::<f64>() / window.len() as f64;

    assert!(
        (mean_dens - post_shock_dens).abs() / post_shock_dens < tol,
        "post-shock density {mean_dens} not within {tol} of {post_shock_dens}"
    );
    assert!(
        (mean_vel - post_shock_vel).abs() / post_shock_vel < tol,
        "post-shock velocity {mean_vel} not within {tol} of {post_shock_vel}"
    );

    // Rarefaction head: particles left of it should still be at rest at the
    // undisturbed left state; nothing left of x ≈ -0.15 has moved yet.
    let undisturbed_left = sim
        .particles
        .iter()
        .filter(|p| p.pos.x < rarefaction_head_x - 0.05)
        .all(|p| p.vel.x.abs() < 0.05);
    assert!(undisturbed_left, "left state disturbed ahead of the rarefaction head");

    // Nothing ahead of the shock has moved yet either.
    let undisturbed_right = sim
        .particles
        .iter()
        .filter(|p| p.pos.x > shock_x + 0.05)
        .all(|p| p.vel.x.abs() < 0.05);
    assert!(undisturbed_right, "right state disturbed ahead of the shock");
}

fn periodic_box_particles(n: usize, seed: u64) -> Vec<Particle> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|id| {
            let pos = DVec3::new(
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
            );
            let mut p = Particle::new(id as i32, pos, 1.0 / n as f64);
            p.sml = 0.2;
            p.ene = 1.0;
            p.vel = DVec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            p
        })
        .collect()
}

fn periodic_params(variant: SphVariant) -> Parameters {
    Parameters {
        dim: Dimension::D3,
        variant,
        kernel: KernelKind::CubicSpline,
        simulation_name: "momentum".into(),
        time: TimeParameters {
            start: 0.0,
            end: 1.0,
            initial_dt: 1e-4,
        },
        cfl: CflParameters::default(),
        av: AvParameters::default(),
        ac: AcParameters::default(),
        tree: TreeParameters::default(),
        physics: PhysicsParameters {
            gamma: 5.0 / 3.0,
            neighbor_number: 16.0,
            two_and_half_sim: false,
        },
        periodic: PeriodicParameters {
            is_periodic: true,
            range_min: [0.0, 0.0, 0.0],
            range_max: [1.0, 1.0, 1.0],
        },
        gravity: GravityParameters {
            enabled: false,
            ..GravityParameters::default()
        },
        gsph: GsphParameters::default(),
        density_relaxation: DensityRelaxationParameters::default(),
        resume: ResumeParameters::default(),
        checkpointing: CheckpointingParameters::default(),
        heating_cooling: HeatingCoolingParameters::default(),
    }
}

fn total_momentum(particles: &[Particle]) -> DVec3 {
    particles
        .iter()
        .filter(|p| p.is_fluid())
        .fold(DVec3::ZERO, |acc, p| acc + p.mass * p.vel)
}

fn total_momentum_magnitude_sum(particles: &[Particle]) -> f64 {
    particles
        .iter()
        .filter(|p| p.is_fluid())
        .map(|p| p.mass * p.vel.length())
        .sum()
}

/// SPEC_FULL.md §8 "Integrator properties": equal-mass particles on a
/// periodic box without gravity conserve linear momentum to < 1e-10
/// relative per step for SSPH, since the pairwise pressure/AV force is
/// exactly antisymmetric between equal-mass neighbors under the
/// minimum-image convention.
#[test]
fn linear_momentum_is_conserved_on_a_periodic_box_without_gravity() {
    let particles = periodic_box_particles(200, 42);
    let initial_momentum = total_momentum(&particles);
    let norm = total_momentum_magnitude_sum(&particles).max(1e-300);

    let mut sim = Simulation::new(particles, periodic_params(SphVariant::SSPH)).unwrap();
    advance_to_ready(&mut sim);

    let mut integrator = Integrator::new(Arc::new(AtomicBool::new(false)), None);
    for _ in 0..10 {
        integrator.step(&mut sim).unwrap();
        let drift = (total_momentum(&sim.particles) - initial_momentum).length() / norm;
        assert!(drift < 1e-10, "momentum drift {drift} exceeds 1e-10 at t={}", sim.time);
    }
}

#[test]
fn disph_also_conserves_linear_momentum_on_a_periodic_box_without_gravity() {
    let particles = periodic_box_particles(200, 7);
    let initial_momentum = total_momentum(&particles);
    let norm = total_momentum_magnitude_sum(&particles).max(1e-300);

    let mut sim = Simulation::new(particles, periodic_params(SphVariant::DISPH)).unwrap();
    advance_to_ready(&mut sim);

    let mut integrator = Integrator::new(Arc::new(AtomicBool::new(false)), None);
    for _ in 0..10 {
        integrator.step(&mut sim).unwrap();
        let drift = (total_momentum(&sim.particles) - initial_momentum).length() / norm;
        assert!(drift < 1e-10, "momentum drift {drift} exceeds 1e-10 at t={}", sim.time);
    }
}

fn exhaustive_search(particles: &[Particle], i: usize, periodic: &sphcore::periodic::PeriodicBox) -> Vec<usize> {
    let h_i = particles[i].sml;
    particles
        .iter()
        .enumerate()
        .filter(|&(j, p)| {
            if j == i {
                return false;
            }
            let cutoff = h_i.max(p.sml);
            periodic.distance(particles[i].pos, p.pos) <= cutoff
        })
        .map(|(j, _)| j)
        .collect()
}

/// SPEC_FULL.md §8 "Tree properties": exhaustive search and tree search
/// return the same set of neighbors for N=100 uniformly random particles.
#[test]
fn exhaustive_and_tree_neighbor_search_agree_as_sets() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut particles: Vec<Particle> = (0..100)
        .map(|id| {
            let pos = DVec3::new(
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
            );
            Particle::new(id, pos, 1.0)
        })
        .collect();
    for p in particles.iter_mut() {
        p.sml = 0.15;
    }

    let tree_params = TreeParameters {
        max_level: 20,
        leaf_particle_num: 4,
        initial_arena_capacity: 256,
    };
    let periodic = sphcore::periodic::PeriodicBox::new(&PeriodicParameters::default(), Dimension::D3);
    let mut tree = sphcore::tree::Tree::empty(Dimension::D3, tree_params.initial_arena_capacity);
    build::make(&mut tree, &particles, &tree_params, &periodic).unwrap();

    for i in 0..particles.len() {
        let mut tree_neighbors = Vec::new();
        neighbor::search(&tree, &particles, i, true, &periodic, 512, &mut tree_neighbors).unwrap();
        let mut exhaustive_neighbors = exhaustive_search(&particles, i, &periodic);

        tree_neighbors.sort_unstable();
        exhaustive_neighbors.sort_unstable();
        assert_eq!(
            tree_neighbors, exhaustive_neighbors,
            "neighbor sets disagree for particle {i}"
        );
    }
}
