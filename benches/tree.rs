//! Barnes-Hut tree build + neighbor search throughput (SPEC_FULL.md §4.2).
//!
//! Grounded on `benches/quadtree/main.rs`'s radius-search-over-a-lattice
//! shape, re-targeted at this crate's arena-indexed octree and runtime
//! `Dimension` instead of the teacher's fixed 2D `QuadTree`.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use sphcore::parameters::{Dimension, PeriodicParameters, TreeParameters};
use sphcore::particle::Particle;
use sphcore::periodic::PeriodicBox;
use sphcore::tree::{build, neighbor, Tree};

fn lattice(num_particles: usize, h: f64) -> Vec<Particle> {
    let per_axis = (num_particles as f64).cbrt().ceil() as i32;
    let spacing = 1.0 / per_axis as f64;
    let mut particles = Vec::with_capacity(num_particles);
    let mut id = 0;
    'outer: for x in 0..per_axis {
        for y in 0..per_axis {
            for z in 0..per_axis {
                if particles.len() >= num_particles {
                    break 'outer;
                }
                let pos = DVec3::new(x as f64, y as f64, z as f64) * spacing;
                let mut p = Particle::new(id, pos, 1.0);
                p.sml = h;
                particles.push(p);
                id += 1;
            }
        }
    }
    particles
}

fn build_tree(particles: &[Particle], periodic: &PeriodicBox) -> Tree {
    let params = TreeParameters::default();
    let mut tree = Tree::empty(Dimension::D3, params.initial_arena_capacity);
    build::make(&mut tree, particles, &params, periodic).unwrap();
    tree
}

fn tree_build_benchmark(c: &mut Criterion) {
    let periodic = PeriodicBox::new(&PeriodicParameters::default(), Dimension::D3);
    let mut group = c.benchmark_group("tree_build");
    group.noise_threshold(0.05);
    for num_particles in [1_000, 10_000, 100_000] {
        let particles = lattice(num_particles, 0.02);
        group.bench_with_input(
            BenchmarkId::from_parameter(num_particles),
            &particles,
            |b, particles| b.iter(|| build_tree(particles, &periodic)),
        );
    }
    group.finish();
}

fn neighbor_search_benchmark(c: &mut Criterion) {
    let periodic = PeriodicBox::new(&PeriodicParameters::default(), Dimension::D3);
    let mut group = c.benchmark_group("tree_neighbor_search");
    group.noise_threshold(0.05);
    for num_particles in [1_000, 10_000, 100_000] {
        let particles = lattice(num_particles, 0.05);
        let tree = build_tree(&particles, &periodic);
        group.bench_with_input(
            BenchmarkId::from_parameter(num_particles),
            &(particles, tree),
            |b, (particles, tree)| {
                let mut out = Vec::new();
                b.iter(|| {
                    for i in 0..particles.len().min(256) {
                        neighbor::search_with_retry(tree, particles, i, true, &periodic, &mut out)
                            .unwrap();
                    }
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, tree_build_benchmark, neighbor_search_benchmark);
criterion_main!(benches);
