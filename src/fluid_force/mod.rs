//! Fluid force (SPEC_FULL.md §4.4): the pairwise momentum/energy exchange
//! shared contract, dispatched to one of four variant-specific formulations.
//!
//! Grounded on `hydrodynamics/mod.rs`'s `compute_forces_system` /
//! `compute_energy_change_system` for the overall per-particle
//! neighbor-sum shape (parallel outer loop, thread-local neighbor buffer,
//! side-buffer-then-commit pattern), generalized from the teacher's single
//! fixed formulation to four interchangeable variants dispatched by
//! `Parameters::variant` (SPEC_FULL.md §9: "tagged variant ... dispatched by
//! a match", not a trait object).

pub mod disph;
pub mod gdisph;
pub mod gsph;
pub mod riemann;
pub mod ssph;

use std::cell::RefCell;

use glam::DVec3;
use rayon::prelude::*;

use crate::error::{SphError, SphResult};
use crate::kernel::Kernel;
use crate::parameters::{AvParameters, Parameters, SphVariant};
use crate::particle::Particle;
use crate::periodic::PeriodicBox;
use crate::scratch::ScratchArrays;
use crate::tree::{neighbor, Tree};

/// η² in the Monaghan artificial-viscosity denominator (standard choice,
/// η = 0.1h), shared by SSPH/DISPH/GSPH/GDISPH (SPEC_FULL.md §4.4.1).
const AV_ETA2: f64 = 0.01;

const NEIGHBOR_CAPACITY: usize = 512;
const MAX_NEIGHBOR_CAPACITY: usize = 1 << 16;

thread_local! {
    static NEIGHBOR_BUF: RefCell<Vec<usize>> = RefCell::new(Vec::with_capacity(NEIGHBOR_CAPACITY));
}

/// Per-particle result of a FluidForce pass, applied back onto the particle
/// array by the caller (SPEC_FULL.md §5's side-buffer-then-commit pattern).
#[derive(Debug, Clone, Copy, Default)]
pub struct FluidForceOutput {
    pub acc: DVec3,
    pub dene: f64,
}

/// The Monaghan (1992) artificial-viscosity term Π_ij, shared by every
/// variant (SPEC_FULL.md §4.4.1). Zero unless the pair is approaching
/// (`r_ij . v_ij < 0`).
pub fn monaghan_pi(pi: &Particle, pj: &Particle, r_ij: DVec3, av: &AvParameters) -> f64 {
    let v_ij = pi.vel - pj.vel;
    let rv = r_ij.dot(v_ij);
    if rv >= 0.0 {
        return 0.0;
    }
    let h_ij = 0.5 * (pi.sml + pj.sml);
    let r2 = r_ij.length_squared();
    let mu_ij = h_ij * rv / (r2 + AV_ETA2 * h_ij * h_ij);
    let alpha_ij = 0.5 * (pi.alpha + pj.alpha);
    let c_ij = 0.5 * (pi.sound + pj.sound);
    let rho_ij = 0.5 * (pi.dens + pj.dens);
    (-alpha_ij * c_ij * mu_ij + av.beta * mu_ij * mu_ij) / rho_ij.max(1e-300)
}

/// Searches for particle `i`'s symmetric-cutoff neighbors (cutoff = max(h_i,
/// h_j)), doubling the buffer and retrying on `NeighborOverflow` up to a hard
/// cap (SPEC_FULL.md §4.2, §4.4).
fn search_with_retry(
    tree: &Tree,
    particles: &[Particle],
    i: usize,
    periodic: &PeriodicBox,
    buf: &mut Vec<usize>,
) -> SphResult<()> {
    let mut capacity = NEIGHBOR_CAPACITY;
    loop {
        match neighbor::search(tree, particles, i, true, periodic, capacity, buf) {
            Ok(()) => return Ok(()),
            Err(SphError::NeighborOverflow { .. }) if capacity < MAX_NEIGHBOR_CAPACITY => {
                capacity *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Computes acceleration and du/dt for every fluid particle, dispatching the
/// pairwise contribution to the variant named by `params.variant`. Wall and
/// point-mass particles are skipped entirely and contribute zero (they are
/// accumulated separately by `crate::tree::gravity`).
pub fn compute(
    particles: &[Particle],
    tree: &Tree,
    kernel: &Kernel,
    periodic: &PeriodicBox,
    scratch: &ScratchArrays,
    params: &Parameters,
    dt: f64,
) -> SphResult<Vec<FluidForceOutput>> {
    let results: Vec<SphResult<FluidForceOutput>> = (0..particles.len())
        .into_par_iter()
        .map(|i| -> SphResult<FluidForceOutput> {
            if !particles[i].is_fluid() {
                return Ok(FluidForceOutput::default());
            }
            NEIGHBOR_BUF.with(|buf| {
                let mut buf = buf.borrow_mut();
                search_with_retry(tree, particles, i, periodic, &mut buf)?;
                let (acc, dene) = match params.variant {
                    SphVariant::SSPH => {
                        ssph::accumulate(i, particles, &buf, kernel, periodic, &params.av)
                    }
                    SphVariant::DISPH => {
                        disph::accumulate(i, particles, &buf, kernel, periodic, params)
                    }
                    SphVariant::GSPH => gsph::accumulate(
                        i, particles, &buf, kernel, periodic, scratch, params, dt,
                    ),
                    SphVariant::GDISPH => gdisph::accumulate(
                        i, particles, &buf, kernel, periodic, scratch, params, dt,
                    ),
                };
                Ok(FluidForceOutput { acc, dene })
            })
        })
        .collect();

    let mut out = Vec::with_capacity(particles.len());
    for r in results {
        out.push(r?);
    }
    Ok(out)
}
