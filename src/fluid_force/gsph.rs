//! Godunov SPH fluid force (SPEC_FULL.md §4.4.3).
//!
//! Grounded on `hydrodynamics/mod.rs`'s pairwise-sum shape, re-targeted at an
//! HLL Riemann solve along each pair's unit separation rather than a direct
//! pressure-gradient pair force; see `include/gsph/*.hpp` (original_source)
//! for the DISPH-style pairing of the Riemann pressure used here.

use std::sync::Once;

use glam::DVec3;
use log::debug;

use super::{monaghan_pi, riemann};
use crate::kernel::Kernel;
use crate::parameters::Parameters;
use crate::particle::Particle;
use crate::periodic::PeriodicBox;
use crate::scratch::ScratchArrays;

static RIEMANN_MODE_SWITCH_NOTICE: Once = Once::new();

/// Threshold (as a fraction of the pair-averaged sound speed) below which
/// the GSPH pair force falls back from the Riemann solve to a plain SPH
/// pressure term. Reproduced literally from the source per SPEC_FULL.md §9
/// Open Questions: an ad-hoc heuristic of uncertain provenance, not a
/// first-principles criterion.
const RIEMANN_MODE_DIVERGENCE_THRESHOLD: f64 = 0.1;

fn reconstructed_state(
    pi: &Particle,
    scratch: &ScratchArrays,
    idx: usize,
    other: &Particle,
    e_hat: DVec3,
    r: f64,
    dt: f64,
    second_order: bool,
) -> riemann::State {
    if !second_order {
        return riemann::State {
            v: pi.vel.dot(e_hat),
            rho: pi.dens,
            pres: pi.pres,
            sound: pi.sound,
        };
    }
    let delta_r = riemann::upwind_delta(pi.sound, dt, r) * r;

    let grad_rho = scratch
        .vector("grad_density")
        .map(|v| v[idx])
        .unwrap_or(DVec3::ZERO);
    let grad_pres = scratch
        .vector("grad_pressure")
        .map(|v| v[idx])
        .unwrap_or(DVec3::ZERO);
    let grad_vx = scratch
        .vector("grad_velocity_0")
        .map(|v| v[idx])
        .unwrap_or(DVec3::ZERO);
    let grad_vy = scratch
        .vector("grad_velocity_1")
        .map(|v| v[idx])
        .unwrap_or(DVec3::ZERO);
    let grad_vz = scratch
        .vector("grad_velocity_2")
        .map(|v| v[idx])
        .unwrap_or(DVec3::ZERO);
    let dv_de = DVec3::new(grad_vx.dot(e_hat), grad_vy.dot(e_hat), grad_vz.dot(e_hat));

    let rho = riemann::limited_reconstruct(pi.dens, other.dens, grad_rho.dot(e_hat), delta_r);
    let pres = riemann::limited_reconstruct(pi.pres, other.pres, grad_pres.dot(e_hat), delta_r);
    let v = riemann::limited_reconstruct(
        pi.vel.dot(e_hat),
        other.vel.dot(e_hat),
        dv_de.dot(e_hat),
        delta_r,
    );
    riemann::State {
        v,
        rho: rho.max(1e-300),
        pres: pres.max(0.0),
        sound: pi.sound,
    }
}

/// HLL Riemann solve along each pair's unit separation, with a DISPH-style
/// pressure pairing and a fallback Monaghan AV term gated on a divergence
/// heuristic (SPEC_FULL.md §4.4.3).
pub fn accumulate(
    i: usize,
    particles: &[Particle],
    neighbors: &[usize],
    kernel: &Kernel,
    periodic: &PeriodicBox,
    scratch: &ScratchArrays,
    params: &Parameters,
    dt: f64,
) -> (DVec3, f64) {
    let pi = &particles[i];
    let second_order = params.gsph.is_2nd_order;

    let mut acc = DVec3::ZERO;
    let mut dene = 0.0;

    for &j in neighbors {
        let pj = &particles[j];
        let r_ij = periodic.distance_vec(pi.pos, pj.pos);
        let r = r_ij.length();
        if r <= 1e-12 {
            continue;
        }
        let e_hat = r_ij / r;

        let avg_sound = 0.5 * (pi.sound + pj.sound);
        let v_ij_proj = (pi.vel - pj.vel).dot(e_hat);
        let use_riemann = -v_ij_proj < RIEMANN_MODE_DIVERGENCE_THRESHOLD * avg_sound;
        if !use_riemann {
            RIEMANN_MODE_SWITCH_NOTICE.call_once(|| {
                debug!(
                    "GSPH: falling back to plain-SPH pressure pairing for a pair with \
                     approach speed {v_ij_proj:.3e} against threshold {:.3e} \
                     (heuristic of uncertain provenance, SPEC_FULL.md §9)",
                    RIEMANN_MODE_DIVERGENCE_THRESHOLD * avg_sound
                );
            });
        }

        let left = reconstructed_state(pi, scratch, i, pj, e_hat, r, dt, second_order);
        let right = reconstructed_state(pj, scratch, j, pi, -e_hat, r, dt, second_order);
        let star = riemann::solve(left, right);

        let grad_w_i = kernel.dw(r_ij, r, pi.sml);
        let grad_w_j = kernel.dw(r_ij, r, pj.sml);
        let grad_w_sym = (grad_w_i + grad_w_j) * 0.5;

        let pres_star = if use_riemann {
            star.pres
        } else {
            0.5 * (pi.pres + pj.pres)
        };
        let balsara_weight = 0.5 * (pi.balsara + pj.balsara);
        let pres_used = balsara_weight * pres_star + (1.0 - balsara_weight) * 0.5 * (pi.pres + pj.pres);

        acc -= grad_w_sym
            * pres_used
            * (pj.mass / (pi.dens * pi.dens).max(1e-300) + pj.mass / (pj.dens * pj.dens).max(1e-300));

        let v_star = if use_riemann {
            star.v
        } else {
            0.5 * (pi.vel.dot(e_hat) + pj.vel.dot(e_hat))
        };
        dene += pres_used * (v_star - pi.vel.dot(e_hat)) / (pi.dens * pi.dens).max(1e-300)
            * pj.mass
            * e_hat.dot(grad_w_i);

        if !use_riemann {
            let pi_ij = monaghan_pi(pi, pj, r_ij, &params.av);
            acc -= pj.mass * grad_w_sym * pi_ij;
            let v_ij = pi.vel - pj.vel;
            dene += pj.mass * 0.5 * pi_ij * v_ij.dot(grad_w_sym);
        }
    }

    (acc, dene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{
        AcParameters, AvParameters, CflParameters, CheckpointingParameters, Dimension,
        DensityRelaxationParameters, GravityParameters, GsphParameters, HeatingCoolingParameters,
        KernelKind, PeriodicParameters, PhysicsParameters, ResumeParameters, SphVariant,
        TimeParameters, TreeParameters,
    };

    fn base_params() -> Parameters {
        Parameters {
            dim: Dimension::D3,
            variant: SphVariant::GSPH,
            kernel: KernelKind::CubicSpline,
            simulation_name: "test".into(),
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
                neighbor_number: 32.0,
                two_and_half_sim: false,
            },
            periodic: PeriodicParameters::default(),
            gravity: GravityParameters::default(),
            gsph: GsphParameters { is_2nd_order: false },
            density_relaxation: DensityRelaxationParameters::default(),
            resume: ResumeParameters::default(),
            checkpointing: CheckpointingParameters::default(),
            heating_cooling: HeatingCoolingParameters::default(),
        }
    }

    fn particle_at(id: i32, x: f64) -> Particle {
        let mut p = Particle::new(id, DVec3::new(x, 0.0, 0.0), 1.0);
        p.sml = 0.5;
        p.dens = 1.0;
        p.pres = 1.0;
        p.sound = 1.0;
        p.balsara = 1.0;
        p
    }

    #[test]
    fn first_order_symmetric_pair_has_finite_opposite_forces() {
        let particles = vec![particle_at(0, -0.1), particle_at(1, 0.1)];
        let kernel = Kernel::new(KernelKind::CubicSpline, 3);
        let periodic = PeriodicBox::new(&Default::default(), Dimension::D3);
        let scratch = ScratchArrays::new(2);
        let params = base_params();
        let (acc0, dene0) = accumulate(0, &particles, &[1], &kernel, &periodic, &scratch, &params, 1e-3);
        let (acc1, dene1) = accumulate(1, &particles, &[0], &kernel, &periodic, &scratch, &params, 1e-3);
        assert!(acc0.x.is_finite() && acc1.x.is_finite());
        assert!((acc0 + acc1).length() < 1e-8);
        assert!(dene0.is_finite() && dene1.is_finite());
    }
}
