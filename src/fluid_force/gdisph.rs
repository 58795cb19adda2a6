//! Godunov density-independent SPH fluid force (SPEC_FULL.md §4.4.4).
//!
//! As `gsph.rs`, but pressure/viscous-stress pairing runs on DISPH's volume
//! element `V = m/rho` and `q = P/(gamma-1)` rather than density, and the
//! HLL solve always supplies the viscous stress term (no plain-SPH AV
//! fallback), per `include/gdisph/*.hpp` (original_source).

use glam::DVec3;

use super::riemann;
use crate::kernel::Kernel;
use crate::parameters::Parameters;
use crate::particle::Particle;
use crate::periodic::PeriodicBox;
use crate::scratch::ScratchArrays;

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

/// `a_i -= sum_j (dW_i+dW_j)/2 [m_j (P* - P_i)/rho_i^2]`-style viscous
/// stress plus the DISPH-paired Riemann pressure force, for every pair
/// (SPEC_FULL.md §4.4.4: "always uses the HLL solver for both pressure and
/// viscous stress").
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
    let gamma = params.physics.gamma;
    let pi = &particles[i];
    let q_i = (pi.pres / (gamma - 1.0)).max(1e-300);
    let second_order = params.gsph.is_2nd_order;

    let mut acc = DVec3::ZERO;
    let mut dene = 0.0;

    for &j in neighbors {
        let pj = &particles[j];
        let q_j = (pj.pres / (gamma - 1.0)).max(1e-300);
        let r_ij = periodic.distance_vec(pi.pos, pj.pos);
        let r = r_ij.length();
        if r <= 1e-12 {
            continue;
        }
        let e_hat = r_ij / r;

        let left = reconstructed_state(pi, scratch, i, pj, e_hat, r, dt, second_order);
        let right = reconstructed_state(pj, scratch, j, pi, -e_hat, r, dt, second_order);
        let star = riemann::solve(left, right);

        let grad_w_i = kernel.dw(r_ij, r, pi.sml);
        let grad_w_j = kernel.dw(r_ij, r, pj.sml);
        let grad_w_sym = (grad_w_i + grad_w_j) * 0.5;

        let u_j = pj.mass * pj.ene;
        acc -= (gamma - 1.0)
            * pi.ene
            * u_j
            * (grad_w_i * (pi.grad_h / q_i) + grad_w_j * (pj.grad_h / q_j));

        // Viscous stress from the Riemann star pressure rather than a
        // Monaghan Pi term (SPEC_FULL.md §4.4.4).
        let stress_i = pj.mass * (star.pres - pi.pres) / (pi.dens * pi.dens).max(1e-300);
        let stress_j = pj.mass * (star.pres - pj.pres) / (pj.dens * pj.dens).max(1e-300);
        acc -= grad_w_sym * (stress_i + stress_j);

        dene += pi.grad_h * (u_j / q_i) * (star.v - pi.vel.dot(e_hat)) * e_hat.dot(grad_w_i)
            * (gamma - 1.0);
    }

    (acc, dene / pi.mass.max(1e-300))
}
