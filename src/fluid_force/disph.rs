//! Density-independent SPH fluid force (SPEC_FULL.md §4.4.2).
//!
//! Grounded on the same `hydrodynamics/mod.rs` pairwise-sum shape as
//! `ssph.rs`, re-paired on the DISPH volume-element quantities `q = P/(gamma
//! - 1)` and `U = m u` rather than density, per the source's DISPH momentum
//! and energy equations.

use glam::DVec3;

use super::monaghan_pi;
use crate::kernel::Kernel;
use crate::parameters::Parameters;
use crate::particle::Particle;
use crate::periodic::PeriodicBox;

/// `a_i = -(gamma-1) sum_j u_i U_j [f_h,i dW_ij(h_i)/q_i + f_h,j
/// dW_ij(h_j)/q_j]`; `m_i du_i/dt = (gamma-1) f_h,i sum_j (U_i U_j / q_i)
/// (v_i - v_j) . dW_ij(h_i)`, plus the symmetric Monaghan AV term as in SSPH
/// (SPEC_FULL.md §4.4.2).
pub fn accumulate(
    i: usize,
    particles: &[Particle],
    neighbors: &[usize],
    kernel: &Kernel,
    periodic: &PeriodicBox,
    params: &Parameters,
) -> (DVec3, f64) {
    let gamma = params.physics.gamma;
    let pi = &particles[i];
    let q_i = (pi.pres / (gamma - 1.0)).max(1e-300);
    let u_i = pi.mass * pi.ene;

    let mut acc = DVec3::ZERO;
    let mut pressure_energy_sum = 0.0;
    let mut av_energy_sum = 0.0;

    for &j in neighbors {
        let pj = &particles[j];
        let q_j = (pj.pres / (gamma - 1.0)).max(1e-300);
        let u_j = pj.mass * pj.ene;

        let r_ij = periodic.distance_vec(pi.pos, pj.pos);
        let r = r_ij.length();
        let grad_w_i = kernel.dw(r_ij, r, pi.sml);
        let grad_w_j = kernel.dw(r_ij, r, pj.sml);
        let grad_w_sym = (grad_w_i + grad_w_j) * 0.5;

        let pi_ij = monaghan_pi(pi, pj, r_ij, &params.av);

        acc -= (gamma - 1.0)
            * pi.ene
            * u_j
            * (grad_w_i * (pi.grad_h / q_i) + grad_w_j * (pj.grad_h / q_j))
            + pj.mass * grad_w_sym * pi_ij;

        let v_ij = pi.vel - pj.vel;
        pressure_energy_sum += (u_i * u_j / q_i) * v_ij.dot(grad_w_i);
        av_energy_sum += pj.mass * 0.5 * pi_ij * v_ij.dot(grad_w_sym);
    }

    // `av_energy_sum` is already per-unit-mass (same form as SSPH's AV energy
    // term, which is never re-divided); only the DISPH pressure-energy term
    // needs the `1/m_i` from `m_i du_i/dt = ...` (SPEC_FULL.md §4.4.2).
    let inv_mass_i = 1.0 / pi.mass.max(1e-300);
    let dene = (gamma - 1.0) * pi.grad_h * pressure_energy_sum * inv_mass_i + av_energy_sum;
    (acc, dene)
}
