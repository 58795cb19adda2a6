//! Standard SPH fluid force (SPEC_FULL.md §4.4.1).
//!
//! Grounded on `hydrodynamics/mod.rs`'s pressure-gradient pair sum, extended
//! with the grad-h correction and the symmetric Monaghan artificial
//! viscosity described in SPEC_FULL.md.

use glam::DVec3;

use super::monaghan_pi;
use crate::kernel::Kernel;
use crate::parameters::AvParameters;
use crate::particle::Particle;
use crate::periodic::PeriodicBox;

/// `a_i = -sum_j m_j [P_i f_h,i/rho_i^2 dW_ij(h_i) + P_j f_h,j/rho_j^2
/// dW_ij(h_j) + Pi_ij (dW_ij(h_i)+dW_ij(h_j))/2]`; `du_i/dt` receives the
/// symmetric dot product of the same pressure and AV terms with `v_ij`
/// (SPEC_FULL.md §4.4.1).
pub fn accumulate(
    i: usize,
    particles: &[Particle],
    neighbors: &[usize],
    kernel: &Kernel,
    periodic: &PeriodicBox,
    av: &AvParameters,
) -> (DVec3, f64) {
    let pi = &particles[i];
    let pres_over_rho2_i = pi.pres * pi.grad_h / (pi.dens * pi.dens).max(1e-300);

    let mut acc = DVec3::ZERO;
    let mut dene = 0.0;

    for &j in neighbors {
        let pj = &particles[j];
        let r_ij = periodic.distance_vec(pi.pos, pj.pos);
        let r = r_ij.length();
        let grad_w_i = kernel.dw(r_ij, r, pi.sml);
        let grad_w_j = kernel.dw(r_ij, r, pj.sml);
        let grad_w_sym = (grad_w_i + grad_w_j) * 0.5;

        let pres_over_rho2_j = pj.pres * pj.grad_h / (pj.dens * pj.dens).max(1e-300);
        let pi_ij = monaghan_pi(pi, pj, r_ij, av);

        acc -= pj.mass
            * (grad_w_i * pres_over_rho2_i + grad_w_j * pres_over_rho2_j + grad_w_sym * pi_ij);

        let v_ij = pi.vel - pj.vel;
        dene += pj.mass
            * (pres_over_rho2_i * v_ij.dot(grad_w_i) + 0.5 * pi_ij * v_ij.dot(grad_w_sym));
    }

    (acc, dene)
}
