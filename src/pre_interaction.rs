//! Smoothing-length iteration, density/pressure, and AV switches
//! (SPEC_FULL.md §4.3).
//!
//! Grounded on `hydrodynamics/mod.rs`'s `compute_pressure_and_density_system`
//! (kernel-sum density, then pressure from energy) for the overall shape,
//! generalized from a fixed smoothing length to the Newton-Raphson h-search
//! described in SPEC_FULL.md, and from the teacher's Bevy `par_for_each_mut`
//! to a plain `rayon::par_iter` over particle indices with a thread-local
//! neighbor buffer (SPEC_FULL.md §5).

use std::cell::RefCell;
use std::f64::consts::PI;

use glam::DVec3;
use log::warn;
use rayon::prelude::*;

use crate::error::{SphError, SphResult};
use crate::kernel::Kernel;
use crate::parameters::Parameters;
use crate::particle::Particle;
use crate::periodic::PeriodicBox;
use crate::tree::{neighbor, Tree};

const H_CONVERGENCE_EPS: f64 = 1e-4;
const MAX_H_ITERATIONS: u32 = 10;
const BALSARA_EPS: f64 = 1e-4;
const NEIGHBOR_CAPACITY: usize = 512;
const MAX_NEIGHBOR_CAPACITY: usize = 1 << 16;

/// Searches for particle `i`'s neighbors, doubling the buffer capacity and
/// retrying on `NeighborOverflow` up to a hard cap (SPEC_FULL.md §4.2
/// "Neighbor search": "the default retry policy doubles the buffer size,
/// capped at a configurable maximum").
fn search_with_retry(
    tree: &Tree,
    particles: &[Particle],
    i: usize,
    periodic: &PeriodicBox,
    buf: &mut Vec<usize>,
) -> SphResult<()> {
    let mut capacity = NEIGHBOR_CAPACITY;
    loop {
        match neighbor::search(tree, particles, i, false, periodic, capacity, buf) {
            Ok(()) => return Ok(()),
            Err(SphError::NeighborOverflow { .. }) if capacity < MAX_NEIGHBOR_CAPACITY => {
                capacity *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Per-particle results of the smoothing-length/density/pressure pass,
/// applied back onto the particle array by the caller (SPEC_FULL.md §5's
/// "compute into a side buffer, then commit" pattern, needed because the
/// neighbor search borrows the whole particle array immutably while each
/// particle's own fields are being derived).
#[derive(Debug, Clone, Copy)]
pub struct PreInteractionOutput {
    pub sml: f64,
    pub dens: f64,
    pub pres: f64,
    pub volume: f64,
    pub grad_h: f64,
    pub balsara: f64,
    pub alpha: f64,
    pub sound: f64,
    pub neighbor: i32,
    /// Signal velocity used by the CFL timestep (SPEC_FULL.md §4.5).
    pub v_sig: f64,
    /// -div(v), used for the Balsara switch and carried forward as the
    /// diagnostic shock sensor (SPEC_FULL.md §4.8); no additional neighbor
    /// search is needed since it reuses this same SPH-sum.
    pub div_v: f64,
    /// Diagnostic only; no FluidForce variant reads this back (SPEC_FULL.md
    /// §4.8, §9 Open Questions).
    pub shock_sensor: f64,
    /// Populated only for GSPH/GDISPH (SPEC_FULL.md §4.4.5); `None` for
    /// SSPH/DISPH, which never allocate the scratch gradient fields.
    pub grad_density: Option<DVec3>,
    pub grad_pressure: Option<DVec3>,
    /// Row `k` is the gradient of velocity component `k`.
    pub grad_velocity: Option<[DVec3; 3]>,
}

thread_local! {
    static NEIGHBOR_BUF: RefCell<Vec<usize>> = RefCell::new(Vec::with_capacity(NEIGHBOR_CAPACITY));
}

fn area_constant(d_eff: usize) -> f64 {
    match d_eff {
        1 => 2.0,
        2 => PI,
        _ => 4.0 * PI / 3.0,
    }
}

/// Computes the new smoothing length, density, pressure, AV switches, and
/// signal velocity for every fluid particle. Wall and point-mass particles
/// are skipped and keep their existing fields. `dt` is the current step's
/// Δt, used only to integrate time-dependent AV-alpha.
pub fn compute(
    particles: &[Particle],
    tree: &Tree,
    kernel: &Kernel,
    periodic: &PeriodicBox,
    params: &Parameters,
    dt: f64,
) -> SphResult<Vec<PreInteractionOutput>> {
    let d_eff = params.effective_dimension();
    let gamma = params.physics.gamma;
    let n_nb = params.physics.neighbor_number;
    let a_d = area_constant(d_eff);

    let results: Vec<SphResult<PreInteractionOutput>> = (0..particles.len())
        .into_par_iter()
        .map(|i| -> SphResult<PreInteractionOutput> {
            let p = &particles[i];
            if !p.is_fluid() {
                return Ok(PreInteractionOutput {
                    sml: p.sml,
                    dens: p.dens,
                    pres: p.pres,
                    volume: p.volume,
                    grad_h: p.grad_h,
                    balsara: p.balsara,
                    alpha: p.alpha,
                    sound: p.sound,
                    neighbor: p.neighbor,
                    v_sig: 0.0,
                    div_v: 0.0,
                    shock_sensor: p.shock_sensor,
                    grad_density: None,
                    grad_pressure: None,
                    grad_velocity: None,
                });
            }
            NEIGHBOR_BUF.with(|buf| {
                let mut buf = buf.borrow_mut();
                solve_particle(
                    i, particles, tree, kernel, periodic, params, d_eff, gamma, n_nb, a_d, dt,
                    &mut buf,
                )
            })
        })
        .collect();

    let mut out = Vec::with_capacity(particles.len());
    for r in results {
        out.push(r?);
    }

    let v_sig_max = out
        .par_iter()
        .map(|o| o.v_sig)
        .reduce(|| 0.0_f64, f64::max);
    log::debug!("pre_interaction: v_sig_max = {v_sig_max}");
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn solve_particle(
    i: usize,
    particles: &[Particle],
    tree: &Tree,
    kernel: &Kernel,
    periodic: &PeriodicBox,
    params: &Parameters,
    d_eff: usize,
    gamma: f64,
    n_nb: f64,
    a_d: f64,
    dt: f64,
    buf: &mut Vec<usize>,
) -> SphResult<PreInteractionOutput> {
    let pos_i = particles[i].pos;
    let mass_i = particles[i].mass;

    let mut h = if particles[i].sml > 0.0 {
        particles[i].sml
    } else {
        (n_nb * mass_i / a_d).powf(1.0 / d_eff as f64).max(1e-6)
    };

    let (mut dens, mut drho_dh, mut energy_sum, mut denergy_sum_dh, mut converged) =
        (0.0, 0.0, 0.0, 0.0, false);

    for _iter in 0..MAX_H_ITERATIONS {
        search_with_retry(tree, particles, i, periodic, buf)?;
        dens = 0.0;
        drho_dh = 0.0;
        energy_sum = 0.0;
        denergy_sum_dh = 0.0;
        for &j in buf.iter() {
            let r_ij = periodic.distance_vec(pos_i, particles[j].pos);
            let r = r_ij.length();
            dens += particles[j].mass * kernel.w(r_ij, r, h);
            drho_dh += particles[j].mass * kernel.dhw(r_ij, r, h);
            energy_sum += particles[j].mass * particles[j].ene * kernel.w(r_ij, r, h);
            denergy_sum_dh += particles[j].mass * particles[j].ene * kernel.dhw(r_ij, r, h);
        }
        // Include the particle's own kernel-self-contribution (r = 0).
        dens += mass_i * kernel.w(DVec3::ZERO, 0.0, h);
        drho_dh += mass_i * kernel.dhw(DVec3::ZERO, 0.0, h);
        energy_sum += mass_i * particles[i].ene * kernel.w(DVec3::ZERO, 0.0, h);
        denergy_sum_dh += mass_i * particles[i].ene * kernel.dhw(DVec3::ZERO, 0.0, h);

        let f = dens * h.powi(d_eff as i32) - mass_i * n_nb / a_d;
        let df = drho_dh * h.powi(d_eff as i32) + dens * d_eff as f64 * h.powi(d_eff as i32 - 1);
        if df.abs() < 1e-300 {
            break;
        }
        let h_new = (h - f / df).max(h * 0.1);
        let delta = (h_new - h).abs();
        let scale = h_new + h;
        h = h_new;
        if scale > 0.0 && delta < H_CONVERGENCE_EPS * scale {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(
            "particle {} smoothing length did not converge after {} iterations, retaining h = {}",
            particles[i].id, MAX_H_ITERATIONS, particles[i].sml
        );
        if particles[i].sml > 0.0 {
            h = particles[i].sml;
            // Recompute density/derivatives once more at the retained h so
            // pressure and the grad-h correction are consistent with it.
            search_with_retry(tree, particles, i, periodic, buf)?;
            dens = mass_i * kernel.w(DVec3::ZERO, 0.0, h);
            drho_dh = mass_i * kernel.dhw(DVec3::ZERO, 0.0, h);
            energy_sum = mass_i * particles[i].ene * kernel.w(DVec3::ZERO, 0.0, h);
            denergy_sum_dh = mass_i * particles[i].ene * kernel.dhw(DVec3::ZERO, 0.0, h);
            for &j in buf.iter() {
                let r_ij = periodic.distance_vec(pos_i, particles[j].pos);
                let r = r_ij.length();
                dens += particles[j].mass * kernel.w(r_ij, r, h);
                drho_dh += particles[j].mass * kernel.dhw(r_ij, r, h);
                energy_sum += particles[j].mass * particles[j].ene * kernel.w(r_ij, r, h);
                denergy_sum_dh += particles[j].mass * particles[j].ene * kernel.dhw(r_ij, r, h);
            }
        }
    }

    let volume = mass_i / dens;
    let pres = if params.variant.is_density_independent() {
        (gamma - 1.0) * energy_sum
    } else {
        (gamma - 1.0) * dens * particles[i].ene
    };

    let (quantity, dquantity_dh) = if params.variant.is_density_independent() {
        (energy_sum, denergy_sum_dh)
    } else {
        (dens, drho_dh)
    };
    let grad_h = if quantity.abs() < 1e-300 {
        1.0
    } else {
        1.0 / (1.0 + (h / (d_eff as f64 * quantity)) * dquantity_dh)
    };

    let sound = (gamma * (gamma - 1.0) * particles[i].ene).max(0.0).sqrt();

    // div(v) and |curl(v)| via SPH sums, used for the Balsara switch and the
    // time-dependent AV-alpha source term (SPEC_FULL.md §4.3).
    let mut div_v = 0.0;
    let mut curl_v = glam::DVec3::ZERO;
    for &j in buf.iter() {
        let r_ij = periodic.distance_vec(pos_i, particles[j].pos);
        let r = r_ij.length();
        let grad_w = kernel.dw(r_ij, r, h);
        let v_ij = particles[j].vel - particles[i].vel;
        div_v += particles[j].mass * v_ij.dot(grad_w);
        curl_v += particles[j].mass * v_ij.cross(grad_w);
    }
    div_v = -div_v / dens.max(1e-300);
    let curl_v_mag = (curl_v / dens.max(1e-300)).length();

    let balsara = if params.av.use_balsara_switch && d_eff > 1 {
        let denom = div_v.abs() + curl_v_mag + BALSARA_EPS * sound / h.max(1e-300);
        if denom > 0.0 {
            div_v.abs() / denom
        } else {
            0.0
        }
    } else {
        1.0
    };

    let alpha = if params.av.use_time_dependent_av {
        let tau = h / (params.av.epsilon_av * sound.max(1e-300));
        let source = (-div_v).max(0.0) * (params.av.alpha_max - particles[i].alpha);
        let decay = -(particles[i].alpha - params.av.alpha_min) / tau.max(1e-300);
        (particles[i].alpha + dt * (decay + source)).clamp(params.av.alpha_min, params.av.alpha_max)
    } else {
        params.av.alpha
    };

    let v_sig = buf
        .iter()
        .map(|&j| {
            let r_ij = periodic.distance_vec(pos_i, particles[j].pos);
            let r = r_ij.length();
            let v_ij = particles[j].vel - particles[i].vel;
            let w_ij = if r > 0.0 { v_ij.dot(r_ij) / r } else { 0.0 };
            sound + particles[j].sound - params.av.beta * w_ij.min(0.0)
        })
        .fold(sound, f64::max);

    // Diagnostic shock sensor (SPEC_FULL.md §4.8): reuses div_v already
    // computed above, no extra neighbor pass. Never read back by FluidForce.
    let shock_sensor = (-div_v).max(0.0) * h / sound.max(1e-300);

    let (grad_density, grad_pressure, grad_velocity) = if params.variant.uses_riemann_solver() {
        let mut grad_rho = glam::DVec3::ZERO;
        let mut grad_v = [glam::DVec3::ZERO; 3];
        for &j in buf.iter() {
            let r_ij = periodic.distance_vec(pos_i, particles[j].pos);
            let r = r_ij.length();
            let grad_w = kernel.dw(r_ij, r, h);
            grad_rho += particles[j].mass * grad_w;
            let v_ij = particles[j].vel - particles[i].vel;
            grad_v[0] += particles[j].mass * v_ij.x * grad_w;
            grad_v[1] += particles[j].mass * v_ij.y * grad_w;
            grad_v[2] += particles[j].mass * v_ij.z * grad_w;
        }
        let inv_dens = 1.0 / dens.max(1e-300);
        grad_v[0] *= inv_dens;
        grad_v[1] *= inv_dens;
        grad_v[2] *= inv_dens;

        // Kernel sum of (gamma - 1) m_j u_j grad W, plus the cross term from
        // the product rule applied to P = (gamma - 1) rho u (SPEC_FULL.md §4.4.5).
        let mut grad_p_sum = glam::DVec3::ZERO;
        for &j in buf.iter() {
            let r_ij = periodic.distance_vec(pos_i, particles[j].pos);
            let r = r_ij.length();
            let grad_w = kernel.dw(r_ij, r, h);
            grad_p_sum += (gamma - 1.0) * particles[j].mass * particles[j].ene * grad_w;
        }
        let grad_p = grad_p_sum + (gamma - 1.0) * particles[i].ene * grad_rho;

        (Some(grad_rho), Some(grad_p), Some(grad_v))
    } else {
        (None, None, None)
    };

    Ok(PreInteractionOutput {
        sml: h,
        dens,
        pres,
        volume,
        grad_h,
        balsara,
        alpha,
        sound,
        neighbor: buf.len() as i32,
        v_sig,
        div_v,
        shock_sensor,
        grad_density,
        grad_pressure,
        grad_velocity,
    })
}
