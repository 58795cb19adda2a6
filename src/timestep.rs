//! Global CFL-based timestep (SPEC_FULL.md §4.5).
//!
//! Grounded on the parameter-driven reduction shape of `timestep/mod.rs`
//! (the teacher's per-particle time-bin assignment), simplified to a single
//! global Δt per SPEC_FULL.md §9 ("OpenMP ... replace with the target
//! ecosystem's data-parallel primitive. The only semantic requirement is
//! 'global min over per-particle scalars'") — this core does not implement
//! the teacher's hierarchical time-bin subcycling, only the flat per-step
//! minimum the spec names.

use rayon::prelude::*;

use crate::parameters::CflParameters;
use crate::particle::Particle;

/// `min over fluid particles of min(CFL_sound h/c, CFL_force sqrt(h/|a|),
/// CFL_ene |u / du_dt|)`, additionally capped by `CFL_sound h / v_sig_max`
/// (SPEC_FULL.md §4.5). `v_sig_max` is the global maximum signal velocity
/// captured by PreInteraction for the current step.
pub fn compute(particles: &[Particle], cfl: &CflParameters, v_sig_max: f64) -> f64 {
    particles
        .par_iter()
        .filter(|p| p.is_fluid())
        .map(|p| {
            let mut dt = cfl.sound * p.sml / p.sound.max(1e-300);
            let acc_mag = p.acc.length();
            if acc_mag > 0.0 {
                dt = dt.min(cfl.force * (p.sml / acc_mag).sqrt());
            }
            let dene_mag = p.dene.abs();
            if dene_mag > 1e-300 {
                dt = dt.min(cfl.ene * (p.ene / dene_mag).abs());
            }
            if v_sig_max > 0.0 {
                dt = dt.min(cfl.sound * p.sml / v_sig_max);
            }
            dt
        })
        .reduce(|| f64::MAX, f64::min)
}
