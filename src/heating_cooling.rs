//! Optional heating/cooling source term on internal energy (SPEC_FULL.md §4.7).
//!
//! Spec-only: grounded in the "optional pluggable source term, no-op by
//! default" pattern the out-of-scope plugin mechanism would otherwise supply
//! (`plugin_utils.rs`'s optional-hook style in the teacher), kept minimal
//! since multi-species chemistry is an explicit Non-goal (SPEC_FULL.md §1)
//! and this core owns only a single scalar cooling-rate function.

use rayon::prelude::*;

use crate::parameters::HeatingCoolingParameters;
use crate::particle::Particle;

/// Adds a cooling/heating rate Λ(ρ, u) to every non-wall, non-point-mass
/// particle's `dene`, evaluated once per step after FluidForce/GravityForce
/// have populated it and before the Correct kick (SPEC_FULL.md §4.7). A
/// no-op when `params.enabled` is false.
pub fn apply(particles: &mut [Particle], params: &HeatingCoolingParameters) {
    if !params.enabled {
        return;
    }
    particles
        .par_iter_mut()
        .filter(|p| p.is_fluid())
        .for_each(|p| {
            p.dene += cooling_rate(p.dens, p.ene, params.cooling_rate_coefficient);
        });
}

/// A simple optically-thin cooling curve, rate ~ -coefficient * rho * sqrt(u)
/// (a minimal stand-in for the source's tabulated cooling function; the
/// spec requires only "a single scalar rate function of local state",
/// SPEC_FULL.md §4.7).
fn cooling_rate(dens: f64, ene: f64, coefficient: f64) -> f64 {
    -coefficient * dens * ene.max(0.0).sqrt()
}
