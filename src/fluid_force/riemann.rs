//! One-dimensional HLL Riemann solver shared by GSPH and GDISPH
//! (SPEC_FULL.md §4.4.3, §4.4.4).
//!
//! Grounded literally on `gdi_fluid_force.cpp`'s `hll_solver` lambda: a
//! Roe-averaged two-wave HLL solve, with `s_l`/`s_r` bounded by both the
//! bare left/right characteristic speeds and the Roe-averaged ones
//! (`std::min`/`std::max` against `u_t - c_t`/`u_t + c_t`), not a plain
//! acoustic-impedance average. The left/right states are the velocity
//! component along the unit separation vector, density, pressure, and
//! sound speed of the two particles in the pair.

/// A one-dimensional fluid state along the pair separation direction.
#[derive(Debug, Clone, Copy)]
pub struct State {
    pub v: f64,
    pub rho: f64,
    pub pres: f64,
    pub sound: f64,
}

/// Van-Leer-limited linear reconstruction of a scalar from particle `i`
/// toward the pair midpoint, used for second-order GSPH/GDISPH states
/// (SPEC_FULL.md §4.4.3): the raw Taylor term `grad_dot_e * delta_r` is
/// limited against the particle-to-particle jump `s_j - s_i` so the
/// reconstructed value never overshoots past the neighbor's own value.
pub fn limited_reconstruct(s_i: f64, s_j: f64, grad_dot_e: f64, delta_r: f64) -> f64 {
    let diff = s_j - s_i;
    let raw = grad_dot_e * delta_r;
    if diff.abs() < 1e-300 || raw * diff <= 0.0 {
        return s_i;
    }
    let ratio = raw / diff;
    let phi = (ratio + ratio.abs()) / (1.0 + ratio.abs());
    s_i + phi * diff.signum() * raw.abs().min(diff.abs())
}

/// The "time-corrected upwind distance" delta = 0.5 (1 - c dt / r) used to
/// scale the Taylor-extrapolation distance toward the interface
/// (SPEC_FULL.md §4.4.3).
pub fn upwind_delta(sound: f64, dt: f64, r: f64) -> f64 {
    0.5 * (1.0 - sound * dt / r.max(1e-300))
}

/// The solver's star-region result: contact pressure and velocity.
#[derive(Debug, Clone, Copy)]
pub struct StarState {
    pub pres: f64,
    pub v: f64,
}

/// Solves the Riemann problem between `left` and `right`, returning the
/// star-region pressure and velocity. Wave speeds `s_l`/`s_r` bound both
/// the raw and Roe-averaged characteristic speeds, matching
/// `gdi_fluid_force.cpp::hll_solver` exactly.
pub fn solve(left: State, right: State) -> StarState {
    let roe_l = left.rho.sqrt();
    let roe_r = right.rho.sqrt();
    let roe_inv = 1.0 / (roe_l + roe_r);

    let u_t = (roe_l * left.v + roe_r * right.v) * roe_inv;
    let c_t = (roe_l * left.sound + roe_r * right.sound) * roe_inv;
    let s_l = (left.v - left.sound).min(u_t - c_t);
    let s_r = (right.v + right.sound).max(u_t + c_t);

    let c1 = left.rho * (s_l - left.v);
    let c2 = right.rho * (s_r - right.v);
    let denom = c1 - c2;
    let c3 = 1.0 / if denom.abs() < 1e-300 { 1e-300 } else { denom };
    let c4 = left.pres - left.v * c1;
    let c5 = right.pres - right.v * c2;

    let v = (c5 - c4) * c3;
    let pres = (c1 * c5 - c2 * c4) * c3;
    StarState {
        pres: pres.max(0.0),
        v,
    }
}
