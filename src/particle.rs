//! Particle data model (SPEC_FULL.md §3).
//!
//! Grounded on `include/particle.hpp` of the original C++ source: a flat,
//! plain-old-data record per fluid parcel. Particles are owned by
//! [`crate::simulation::Simulation`] as a contiguous `Vec<Particle>`; the
//! index into that vector is the particle's handle for neighbor lists and
//! tree assignment.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// One fluid parcel (or, if `is_wall`/`is_point_mass`, a non-fluid marker
/// particle carried in the same array).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub pos: DVec3,
    pub vel: DVec3,
    /// Velocity at the half step, set by the integrator's predict phase.
    pub vel_half: DVec3,
    pub acc: DVec3,
    pub mass: f64,
    /// Mass density.
    pub dens: f64,
    pub pres: f64,
    /// Specific internal energy.
    pub ene: f64,
    /// Internal energy at the half step.
    pub ene_half: f64,
    /// du/dt.
    pub dene: f64,
    /// Smoothing length.
    pub sml: f64,
    /// Sound speed.
    pub sound: f64,
    /// Balsara switch, in [0, 1].
    pub balsara: f64,
    /// Artificial-viscosity coefficient.
    pub alpha: f64,
    /// Grad-h correction factor.
    pub grad_h: f64,
    /// Gravitational potential.
    pub phi: f64,
    /// Volume element V = m / rho, used by DISPH/GDISPH (SPEC_FULL.md §9).
    pub volume: f64,
    pub id: i32,
    pub neighbor: i32,
    /// Dimensionless shock sensor; diagnostic only (SPEC_FULL.md §4.8).
    pub shock_sensor: f64,
    pub is_wall: bool,
    pub is_point_mass: bool,
    /// Set once `ene` has ever been clamped to [`crate::ENERGY_FLOOR`]; never cleared.
    pub energy_floored: bool,
}

impl Particle {
    pub fn new(id: i32, pos: DVec3, mass: f64) -> Self {
        Self {
            pos,
            vel: DVec3::ZERO,
            vel_half: DVec3::ZERO,
            acc: DVec3::ZERO,
            mass,
            dens: 0.0,
            pres: 0.0,
            ene: crate::ENERGY_FLOOR,
            ene_half: crate::ENERGY_FLOOR,
            dene: 0.0,
            sml: 0.0,
            sound: 0.0,
            balsara: 0.0,
            alpha: 0.0,
            grad_h: 1.0,
            phi: 0.0,
            volume: 0.0,
            id,
            neighbor: 0,
            shock_sensor: 0.0,
            is_wall: false,
            is_point_mass: false,
            energy_floored: false,
        }
    }

    /// Whether this particle participates in pressure/gravity force loops
    /// (i.e. is a genuine fluid parcel, not a wall marker or point mass).
    #[inline]
    pub fn is_fluid(&self) -> bool {
        !self.is_wall && !self.is_point_mass
    }

    /// Applies the energy floor (SPEC_FULL.md §4.5 step 2, §7 `EnergyFloored`),
    /// returning whether the floor was applied this call.
    pub fn apply_energy_floor(&mut self) -> bool {
        if self.ene < crate::ENERGY_FLOOR {
            self.ene = crate::ENERGY_FLOOR;
            self.energy_floored = true;
            true
        } else {
            false
        }
    }

    /// c = sqrt(gamma (gamma - 1) u).
    pub fn recompute_sound_speed(&mut self, gamma: f64) {
        self.sound = (gamma * (gamma - 1.0) * self.ene).max(0.0).sqrt();
    }
}
