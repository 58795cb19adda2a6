//! Simulation parameters (SPEC_FULL.md §3).
//!
//! Grounded on the nested-parameter-group shape of `src/hydrodynamics/parameters.rs`
//! and `src/gravity/parameters.rs` in the teacher, minus the `raxiom_parameters`
//! proc-macro and YAML-section lookup (the JSON config parser is an external
//! collaborator, SPEC_FULL.md §1). `Parameters` is plain `serde`-derived so it
//! can be embedded byte-for-byte in a checkpoint (§4.6) and is otherwise treated
//! as an opaque, read-only record by the core, except for `density_relaxation`.

use serde::{Deserialize, Serialize};

use crate::error::{SphError, SphResult};

/// Spatial dimensionality. Represented at runtime rather than via a
/// compile-time template parameter or Cargo feature (SPEC_FULL.md §9,
/// "Dimension representation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    D1,
    D2,
    D3,
}

impl Dimension {
    pub fn value(self) -> usize {
        match self {
            Dimension::D1 => 1,
            Dimension::D2 => 2,
            Dimension::D3 => 3,
        }
    }

    /// NCHILD = 2^DIM (SPEC_FULL.md §3, tree node).
    pub fn num_children(self) -> usize {
        1 << self.value()
    }

    pub fn from_usize(d: usize) -> SphResult<Self> {
        match d {
            1 => Ok(Dimension::D1),
            2 => Ok(Dimension::D2),
            3 => Ok(Dimension::D3),
            other => Err(SphError::ConfigInvalid(format!(
                "unsupported dimension {other}, expected 1, 2, or 3"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SphVariant {
    SSPH,
    DISPH,
    GSPH,
    GDISPH,
}

impl SphVariant {
    /// Whether this variant derives pressure directly from a kernel sum of
    /// (m u) rather than from density (SPEC_FULL.md §4.3).
    pub fn is_density_independent(self) -> bool {
        matches!(self, SphVariant::DISPH | SphVariant::GDISPH)
    }

    /// Whether this variant uses the HLL Riemann solver for its pairwise
    /// force (SPEC_FULL.md §4.4.3, §4.4.4).
    pub fn uses_riemann_solver(self) -> bool {
        matches!(self, SphVariant::GSPH | SphVariant::GDISPH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelKind {
    CubicSpline,
    Wendland,
    AnisotropicProduct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeParameters {
    pub start: f64,
    pub end: f64,
    /// Initial Δt guess; subsequent steps are CFL-determined.
    pub initial_dt: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CflParameters {
    pub sound: f64,
    pub force: f64,
    pub ene: f64,
}

impl Default for CflParameters {
    fn default() -> Self {
        Self {
            sound: 0.3,
            force: 0.5,
            ene: 0.3,
        }
    }
}

/// Artificial-viscosity parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AvParameters {
    pub use_balsara_switch: bool,
    pub use_time_dependent_av: bool,
    /// Fixed alpha (used when `use_time_dependent_av` is false).
    pub alpha: f64,
    pub alpha_min: f64,
    pub alpha_max: f64,
    /// Beta is `2 alpha` when alpha is fixed (SPEC_FULL.md §4.4.1).
    pub beta: f64,
    /// epsilon_AV in the time-dependent-alpha relaxation timescale.
    pub epsilon_av: f64,
}

impl Default for AvParameters {
    fn default() -> Self {
        Self {
            use_balsara_switch: true,
            use_time_dependent_av: false,
            alpha: 1.0,
            alpha_min: 0.1,
            alpha_max: 2.0,
            beta: 2.0,
            epsilon_av: 0.2,
        }
    }
}

/// Artificial-conductivity parameters (placeholder group carried through from
/// the original's `ac` parameter section; unused by any variant specified
/// here but retained since `Parameters` is an opaque record the core must
/// round-trip through the checkpoint verbatim).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AcParameters {
    pub enabled: bool,
    pub alpha: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TreeParameters {
    pub max_level: u32,
    pub leaf_particle_num: usize,
    /// Initial capacity of the node arena, grown geometrically on exhaustion
    /// (SPEC_FULL.md §4.2).
    pub initial_arena_capacity: usize,
}

impl Default for TreeParameters {
    fn default() -> Self {
        Self {
            max_level: 20,
            leaf_particle_num: 1,
            initial_arena_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhysicsParameters {
    pub gamma: f64,
    pub neighbor_number: f64,
    /// Whether positions are 3D but the kernel evaluates as 2D (SPEC_FULL.md §4.1).
    pub two_and_half_sim: bool,
}

impl Default for PhysicsParameters {
    fn default() -> Self {
        Self {
            gamma: 5.0 / 3.0,
            neighbor_number: 32.0,
            two_and_half_sim: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeriodicParameters {
    pub is_periodic: bool,
    pub range_min: [f64; 3],
    pub range_max: [f64; 3],
}

impl Default for PeriodicParameters {
    fn default() -> Self {
        Self {
            is_periodic: false,
            range_min: [0.0; 3],
            range_max: [1.0; 3],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GravityParameters {
    pub enabled: bool,
    pub g_constant: f64,
    pub opening_angle: f64,
}

impl Default for GravityParameters {
    fn default() -> Self {
        Self {
            enabled: false,
            g_constant: 1.0,
            opening_angle: 0.5,
        }
    }
}

/// GSPH/GDISPH-specific parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GsphParameters {
    pub is_2nd_order: bool,
}

impl Default for GsphParameters {
    fn default() -> Self {
        Self { is_2nd_order: true }
    }
}

/// Fields mutated only by the density-relaxation internal machinery, never
/// by the host (SPEC_FULL.md §6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DensityRelaxationParameters {
    pub enabled: bool,
    pub relaxed: bool,
    pub iterations_done: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResumeParameters {
    pub resume: bool,
}

impl Default for ResumeParameters {
    fn default() -> Self {
        Self { resume: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointingParameters {
    pub enabled: bool,
    pub directory: String,
    pub interval: f64,
    pub max_keep: usize,
    pub save_on_interrupt: bool,
}

impl Default for CheckpointingParameters {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: "checkpoints".to_string(),
            interval: 0.0,
            max_keep: 3,
            save_on_interrupt: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeatingCoolingParameters {
    pub enabled: bool,
    /// Coefficient in the cooling-rate curve (SPEC_FULL.md §4.7).
    pub cooling_rate_coefficient: f64,
}

impl Default for HeatingCoolingParameters {
    fn default() -> Self {
        Self {
            enabled: false,
            cooling_rate_coefficient: 0.0,
        }
    }
}

/// The full, flat-with-nested-groups parameter record (SPEC_FULL.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    pub dim: Dimension,
    pub variant: SphVariant,
    pub kernel: KernelKind,
    pub simulation_name: String,

    pub time: TimeParameters,
    pub cfl: CflParameters,
    pub av: AvParameters,
    pub ac: AcParameters,
    pub tree: TreeParameters,
    pub physics: PhysicsParameters,
    pub periodic: PeriodicParameters,
    pub gravity: GravityParameters,
    pub gsph: GsphParameters,
    pub density_relaxation: DensityRelaxationParameters,
    pub resume: ResumeParameters,
    pub checkpointing: CheckpointingParameters,
    pub heating_cooling: HeatingCoolingParameters,
}

impl Parameters {
    /// Validates cross-field invariants, returning `ConfigInvalid` on the
    /// first violation found (SPEC_FULL.md §7).
    pub fn validate(&self) -> SphResult<()> {
        if self.time.end < self.time.start {
            return Err(SphError::ConfigInvalid(
                "time.end must not be before time.start".into(),
            ));
        }
        if self.av.alpha_max < self.av.alpha_min {
            return Err(SphError::ConfigInvalid(
                "av.alpha_max must not be less than av.alpha_min".into(),
            ));
        }
        if self.physics.two_and_half_sim && self.dim != Dimension::D3 {
            return Err(SphError::ConfigInvalid(
                "two_and_half_sim requires dim = D3 (positions stay 3D; only the kernel \
                 evaluates as 2D)"
                    .into(),
            ));
        }
        if self.physics.neighbor_number <= 0.0 {
            return Err(SphError::ConfigInvalid(
                "physics.neighbor_number must be positive".into(),
            ));
        }
        if self.tree.leaf_particle_num == 0 {
            return Err(SphError::ConfigInvalid(
                "tree.leaf_particle_num must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Effective kernel dimension (SPEC_FULL.md §4.1): DIM, unless
    /// `two_and_half_sim` forces it to 2 regardless of the genuine DIM.
    pub fn effective_dimension(&self) -> usize {
        if self.physics.two_and_half_sim {
            2
        } else {
            self.dim.value()
        }
    }
}
