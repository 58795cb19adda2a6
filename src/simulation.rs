//! Owns the particle array and every piece of per-run state the integrator
//! drives (SPEC_FULL.md §2, §6).
//!
//! Grounded on `Sweep`/the teacher's top-level `Simulation` resource bundle
//! (`simulation_box.rs` + `units.rs` + the Bevy `App`'s resource set),
//! replacing Bevy ECS resources with plain owned fields per SPEC_FULL.md §9
//! ("Bevy ECS ... replace with a plain Rust struct owning a `Vec<Particle>`").

use glam::DVec3;

use crate::error::SphResult;
use crate::kernel::Kernel;
use crate::parameters::Parameters;
use crate::particle::Particle;
use crate::periodic::PeriodicBox;
use crate::pre_interaction::{self, PreInteractionOutput};
use crate::scratch::ScratchArrays;
use crate::tree::{build, gravity, Tree};

/// A read-only view of simulation state for output writers (SPEC_FULL.md §6
/// "Particle snapshots produced for the caller"). Valid only between steps.
pub struct Snapshot<'a> {
    pub time: f64,
    pub dt: f64,
    pub step: i64,
    pub particles: &'a [Particle],
}

/// A hook invoked exactly once after a checkpoint load, before the first
/// integration step (SPEC_FULL.md §6 "Initial-conditions hook"). May insert
/// additional particles and adjust existing ones.
pub trait Modifier {
    fn modify(&mut self, particles: &mut Vec<Particle>, simulation: &Simulation);
}

/// Owns the particle array, kernel, tree, periodic box, and scratch arrays
/// for one run (SPEC_FULL.md §3 "Scratch arrays (Simulation)").
pub struct Simulation {
    pub particles: Vec<Particle>,
    pub kernel: Kernel,
    pub tree: Tree,
    pub periodic: PeriodicBox,
    pub scratch: ScratchArrays,
    pub params: Parameters,
    pub time: f64,
    pub dt: f64,
    pub step: i64,
}

impl Simulation {
    /// Builds a fresh simulation from an initial particle array and
    /// validated parameters (SPEC_FULL.md §7 "the core validates ...
    /// configuration once at startup").
    pub fn new(particles: Vec<Particle>, params: Parameters) -> SphResult<Self> {
        params.validate()?;
        let d_eff = params.effective_dimension();
        let kernel = Kernel::new(params.kernel, d_eff);
        let periodic = PeriodicBox::new(&params.periodic, params.dim);
        let tree = Tree::empty(params.dim, params.tree.initial_arena_capacity);
        let scratch = ScratchArrays::new(particles.len());
        Ok(Self {
            particles,
            kernel,
            tree,
            periodic,
            scratch,
            time: params.time.start,
            dt: params.time.initial_dt,
            params,
            step: 0,
        })
    }

    /// Loads a checkpoint and resumes from its (t, dt, step), running
    /// `modifier` exactly once against the freshly-loaded particle array
    /// before returning (SPEC_FULL.md §6 "Initial-conditions hook").
    pub fn from_checkpoint(
        path: &std::path::Path,
        modifier: Option<&mut dyn Modifier>,
    ) -> SphResult<Self> {
        let loaded = crate::checkpoint::load(path)?;
        let mut sim = Self::new(loaded.particles, loaded.params)?;
        sim.time = loaded.sim_time;
        sim.dt = loaded.dt;
        sim.step = loaded.step;
        if let Some(modifier) = modifier {
            let mut particles = std::mem::take(&mut sim.particles);
            modifier.modify(&mut particles, &sim);
            sim.particles = particles;
            sim.scratch.resize(sim.particles.len());
        }
        Ok(sim)
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            time: self.time,
            dt: self.dt,
            step: self.step,
            particles: &self.particles,
        }
    }

    /// Rebuilds the Barnes-Hut tree over the current particle positions
    /// (SPEC_FULL.md §4.2 "State machine": Built after a fresh rebuild).
    pub fn rebuild_tree(&mut self) -> SphResult<()> {
        build::make(
            &mut self.tree,
            &self.particles,
            &self.params.tree,
            &self.periodic,
        )
    }

    /// Runs PreInteraction and commits its per-particle outputs, including
    /// the second-order reconstruction gradients into the scratch arrays
    /// under the fixed keys GSPH/GDISPH read back (SPEC_FULL.md §4.4.5).
    pub fn run_pre_interaction(&mut self) -> SphResult<()> {
        let out = pre_interaction::compute(
            &self.particles,
            &self.tree,
            &self.kernel,
            &self.periodic,
            &self.params,
            self.dt,
        )?;
        self.commit_pre_interaction(&out);
        Ok(())
    }

    fn commit_pre_interaction(&mut self, out: &[PreInteractionOutput]) {
        let needs_gradients = self.params.variant.uses_riemann_solver();
        if needs_gradients {
            self.scratch.resize(self.particles.len());
        }
        for (p, o) in self.particles.iter_mut().zip(out.iter()) {
            p.sml = o.sml;
            p.dens = o.dens;
            p.pres = o.pres;
            p.volume = o.volume;
            p.grad_h = o.grad_h;
            p.balsara = o.balsara;
            p.alpha = o.alpha;
            p.sound = o.sound;
            p.neighbor = o.neighbor;
            p.shock_sensor = o.shock_sensor;
        }
        if needs_gradients {
            let grad_density = self.scratch.vector_mut("grad_density");
            for (i, o) in out.iter().enumerate() {
                if let Some(g) = o.grad_density {
                    grad_density[i] = g;
                }
            }
            let grad_pressure = self.scratch.vector_mut("grad_pressure");
            for (i, o) in out.iter().enumerate() {
                if let Some(g) = o.grad_pressure {
                    grad_pressure[i] = g;
                }
            }
            for axis in 0..3 {
                let key = format!("grad_velocity_{axis}");
                let field = self.scratch.vector_mut(&key);
                for (i, o) in out.iter().enumerate() {
                    if let Some(g) = o.grad_velocity {
                        field[i] = g[axis];
                    }
                }
            }
        }
    }

    /// Runs the dispatched FluidForce pass and commits `acc`/`dene` onto
    /// every fluid particle, adding to (not overwriting) whatever gravity
    /// has already contributed this step (SPEC_FULL.md §4.4, §5).
    pub fn run_fluid_force(&mut self) -> SphResult<()> {
        let out = crate::fluid_force::compute(
            &self.particles,
            &self.tree,
            &self.kernel,
            &self.periodic,
            &self.scratch,
            &self.params,
            self.dt,
        )?;
        for (p, o) in self.particles.iter_mut().zip(out.iter()) {
            if p.is_fluid() {
                p.acc += o.acc;
                p.dene += o.dene;
            }
        }
        Ok(())
    }

    /// Resets every particle's gravitational potential, then accumulates
    /// tree self-gravity (acceleration added onto whatever FluidForce already
    /// contributed this step, potential overwritten) and direct point-mass
    /// gravity (SPEC_FULL.md §4.2 "Gravity"). A no-op when `gravity.enabled`
    /// is false. Point masses do not receive a potential, matching
    /// `gravity_force.cpp`'s self-gravity-only `phi` reset/accumulation.
    pub fn run_gravity(&mut self) {
        if !self.params.gravity.enabled {
            return;
        }
        let n = self.particles.len();
        let results: Vec<(DVec3, f64)> = (0..n)
            .map(|i| {
                if self.particles[i].is_point_mass {
                    (DVec3::ZERO, 0.0)
                } else {
                    gravity::force_and_potential(
                        &self.tree,
                        &self.particles,
                        i,
                        &self.params.gravity,
                        &self.periodic,
                    )
                }
            })
            .collect();
        for (p, (a, phi)) in self.particles.iter_mut().zip(results.iter()) {
            p.acc += *a;
            p.phi = *phi;
        }
        gravity::accumulate_point_masses(&mut self.particles, &self.params.gravity, &self.periodic);
    }

    /// Zeroes every particle's acceleration and du/dt ahead of a force
    /// recomputation (SPEC_FULL.md §4.5 step 3).
    pub fn clear_forces(&mut self) {
        for p in self.particles.iter_mut() {
            p.acc = DVec3::ZERO;
            p.dene = 0.0;
        }
    }

    /// Applies the optional heating/cooling source term (SPEC_FULL.md §4.7).
    pub fn run_heating_cooling(&mut self) {
        crate::heating_cooling::apply(&mut self.particles, &self.params.heating_cooling);
    }
}
