//! Kick-drift-kick (velocity Verlet) time integration (SPEC_FULL.md §4.5).
//!
//! Grounded on the teacher's `integrator/mod.rs` predict/correct staging
//! (leapfrog-with-energy split), generalized from the teacher's fixed
//! hierarchical time-bin subcycling to this core's single flat global Δt
//! (SPEC_FULL.md §9), and from its Bevy `Time`/event-driven step loop to a
//! plain `run_step`/`run` pair the host drives directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

use crate::checkpoint::AutoCheckpointer;
use crate::error::SphResult;
use crate::simulation::Simulation;
use crate::timestep;

/// Runs the kick-drift-kick integrator to completion (or until interrupted),
/// driving tree rebuilds, force recomputation, optional auto-checkpointing,
/// and interrupt polling (SPEC_FULL.md §4.5, §5, §6).
pub struct Integrator {
    interrupt: Arc<AtomicBool>,
    checkpointer: Option<AutoCheckpointer>,
}

impl Integrator {
    pub fn new(interrupt: Arc<AtomicBool>, checkpointer: Option<AutoCheckpointer>) -> Self {
        Self {
            interrupt,
            checkpointer,
        }
    }

    /// Advances `sim` one full kick-drift-kick step, returning the Δt used.
    /// Requires `sim`'s forces (`acc`/`dene`) to already reflect the current
    /// state (true after `Simulation::new` + one force pass, or after the
    /// previous call to this method, which leaves the Correct-kick forces in
    /// place for the next step's predict phase).
    pub fn step(&mut self, sim: &mut Simulation) -> SphResult<f64> {
        let dt = sim.dt;
        let gamma = sim.params.physics.gamma;
        let two_and_half = sim.params.physics.two_and_half_sim;

        // 1. Predict: half-step velocity/energy, full drift, full-step
        //    velocity/energy (SPEC_FULL.md §4.5 step 1).
        for p in sim.particles.iter_mut().filter(|p| p.is_fluid()) {
            p.vel_half = p.vel + 0.5 * dt * p.acc;
            p.ene_half = p.ene + 0.5 * dt * p.dene;
            p.pos += p.vel_half * dt;
            p.vel += dt * p.acc;
            p.ene += dt * p.dene;
        }

        // 2. Floor, recompute sound speed, wrap, zero the z axis in 2.5D
        //    mode (SPEC_FULL.md §4.5 step 2).
        for p in sim.particles.iter_mut().filter(|p| p.is_fluid()) {
            p.apply_energy_floor();
            p.recompute_sound_speed(gamma);
            p.pos = sim.periodic.wrap(p.pos);
            if two_and_half {
                p.pos.z = 0.0;
                p.vel.z = 0.0;
            }
        }
        sim.tree.mark_stale();

        // 3. Recompute forces: tree rebuild, PreInteraction, FluidForce,
        //    GravityForce, HeatingCooling (SPEC_FULL.md §4.5 step 3).
        sim.rebuild_tree()?;
        sim.run_pre_interaction()?;
        sim.clear_forces();
        sim.run_fluid_force()?;
        sim.run_gravity();
        sim.run_heating_cooling();

        // 4. Correct: full-step velocity/energy from the half-step baseline
        //    plus the freshly recomputed forces (SPEC_FULL.md §4.5 step 4).
        for p in sim.particles.iter_mut().filter(|p| p.is_fluid()) {
            p.vel = p.vel_half + 0.5 * dt * p.acc;
            p.ene = p.ene_half + 0.5 * dt * p.dene;
            p.apply_energy_floor();
            p.recompute_sound_speed(gamma);
            if two_and_half {
                p.vel.z = 0.0;
            }
        }

        let v_sig_max = sim
            .particles
            .iter()
            .filter(|p| p.is_fluid())
            .map(|p| p.sound)
            .fold(0.0_f64, f64::max);
        sim.dt = timestep::compute(&sim.particles, &sim.params.cfl, v_sig_max);
        sim.time += dt;
        sim.step += 1;

        if let Some(checkpointer) = self.checkpointer.as_mut() {
            checkpointer.maybe_save(&sim.particles, &sim.params, sim.time, sim.dt, sim.step)?;
        }

        Ok(dt)
    }

    /// Steps `sim` until `sim.time >= sim.params.time.end` or the interrupt
    /// flag is set, returning the number of steps taken. Writes a final
    /// checkpoint on interrupt if auto-checkpointing is configured
    /// (SPEC_FULL.md §4.5, §5 "Cancellation/timeouts").
    pub fn run(&mut self, sim: &mut Simulation) -> SphResult<i64> {
        let mut steps_taken = 0i64;
        while sim.time < sim.params.time.end {
            self.step(sim)?;
            steps_taken += 1;
            if self.interrupt.load(Ordering::SeqCst) {
                info!(
                    "integrator: interrupt received after step {} (t={})",
                    sim.step, sim.time
                );
                if let Some(checkpointer) = self.checkpointer.as_mut() {
                    if checkpointer.save_on_interrupt() {
                        checkpointer.save_final(
                            &sim.particles,
                            &sim.params,
                            sim.time,
                            sim.dt,
                            sim.step,
                        )?;
                    }
                }
                break;
            }
        }
        Ok(steps_taken)
    }
}
