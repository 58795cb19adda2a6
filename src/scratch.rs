//! Scratch arrays (SPEC_FULL.md §3 "Scratch arrays (Simulation)").
//!
//! Optional named per-particle fields, populated lazily by the variants that
//! need them (GSPH/GDISPH gradient reconstruction, §4.4.5). Kept as a flat
//! `HashMap` owned by [`crate::simulation::Simulation`] rather than as
//! additional `Particle` fields, since most runs (SSPH, DISPH) never touch
//! them.

use std::collections::HashMap;

use glam::DVec3;

/// Lazily-populated, string-keyed scalar and vector fields sized to the
/// particle count.
#[derive(Debug, Default)]
pub struct ScratchArrays {
    len: usize,
    scalars: HashMap<String, Vec<f64>>,
    vectors: HashMap<String, Vec<DVec3>>,
}

impl ScratchArrays {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            scalars: HashMap::new(),
            vectors: HashMap::new(),
        }
    }

    /// Resizes every already-allocated field to the new particle count,
    /// zero-filling any new entries. Called when the particle array itself
    /// is rebuilt (e.g. on checkpoint load).
    pub fn resize(&mut self, len: usize) {
        self.len = len;
        for v in self.scalars.values_mut() {
            v.resize(len, 0.0);
        }
        for v in self.vectors.values_mut() {
            v.resize(len, DVec3::ZERO);
        }
    }

    pub fn scalar_mut(&mut self, name: &str) -> &mut [f64] {
        self.scalars
            .entry(name.to_string())
            .or_insert_with(|| vec![0.0; self.len])
    }

    pub fn scalar(&self, name: &str) -> Option<&[f64]> {
        self.scalars.get(name).map(Vec::as_slice)
    }

    pub fn vector_mut(&mut self, name: &str) -> &mut [DVec3] {
        self.vectors
            .entry(name.to_string())
            .or_insert_with(|| vec![DVec3::ZERO; self.len])
    }

    pub fn vector(&self, name: &str) -> Option<&[DVec3]> {
        self.vectors.get(name).map(Vec::as_slice)
    }
}
