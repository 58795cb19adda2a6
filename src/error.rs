//! Error taxonomy (SPEC_FULL.md §7).
//!
//! Recoverable classes (`NeighborOverflow`, `SmoothingLengthDivergence`,
//! `TreeArenaExhausted`, `EnergyFloored`) are normally resolved inside the
//! component that would raise them and never cross a function boundary as an
//! `Err` — they exist here so the taxonomy is complete and independently
//! testable. Fatal classes propagate with `?` up to the integrator driver.

use thiserror::Error;

pub type SphResult<T> = Result<T, SphError>;

#[derive(Debug, Error)]
pub enum SphError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("neighbor search exceeded caller-supplied capacity of {capacity}")]
    NeighborOverflow { capacity: usize },

    #[error("smoothing length did not converge for particle {particle_id} after {iterations} iterations")]
    SmoothingLengthDivergence { particle_id: i32, iterations: u32 },

    #[error("internal energy floored to {floor} for particle {particle_id}")]
    EnergyFloored { particle_id: i32, floor: f64 },

    #[error("tree node arena exhausted (capacity {capacity})")]
    TreeArenaExhausted { capacity: usize },

    #[error("checkpoint checksum mismatch: file is corrupt or truncated")]
    ChecksumMismatch,

    #[error("unsupported checkpoint format version {found} (expected {expected})")]
    UnsupportedCheckpointVersion { found: u32, expected: u32 },

    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("checkpoint parameters section is not valid JSON: {0}")]
    InvalidParameters(#[from] serde_json::Error),
}
