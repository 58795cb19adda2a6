//! Binary checkpoint format with SHA-256 integrity (SPEC_FULL.md §4.6).
//!
//! Grounded in the atomic write-to-temp-then-rename staging pattern of
//! `io/output/mod.rs` (open/close staging), generalized to this core's own
//! fixed-header-plus-JSON-plus-POD-array binary layout (the teacher writes
//! HDF5, which is out of scope here per SPEC_FULL.md §1). Every field is
//! serialized explicitly in a fixed order; the core never transmutes
//! `Particle` to bytes, since struct layout is not portable (SPEC_FULL.md §6).

use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use glam::DVec3;
use log::{debug, info};
use sha2::{Digest, Sha256};

use crate::error::{SphError, SphResult};
use crate::parameters::{CheckpointingParameters, Dimension, Parameters, SphVariant};
use crate::particle::Particle;

pub const MAGIC: &[u8; 8] = b"SPHCHKPT";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_SIZE: usize = 512;
/// 4 `DVec3` fields (pos, vel, vel_half, acc) + 12 `f64` scalars + 2 `i32`
/// integers + 3 `u8` flags, padded to an 8-byte boundary (SPEC_FULL.md §6).
const PARTICLE_RECORD_SIZE: usize = 4 * 24 + 12 * 8 + 2 * 4 + 3 + 5;
const CHECKSUM_SIZE: usize = 32;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 8;
const OFF_DIM: usize = 12;
const OFF_TIMESTAMP: usize = 16;
const OFF_SIM_NAME: usize = 80;
const OFF_VARIANT: usize = 208;
const OFF_SIM_TIME: usize = 272;
const OFF_DT: usize = 280;
const OFF_STEP: usize = 288;
const OFF_PARTICLE_COUNT: usize = 296;
const OFF_PARAMS_SIZE: usize = 304;

fn pad_str(dst: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
}

fn variant_name(variant: SphVariant) -> &'static str {
    match variant {
        SphVariant::SSPH => "SSPH",
        SphVariant::DISPH => "DISPH",
        SphVariant::GSPH => "GSPH",
        SphVariant::GDISPH => "GDISPH",
    }
}

fn write_header(
    dim: Dimension,
    sim_name: &str,
    variant: SphVariant,
    sim_time: f64,
    dt: f64,
    step: i64,
    particle_count: i64,
    params_size: i64,
) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[OFF_MAGIC..OFF_MAGIC + 8].copy_from_slice(MAGIC);
    header[OFF_VERSION..OFF_VERSION + 4].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    header[OFF_DIM..OFF_DIM + 4].copy_from_slice(&(dim.value() as i32).to_le_bytes());
    pad_str(
        &mut header[OFF_TIMESTAMP..OFF_TIMESTAMP + 64],
        &Utc::now().to_rfc3339(),
    );
    pad_str(&mut header[OFF_SIM_NAME..OFF_SIM_NAME + 128], sim_name);
    pad_str(
        &mut header[OFF_VARIANT..OFF_VARIANT + 64],
        variant_name(variant),
    );
    header[OFF_SIM_TIME..OFF_SIM_TIME + 8].copy_from_slice(&sim_time.to_le_bytes());
    header[OFF_DT..OFF_DT + 8].copy_from_slice(&dt.to_le_bytes());
    header[OFF_STEP..OFF_STEP + 8].copy_from_slice(&step.to_le_bytes());
    header[OFF_PARTICLE_COUNT..OFF_PARTICLE_COUNT + 8]
        .copy_from_slice(&particle_count.to_le_bytes());
    header[OFF_PARAMS_SIZE..OFF_PARAMS_SIZE + 8].copy_from_slice(&params_size.to_le_bytes());
    header
}

struct ParsedHeader {
    dim: Dimension,
    sim_time: f64,
    dt: f64,
    step: i64,
    particle_count: i64,
    params_size: i64,
}

fn parse_header(bytes: &[u8]) -> SphResult<ParsedHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(SphError::IOError(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "checkpoint file shorter than the fixed header",
        )));
    }
    if &bytes[OFF_MAGIC..OFF_MAGIC + 8] != MAGIC {
        return Err(SphError::ChecksumMismatch);
    }
    let version = u32::from_le_bytes(bytes[OFF_VERSION..OFF_VERSION + 4].try_into().unwrap());
    if version != FORMAT_VERSION {
        return Err(SphError::UnsupportedCheckpointVersion {
            found: version,
            expected: FORMAT_VERSION,
        });
    }
    let dim_raw = i32::from_le_bytes(bytes[OFF_DIM..OFF_DIM + 4].try_into().unwrap());
    let dim = Dimension::from_usize(dim_raw as usize)?;
    let sim_time = f64::from_le_bytes(bytes[OFF_SIM_TIME..OFF_SIM_TIME + 8].try_into().unwrap());
    let dt = f64::from_le_bytes(bytes[OFF_DT..OFF_DT + 8].try_into().unwrap());
    let step = i64::from_le_bytes(bytes[OFF_STEP..OFF_STEP + 8].try_into().unwrap());
    let particle_count = i64::from_le_bytes(
        bytes[OFF_PARTICLE_COUNT..OFF_PARTICLE_COUNT + 8]
            .try_into()
            .unwrap(),
    );
    let params_size = i64::from_le_bytes(
        bytes[OFF_PARAMS_SIZE..OFF_PARAMS_SIZE + 8]
            .try_into()
            .unwrap(),
    );
    Ok(ParsedHeader {
        dim,
        sim_time,
        dt,
        step,
        particle_count,
        params_size,
    })
}

fn write_vec3(buf: &mut Vec<u8>, v: DVec3) {
    buf.extend_from_slice(&v.x.to_le_bytes());
    buf.extend_from_slice(&v.y.to_le_bytes());
    buf.extend_from_slice(&v.z.to_le_bytes());
}

fn read_vec3(bytes: &[u8], off: &mut usize) -> DVec3 {
    let x = f64::from_le_bytes(bytes[*off..*off + 8].try_into().unwrap());
    let y = f64::from_le_bytes(bytes[*off + 8..*off + 16].try_into().unwrap());
    let z = f64::from_le_bytes(bytes[*off + 16..*off + 24].try_into().unwrap());
    *off += 24;
    DVec3::new(x, y, z)
}

fn write_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn read_f64(bytes: &[u8], off: &mut usize) -> f64 {
    let v = f64::from_le_bytes(bytes[*off..*off + 8].try_into().unwrap());
    *off += 8;
    v
}

/// Serializes a single particle field-by-field in a fixed order (never by
/// transmuting the in-memory struct, SPEC_FULL.md §6). `volume` and
/// `shock_sensor` are diagnostics recomputed every step and are not part of
/// the version-1 on-disk record.
fn serialize_particle(p: &Particle, buf: &mut Vec<u8>) {
    let start = buf.len();
    write_vec3(buf, p.pos);
    write_vec3(buf, p.vel);
    write_vec3(buf, p.vel_half);
    write_vec3(buf, p.acc);
    write_f64(buf, p.mass);
    write_f64(buf, p.dens);
    write_f64(buf, p.pres);
    write_f64(buf, p.ene);
    write_f64(buf, p.ene_half);
    write_f64(buf, p.dene);
    write_f64(buf, p.sml);
    write_f64(buf, p.sound);
    write_f64(buf, p.balsara);
    write_f64(buf, p.alpha);
    write_f64(buf, p.grad_h);
    write_f64(buf, p.phi);
    buf.extend_from_slice(&p.id.to_le_bytes());
    buf.extend_from_slice(&p.neighbor.to_le_bytes());
    buf.push(p.is_wall as u8);
    buf.push(p.is_point_mass as u8);
    buf.push(p.energy_floored as u8);
    buf.resize(start + PARTICLE_RECORD_SIZE, 0);
}

fn deserialize_particle(bytes: &[u8]) -> Particle {
    let mut off = 0usize;
    let pos = read_vec3(bytes, &mut off);
    let vel = read_vec3(bytes, &mut off);
    let vel_half = read_vec3(bytes, &mut off);
    let acc = read_vec3(bytes, &mut off);
    let mass = read_f64(bytes, &mut off);
    let dens = read_f64(bytes, &mut off);
    let pres = read_f64(bytes, &mut off);
    let ene = read_f64(bytes, &mut off);
    let ene_half = read_f64(bytes, &mut off);
    let dene = read_f64(bytes, &mut off);
    let sml = read_f64(bytes, &mut off);
    let sound = read_f64(bytes, &mut off);
    let balsara = read_f64(bytes, &mut off);
    let alpha = read_f64(bytes, &mut off);
    let grad_h = read_f64(bytes, &mut off);
    let phi = read_f64(bytes, &mut off);
    let id = i32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    off += 4;
    let neighbor = i32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    off += 4;
    let is_wall = bytes[off] != 0;
    let is_point_mass = bytes[off + 1] != 0;
    let energy_floored = bytes[off + 2] != 0;

    let mut p = Particle::new(id, pos, mass);
    p.vel = vel;
    p.vel_half = vel_half;
    p.acc = acc;
    p.dens = dens;
    p.pres = pres;
    p.ene = ene;
    p.ene_half = ene_half;
    p.dene = dene;
    p.sml = sml;
    p.sound = sound;
    p.balsara = balsara;
    p.alpha = alpha;
    p.grad_h = grad_h;
    p.phi = phi;
    p.neighbor = neighbor;
    p.is_wall = is_wall;
    p.is_point_mass = is_point_mass;
    p.energy_floored = energy_floored;
    // Volume is not persisted; PreInteraction recomputes `m / rho` before it
    // is ever read (SPEC_FULL.md §9 Open Questions).
    p.volume = if dens > 0.0 { mass / dens } else { 0.0 };
    p
}

/// Saves `particles` and `params` to `path` atomically: serialized to a
/// sibling temp file, flushed, then renamed into place, so a crash never
/// leaves a partially-written file observable under the final name
/// (SPEC_FULL.md §4.6, §7 `IOError`).
pub fn save(
    path: &Path,
    particles: &[Particle],
    params: &Parameters,
    sim_time: f64,
    dt: f64,
    step: i64,
) -> SphResult<()> {
    let params_json = serde_json::to_vec(params)?;
    let header = write_header(
        params.dim,
        &params.simulation_name,
        params.variant,
        sim_time,
        dt,
        step,
        particles.len() as i64,
        params_json.len() as i64,
    );

    let mut body = Vec::with_capacity(
        HEADER_SIZE + params_json.len() + particles.len() * PARTICLE_RECORD_SIZE,
    );
    body.extend_from_slice(&header);
    body.extend_from_slice(&params_json);
    for p in particles {
        serialize_particle(p, &mut body);
    }

    let checksum = Sha256::digest(&body);

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint".to_string())
    ));
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(&body)?;
        f.write_all(&checksum)?;
        f.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    info!(
        "checkpoint saved: {} (t={sim_time}, step={step}, {} particles)",
        path.display(),
        particles.len()
    );
    Ok(())
}

/// The result of a successful [`load`]: the deserialized parameters,
/// particle array, simulation time, timestep, and step counter.
pub struct LoadedCheckpoint {
    pub params: Parameters,
    pub particles: Vec<Particle>,
    pub sim_time: f64,
    pub dt: f64,
    pub step: i64,
}

/// Loads a checkpoint, validating magic, version, and the trailing SHA-256
/// before touching any output. On any validation failure, returns an error
/// and never partially populates state (SPEC_FULL.md §4.6, §7).
pub fn load(path: &Path) -> SphResult<LoadedCheckpoint> {
    let bytes = fs::read(path)?;
    if bytes.len() < CHECKSUM_SIZE {
        return Err(SphError::ChecksumMismatch);
    }
    let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
    let computed = Sha256::digest(body);
    if computed.as_slice() != checksum {
        return Err(SphError::ChecksumMismatch);
    }

    let header = parse_header(body)?;
    let params_start = HEADER_SIZE;
    let params_end = params_start + header.params_size as usize;
    if body.len() < params_end {
        return Err(SphError::ChecksumMismatch);
    }
    let params: Parameters = serde_json::from_slice(&body[params_start..params_end])?;

    let mut particles = Vec::with_capacity(header.particle_count as usize);
    let mut off = params_end;
    for _ in 0..header.particle_count {
        if off + PARTICLE_RECORD_SIZE > body.len() {
            return Err(SphError::ChecksumMismatch);
        }
        particles.push(deserialize_particle(&body[off..off + PARTICLE_RECORD_SIZE]));
        off += PARTICLE_RECORD_SIZE;
    }

    Ok(LoadedCheckpoint {
        params,
        particles,
        sim_time: header.sim_time,
        dt: header.dt,
        step: header.step,
    })
}

/// Drives interval-triggered auto-checkpointing and the FIFO eviction of
/// old files (SPEC_FULL.md §4.6 "Auto-checkpoint maintains a FIFO queue of
/// `max_keep` files").
pub struct AutoCheckpointer {
    directory: PathBuf,
    interval: f64,
    max_keep: usize,
    save_on_interrupt: bool,
    next_threshold: f64,
    saved: VecDeque<PathBuf>,
}

impl AutoCheckpointer {
    pub fn new(params: &CheckpointingParameters) -> Self {
        Self {
            directory: PathBuf::from(&params.directory),
            interval: params.interval,
            max_keep: params.max_keep.max(1),
            save_on_interrupt: params.save_on_interrupt,
            next_threshold: params.interval,
            saved: VecDeque::new(),
        }
    }

    pub fn save_on_interrupt(&self) -> bool {
        self.save_on_interrupt
    }

    fn checkpoint_path(&self, step: i64) -> PathBuf {
        self.directory.join(format!("checkpoint_{step:010}.sphchkpt"))
    }

    /// Saves and evicts if `sim_time` has crossed a new multiple of
    /// `interval` since the last save; otherwise a no-op. Returns the
    /// written path, if any.
    pub fn maybe_save(
        &mut self,
        particles: &[Particle],
        params: &Parameters,
        sim_time: f64,
        dt: f64,
        step: i64,
    ) -> SphResult<Option<PathBuf>> {
        if self.interval <= 0.0 || sim_time + 1e-12 < self.next_threshold {
            return Ok(None);
        }
        let path = self.checkpoint_path(step);
        save(&path, particles, params, sim_time, dt, step)?;
        self.saved.push_back(path.clone());
        while self.saved.len() > self.max_keep {
            if let Some(old) = self.saved.pop_front() {
                if let Err(e) = fs::remove_file(&old) {
                    debug!("auto-checkpoint: failed to evict {}: {e}", old.display());
                } else {
                    debug!("auto-checkpoint: evicted {}", old.display());
                }
            }
        }
        while sim_time + 1e-12 >= self.next_threshold {
            self.next_threshold += self.interval;
        }
        Ok(Some(path))
    }

    /// Saves one final checkpoint regardless of interval, for the interrupt
    /// path (SPEC_FULL.md §4.6 "An interrupt signal ... triggers one final
    /// save before graceful exit").
    pub fn save_final(
        &mut self,
        particles: &[Particle],
        params: &Parameters,
        sim_time: f64,
        dt: f64,
        step: i64,
    ) -> SphResult<PathBuf> {
        let path = self.checkpoint_path(step);
        save(&path, particles, params, sim_time, dt, step)?;
        self.saved.push_back(path.clone());
        Ok(path)
    }
}
