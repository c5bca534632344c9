//! Initial particle sets

use pbf_cpu_gpu_shared::{glam::Vec3, Particle, PARTICLE_COUNT_LIMIT};
use rand::Rng as _;

use crate::Error;

/// Check a particle count is supported, returning it as the GPU's integer type.
///
/// # Errors
/// If there are no particles, or at least `WORKGROUP_SIZE²` of them.
#[inline]
pub fn validate_count(count: usize) -> Result<u32, Error> {
    if count == 0 {
        return Err(Error::NoParticles);
    }
    match u32::try_from(count) {
        Ok(count) if count < PARTICLE_COUNT_LIMIT => Ok(count),
        _ => Err(Error::TooManyParticles {
            count,
            max: PARTICLE_COUNT_LIMIT,
        }),
    }
}

/// A block of resting particles, `dimensions` along each axis, starting at `origin`.
///
/// Index order is x fastest, then y, then z. Each position is nudged by up to `jitter` on every
/// axis, which breaks the symmetry of a perfect lattice.
#[must_use]
pub fn cuboid(origin: Vec3, dimensions: [u32; 3], spacing: f32, jitter: f32) -> Vec<Particle> {
    let mut rng = rand::thread_rng();
    let [width, height, depth] = dimensions;
    let mut particles = Vec::new();

    for z in 0..depth {
        for y in 0..height {
            for x in 0..width {
                let lattice = Vec3::new(x as f32, y as f32, z as f32) * spacing;
                let nudge = if jitter > 0.0 {
                    Vec3::new(
                        rng.gen_range(-jitter..=jitter),
                        rng.gen_range(-jitter..=jitter),
                        rng.gen_range(-jitter..=jitter),
                    )
                } else {
                    Vec3::ZERO
                };
                particles.push(Particle::new(origin + lattice + nudge, Vec3::ZERO));
            }
        }
    }

    particles
}
