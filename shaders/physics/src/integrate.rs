//! Explicit Euler prediction, the first kernel of every frame.

use pbf_cpu_gpu_shared::{BoxSettings, Particle, SimulationSettings};

/// Predict where particle `id` will be, reading last frame's buffer and writing this frame's.
pub fn predict(
    id: usize,
    settings: &SimulationSettings,
    bounds: &BoxSettings,
    previous: &[Particle],
    particles: &mut [Particle],
) {
    if id >= settings.particle_count as usize {
        return;
    }

    let mut particle = previous[id];
    let start = particle.position.truncate();
    let velocity = particle.velocity.truncate() + settings.gravity.truncate() * settings.dt;

    particle.previous_position = start.extend(0.0);
    particle.velocity = velocity.extend(0.0);
    particle.position = bounds.clamp(start + velocity * settings.dt).extend(0.0);
    particles[id] = particle;
}
