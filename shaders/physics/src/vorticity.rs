//! Vorticity confinement, adding back some of the swirl that the solver's damping removes.
//!
//! See Fedkiw, Stam and Jensen 2001, "Visual Simulation of Smoke".

use pbf_cpu_gpu_shared::{glam::Vec3, NeighbourSearchSettings, Particle, SimulationSettings};

use crate::{kernel::SmoothingKernel, solver::Neighbourhood};

/// Location vectors shorter than this have no usable direction.
const MIN_LOCATION_LENGTH: f32 = 1.0e-6;

/// Push particle `id` towards regions of stronger curl, reading the curl left by the last
/// velocity cache.
pub fn vorticity(
    id: usize,
    settings: &SimulationSettings,
    search: &NeighbourSearchSettings,
    particles: &mut [Particle],
    neighbours: &[u32],
) {
    if id >= settings.particle_count as usize {
        return;
    }

    let kernel = SmoothingKernel::new(settings.smoothing_radius);
    let neighbourhood = Neighbourhood::of(id, search, neighbours);
    let position = particles[id].position.truncate();

    let mut location = Vec3::ZERO;
    let neighbour_count = neighbourhood.len();
    let mut index = 0;
    while index < neighbour_count {
        let neighbour = &particles[neighbourhood.get(index)];
        let offset = position - neighbour.position.truncate();
        location += kernel.spiky_gradient(offset) * neighbour.curl.truncate().length();
        index += 1;
    }
    location *= settings.particle_mass / settings.rest_density;

    let length = location.length();
    if length <= MIN_LOCATION_LENGTH {
        return;
    }

    let force = (location / length).cross(particles[id].curl.truncate()) * settings.vorticity;
    let velocity = particles[id].velocity.truncate() + force * settings.dt;
    particles[id].velocity = velocity.extend(0.0);
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod tests {
    use pbf_cpu_gpu_shared::glam::Vec4;

    use super::*;

    const RADIUS: f32 = 0.1;

    fn settings(particle_count: u32) -> SimulationSettings {
        SimulationSettings {
            dt: 0.1,
            particle_count,
            smoothing_radius: RADIUS,
            rest_density: 1.0,
            particle_mass: 1.0,
            vorticity: 1.0,
            ..Default::default()
        }
    }

    fn search(particle_count: u32) -> NeighbourSearchSettings {
        NeighbourSearchSettings {
            particle_count,
            max_neighbours: 2,
            smoothing_radius: RADIUS,
            cell_size: RADIUS,
            ..Default::default()
        }
    }

    fn particle(x: f32, curl: f32) -> Particle {
        let mut particle = Particle::new(Vec3::new(x, 0.0, 0.0), Vec3::ZERO);
        particle.curl = Vec4::new(0.0, 0.0, curl, 0.0);
        particle
    }

    #[test]
    fn uniform_curl_gives_no_force() {
        let mut particles = vec![particle(-0.05, 1.0), particle(0.0, 1.0), particle(0.05, 1.0)];
        let neighbours = [1, u32::MAX, 0, 2, 1, u32::MAX];

        vorticity(1, &settings(3), &search(3), &mut particles, &neighbours);

        assert_eq!(particles[1].velocity, Vec4::ZERO);
    }

    #[test]
    fn particles_are_pushed_around_stronger_curl() {
        // The curl is stronger to the right, so the location vector points along +x and the
        // force is +x cross +z, which is -y.
        let mut particles = vec![particle(-0.05, 1.0), particle(0.0, 1.0), particle(0.05, 3.0)];
        let neighbours = [1, u32::MAX, 0, 2, 1, u32::MAX];

        vorticity(1, &settings(3), &search(3), &mut particles, &neighbours);

        let velocity = particles[1].velocity.truncate();
        assert!((velocity - Vec3::new(0.0, -0.1, 0.0)).length() < 1.0e-5);
    }

    #[test]
    fn isolated_particles_are_left_alone() {
        let mut particles = vec![particle(0.0, 5.0)];
        let neighbours = [u32::MAX, u32::MAX];

        vorticity(0, &settings(1), &search(1), &mut particles, &neighbours);

        assert_eq!(particles[0].velocity, Vec4::ZERO);
    }
}
