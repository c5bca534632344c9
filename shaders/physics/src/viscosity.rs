//! XSPH viscosity, plus the velocity snapshot it and vorticity confinement read from.

use pbf_cpu_gpu_shared::{glam::Vec3, NeighbourSearchSettings, Particle, SimulationSettings};

use crate::{kernel::SmoothingKernel, solver::Neighbourhood};

/// Snapshot particle `id`'s velocity and work out the curl of the velocity field around it.
///
/// Neighbours' live velocities are read but never written here, so this is safe to run in
/// parallel with itself.
pub fn velocity_cache(
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
    let velocity = particles[id].velocity.truncate();

    let mut curl = Vec3::ZERO;
    let neighbour_count = neighbourhood.len();
    let mut index = 0;
    while index < neighbour_count {
        let neighbour = &particles[neighbourhood.get(index)];
        let offset = position - neighbour.position.truncate();
        let relative = neighbour.velocity.truncate() - velocity;
        curl += relative.cross(-kernel.spiky_gradient(offset));
        index += 1;
    }

    let scale = settings.particle_mass / settings.rest_density;
    particles[id].cached_velocity = particles[id].velocity;
    particles[id].curl = (curl * scale).extend(0.0);
}

/// Blend particle `id`'s velocity towards the average of its neighbours'.
pub fn viscosity(
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
    let cached = particles[id].cached_velocity.truncate();

    let mut blend = Vec3::ZERO;
    let neighbour_count = neighbourhood.len();
    let mut index = 0;
    while index < neighbour_count {
        let neighbour = &particles[neighbourhood.get(index)];
        let weight = kernel.poly6((position - neighbour.position.truncate()).length_squared());
        blend += (neighbour.cached_velocity.truncate() - cached) * weight;
        index += 1;
    }

    let scale = settings.viscosity * settings.particle_mass / settings.rest_density;
    let velocity = particles[id].velocity.truncate() + blend * scale;
    particles[id].velocity = velocity.extend(0.0);
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod tests {
    use pbf_cpu_gpu_shared::glam::Vec4;

    use super::*;

    const RADIUS: f32 = 0.1;

    fn settings(viscosity: f32) -> SimulationSettings {
        SimulationSettings {
            particle_count: 2,
            smoothing_radius: RADIUS,
            rest_density: SmoothingKernel::new(RADIUS).poly6(0.0),
            particle_mass: 1.0,
            viscosity,
            ..Default::default()
        }
    }

    fn search() -> NeighbourSearchSettings {
        NeighbourSearchSettings {
            particle_count: 2,
            max_neighbours: 1,
            smoothing_radius: RADIUS,
            cell_size: RADIUS,
            ..Default::default()
        }
    }

    fn shearing_pair() -> Vec<Particle> {
        vec![
            Particle::new(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0)),
            Particle::new(Vec3::new(0.05, 0.0, 0.0), Vec3::new(0.0, -1.0, 0.0)),
        ]
    }

    #[test]
    fn caching_copies_the_velocity() {
        let mut particles = shearing_pair();
        let neighbours = [1, 0];

        velocity_cache(0, &settings(0.0), &search(), &mut particles, &neighbours);

        assert_eq!(particles[0].cached_velocity, Vec4::new(0.0, 1.0, 0.0, 0.0));
        assert_eq!(particles[1].cached_velocity, Vec4::ZERO);
    }

    #[test]
    fn shearing_pairs_have_curl_around_the_z_axis() {
        let mut particles = shearing_pair();
        let neighbours = [1, 0];

        for id in 0..2 {
            velocity_cache(id, &settings(0.0), &search(), &mut particles, &neighbours);
        }

        let curl = particles[0].curl.truncate();
        assert!(curl.z < 0.0);
        assert!(curl.x.abs() < 1.0e-6 && curl.y.abs() < 1.0e-6);
        assert!((particles[1].curl.z - curl.z).abs() < 1.0e-3 * curl.z.abs());
    }

    #[test]
    fn viscosity_pulls_velocities_together() {
        let mut particles = shearing_pair();
        let neighbours = [1, 0];
        let settings = settings(0.01);
        for id in 0..2 {
            velocity_cache(id, &settings, &search(), &mut particles, &neighbours);
        }

        for id in 0..2 {
            viscosity(id, &settings, &search(), &mut particles, &neighbours);
        }

        assert!(particles[0].velocity.y < 1.0);
        assert!(particles[1].velocity.y > -1.0);
        assert!((particles[0].velocity.y + particles[1].velocity.y).abs() < 1.0e-6);
    }

    #[test]
    fn no_neighbours_means_no_change() {
        let mut particles = shearing_pair();
        let neighbours = [u32::MAX, u32::MAX];
        let settings = settings(0.5);
        velocity_cache(0, &settings, &search(), &mut particles, &neighbours);

        viscosity(0, &settings, &search(), &mut particles, &neighbours);

        assert_eq!(particles[0].velocity, Vec4::new(0.0, 1.0, 0.0, 0.0));
        assert_eq!(particles[0].curl, Vec4::ZERO);
    }
}
