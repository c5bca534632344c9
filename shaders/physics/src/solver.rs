//! The density constraint solver, after Macklin and Müller 2013, "Position Based Fluids".
//!
//! Each correction iteration is three kernels: `lambda`, `delta_position` and
//! `position_update`. They are separate dispatches because each one reads values of neighbours
//! that the previous one wrote.

use pbf_cpu_gpu_shared::{
    glam::Vec3, BoxSettings, NeighbourSearchSettings, Particle, SimulationSettings, NO_NEIGHBOUR,
};

#[cfg(target_arch = "spirv")]
use spirv_std::num_traits::Float as _;

use crate::kernel::SmoothingKernel;

/// Exponent of the artificial pressure term.
const TENSILE_EXPONENT: i32 = 4;

/// The neighbours of one particle, as left by the neighbour search.
pub struct Neighbourhood<'list> {
    /// Indices of neighbouring particles, terminated early by `NO_NEIGHBOUR`
    pub list: &'list [u32],
}

impl<'list> Neighbourhood<'list> {
    /// The neighbourhood of particle `id`.
    pub fn of(id: usize, search: &NeighbourSearchSettings, neighbours: &'list [u32]) -> Self {
        Self {
            list: crate::neighbours::list(neighbours, id, search.max_neighbours),
        }
    }

    /// The number of listed neighbours.
    pub fn len(&self) -> usize {
        let mut count = 0;
        while count < self.list.len() && self.list[count] != NO_NEIGHBOUR {
            count += 1;
        }
        count
    }

    /// Whether no neighbours were found.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `index`th neighbour.
    pub fn get(&self, index: usize) -> usize {
        self.list[index] as usize
    }
}

/// Evaluate the density constraint of particle `id` and its Lagrange multiplier.
pub fn lambda(
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
    let gradient_scale = settings.particle_mass / settings.rest_density;

    let mut density = settings.particle_mass * kernel.poly6(0.0);
    let mut own_gradient = Vec3::ZERO;
    let mut gradients_squared = 0.0;
    let neighbour_count = neighbourhood.len();
    let mut index = 0;
    while index < neighbour_count {
        let offset = position - particles[neighbourhood.get(index)].position.truncate();
        density += settings.particle_mass * kernel.poly6(offset.length_squared());
        let gradient = kernel.spiky_gradient(offset) * gradient_scale;
        own_gradient += gradient;
        gradients_squared += gradient.length_squared();
        index += 1;
    }

    let constraint = density / settings.rest_density - 1.0;
    let denominator = gradients_squared + own_gradient.length_squared() + settings.relaxation;
    particles[id].density = density;
    particles[id].lambda = -constraint / denominator;
}

/// Work out how far particle `id` moves to satisfy its own and its neighbours' constraints.
pub fn delta_position(
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
    let lambda = particles[id].lambda;
    let delta_q = settings.tensile_delta_q * settings.smoothing_radius;
    let reference_weight = kernel.poly6(delta_q * delta_q);

    let mut delta = Vec3::ZERO;
    let neighbour_count = neighbourhood.len();
    let mut index = 0;
    while index < neighbour_count {
        let neighbour = &particles[neighbourhood.get(index)];
        let offset = position - neighbour.position.truncate();
        let ratio = kernel.poly6(offset.length_squared()) / reference_weight;
        let artificial_pressure = -settings.tensile_k * ratio.powi(TENSILE_EXPONENT);
        delta += kernel.spiky_gradient(offset) * (lambda + neighbour.lambda + artificial_pressure);
        index += 1;
    }

    let scale = settings.particle_mass / settings.rest_density;
    particles[id].delta_position = (delta * scale).extend(0.0);
}

/// Apply this iteration's correction.
pub fn position_update(
    id: usize,
    search: &NeighbourSearchSettings,
    bounds: &BoxSettings,
    particles: &mut [Particle],
) {
    if id >= search.particle_count as usize {
        return;
    }

    let particle = &mut particles[id];
    let corrected = particle.position.truncate() + particle.delta_position.truncate();
    particle.position = bounds.clamp(corrected).extend(0.0);
}

/// Derive the velocity from how far the particle actually moved this frame.
pub fn velocity_update(id: usize, settings: &SimulationSettings, particles: &mut [Particle]) {
    if id >= settings.particle_count as usize {
        return;
    }

    let particle = &mut particles[id];
    let moved = particle.position.truncate() - particle.previous_position.truncate();
    particle.velocity = (moved / settings.dt).extend(0.0);
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod tests {
    use pbf_cpu_gpu_shared::glam::Vec4;

    use super::*;

    const RADIUS: f32 = 0.1;

    fn settings(particle_count: u32, rest_density: f32) -> SimulationSettings {
        SimulationSettings {
            dt: 0.1,
            particle_count,
            smoothing_radius: RADIUS,
            rest_density,
            particle_mass: 1.0,
            relaxation: 600.0,
            tensile_delta_q: 0.2,
            ..Default::default()
        }
    }

    fn search(particle_count: u32, max_neighbours: u32) -> NeighbourSearchSettings {
        NeighbourSearchSettings {
            particle_count,
            max_neighbours,
            smoothing_radius: RADIUS,
            cell_size: RADIUS,
            ..Default::default()
        }
    }

    fn pair(separation: f32) -> Vec<Particle> {
        vec![
            Particle::new(Vec3::ZERO, Vec3::ZERO),
            Particle::new(Vec3::new(separation, 0.0, 0.0), Vec3::ZERO),
        ]
    }

    #[test]
    fn neighbourhoods_stop_at_the_first_empty_entry() {
        let neighbours = [3, 1, NO_NEIGHBOUR, NO_NEIGHBOUR, 0, NO_NEIGHBOUR, NO_NEIGHBOUR, 9];
        let search = search(2, 4);

        assert_eq!(Neighbourhood::of(0, &search, &neighbours).len(), 2);
        assert_eq!(Neighbourhood::of(1, &search, &neighbours).len(), 1);
        assert_eq!(Neighbourhood::of(1, &search, &neighbours).get(0), 0);
    }

    #[test]
    fn an_isolated_particle_below_rest_density_gets_a_positive_lambda() {
        let kernel = SmoothingKernel::new(RADIUS);
        let mut particles = vec![Particle::default()];
        let neighbours = [NO_NEIGHBOUR; 4];

        let settings = settings(1, 2.0 * kernel.poly6(0.0));

        lambda(0, &settings, &search(1, 4), &mut particles, &neighbours);

        assert_eq!(particles[0].density, kernel.poly6(0.0));
        assert!(particles[0].lambda > 0.0);
    }

    #[test]
    fn compressed_pairs_push_apart() {
        let kernel = SmoothingKernel::new(RADIUS);
        let rest_density = kernel.poly6(0.0);
        let settings = settings(2, rest_density);
        let search = search(2, 1);
        let mut particles = pair(0.02);
        let neighbours = [1, 0];

        for id in 0..2 {
            lambda(id, &settings, &search, &mut particles, &neighbours);
        }
        for id in 0..2 {
            delta_position(id, &settings, &search, &mut particles, &neighbours);
        }

        assert!(particles[0].lambda < 0.0);
        assert!(particles[0].delta_position.x < 0.0);
        assert!(particles[1].delta_position.x > 0.0);
        assert!((particles[0].delta_position.x + particles[1].delta_position.x).abs() < 1.0e-6);
    }

    #[test]
    fn position_updates_apply_the_delta_inside_the_box() {
        let mut particles = pair(0.05);
        particles[0].delta_position = Vec4::new(-1.0, 0.25, 0.0, 0.0);
        let bounds = BoxSettings {
            min: Vec4::splat(-0.5),
            max: Vec4::splat(0.5),
        };

        position_update(0, &search(2, 1), &bounds, &mut particles);

        assert_eq!(particles[0].position, Vec4::new(-0.5, 0.25, 0.0, 0.0));
    }

    #[test]
    fn velocity_comes_from_the_distance_moved() {
        let mut particles = pair(0.05);
        particles[1].position = Vec4::new(0.06, 0.01, 0.0, 0.0);

        velocity_update(1, &settings(2, 1.0), &mut particles);

        let velocity = particles[1].velocity.truncate();
        assert!((velocity - Vec3::new(0.1, 0.1, 0.0)).length() < 1.0e-5);
    }
}
