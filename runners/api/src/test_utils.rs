//! A CPU backed harness for testing whole simulations

use pbf_cpu_gpu_shared::NO_NEIGHBOUR;
use pbf_physics_shaders::neighbours;

use crate::{
    config::FluidConfig,
    cpu::CpuDevice,
    device::{Device as _, SimulatedFrame},
    Error, Particle, Simulation,
};

/// Drives a [`Simulation`] on a [`CpuDevice`], pretending every frame is rendered instantly.
pub struct FluidTestAPI {
    /// The simulation under test
    pub simulation: Simulation<CpuDevice>,
}

impl FluidTestAPI {
    /// Instantiate
    ///
    /// # Errors
    /// On an invalid config or particle count.
    #[inline]
    pub fn new(config: &FluidConfig, particles: &[Particle]) -> Result<Self, Error> {
        let device = CpuDevice::new(particles, config)?;
        Ok(Self {
            simulation: Simulation::new(device, config)?,
        })
    }

    /// Run a single frame, using the config's time step.
    ///
    /// # Errors
    /// If the simulation fails.
    #[inline]
    pub fn tick(&mut self) -> Result<SimulatedFrame<u64>, Error> {
        let dt = self.simulation.config().time_step;
        let frame = self.simulation.step(dt)?;
        self.simulation.rendered(frame.slot, frame.completion);
        Ok(frame)
    }

    /// Run several frames.
    ///
    /// # Errors
    /// If the simulation fails.
    #[inline]
    pub fn tick_many(&mut self, frames: u32) -> Result<(), Error> {
        for _ in 0..frames {
            self.tick()?;
        }
        Ok(())
    }

    /// Particles written by the latest frame.
    #[inline]
    #[must_use]
    pub fn particles(&self) -> &[Particle] {
        let device = self.simulation.device();
        device.particles(self.simulation.current_slot())
    }

    /// Neighbours found for particle `id` by the latest frame, in scan order.
    #[inline]
    #[must_use]
    pub fn neighbours_of(&self, id: usize) -> Vec<u32> {
        let device = self.simulation.device();
        let lists = device.neighbours(self.simulation.current_slot());
        neighbours::list(lists, id, self.simulation.config().max_neighbours)
            .iter()
            .copied()
            .take_while(|&neighbour| neighbour != NO_NEIGHBOUR)
            .collect()
    }

    /// Every particle's density as a fraction of the rest density.
    #[inline]
    #[must_use]
    pub fn density_ratios(&self) -> Vec<f32> {
        let rest_density = self.simulation.config().rest_density();
        self.particles()
            .iter()
            .map(|particle| particle.density / rest_density)
            .collect()
    }

    /// Number of simulated particles.
    #[inline]
    #[must_use]
    pub fn particle_count(&self) -> u32 {
        self.simulation.device().particle_count()
    }
}

#[cfg(test)]
mod tests {
    use pbf_cpu_gpu_shared::glam::Vec3;

    use crate::particles::cuboid;

    use super::*;

    #[test]
    fn two_separate_clusters_only_see_themselves() {
        let config = FluidConfig {
            gravity: Vec3::ZERO,
            ..Default::default()
        };
        let mut particles = cuboid(Vec3::new(0.0, 0.5, 0.0), [2, 2, 1], 0.02, 0.0);
        particles.extend(cuboid(Vec3::new(0.6, 0.5, 0.6), [2, 2, 1], 0.02, 0.0));
        let mut api = FluidTestAPI::new(&config, &particles).unwrap();

        api.tick().unwrap();

        assert_eq!(api.particle_count(), 8);
        for id in 0..8_u32 {
            let cluster = if id < 4 { 0..4 } else { 4..8 };
            let expected: Vec<u32> = cluster.filter(|&other| other != id).collect();
            let mut found = api.neighbours_of(id as usize);
            found.sort_unstable();
            assert_eq!(found, expected, "particle {id}");
        }
    }

    #[test]
    fn crowded_lists_are_capped() {
        let config = FluidConfig {
            gravity: Vec3::ZERO,
            max_neighbours: 5,
            ..Default::default()
        };
        let particles = cuboid(Vec3::new(0.0, 0.5, 0.0), [3, 3, 3], 0.01, 0.0);
        let mut api = FluidTestAPI::new(&config, &particles).unwrap();

        api.tick().unwrap();

        for id in 0..27 {
            assert_eq!(api.neighbours_of(id).len(), 5);
        }
    }
}
