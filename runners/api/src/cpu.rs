//! A reference [`Device`] that runs schedules on the host.
//!
//! Each dispatch calls the shader crate's kernel bodies once per invocation, in invocation order.
//! The kernels are written so that this gives the same result as running them in parallel, which
//! makes this device an oracle for the GPU one.

use pbf_cpu_gpu_shared::{
    bucket_table_len, hash_size, workgroup_count, CellRange, Particle, NO_NEIGHBOUR,
    RADIX_BUCKETS,
};
use pbf_physics_shaders::{
    cell_ranges, hash, integrate, neighbours, radix_sort, solver, viscosity, vorticity,
};

use crate::{
    config::FluidConfig,
    device::{Device, FrameUniforms},
    frame::{FrameSlot, FrameSlots, Parity},
    particles,
    pipeline::{Kernel, Stage},
    schedule::{Command, Schedule},
    Error,
};

/// Every buffer of the simulation, in host memory.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct HostBuffers {
    /// Particles per slot
    pub particles: FrameSlots<Vec<Particle>>,
    /// Neighbour lists per slot
    pub neighbours: FrameSlots<Vec<u32>>,
    /// One hash per particle
    pub cell_hashes: Vec<u32>,
    /// The two ping-pong permutations
    pub sorted: [Vec<u32>; 2],
    /// Global bucket table
    pub buckets: Vec<u32>,
    /// Local rank buffer
    pub ranks: Vec<u32>,
    /// Cell range table
    pub cell_ranges: Vec<CellRange>,
}

impl HostBuffers {
    /// Allocate everything, with every slot holding the initial particles.
    fn new(initial: &[Particle], frames_in_flight: usize, max_neighbours: u32) -> Self {
        let count = initial.len();
        let identity: Vec<u32> = (0..).take(count).collect();
        let count_u32 = identity.last().map_or(0, |last| last + 1);

        Self {
            particles: FrameSlots::from_fn(frames_in_flight, |_| initial.to_vec()),
            neighbours: FrameSlots::from_fn(frames_in_flight, |_| {
                vec![NO_NEIGHBOUR; count * max_neighbours as usize]
            }),
            cell_hashes: vec![0; count],
            sorted: [identity.clone(), identity],
            buckets: vec![0; bucket_table_len(workgroup_count(count_u32)) as usize],
            ranks: vec![0; count],
            cell_ranges: vec![CellRange::EMPTY; hash_size(count_u32) as usize],
        }
    }
}

/// Runs everything on the CPU. Submissions complete before `submit()` returns.
#[derive(Debug)]
pub struct CpuDevice {
    /// The simulation's memory
    buffers: HostBuffers,
    /// Staged by `write_uniforms()`
    uniforms: FrameUniforms,
    /// Number of particles
    particle_count: u32,
    /// Submissions so far, also the latest fence
    submitted: u64,
}

impl CpuDevice {
    /// Allocate buffers for `initial` particles, sized by `config`.
    ///
    /// # Errors
    /// On an invalid config or particle count.
    pub fn new(initial: &[Particle], config: &FluidConfig) -> Result<Self, Error> {
        config.validate()?;
        let particle_count = particles::validate_count(initial.len())?;

        Ok(Self {
            buffers: HostBuffers::new(initial, config.frames_in_flight, config.max_neighbours),
            uniforms: FrameUniforms::default(),
            particle_count,
            submitted: 0,
        })
    }

    /// Every buffer.
    #[must_use]
    pub const fn buffers(&self) -> &HostBuffers {
        &self.buffers
    }

    /// The particles of `slot`.
    #[must_use]
    pub fn particles(&self, slot: FrameSlot) -> &[Particle] {
        &self.buffers.particles[slot]
    }

    /// The flattened neighbour lists of `slot`.
    #[must_use]
    pub fn neighbours(&self, slot: FrameSlot) -> &[u32] {
        &self.buffers.neighbours[slot]
    }

    /// The permutation left by the latest sort.
    #[must_use]
    pub fn sorted_indices(&self) -> &[u32] {
        let [sorted, _] = &self.buffers.sorted;
        sorted
    }

    /// The latest cell hashes.
    #[must_use]
    pub fn cell_hashes(&self) -> &[u32] {
        &self.buffers.cell_hashes
    }

    /// The latest cell range table.
    #[must_use]
    pub fn cell_ranges(&self) -> &[CellRange] {
        &self.buffers.cell_ranges
    }

    /// The uniforms of the latest frame.
    #[must_use]
    pub const fn uniforms(&self) -> &FrameUniforms {
        &self.uniforms
    }

    /// Run every invocation of one stage.
    fn dispatch(&mut self, stage: &Stage) -> Result<(), Error> {
        log::trace!("CPU dispatch of {:?}", stage.kernel);

        let FrameUniforms {
            simulation,
            search,
            bounds,
        } = self.uniforms;
        let HostBuffers {
            particles,
            neighbours,
            cell_hashes,
            sorted,
            buckets,
            ranks,
            cell_ranges: ranges,
        } = &mut self.buffers;
        let slot = stage.bindings.slot;
        let [even, odd] = sorted;
        let (source, destination) = match stage.bindings.parity {
            Parity::Even => (even, odd),
            Parity::Odd => (odd, even),
        };
        let [workgroups, _, _] = stage.workgroups;
        let invocations = usize::try_from(stage.invocations()).map_err(|_| Error::Device {
            step: "dispatching",
            reason: format!("{:?} launches too many invocations", stage.kernel),
        })?;
        let radix_pass = || {
            stage.radix_pass.ok_or_else(|| Error::Device {
                step: "sorting",
                reason: format!("{:?} was dispatched without a radix pass", stage.kernel),
            })
        };

        match stage.kernel {
            Kernel::Integrate => {
                let (previous, current) = particles
                    .pair_mut(stage.bindings.previous, slot)
                    .ok_or_else(|| Error::Device {
                        step: "integrating",
                        reason: "the previous and current slots must differ".to_owned(),
                    })?;
                for id in 0..invocations {
                    integrate::predict(id, &simulation, &bounds, previous, current);
                }
            }
            Kernel::CellHash => {
                let current = &mut particles[slot];
                for id in 0..invocations {
                    hash::cell_hash(id, &search, current, cell_hashes, ranges);
                }
            }
            Kernel::RadixHistogram => {
                let pass = radix_pass()?;
                for workgroup in 0..workgroups as usize {
                    for lane in 0..RADIX_BUCKETS as usize {
                        radix_sort::histogram(
                            workgroup,
                            lane,
                            &search,
                            pass,
                            cell_hashes,
                            source,
                            buckets,
                            ranks,
                        );
                    }
                }
            }
            Kernel::RadixScan => {
                if invocations > 0 {
                    radix_sort::scan(&search, buckets);
                }
            }
            Kernel::RadixScatter => {
                let pass = radix_pass()?;
                for id in 0..invocations {
                    radix_sort::scatter(
                        id,
                        &search,
                        pass,
                        cell_hashes,
                        source,
                        buckets,
                        ranks,
                        destination,
                    );
                }
            }
            Kernel::CellRanges => {
                for id in 0..invocations {
                    cell_ranges::resolve(id, &search, cell_hashes, source, ranges);
                }
            }
            Kernel::Neighbours => {
                let current = &particles[slot];
                let lists = &mut neighbours[slot];
                for id in 0..invocations {
                    neighbours::gather(id, &search, current, source, ranges, lists);
                }
            }
            Kernel::PositionUpdate => {
                let current = &mut particles[slot];
                for id in 0..invocations {
                    solver::position_update(id, &search, &bounds, current);
                }
            }
            Kernel::VelocityUpdate => {
                let current = &mut particles[slot];
                for id in 0..invocations {
                    solver::velocity_update(id, &simulation, current);
                }
            }
            Kernel::Lambda
            | Kernel::DeltaPosition
            | Kernel::VelocityCache
            | Kernel::Viscosity
            | Kernel::Vorticity => {
                let run = match stage.kernel {
                    Kernel::Lambda => solver::lambda,
                    Kernel::DeltaPosition => solver::delta_position,
                    Kernel::VelocityCache => viscosity::velocity_cache,
                    Kernel::Viscosity => viscosity::viscosity,
                    _ => vorticity::vorticity,
                };
                let current = &mut particles[slot];
                let lists = &neighbours[slot];
                for id in 0..invocations {
                    run(id, &simulation, &search, current, lists);
                }
            }
        }

        Ok(())
    }
}

impl Device for CpuDevice {
    type Fence = u64;
    type Error = Error;

    fn particle_count(&self) -> u32 {
        self.particle_count
    }

    fn frames_in_flight(&self) -> usize {
        self.buffers.particles.len()
    }

    fn write_uniforms(&mut self, uniforms: &FrameUniforms) -> Result<(), Error> {
        self.uniforms = *uniforms;
        Ok(())
    }

    fn submit(&mut self, schedule: &Schedule) -> Result<u64, Error> {
        if schedule.slot().index() >= self.frames_in_flight() {
            return Err(Error::Device {
                step: "submitting",
                reason: format!("there is no slot {}", schedule.slot().index()),
            });
        }

        for command in schedule.commands() {
            match command {
                Command::Barrier => log::trace!("CPU barrier"),
                Command::Dispatch(stage) => self.dispatch(stage)?,
            }
        }

        self.submitted += 1;
        Ok(self.submitted)
    }

    fn wait(&mut self, fence: &u64) -> Result<(), Error> {
        if *fence > self.submitted {
            return Err(Error::Device {
                step: "waiting",
                reason: format!("fence {fence} was never submitted"),
            });
        }
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod tests {
    use pbf_cpu_gpu_shared::glam::Vec3;

    use crate::{particles::cuboid, pipeline::PipelineDescriptor, test_utils::FluidTestAPI};

    use super::*;

    fn weightless() -> FluidConfig {
        FluidConfig {
            gravity: Vec3::ZERO,
            ..Default::default()
        }
    }

    /// Run only the stages up to and including the neighbour search, so the particles are
    /// still where the search saw them.
    fn search_only(particles: &[Particle], config: &FluidConfig) -> CpuDevice {
        let mut device = CpuDevice::new(particles, config).unwrap();
        let descriptor = PipelineDescriptor::new(particles.len()).unwrap();
        let slot = FrameSlot::new(0);
        let stages: Vec<Stage> = descriptor
            .stages(slot, config.frames_in_flight)
            .into_iter()
            .take_while(|stage| stage.kernel != Kernel::Lambda)
            .collect();
        let count = device.particle_count();

        device
            .write_uniforms(&config.uniforms(count, config.time_step, config.time_step))
            .unwrap();
        device.submit(&Schedule::new(slot, stages)).unwrap();
        device
    }

    fn brute_force_neighbours(particles: &[Particle], id: usize, radius: f32) -> Vec<u32> {
        let position = particles[id].position.truncate();
        (0..particles.len())
            .filter(|&other| other != id)
            .filter(|&other| {
                position.distance_squared(particles[other].position.truncate()) < radius * radius
            })
            .map(|other| other as u32)
            .collect()
    }

    #[test]
    fn the_sort_leaves_a_permutation_ordered_by_hash() {
        let config = weightless();
        let particles = cuboid(Vec3::new(0.0, 0.5, 0.0), [9, 7, 5], 0.04, 0.01);

        let device = search_only(&particles, &config);

        let hashes = device.cell_hashes();
        let mut sorted = device.sorted_indices().to_vec();
        for pair in sorted.windows(2) {
            assert!(hashes[pair[0] as usize] <= hashes[pair[1] as usize]);
        }
        sorted.sort_unstable();
        assert_eq!(sorted, (0..particles.len() as u32).collect::<Vec<u32>>());
    }

    #[test]
    fn cell_ranges_cover_every_sorted_slot_once() {
        let config = weightless();
        let particles = cuboid(Vec3::new(0.0, 0.5, 0.0), [8, 8, 8], 0.03, 0.01);

        let device = search_only(&particles, &config);

        let mut covered = vec![0_u32; particles.len()];
        for (hash, range) in device.cell_ranges().iter().enumerate() {
            if range.cell_id == hash as u32 {
                for slot in range.start..range.end {
                    covered[slot as usize] += 1;
                    let particle = device.sorted_indices()[slot as usize];
                    assert_eq!(device.cell_hashes()[particle as usize], hash as u32);
                }
            }
        }
        assert!(covered.iter().all(|&count| count == 1));
    }

    #[test]
    fn neighbour_lists_match_a_brute_force_search() {
        let config = weightless();
        let particles = cuboid(Vec3::new(-0.1, 0.5, 0.2), [6, 6, 6], 0.05, 0.02);

        let device = search_only(&particles, &config);

        let slot = FrameSlot::new(0);
        let predicted = device.particles(slot);
        for id in 0..particles.len() {
            let mut listed: Vec<u32> =
                neighbours::list(device.neighbours(slot), id, config.max_neighbours)
                    .iter()
                    .copied()
                    .take_while(|&neighbour| neighbour != NO_NEIGHBOUR)
                    .collect();
            listed.sort_unstable();
            let expected = brute_force_neighbours(predicted, id, config.smoothing_radius);
            assert_eq!(listed, expected, "particle {id}");
        }
    }

    #[test]
    fn a_resting_cube_keeps_its_rest_density() {
        let config = weightless();
        let side = 6;
        let particles = cuboid(Vec3::new(-0.125, 0.5, -0.125), [side; 3], 0.05, 0.0);
        let mut api = FluidTestAPI::new(&config, &particles).unwrap();

        api.tick_many(40).unwrap();

        let ratios = api.density_ratios();
        let is_interior = |index: usize| {
            let side = side as usize;
            [index % side, (index / side) % side, index / (side * side)]
                .iter()
                .all(|&coord| coord >= 1 && coord < side - 1)
        };
        let interior: Vec<f32> = ratios
            .iter()
            .enumerate()
            .filter(|&(index, _)| is_interior(index))
            .map(|(_, &ratio)| ratio)
            .collect();
        let interior_mean = interior.iter().sum::<f32>() / interior.len() as f32;
        let overall_mean = ratios.iter().sum::<f32>() / ratios.len() as f32;
        let densest = ratios.iter().copied().fold(0.0, f32::max);

        assert_eq!(interior.len(), 64);
        assert!((interior_mean - 1.0).abs() < 0.05, "interior {interior_mean}");
        assert!((overall_mean - 1.0).abs() < 0.1, "overall {overall_mean}");
        assert!(densest < 1.2, "densest {densest}");
    }

    #[test]
    fn a_lone_particle_falls_to_the_floor() {
        let config = FluidConfig::default();
        let particles = [Particle::new(Vec3::new(0.0, 0.5, 0.0), Vec3::ZERO)];
        let mut api = FluidTestAPI::new(&config, &particles).unwrap();

        api.tick().unwrap();
        let after_one = api.particles()[0];
        api.tick_many(59).unwrap();
        let landed = api.particles()[0];

        assert!(after_one.position.y < 0.5);
        assert!(after_one.velocity.y < 0.0);
        assert_eq!(landed.position.y, config.box_min.y);
        assert_eq!(landed.velocity.y, 0.0);
    }

    #[test]
    fn frames_read_the_previous_slot_and_write_their_own() {
        let config = FluidConfig::default();
        let particles = [Particle::new(Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO)];
        let mut api = FluidTestAPI::new(&config, &particles).unwrap();

        api.tick().unwrap();
        api.tick().unwrap();
        let device = api.simulation.device();
        let first = device.particles(FrameSlot::new(0))[0];
        let second = device.particles(FrameSlot::new(1))[0];

        assert!(second.position.y < first.position.y);
        assert_eq!(second.previous_position, first.position);
    }

    #[test]
    fn waiting_on_an_unknown_fence_fails() {
        let mut device = CpuDevice::new(&[Particle::default()], &FluidConfig::default()).unwrap();
        assert!(device.wait(&0).is_ok());
        assert!(device.wait(&1).is_err());
    }
}
