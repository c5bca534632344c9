//! Everything the kernels run over, and recording schedules into command buffers

use std::{collections::HashMap, path::Path};

use pbf_api::{
    Binding, BindingSet, FluidConfig, FrameSlot, FrameSlots, Kernel, Parity, Resource, Schedule,
    Stage,
};
use pbf_cpu_gpu_shared::{
    bucket_table_len, hash_size, workgroup_count, CellRange,
    NeighbourSearchSettings, Particle, RadixPass, SimulationSettings, NO_NEIGHBOUR,
};

use super::builder::{scoped, Builder};
use crate::GpuError;

/// Every buffer of the simulation. Allocated once, never resized.
pub struct Buffers {
    /// `SimulationSettings` uniform
    pub simulation: wgpu::Buffer,
    /// `NeighbourSearchSettings` uniform
    pub search: wgpu::Buffer,
    /// `BoxSettings` uniform
    pub bounds: wgpu::Buffer,
    /// Particles, one buffer per frame in flight
    pub particles: FrameSlots<wgpu::Buffer>,
    /// Neighbour lists, one buffer per frame in flight
    pub neighbours: FrameSlots<wgpu::Buffer>,
    /// One cell hash per particle
    pub cell_hashes: wgpu::Buffer,
    /// The radix sort's ping-pong permutations
    pub sorted: [wgpu::Buffer; 2],
    /// Global bucket table
    pub buckets: wgpu::Buffer,
    /// Local ranks
    pub ranks: wgpu::Buffer,
    /// Cell range table
    pub cell_ranges: wgpu::Buffer,
}

impl Buffers {
    /// Allocate everything for `initial`, copying it into every slot.
    fn new(
        builder: &Builder<'_>,
        initial: &[Particle],
        config: &FluidConfig,
        particle_count: u32,
    ) -> Result<Self, GpuError> {
        let count = initial.len();
        let identity: Vec<u32> = (0..particle_count).collect();
        let readable = wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;

        Ok(Self {
            simulation: builder
                .uniform_buffer("Simulation settings", &SimulationSettings::default())?,
            search: builder
                .uniform_buffer("Neighbour search settings", &NeighbourSearchSettings::default())?,
            bounds: builder.uniform_buffer("Box settings", &config.box_settings())?,
            particles: FrameSlots::try_from_fn(config.frames_in_flight, |slot| {
                builder.storage_buffer(
                    &format!("Particles {}", slot.index()),
                    initial,
                    readable,
                )
            })?,
            neighbours: FrameSlots::try_from_fn(config.frames_in_flight, |slot| {
                builder.storage_buffer(
                    &format!("Neighbours {}", slot.index()),
                    &vec![NO_NEIGHBOUR; count * config.max_neighbours as usize],
                    wgpu::BufferUsages::COPY_SRC,
                )
            })?,
            cell_hashes: builder.storage_buffer(
                "Cell hashes",
                &vec![0_u32; count],
                wgpu::BufferUsages::COPY_SRC,
            )?,
            sorted: [
                builder.storage_buffer("Sorted 0", &identity, wgpu::BufferUsages::COPY_SRC)?,
                builder.storage_buffer("Sorted 1", &identity, wgpu::BufferUsages::COPY_SRC)?,
            ],
            buckets: builder.storage_buffer(
                "Buckets",
                &vec![0_u32; bucket_table_len(workgroup_count(particle_count)) as usize],
                wgpu::BufferUsages::empty(),
            )?,
            ranks: builder.storage_buffer(
                "Ranks",
                &vec![0_u32; count],
                wgpu::BufferUsages::empty(),
            )?,
            cell_ranges: builder.storage_buffer(
                "Cell ranges",
                &vec![CellRange::EMPTY; hash_size(particle_count) as usize],
                wgpu::BufferUsages::COPY_SRC,
            )?,
        })
    }

    /// The buffer behind `resource`.
    #[must_use]
    pub fn resource(&self, resource: Resource) -> &wgpu::Buffer {
        match resource {
            Resource::SimulationSettings => &self.simulation,
            Resource::NeighbourSearchSettings => &self.search,
            Resource::BoxSettings => &self.bounds,
            Resource::Particles(slot) => &self.particles[slot],
            Resource::Neighbours(slot) => &self.neighbours[slot],
            Resource::CellHashes => &self.cell_hashes,
            Resource::Sorted(index) => {
                let [even, odd] = &self.sorted;
                if index % 2 == 0 {
                    even
                } else {
                    odd
                }
            }
            Resource::Buckets => &self.buckets,
            Resource::Ranks => &self.ranks,
            Resource::CellRanges => &self.cell_ranges,
        }
    }
}

/// A stage with the objects it is recorded with.
struct Dispatch<'frame, P, B> {
    /// The stage
    stage: &'frame Stage,
    /// Its kernel's pipeline
    pipeline: &'frame P,
    /// Its bind group
    bind_group: &'frame B,
}

/// Pair every stage of `schedule` with its pipeline and bind group, keeping the segments.
fn resolve<'frame, P, B>(
    schedule: &'frame Schedule,
    pipelines: &'frame HashMap<Kernel, P>,
    bind_groups: &'frame HashMap<BindingSet, B>,
) -> Result<Vec<Vec<Dispatch<'frame, P, B>>>, pbf_api::Error> {
    schedule
        .passes()
        .iter()
        .map(|segment| {
            segment
                .iter()
                .map(|stage| {
                    let pipeline =
                        pipelines
                            .get(&stage.kernel)
                            .ok_or_else(|| pbf_api::Error::Device {
                                step: "recording a frame",
                                reason: format!("no pipeline for {:?}", stage.kernel),
                            })?;
                    let bind_group =
                        bind_groups
                            .get(&stage.bindings)
                            .ok_or_else(|| pbf_api::Error::Device {
                                step: "recording a frame",
                                reason: format!("no bind group for {:?}", stage.bindings),
                            })?;
                    Ok(Dispatch {
                        stage,
                        pipeline,
                        bind_group,
                    })
                })
                .collect()
        })
        .collect()
}

/// The compiled kernels and everything they are bound to.
pub struct Pipeline {
    /// Every buffer
    pub buffers: Buffers,
    /// One bind group per slot and sort parity
    bind_groups: HashMap<BindingSet, wgpu::BindGroup>,
    /// One pipeline per kernel
    pipelines: HashMap<Kernel, wgpu::ComputePipeline>,
}

impl Pipeline {
    /// Load the kernels from `shader_path` and allocate buffers for `initial`.
    ///
    /// # Errors
    /// If the shader can't be loaded, or wgpu rejects anything built from it.
    pub fn init(
        device: &wgpu::Device,
        shader_path: &Path,
        initial: &[Particle],
        config: &FluidConfig,
    ) -> Result<Self, GpuError> {
        config.validate()?;
        let particle_count = pbf_api::particles::validate_count(initial.len())?;
        let builder = Builder::new(device);

        let shader_module = builder.shader(shader_path)?;
        let bind_group_layout = builder.bind_group_layout()?;
        let pipeline_layout = builder.pipeline_layout(&bind_group_layout)?;

        let mut pipelines = HashMap::new();
        for kernel in Kernel::ALL {
            let pipeline = builder.compute_pipeline(&pipeline_layout, &shader_module, kernel)?;
            pipelines.insert(kernel, pipeline);
        }

        let buffers = Buffers::new(&builder, initial, config, particle_count)?;

        let frames_in_flight = config.frames_in_flight;
        let mut bind_groups = HashMap::new();
        for index in 0..frames_in_flight {
            for parity in Parity::ALL {
                let set = BindingSet::new(FrameSlot::new(index), frames_in_flight, parity);
                let entries: Vec<wgpu::BindGroupEntry<'_>> = Binding::ALL
                    .iter()
                    .map(|&binding| wgpu::BindGroupEntry {
                        binding: binding.index(),
                        resource: buffers.resource(set.resource(binding)).as_entire_binding(),
                    })
                    .collect();
                let bind_group = scoped(device, "creating a bind group", || {
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("PBF bind group"),
                        layout: &bind_group_layout,
                        entries: &entries,
                    })
                })?;
                bind_groups.insert(set, bind_group);
            }
        }

        log::info!(
            "Built {} kernels and {} bind groups for {particle_count} particles",
            pipelines.len(),
            bind_groups.len()
        );

        Ok(Self {
            buffers,
            bind_groups,
            pipelines,
        })
    }

    /// Look up every stage's pipeline and bind group, then record `schedule`, one compute pass
    /// per barrier separated segment. Nothing is recorded unless every lookup succeeds.
    ///
    /// # Errors
    /// If the schedule uses a bind group or kernel that wasn't built.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        schedule: &Schedule,
    ) -> Result<(), GpuError> {
        let passes = resolve(schedule, &self.pipelines, &self.bind_groups)?;
        for segment in passes {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("PBF segment"),
                timestamp_writes: None,
            });
            for dispatch in segment {
                pass.set_pipeline(dispatch.pipeline);
                pass.set_bind_group(0, dispatch.bind_group, &[]);
                if let Some(radix_pass) = dispatch.stage.radix_pass {
                    pass.set_push_constants(0, bytemuck::bytes_of(&RadixPass { pass: radix_pass }));
                }
                let [x, y, z] = dispatch.stage.workgroups;
                pass.dispatch_workgroups(x, y, z);
            }
        }
        Ok(())
    }

    /// Features that are used when available.
    #[must_use]
    pub const fn optional_features() -> wgpu::Features {
        wgpu::Features::empty()
    }

    /// Limits the bind group layout and push constants need.
    #[must_use]
    pub fn required_limits() -> wgpu::Limits {
        wgpu::Limits {
            max_storage_buffers_per_shader_stage: 9,
            max_push_constant_size: 128,
            ..wgpu::Limits::downlevel_defaults()
        }
    }

    /// Features the kernels can't run without.
    #[must_use]
    pub const fn required_features() -> wgpu::Features {
        wgpu::Features::PUSH_CONSTANTS
    }

    /// Only compute shaders are needed, there is no rendering.
    #[must_use]
    pub fn required_downlevel_capabilities() -> wgpu::DownlevelCapabilities {
        wgpu::DownlevelCapabilities {
            flags: wgpu::DownlevelFlags::COMPUTE_SHADERS,
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod tests {
    use pbf_api::PipelineDescriptor;

    use crate::pipeline::builder::layout_entries;

    use super::*;

    fn frame(frames_in_flight: usize) -> Schedule {
        let descriptor = PipelineDescriptor::new(1000).unwrap();
        Schedule::for_frame(&descriptor, FrameSlot::new(0), frames_in_flight).unwrap()
    }

    fn every_kernel() -> HashMap<Kernel, Kernel> {
        Kernel::ALL.iter().map(|&kernel| (kernel, kernel)).collect()
    }

    fn every_set(frames_in_flight: usize) -> HashMap<BindingSet, BindingSet> {
        let mut sets = HashMap::new();
        for index in 0..frames_in_flight {
            for parity in Parity::ALL {
                let set = BindingSet::new(FrameSlot::new(index), frames_in_flight, parity);
                sets.insert(set, set);
            }
        }
        sets
    }

    #[test]
    fn resolving_pairs_each_stage_with_its_own_objects() {
        let schedule = frame(2);
        let kernels = every_kernel();
        let sets = every_set(2);

        let passes = resolve(&schedule, &kernels, &sets).unwrap();

        assert_eq!(passes.len(), schedule.barrier_count());
        let dispatches: Vec<&Dispatch<'_, Kernel, BindingSet>> = passes.iter().flatten().collect();
        assert_eq!(dispatches.len(), 42);
        for dispatch in dispatches {
            assert_eq!(*dispatch.pipeline, dispatch.stage.kernel);
            assert_eq!(*dispatch.bind_group, dispatch.stage.bindings);
        }
    }

    #[test]
    fn a_missing_bind_group_fails_before_anything_is_recorded() {
        let schedule = frame(2);
        let kernels = every_kernel();
        let mut sets = every_set(2);
        let last = schedule.passes()[schedule.barrier_count() - 1][0].bindings;
        sets.remove(&last);

        let resolved = resolve(&schedule, &kernels, &sets);

        assert!(matches!(
            resolved,
            Err(pbf_api::Error::Device {
                step: "recording a frame",
                ..
            })
        ));
    }

    #[test]
    fn a_missing_kernel_fails_too() {
        let schedule = frame(2);
        let mut kernels = every_kernel();
        kernels.remove(&Kernel::Vorticity);

        assert!(resolve(&schedule, &kernels, &every_set(2)).is_err());
    }

    #[test]
    fn the_limits_cover_the_storage_bindings() {
        let storage = layout_entries()
            .iter()
            .filter(|entry| {
                matches!(
                    entry.ty,
                    wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { .. },
                        ..
                    }
                )
            })
            .count();

        assert_eq!(
            storage,
            Pipeline::required_limits().max_storage_buffers_per_shader_stage as usize
        );
    }

    #[test]
    fn requirements_are_compute_only() {
        assert!(Pipeline::required_features().contains(wgpu::Features::PUSH_CONSTANTS));
        assert!(Pipeline::required_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS));
        assert!(Pipeline::required_limits().max_uniform_buffers_per_shader_stage >= 3);
    }
}
