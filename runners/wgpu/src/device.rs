//! [`pbf_api::Device`] on top of wgpu

use std::path::Path;

use pbf_api::{Device, FluidConfig, FrameSlot, FrameUniforms, Particle, Schedule};

use crate::{pipeline::Pipeline, readback, GPUManager, GpuError};

/// A simulation's buffers and kernels on a real GPU.
pub struct WgpuDevice {
    /// Buffers, bind groups and kernels
    pipeline: Pipeline,
    /// Number of simulated particles
    particle_count: u32,
    /// Number of particle and neighbour buffers
    frames_in_flight: usize,
    /// The wgpu handles, dropped after everything created from them
    manager: GPUManager,
}

impl WgpuDevice {
    /// Build the pipeline for `initial` on `manager`'s device.
    ///
    /// # Errors
    /// If the config or particles are invalid, or the pipeline can't be built.
    pub fn new(
        manager: GPUManager,
        shader_path: &Path,
        initial: &[Particle],
        config: &FluidConfig,
    ) -> Result<Self, GpuError> {
        let pipeline = Pipeline::init(&manager.device, shader_path, initial, config)?;
        let particle_count = pbf_api::particles::validate_count(initial.len())?;

        Ok(Self {
            pipeline,
            particle_count,
            frames_in_flight: config.frames_in_flight,
            manager,
        })
    }

    /// The wgpu handles.
    #[must_use]
    pub const fn manager(&self) -> &GPUManager {
        &self.manager
    }

    /// Every buffer, for render stages that want to bind them.
    #[must_use]
    pub const fn buffers(&self) -> &crate::pipeline::Buffers {
        &self.pipeline.buffers
    }

    /// Copy `slot`'s particles back. Blocks until the GPU has caught up.
    ///
    /// # Errors
    /// If the readback fails.
    pub fn read_particles(&self, slot: FrameSlot) -> Result<Vec<Particle>, GpuError> {
        let buffer = self.pipeline.buffers.particles.get(slot).ok_or_else(|| {
            pbf_api::Error::Device {
                step: "reading back particles",
                reason: format!("there is no slot {}", slot.index()),
            }
        })?;
        readback::read_buffer(
            &self.manager.device,
            &self.manager.queue,
            buffer,
            self.particle_count as usize,
        )
    }
}

impl Device for WgpuDevice {
    type Fence = wgpu::SubmissionIndex;
    type Error = GpuError;

    fn particle_count(&self) -> u32 {
        self.particle_count
    }

    fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    fn write_uniforms(&mut self, uniforms: &FrameUniforms) -> Result<(), GpuError> {
        let queue = &self.manager.queue;
        let buffers = &self.pipeline.buffers;
        queue.write_buffer(
            &buffers.simulation,
            0,
            bytemuck::bytes_of(&uniforms.simulation),
        );
        queue.write_buffer(&buffers.search, 0, bytemuck::bytes_of(&uniforms.search));
        queue.write_buffer(&buffers.bounds, 0, bytemuck::bytes_of(&uniforms.bounds));
        Ok(())
    }

    fn submit(&mut self, schedule: &Schedule) -> Result<wgpu::SubmissionIndex, GpuError> {
        let device = &self.manager.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("PBF frame"),
        });
        // A frame that fails to record is dropped whole, never submitted in part.
        let submission = self
            .pipeline
            .encode(&mut encoder, schedule)
            .map(|()| self.manager.queue.submit(Some(encoder.finish())));

        if let Some(source) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuError::Validation {
                step: "submitting a frame",
                source,
            });
        }
        let submission = submission?;

        log::trace!("Submitted slot {}", schedule.slot().index());
        Ok(submission)
    }

    fn wait(&mut self, fence: &wgpu::SubmissionIndex) -> Result<(), GpuError> {
        self.manager
            .device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(fence.clone()));
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<(), GpuError> {
        self.manager.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }
}
