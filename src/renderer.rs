//! A stand-in render stage that consumes frames the way a real one would.
//!
//! It copies the simulated slot into a vertex buffer, ordered after the simulation on the same
//! queue. The simulation doesn't reuse the slot until that copy has finished. Without a surface
//! nothing goes out of date, so it never reports [`RenderOutcome::Outdated`].

use pbf_api::{Device as _, Particle, RenderOutcome, RenderStage, SimulatedFrame};
use pbf_wgpu::{GpuError, WgpuDevice};

/// Copies every simulated frame into a buffer a draw call could read.
pub struct HeadlessRenderer {
    /// Particles as vertices
    vertices: wgpu::Buffer,
}

impl HeadlessRenderer {
    /// Allocate the vertex buffer for `device`'s particles.
    pub fn new(device: &WgpuDevice) -> Self {
        Self {
            vertices: Self::vertex_buffer(device),
        }
    }

    fn vertex_buffer(device: &WgpuDevice) -> wgpu::Buffer {
        let size = u64::from(device.particle_count()) * core::mem::size_of::<Particle>() as u64;
        device
            .manager()
            .device
            .create_buffer(&wgpu::BufferDescriptor {
                label: Some("Particle vertices"),
                size,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
    }
}

impl RenderStage<WgpuDevice> for HeadlessRenderer {
    fn render(
        &mut self,
        device: &mut WgpuDevice,
        frame: &SimulatedFrame<wgpu::SubmissionIndex>,
    ) -> Result<RenderOutcome<wgpu::SubmissionIndex>, GpuError> {
        let particles = device.buffers().particles.get(frame.slot).ok_or_else(|| {
            pbf_api::Error::Device {
                step: "rendering",
                reason: format!("there is no slot {}", frame.slot.index()),
            }
        })?;

        let manager = device.manager();
        let mut encoder = manager
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render"),
            });
        encoder.copy_buffer_to_buffer(particles, 0, &self.vertices, 0, self.vertices.size());
        Ok(RenderOutcome::Submitted(
            manager.queue.submit(Some(encoder.finish())),
        ))
    }

    fn rebuild(&mut self, device: &mut WgpuDevice) -> Result<(), GpuError> {
        self.vertices = Self::vertex_buffer(device);
        Ok(())
    }
}
