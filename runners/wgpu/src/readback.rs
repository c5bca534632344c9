//! Copying GPU buffers back to the CPU.
//!
//! Only used for inspection and tests. It stalls until the copy is done, so it isn't part of
//! the per-frame path.

use futures::channel::oneshot;

use crate::GpuError;

/// Read the first `count` elements of `buffer`, which needs `COPY_SRC` usage.
///
/// Waits for everything already submitted to `queue`, then for the copy.
///
/// # Errors
/// If mapping the staging buffer fails or the device is lost before it completes.
pub fn read_buffer<T: bytemuck::Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    count: usize,
) -> Result<Vec<T>, GpuError> {
    #[expect(
        clippy::as_conversions,
        reason = "A usize always fits in a u64 on supported targets"
    )]
    let size = (count * core::mem::size_of::<T>()) as u64;
    if size == 0 {
        return Ok(Vec::new());
    }

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    let submission = queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver only goes away if the wait below already failed.
        let _ignored = sender.send(result);
    });
    device.poll(wgpu::Maintain::WaitForSubmissionIndex(submission));

    let mapped = futures::executor::block_on(receiver).map_err(|_cancelled| {
        pbf_api::Error::Device {
            step: "reading back a buffer",
            reason: "the map callback was dropped".to_owned(),
        }
    })?;
    mapped?;

    let contents = bytemuck::pod_collect_to_vec(&slice.get_mapped_range());
    staging.unmap();
    Ok(contents)
}
