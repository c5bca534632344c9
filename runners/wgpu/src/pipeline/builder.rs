//! Creating the wgpu objects a [`super::Pipeline`] is made of.
//!
//! Every creation step runs inside a validation error scope, so a bad descriptor comes back as
//! a [`GpuError::Validation`] naming the step rather than as an uncaptured device error.

use std::path::Path;

use pbf_api::{Binding, Kernel};
use pbf_cpu_gpu_shared::RadixPass;
use wgpu::util::DeviceExt as _;

use crate::GpuError;

/// The magic number every SPIR-V module starts with.
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Run `create` inside a validation error scope.
///
/// # Errors
/// If wgpu reports a validation error for anything `create` did.
pub fn scoped<T>(
    device: &wgpu::Device,
    step: &'static str,
    create: impl FnOnce() -> T,
) -> Result<T, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let created = create();
    match pollster::block_on(device.pop_error_scope()) {
        Some(source) => Err(GpuError::Validation { step, source }),
        None => Ok(created),
    }
}

/// Check `bytes` looks like a SPIR-V module.
///
/// # Errors
/// A description of what's wrong with it.
pub fn check_spirv(bytes: &[u8]) -> Result<(), String> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(format!(
            "{} bytes isn't a whole number of 32 bit words",
            bytes.len()
        ));
    }
    let magic = bytes
        .get(0..4)
        .and_then(|word| <[u8; 4]>::try_from(word).ok())
        .map(u32::from_le_bytes);
    if magic != Some(SPIRV_MAGIC) {
        return Err("missing the SPIR-V magic number".to_owned());
    }
    Ok(())
}

/// The bind group layout shared by every kernel. Binding numbers follow [`Binding::index`].
#[must_use]
pub fn layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    Binding::ALL
        .iter()
        .map(|&binding| {
            let ty = if binding.is_uniform() {
                wgpu::BufferBindingType::Uniform
            } else {
                wgpu::BufferBindingType::Storage {
                    read_only: binding.is_read_only(),
                }
            };
            wgpu::BindGroupLayoutEntry {
                binding: binding.index(),
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }
        })
        .collect()
}

/// Size of the push constant range, just the radix pass.
#[must_use]
pub const fn push_constant_size() -> u32 {
    #[expect(
        clippy::as_conversions,
        clippy::cast_possible_truncation,
        reason = "The struct is one u32"
    )]
    let size = core::mem::size_of::<RadixPass>() as u32;
    size
}

/// Creates wgpu objects on one device.
pub struct Builder<'device> {
    /// Where everything is created
    device: &'device wgpu::Device,
}

impl<'device> Builder<'device> {
    /// A builder for `device`.
    #[must_use]
    pub const fn new(device: &'device wgpu::Device) -> Self {
        Self { device }
    }

    /// Load the precompiled SPIR-V module holding every kernel.
    ///
    /// # Errors
    /// If the file can't be read, isn't SPIR-V or fails validation.
    pub fn shader(&self, path: &Path) -> Result<wgpu::ShaderModule, GpuError> {
        let shader_load = |reason: String| GpuError::ShaderLoad {
            path: path.display().to_string(),
            reason,
        };
        let shader_binary = std::fs::read(path).map_err(|error| shader_load(error.to_string()))?;
        check_spirv(&shader_binary).map_err(shader_load)?;

        log::debug!("Loaded {} bytes of SPIR-V from {}", shader_binary.len(), path.display());
        scoped(self.device, "creating the shader module", || {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("PBF kernels"),
                    source: wgpu::util::make_spirv(&shader_binary),
                })
        })
    }

    /// A storage buffer initialised with `contents`.
    ///
    /// # Errors
    /// If wgpu rejects the buffer.
    pub fn storage_buffer<T: bytemuck::Pod>(
        &self,
        label: &str,
        contents: &[T],
        extra_usage: wgpu::BufferUsages,
    ) -> Result<wgpu::Buffer, GpuError> {
        scoped(self.device, "creating a storage buffer", || {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(contents),
                    usage: wgpu::BufferUsages::STORAGE | extra_usage,
                })
        })
    }

    /// A uniform buffer that is rewritten every frame.
    ///
    /// # Errors
    /// If wgpu rejects the buffer.
    pub fn uniform_buffer<T: bytemuck::Pod>(
        &self,
        label: &str,
        initial: &T,
    ) -> Result<wgpu::Buffer, GpuError> {
        scoped(self.device, "creating a uniform buffer", || {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::bytes_of(initial),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                })
        })
    }

    /// The one bind group layout.
    ///
    /// # Errors
    /// If wgpu rejects the layout.
    pub fn bind_group_layout(&self) -> Result<wgpu::BindGroupLayout, GpuError> {
        let entries = layout_entries();
        scoped(self.device, "creating the bind group layout", || {
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("PBF bindings"),
                    entries: &entries,
                })
        })
    }

    /// The pipeline layout, the bind group layout plus the radix pass push constant.
    ///
    /// # Errors
    /// If wgpu rejects the layout.
    pub fn pipeline_layout(
        &self,
        bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Result<wgpu::PipelineLayout, GpuError> {
        scoped(self.device, "creating the pipeline layout", || {
            self.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("PBF compute"),
                    bind_group_layouts: &[bind_group_layout],
                    push_constant_ranges: &[wgpu::PushConstantRange {
                        stages: wgpu::ShaderStages::COMPUTE,
                        range: 0..push_constant_size(),
                    }],
                })
        })
    }

    /// The compute pipeline of one kernel.
    ///
    /// # Errors
    /// If the entry point is missing or doesn't match the layout.
    pub fn compute_pipeline(
        &self,
        layout: &wgpu::PipelineLayout,
        module: &wgpu::ShaderModule,
        kernel: Kernel,
    ) -> Result<wgpu::ComputePipeline, GpuError> {
        scoped(self.device, "creating a compute pipeline", || {
            self.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(kernel.entry_point()),
                    layout: Some(layout),
                    module,
                    entry_point: Some(kernel.entry_point()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
        })
    }
}
