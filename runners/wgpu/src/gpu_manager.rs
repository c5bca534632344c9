//! Adapter and device selection

use crate::{pipeline::Pipeline, GpuError};

/// The wgpu handles everything else is created from. Headless, there is no surface.
pub struct GPUManager {
    /// The only queue, everything is submitted here in order
    pub queue: wgpu::Queue,
    /// The logical device
    pub device: wgpu::Device,
    /// The chosen adapter
    pub adapter: wgpu::Adapter,
    /// Declared last so it is dropped last
    pub instance: wgpu::Instance,
}

impl GPUManager {
    /// Pick an adapter and open a device that can run the kernels.
    ///
    /// Respects `WGPU_BACKEND`, `WGPU_ADAPTER_NAME` and `WGPU_TRACE`.
    ///
    /// # Errors
    /// If there is no adapter, or the adapter lacks features, limits or capabilities.
    pub async fn setup() -> Result<Self, GpuError> {
        log::info!("Initializing the GPU...");

        let backends = wgpu::util::backend_bits_from_env().unwrap_or_else(wgpu::Backends::all);
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let adapter = wgpu::util::initialize_adapter_from_env_or_default(&instance, None)
            .await
            .ok_or(GpuError::NoAdapter)?;

        {
            let adapter_info = adapter.get_info();
            log::info!("Using {} ({:?})", adapter_info.name, adapter_info.backend);
        }

        let optional_features = Pipeline::optional_features();
        let required_features = Pipeline::required_features();
        let adapter_features = adapter.features();
        if !adapter_features.contains(required_features) {
            return Err(GpuError::MissingFeatures(
                required_features - adapter_features,
            ));
        }

        let required_downlevel_capabilities = Pipeline::required_downlevel_capabilities();
        let downlevel_capabilities = adapter.get_downlevel_capabilities();
        if !downlevel_capabilities
            .flags
            .contains(required_downlevel_capabilities.flags)
        {
            return Err(GpuError::Downlevel(
                required_downlevel_capabilities.flags - downlevel_capabilities.flags,
            ));
        }

        let required_limits = Pipeline::required_limits();
        if !required_limits.check_limits(&adapter.limits()) {
            return Err(GpuError::Limits(Box::new(required_limits)));
        }

        let trace_dir = std::env::var("WGPU_TRACE");
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("PBF device"),
                    required_features: (optional_features & adapter_features) | required_features,
                    required_limits,
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                trace_dir.ok().as_ref().map(std::path::Path::new),
            )
            .await?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("Uncaptured wgpu error: {error}");
        }));

        Ok(Self {
            queue,
            device,
            adapter,
            instance,
        })
    }
}
