//! Errors from the wgpu backend

/// Everything that can go wrong setting up or driving the GPU.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GpuError {
    /// No adapter matched the environment's constraints
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    /// The adapter lacks features the kernels need
    #[error("The adapter is missing required features: {0:?}")]
    MissingFeatures(wgpu::Features),

    /// The adapter's limits are below what the kernels need
    #[error("The adapter's limits are too low, it needs at least: {0:?}")]
    Limits(Box<wgpu::Limits>),

    /// The adapter lacks downlevel capabilities the kernels need
    #[error("The adapter is missing downlevel capabilities: {0:?}")]
    Downlevel(wgpu::DownlevelFlags),

    /// Opening the device failed
    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// The compiled shader couldn't be read or isn't SPIR-V
    #[error("Couldn't load the shader at {path}: {reason}")]
    ShaderLoad {
        /// Where the shader was looked for
        path: String,
        /// What went wrong
        reason: String,
    },

    /// wgpu rejected something, in the named step
    #[error("Validation failed while {step}: {source}")]
    Validation {
        /// What was being created or submitted
        step: &'static str,
        /// wgpu's report
        source: wgpu::Error,
    },

    /// Mapping a buffer for readback failed
    #[error("Buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    /// The backend independent layer failed
    #[error(transparent)]
    Api(#[from] pbf_api::Error),
}
