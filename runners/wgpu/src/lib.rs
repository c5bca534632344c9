//! Headless wgpu backend for PBF fluid simulations
//!
//! [`GPUManager`] finds an adapter and opens a device, [`WgpuDevice`] owns the simulation's
//! buffers and pipelines and implements [`pbf_api::Device`] on top of them.

pub mod device;
pub mod error;
pub mod gpu_manager;
pub mod pipeline;
pub mod readback;

pub use device::WgpuDevice;
pub use error::GpuError;
pub use gpu_manager::GPUManager;
