//! Rust interface to PBF fluid simulations
//!
//! Everything here is independent of the GPU API. A backend implements [`Device`] and the
//! [`Simulation`] drives it one frame at a time: picking the frame-in-flight slot, waiting for
//! the renderer to be done with it, writing the uniforms and submitting the frame's
//! [`Schedule`].
//!
//! [`cpu::CpuDevice`] runs the same kernels on the host, so the whole pipeline can be tested
//! without a GPU.

pub mod config;
pub mod cpu;
pub mod device;
pub mod error;
pub mod frame;
pub mod particles;
pub mod pipeline;
pub mod schedule;
pub mod simulation;
pub mod test_utils;

pub use config::FluidConfig;
pub use device::{Device, FrameUniforms, RenderOutcome, RenderStage, SimulatedFrame};
pub use error::Error;
pub use frame::{FrameSlot, FrameSlots, Parity};
pub use pbf_cpu_gpu_shared::Particle;
pub use pipeline::{Access, Binding, BindingSet, Kernel, PipelineDescriptor, Resource, Stage};
pub use schedule::{Command, Schedule};
pub use simulation::Simulation;
