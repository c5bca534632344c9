//! Headless PBF fluid simulation: a block of water dropped into a box.
//!
//! Environment:
//!   * `PBF_FRAMES`: frames to simulate, 600 by default
//!   * `PBF_PARTICLES_PER_SIDE`: edge length of the initial cube in particles, 16 by default
//!   * `PBF_SHADER`: the compiled kernels, `assets/shaders/pbf_physics.spv` by default
//!   * `RUST_LOG`, and wgpu's `WGPU_BACKEND`, `WGPU_ADAPTER_NAME` and `WGPU_TRACE`

mod event_loop;
mod renderer;

use std::{path::PathBuf, process::ExitCode};

use pbf_api::{particles, FluidConfig, Simulation};
use pbf_cpu_gpu_shared::glam::Vec3;
use pbf_wgpu::{GPUManager, GpuError, WgpuDevice};

/// Where `shaders/rust-gpu-compiler` puts the kernels.
const DEFAULT_SHADER: &str = "assets/shaders/pbf_physics.spv";

/// Read a numeric setting from the environment.
fn from_env(name: &'static str, default: u32) -> Result<u32, GpuError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|error| {
            pbf_api::Error::InvalidParameter {
                name,
                reason: format!("{value:?}: {error}"),
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}

fn run() -> Result<(), GpuError> {
    let frames = from_env("PBF_FRAMES", 600)?;
    let per_side = from_env("PBF_PARTICLES_PER_SIDE", 16)?;
    let shader_path = std::env::var_os("PBF_SHADER")
        .map_or_else(|| PathBuf::from(DEFAULT_SHADER), PathBuf::from);

    let config = FluidConfig::default();
    let block = Vec3::splat(config.particle_spacing * per_side as f32);
    let origin = Vec3::new(
        config.box_min.x + config.particle_spacing,
        config.box_max.y - block.y - config.particle_spacing,
        -block.z / 2.0,
    );
    let initial = particles::cuboid(
        origin,
        [per_side; 3],
        config.particle_spacing,
        config.particle_spacing * 0.1,
    );

    let manager = pollster::block_on(GPUManager::setup())?;
    let device = WgpuDevice::new(manager, &shader_path, &initial, &config)?;
    let mut renderer = renderer::HeadlessRenderer::new(&device);
    let simulation = Simulation::new(device, &config)?;

    event_loop::EventLoop::new(simulation, frames).run(&mut renderer)
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error}");
            ExitCode::FAILURE
        }
    }
}
