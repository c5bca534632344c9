//! Drives the simulation at a fixed frame rate and reports timings.

use std::time::{Duration, Instant};

use pbf_api::{RenderStage, Simulation};
use pbf_wgpu::{GpuError, WgpuDevice};

/// Frames between timing reports.
const REPORT_INTERVAL: u64 = 100;

/// Runs a fixed number of frames.
pub struct EventLoop {
    /// The running simulation
    simulation: Simulation<WgpuDevice>,
    /// Frames still to run
    remaining: u32,
    /// When the last frame started
    last_frame_inst: Instant,
    /// Wall clock time over the current report interval
    accum_time: f32,
}

impl EventLoop {
    /// Loop over `frames` frames of `simulation`.
    pub fn new(simulation: Simulation<WgpuDevice>, frames: u32) -> Self {
        Self {
            simulation,
            remaining: frames,
            last_frame_inst: Instant::now(),
            accum_time: 0.0,
        }
    }

    /// Run every frame, paced to real time.
    pub fn run<R: RenderStage<WgpuDevice>>(mut self, renderer: &mut R) -> Result<(), GpuError> {
        log::info!("Entering simulation loop...");
        let dt = self.simulation.config().time_step;
        let target_frametime = Duration::from_secs_f32(dt);

        while self.remaining > 0 {
            let time_since_last_frame = self.last_frame_inst.elapsed();
            if time_since_last_frame < target_frametime {
                std::thread::sleep(target_frametime - time_since_last_frame);
            }
            self.accum_time += self.last_frame_inst.elapsed().as_secs_f32();
            self.last_frame_inst = Instant::now();

            let frame = self.simulation.advance(renderer, dt)?;
            self.remaining -= 1;

            if frame.number % REPORT_INTERVAL == 0 {
                log::info!(
                    "Frame {}: avg frame time {:.2}ms",
                    frame.number,
                    self.accum_time * 1000.0 / REPORT_INTERVAL as f32
                );
                self.accum_time = 0.0;
            }
        }

        let slot = self.simulation.current_slot();
        let particles = self.simulation.device().read_particles(slot)?;
        let lowest = particles
            .iter()
            .map(|particle| particle.position.y)
            .fold(f32::INFINITY, f32::min);
        log::info!(
            "Finished after {} frames, {:.2}s simulated, lowest particle at y = {lowest:.3}",
            self.simulation.frame(),
            self.simulation.accumulated_time()
        );
        Ok(())
    }
}
