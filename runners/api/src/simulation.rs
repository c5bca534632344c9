//! The frame orchestrator
//!
//! Each frame:
//!   1. rotate to the next frame-in-flight slot,
//!   2. wait for the renderer to finish reading that slot, if it ever did,
//!   3. write the uniforms,
//!   4. submit the slot's prebuilt schedule and hand its completion fence to the renderer.
//!
//! Step 2 is the only place the host blocks on the GPU.

use crate::{
    config::FluidConfig,
    device::{Device, RenderOutcome, RenderStage, SimulatedFrame},
    frame::{FrameSlot, FrameSlots},
    particles,
    pipeline::PipelineDescriptor,
    schedule::Schedule,
    Error,
};

/// A running simulation, owning its device.
pub struct Simulation<D: Device> {
    /// One schedule per slot, built up front
    schedules: FrameSlots<Schedule>,
    /// Signalled when the renderer stops reading a slot
    render_fences: FrameSlots<Option<D::Fence>>,
    /// The slot simulated most recently
    slot: FrameSlot,
    /// Parameters
    config: FluidConfig,
    /// Simulated seconds
    accumulated_time: f32,
    /// Frames simulated
    frame: u64,
    /// Declared last so it is dropped after everything referring to its resources
    device: D,
}

impl<D: Device> Simulation<D> {
    /// Check the config against the device and build every slot's schedule.
    ///
    /// # Errors
    /// On invalid configuration, or a device that doesn't match it.
    pub fn new(device: D, config: &FluidConfig) -> Result<Self, D::Error> {
        config.validate()?;
        let frames_in_flight = device.frames_in_flight();
        if frames_in_flight != config.frames_in_flight {
            return Err(Error::invalid(
                "frames_in_flight",
                format!(
                    "the device has {frames_in_flight} slots, the config asks for {}",
                    config.frames_in_flight
                ),
            )
            .into());
        }

        let count = particles::validate_count(device.particle_count() as usize)?;
        let descriptor = PipelineDescriptor::new(count as usize)?;
        let schedules = FrameSlots::try_from_fn(frames_in_flight, |slot| {
            Schedule::for_frame(&descriptor, slot, frames_in_flight)
        })?;
        log::info!(
            "Simulating {count} particles, {frames_in_flight} frames in flight, {} barriers a frame",
            schedules[FrameSlot::new(0)].barrier_count()
        );

        Ok(Self {
            schedules,
            render_fences: FrameSlots::from_fn(frames_in_flight, |_| None),
            // The initial particles stand in for the output of the last slot
            slot: FrameSlot::new(frames_in_flight - 1),
            config: config.resolved(),
            accumulated_time: 0.0,
            frame: 0,
            device,
        })
    }

    /// Simulate one frame of `dt` seconds.
    ///
    /// # Errors
    /// If `dt` isn't positive, or the device fails.
    pub fn step(&mut self, dt: f32) -> Result<SimulatedFrame<D::Fence>, D::Error> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(Error::invalid("dt", format!("must be positive, got {dt}")).into());
        }

        let frames_in_flight = self.schedules.len();
        let slot = self.slot.next(frames_in_flight);
        if let Some(fence) = self.render_fences[slot].take() {
            log::debug!("Waiting for the renderer to release slot {}", slot.index());
            self.device.wait(&fence)?;
        }

        // Nothing is committed until the frame has been submitted.
        let accumulated_time = self.accumulated_time + dt;
        let particle_count = self.device.particle_count();
        let uniforms = self.config.uniforms(particle_count, dt, accumulated_time);
        self.device.write_uniforms(&uniforms)?;
        let completion = self.device.submit(&self.schedules[slot])?;

        self.slot = slot;
        self.accumulated_time = accumulated_time;
        self.frame += 1;
        log::debug!("Submitted frame {} in slot {}", self.frame, slot.index());

        Ok(SimulatedFrame {
            slot,
            number: self.frame,
            completion,
        })
    }

    /// Record that the renderer is reading `slot` until `fence` is signalled.
    pub fn rendered(&mut self, slot: FrameSlot, fence: D::Fence) {
        self.render_fences[slot] = Some(fence);
    }

    /// Simulate a frame and hand it to `renderer`. An outdated render target is rebuilt and the
    /// frame is not drawn, the simulation carries on regardless.
    ///
    /// # Errors
    /// If simulating, rendering or rebuilding fails.
    pub fn advance<R: RenderStage<D>>(
        &mut self,
        renderer: &mut R,
        dt: f32,
    ) -> Result<SimulatedFrame<D::Fence>, D::Error> {
        let frame = self.step(dt)?;
        match renderer.render(&mut self.device, &frame)? {
            RenderOutcome::Submitted(fence) => self.rendered(frame.slot, fence),
            RenderOutcome::Outdated => {
                log::warn!("Render target outdated at frame {}, rebuilding", frame.number);
                renderer.rebuild(&mut self.device)?;
            }
        }
        Ok(frame)
    }

    /// The slot written by the latest frame.
    #[must_use]
    pub const fn current_slot(&self) -> FrameSlot {
        self.slot
    }

    /// Frames simulated so far.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Simulated seconds so far.
    #[must_use]
    pub const fn accumulated_time(&self) -> f32 {
        self.accumulated_time
    }

    /// The parameters.
    #[must_use]
    pub const fn config(&self) -> &FluidConfig {
        &self.config
    }

    /// The schedule run for `slot`.
    #[must_use]
    pub fn schedule(&self, slot: FrameSlot) -> Option<&Schedule> {
        self.schedules.get(slot)
    }

    /// The device.
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// The device, mutably. Used for readbacks.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: Device> Drop for Simulation<D> {
    fn drop(&mut self) {
        if let Err(error) = self.device.wait_idle() {
            log::error!("Couldn't idle the device before teardown: {error}");
        }
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod tests {
    use std::sync::{mpsc, Arc, Condvar, Mutex};
    use std::thread;
    use std::time::Duration;

    use pbf_cpu_gpu_shared::glam::Vec3;

    use crate::{cpu::CpuDevice, device::FrameUniforms, particles::cuboid, Particle};

    use super::*;

    /// A fence the test opens by hand.
    #[derive(Debug, Default)]
    struct Gate {
        open: Mutex<bool>,
        opened: Condvar,
    }

    impl Gate {
        fn already_open() -> Arc<Self> {
            Arc::new(Self {
                open: Mutex::new(true),
                opened: Condvar::new(),
            })
        }

        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.opened.notify_all();
        }

        fn is_open(&self) -> bool {
            *self.open.lock().unwrap()
        }

        fn wait(&self) {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.opened.wait(open).unwrap();
            }
        }
    }

    /// Simulation work finishes instantly, render work finishes when its gate is opened.
    struct GatedDevice {
        /// Render gates, shared with the renderer
        render_gates: Arc<Mutex<Vec<Option<Arc<Gate>>>>>,
    }

    impl Device for GatedDevice {
        type Fence = Arc<Gate>;
        type Error = Error;

        fn particle_count(&self) -> u32 {
            1
        }

        fn frames_in_flight(&self) -> usize {
            2
        }

        fn write_uniforms(&mut self, _uniforms: &FrameUniforms) -> Result<(), Error> {
            Ok(())
        }

        fn submit(&mut self, schedule: &Schedule) -> Result<Arc<Gate>, Error> {
            let gates = self.render_gates.lock().unwrap();
            if let Some(gate) = &gates[schedule.slot().index()] {
                if !gate.is_open() {
                    return Err(Error::Device {
                        step: "submitting",
                        reason: "the slot is still being rendered".to_owned(),
                    });
                }
            }
            Ok(Gate::already_open())
        }

        fn wait(&mut self, fence: &Arc<Gate>) -> Result<(), Error> {
            fence.wait();
            Ok(())
        }

        fn wait_idle(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    /// Accepts uniforms but fails every submission.
    struct RefusingDevice;

    impl Device for RefusingDevice {
        type Fence = ();
        type Error = Error;

        fn particle_count(&self) -> u32 {
            1
        }

        fn frames_in_flight(&self) -> usize {
            2
        }

        fn write_uniforms(&mut self, _uniforms: &FrameUniforms) -> Result<(), Error> {
            Ok(())
        }

        fn submit(&mut self, _schedule: &Schedule) -> Result<(), Error> {
            Err(Error::Device {
                step: "submitting",
                reason: "the device is gone".to_owned(),
            })
        }

        fn wait(&mut self, _fence: &()) -> Result<(), Error> {
            Ok(())
        }

        fn wait_idle(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    /// Submits render work that never finishes by itself.
    struct GatedRenderer {
        render_gates: Arc<Mutex<Vec<Option<Arc<Gate>>>>>,
    }

    impl RenderStage<GatedDevice> for GatedRenderer {
        fn render(
            &mut self,
            _device: &mut GatedDevice,
            frame: &SimulatedFrame<Arc<Gate>>,
        ) -> Result<RenderOutcome<Arc<Gate>>, Error> {
            let gate = Arc::new(Gate::default());
            self.render_gates.lock().unwrap()[frame.slot.index()] = Some(Arc::clone(&gate));
            Ok(RenderOutcome::Submitted(gate))
        }

        fn rebuild(&mut self, _device: &mut GatedDevice) -> Result<(), Error> {
            Ok(())
        }
    }

    /// Reports outdated targets a given number of times, then never renders anything.
    struct FlakyRenderer {
        outdated: u32,
        rebuilds: u32,
    }

    impl RenderStage<CpuDevice> for FlakyRenderer {
        fn render(
            &mut self,
            _device: &mut CpuDevice,
            frame: &SimulatedFrame<u64>,
        ) -> Result<RenderOutcome<u64>, Error> {
            if self.outdated > 0 {
                self.outdated -= 1;
                return Ok(RenderOutcome::Outdated);
            }
            Ok(RenderOutcome::Submitted(frame.completion))
        }

        fn rebuild(&mut self, _device: &mut CpuDevice) -> Result<(), Error> {
            self.rebuilds += 1;
            Ok(())
        }
    }

    fn cpu_simulation() -> Simulation<CpuDevice> {
        let config = FluidConfig::default();
        let origin = Vec3::new(0.0, 0.5, 0.0);
        let particles = cuboid(origin, [2, 2, 2], config.particle_spacing, 0.0);
        let device = CpuDevice::new(&particles, &config).unwrap();
        Simulation::new(device, &config).unwrap()
    }

    #[test]
    fn launching_one_frame_too_many_blocks_until_the_renderer_finishes() {
        let render_gates = Arc::new(Mutex::new(vec![None, None]));
        let (progress, frames) = mpsc::channel();

        let gates = Arc::clone(&render_gates);
        let worker = thread::spawn(move || -> Result<(), Error> {
            let device = GatedDevice {
                render_gates: Arc::clone(&gates),
            };
            let mut simulation = Simulation::new(device, &FluidConfig::default())?;
            let mut renderer = GatedRenderer {
                render_gates: gates,
            };
            for frame in 0..3_u32 {
                simulation.advance(&mut renderer, 0.01)?;
                progress.send(frame).ok();
            }
            Ok(())
        });

        let timeout = Duration::from_secs(5);
        assert_eq!(frames.recv_timeout(timeout), Ok(0));
        assert_eq!(frames.recv_timeout(timeout), Ok(1));
        assert!(frames.recv_timeout(Duration::from_millis(300)).is_err());

        let first = render_gates.lock().unwrap()[0].clone().unwrap();
        first.open();

        assert_eq!(frames.recv_timeout(timeout), Ok(2));
        assert!(worker.join().unwrap().is_ok());
    }

    #[test]
    fn slots_rotate_from_the_first() {
        let mut simulation = cpu_simulation();

        let slots: Vec<usize> = (0..4)
            .map(|_| simulation.step(0.01).unwrap().slot.index())
            .collect();

        assert_eq!(slots, [0, 1, 0, 1]);
        assert_eq!(simulation.frame(), 4);
        assert!((simulation.accumulated_time() - 0.04).abs() < 1.0e-6);
    }

    #[test]
    fn outdated_render_targets_are_rebuilt_without_losing_frames() {
        let mut simulation = cpu_simulation();
        let mut renderer = FlakyRenderer {
            outdated: 1,
            rebuilds: 0,
        };

        let first = simulation.advance(&mut renderer, 0.01).unwrap();
        let second = simulation.advance(&mut renderer, 0.01).unwrap();

        assert_eq!(renderer.rebuilds, 1);
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_eq!(simulation.current_slot(), FrameSlot::new(1));
    }

    #[test]
    fn non_positive_time_steps_are_rejected() {
        let mut simulation = cpu_simulation();
        assert!(matches!(
            simulation.step(0.0),
            Err(Error::InvalidParameter { name: "dt", .. })
        ));
        assert!(simulation.step(f32::NAN).is_err());
        assert_eq!(simulation.frame(), 0);
    }

    #[test]
    fn failed_submissions_leave_the_clock_alone() {
        let mut simulation = Simulation::new(RefusingDevice, &FluidConfig::default()).unwrap();

        assert!(simulation.step(0.01).is_err());

        assert_eq!(simulation.frame(), 0);
        assert_eq!(simulation.accumulated_time(), 0.0);
        assert_eq!(simulation.current_slot(), FrameSlot::new(1));
    }

    #[test]
    fn the_rest_density_is_calibrated_once_up_front() {
        let simulation = cpu_simulation();

        let config = simulation.config();

        assert_eq!(
            config.rest_density,
            Some(FluidConfig::default().rest_density())
        );
    }

    #[test]
    fn config_and_device_must_agree_on_frames_in_flight() {
        let particles = [Particle::default()];
        let device = CpuDevice::new(&particles, &FluidConfig::default()).unwrap();
        let config = FluidConfig {
            frames_in_flight: 3,
            ..Default::default()
        };

        assert!(matches!(
            Simulation::new(device, &config),
            Err(Error::InvalidParameter {
                name: "frames_in_flight",
                ..
            })
        ));
    }
}
