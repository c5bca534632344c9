//! The seams between the simulation, the GPU API and the renderer.

use pbf_cpu_gpu_shared::{BoxSettings, NeighbourSearchSettings, SimulationSettings};

use crate::{frame::FrameSlot, schedule::Schedule, Error};

/// The three uniforms, rewritten before every submission.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct FrameUniforms {
    /// Solver settings, including this frame's `dt`
    pub simulation: SimulationSettings,
    /// Neighbour search settings
    pub search: NeighbourSearchSettings,
    /// The container
    pub bounds: BoxSettings,
}

/// Something that owns the simulation's buffers and can run schedules over them.
///
/// All buffers are allocated when the device is created, sized from the particle count and
/// frames in flight. Nothing is resized afterwards.
pub trait Device {
    /// Signalled once submitted work has finished
    type Fence: Clone + core::fmt::Debug;
    /// Failures of the underlying API
    type Error: std::error::Error + From<Error>;

    /// Number of simulated particles.
    fn particle_count(&self) -> u32;

    /// Number of frame-in-flight slots the buffers were allocated for.
    fn frames_in_flight(&self) -> usize;

    /// Stage the uniforms for the next submission.
    ///
    /// # Errors
    /// If the write can't be queued.
    fn write_uniforms(&mut self, uniforms: &FrameUniforms) -> Result<(), Self::Error>;

    /// Record and submit a frame. Must not block on the GPU.
    ///
    /// # Errors
    /// If recording or submission fails.
    fn submit(&mut self, schedule: &Schedule) -> Result<Self::Fence, Self::Error>;

    /// Block until the work behind `fence` is done.
    ///
    /// # Errors
    /// If the device was lost while waiting.
    fn wait(&mut self, fence: &Self::Fence) -> Result<(), Self::Error>;

    /// Block until everything submitted so far is done.
    ///
    /// # Errors
    /// If the device was lost while waiting.
    fn wait_idle(&mut self) -> Result<(), Self::Error>;
}

/// A simulated frame, handed to the render stage.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct SimulatedFrame<F> {
    /// The slot whose particles and neighbour lists are now current
    pub slot: FrameSlot,
    /// Frames simulated so far, including this one
    pub number: u64,
    /// Signalled when the simulation of this frame is done. Render work must be ordered after it.
    pub completion: F,
}

/// What happened when the render stage was asked to draw a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderOutcome<F> {
    /// Render work was submitted, the fence is signalled when it stops reading the slot
    Submitted(F),
    /// The render target went out of date, nothing was submitted
    Outdated,
}

/// The external consumer of simulated particles.
pub trait RenderStage<D: Device> {
    /// Submit render work reading `frame.slot`'s buffers, ordered after `frame.completion`.
    ///
    /// # Errors
    /// Unrecoverable render failures. Recoverable ones are [`RenderOutcome::Outdated`].
    fn render(
        &mut self,
        device: &mut D,
        frame: &SimulatedFrame<D::Fence>,
    ) -> Result<RenderOutcome<D::Fence>, D::Error>;

    /// Recreate render resources after [`RenderOutcome::Outdated`]. Simulation state is left
    /// alone.
    ///
    /// # Errors
    /// If the resources can't be recreated.
    fn rebuild(&mut self, device: &mut D) -> Result<(), D::Error>;
}
