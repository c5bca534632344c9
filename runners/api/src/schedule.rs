//! Barrier placement.
//!
//! Stages are grouped into segments. Nothing inside a segment depends on anything else inside
//! it, and every segment starts with a barrier. A stage opens a new segment when it would:
//!   * read something the current segment writes (read after write),
//!   * write something the current segment writes (write after write),
//!   * write something the current segment reads (write after read).

use crate::{
    frame::FrameSlot,
    pipeline::{Kernel, PipelineDescriptor, Resource, Stage},
    Error,
};

/// One step of recording a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command<'stage> {
    /// Make all earlier writes visible to everything after
    Barrier,
    /// Run a stage
    Dispatch(&'stage Stage),
}

/// A frame's stages with derived barriers. Built once per slot and reused every frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    /// The slot this schedule simulates
    slot: FrameSlot,
    /// Barrier separated groups of independent stages
    segments: Vec<Vec<Stage>>,
}

/// What the segment being built reads and writes so far.
#[derive(Default)]
struct Hazards {
    /// Resources read
    reads: Vec<Resource>,
    /// Resources written
    writes: Vec<Resource>,
}

impl Hazards {
    /// Whether `stage` has to wait for the segment to finish.
    fn conflicts_with(&self, stage: &Stage) -> bool {
        stage.accesses().any(|(resource, access)| {
            let read_after_write = access.reads() && self.writes.contains(&resource);
            let write_after_any = access.writes()
                && (self.writes.contains(&resource) || self.reads.contains(&resource));
            read_after_write || write_after_any
        })
    }

    /// Add `stage`'s accesses to the segment.
    fn record(&mut self, stage: &Stage) {
        for (resource, access) in stage.accesses() {
            if access.reads() && !self.reads.contains(&resource) {
                self.reads.push(resource);
            }
            if access.writes() && !self.writes.contains(&resource) {
                self.writes.push(resource);
            }
        }
    }
}

impl Schedule {
    /// Place barriers between `stages`, keeping their order.
    #[must_use]
    pub fn new(slot: FrameSlot, stages: Vec<Stage>) -> Self {
        let mut segments: Vec<Vec<Stage>> = Vec::new();
        let mut current: Vec<Stage> = Vec::new();
        let mut hazards = Hazards::default();

        for stage in stages {
            if hazards.conflicts_with(&stage) {
                segments.push(core::mem::take(&mut current));
                hazards = Hazards::default();
            }
            hazards.record(&stage);
            current.push(stage);
        }
        if !current.is_empty() {
            segments.push(current);
        }

        log::trace!(
            "Scheduled slot {} into {} segments",
            slot.index(),
            segments.len()
        );
        Self { slot, segments }
    }

    /// The full frame for `slot`, checked against the descriptor.
    ///
    /// # Errors
    /// If a dispatch is too small for its work.
    #[inline]
    pub fn for_frame(
        descriptor: &PipelineDescriptor,
        slot: FrameSlot,
        frames_in_flight: usize,
    ) -> Result<Self, Error> {
        let schedule = Self::new(slot, descriptor.stages(slot, frames_in_flight));
        schedule.validate(descriptor)?;
        Ok(schedule)
    }

    /// Check every dispatch launches enough invocations.
    ///
    /// # Errors
    /// [`Error::DispatchMismatch`] naming the first undersized dispatch.
    #[inline]
    pub fn validate(&self, descriptor: &PipelineDescriptor) -> Result<(), Error> {
        for stage in self.segments.iter().flatten() {
            let required = descriptor.required_invocations(stage.kernel);
            let covered = stage.invocations();
            if covered < required {
                return Err(Error::DispatchMismatch {
                    kernel: stage.kernel,
                    covered,
                    required,
                });
            }
        }
        Ok(())
    }

    /// The slot simulated.
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> FrameSlot {
        self.slot
    }

    /// The barrier separated segments. The GPU runner records one compute pass per segment.
    #[inline]
    #[must_use]
    pub fn passes(&self) -> &[Vec<Stage>] {
        &self.segments
    }

    /// Barriers and dispatches in recording order.
    #[inline]
    pub fn commands(&self) -> impl Iterator<Item = Command<'_>> {
        self.segments.iter().flat_map(|segment| {
            core::iter::once(Command::Barrier).chain(segment.iter().map(Command::Dispatch))
        })
    }

    /// The kernels dispatched, in order.
    #[inline]
    pub fn kernels(&self) -> impl Iterator<Item = Kernel> + '_ {
        self.segments.iter().flatten().map(|stage| stage.kernel)
    }

    /// Number of barriers, including the one at the start.
    #[inline]
    #[must_use]
    pub fn barrier_count(&self) -> usize {
        self.segments.len()
    }

    /// Whether the stage at `index` only writes resources nobody else in its segment touches.
    fn is_isolated_in(segment: &[Stage], index: usize) -> bool {
        let Some(stage) = segment.get(index) else {
            return false;
        };
        segment
            .iter()
            .enumerate()
            .filter(|&(other, _)| other != index)
            .all(|(_, other)| {
                stage.accesses().all(|(resource, access)| {
                    !access.writes()
                        || other
                            .accesses()
                            .all(|(other_resource, _)| other_resource != resource)
                })
            })
    }

    /// Check no segment holds two stages that conflict.
    #[must_use]
    pub fn is_hazard_free(&self) -> bool {
        self.segments.iter().all(|segment| {
            (0..segment.len()).all(|index| Self::is_isolated_in(segment, index))
        })
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod tests {
    use crate::{frame::Parity, pipeline::BindingSet};

    use super::*;

    fn stage(kernel: Kernel) -> Stage {
        Stage {
            kernel,
            bindings: BindingSet::new(FrameSlot::new(0), 2, Parity::Even),
            workgroups: [1, 1, 1],
            radix_pass: None,
        }
    }

    fn frame(particle_count: usize) -> Schedule {
        let descriptor = PipelineDescriptor::new(particle_count).unwrap();
        Schedule::for_frame(&descriptor, FrameSlot::new(0), 2).unwrap()
    }

    #[test]
    fn independent_stages_share_a_segment() {
        let schedule = Schedule::new(
            FrameSlot::new(0),
            vec![stage(Kernel::CellHash), stage(Kernel::RadixScan)],
        );

        assert_eq!(schedule.barrier_count(), 1);
        assert_eq!(schedule.passes()[0].len(), 2);
    }

    #[test]
    fn reading_what_was_just_written_needs_a_barrier() {
        let schedule = Schedule::new(
            FrameSlot::new(0),
            vec![stage(Kernel::CellHash), stage(Kernel::RadixHistogram)],
        );

        assert_eq!(schedule.barrier_count(), 2);
    }

    #[test]
    fn overwriting_what_was_just_read_needs_a_barrier() {
        let schedule = Schedule::new(
            FrameSlot::new(0),
            vec![stage(Kernel::RadixScatter), stage(Kernel::RadixHistogram)],
        );

        assert_eq!(schedule.barrier_count(), 2);
    }

    #[test]
    fn commands_start_with_a_barrier() {
        let schedule = frame(100);
        let commands: Vec<Command<'_>> = schedule.commands().collect();

        assert_eq!(commands[0], Command::Barrier);
        let dispatches = commands
            .iter()
            .filter(|command| matches!(command, Command::Dispatch(_)))
            .count();
        assert_eq!(dispatches, 42);
        assert_eq!(commands.len(), 42 + schedule.barrier_count());
    }

    #[test]
    fn every_dependent_frame_stage_is_separated() {
        let schedule = frame(1000);

        assert!(schedule.is_hazard_free());
        // Integrate and the hash both write particles, then everything after is a chain.
        assert_eq!(schedule.barrier_count(), 42);
    }

    #[test]
    fn every_sort_sub_stage_is_barrier_separated() {
        let schedule = frame(600);
        for segment in schedule.passes() {
            let sort_stages = segment
                .iter()
                .filter(|stage| {
                    matches!(
                        stage.kernel,
                        Kernel::RadixHistogram | Kernel::RadixScan | Kernel::RadixScatter
                    )
                })
                .count();
            assert!(sort_stages <= 1);
        }
    }

    #[test]
    fn undersized_dispatches_are_rejected() {
        let descriptor = PipelineDescriptor::new(1000).unwrap();
        let schedule = Schedule::new(FrameSlot::new(0), vec![stage(Kernel::Lambda)]);

        let result = schedule.validate(&descriptor);

        assert!(matches!(
            result,
            Err(Error::DispatchMismatch {
                kernel: Kernel::Lambda,
                covered: 256,
                required: 1000,
            })
        ));
    }

    #[test]
    fn the_frame_keeps_the_second_velocity_cache() {
        let kernels: Vec<Kernel> = frame(10).kernels().collect();
        let caches = kernels
            .iter()
            .filter(|&&kernel| kernel == Kernel::VelocityCache)
            .count();

        assert_eq!(caches, 2);
        assert_eq!(kernels.last(), Some(&Kernel::Vorticity));
    }
}
