//! The kernels, what they bind and the order they run in.
//!
//! A frame is a fixed list of [`Stage`]s. Each stage declares which resources it reads and
//! writes, which is all [`crate::Schedule`] needs to place barriers.

use pbf_cpu_gpu_shared::{
    workgroup_count, CORRECTION_ITERATIONS, RADIX_BUCKETS, RADIX_PASSES, WORKGROUP_SIZE,
};

use crate::{
    frame::{FrameSlot, Parity},
    particles, Error,
};

/// A binding slot of descriptor set 0. Every kernel shares the same layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    /// `SimulationSettings` uniform
    SimulationSettings,
    /// `NeighbourSearchSettings` uniform
    NeighbourSearchSettings,
    /// `BoxSettings` uniform
    BoxSettings,
    /// Particles written by the previous frame
    PreviousParticles,
    /// Particles of the frame being simulated
    Particles,
    /// One cell hash per particle
    CellHashes,
    /// The sorted permutation a radix pass reads
    SortedSource,
    /// The sorted permutation a radix pass writes
    SortedDestination,
    /// Global digit counts and offsets
    Buckets,
    /// Each sorted slot's rank within its workgroup and digit
    Ranks,
    /// Per hash start and end of runs in the sorted permutation
    CellRanges,
    /// Neighbour lists of the frame being simulated
    Neighbours,
}

impl Binding {
    /// Every binding, in binding number order.
    pub const ALL: [Self; 12] = [
        Self::SimulationSettings,
        Self::NeighbourSearchSettings,
        Self::BoxSettings,
        Self::PreviousParticles,
        Self::Particles,
        Self::CellHashes,
        Self::SortedSource,
        Self::SortedDestination,
        Self::Buckets,
        Self::Ranks,
        Self::CellRanges,
        Self::Neighbours,
    ];

    /// The binding number used in the shaders.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        match self {
            Self::SimulationSettings => 0,
            Self::NeighbourSearchSettings => 1,
            Self::BoxSettings => 2,
            Self::PreviousParticles => 3,
            Self::Particles => 4,
            Self::CellHashes => 5,
            Self::SortedSource => 6,
            Self::SortedDestination => 7,
            Self::Buckets => 8,
            Self::Ranks => 9,
            Self::CellRanges => 10,
            Self::Neighbours => 11,
        }
    }

    /// Whether this is a uniform rather than a storage buffer.
    #[inline]
    #[must_use]
    pub const fn is_uniform(self) -> bool {
        matches!(
            self,
            Self::SimulationSettings | Self::NeighbourSearchSettings | Self::BoxSettings
        )
    }

    /// Whether no kernel ever writes through this binding.
    #[inline]
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        self.is_uniform() || matches!(self, Self::PreviousParticles)
    }
}

/// How a kernel uses a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    /// Only read
    Read,
    /// Only written
    Write,
    /// Both
    ReadWrite,
}

impl Access {
    /// Whether the binding is read.
    #[inline]
    #[must_use]
    pub const fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Whether the binding is written.
    #[inline]
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Shorthands for the access tables below.
const SIM: (Binding, Access) = (Binding::SimulationSettings, Access::Read);
const SEARCH: (Binding, Access) = (Binding::NeighbourSearchSettings, Access::Read);
const BOX: (Binding, Access) = (Binding::BoxSettings, Access::Read);

/// Reads and writes of the solver kernels that walk neighbour lists.
const NEIGHBOURHOOD_SOLVER: &[(Binding, Access)] = &[
    SIM,
    SEARCH,
    (Binding::Particles, Access::ReadWrite),
    (Binding::Neighbours, Access::Read),
];

/// The 14 compute kernels, one SPIR-V entry point each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Euler prediction from last frame's particles
    Integrate,
    /// Hash particles into grid cells and clear the cell range table
    CellHash,
    /// Per workgroup digit counts and ranks
    RadixHistogram,
    /// Exclusive scan over all digit counts
    RadixScan,
    /// Reorder the permutation by the current digit
    RadixScatter,
    /// Find each cell's run in the sorted permutation
    CellRanges,
    /// Build the neighbour lists
    Neighbours,
    /// Density constraint and its multiplier
    Lambda,
    /// Position correction
    DeltaPosition,
    /// Apply the position correction
    PositionUpdate,
    /// Velocity from displacement
    VelocityUpdate,
    /// Velocity snapshot and curl
    VelocityCache,
    /// XSPH viscosity
    Viscosity,
    /// Vorticity confinement
    Vorticity,
}

impl Kernel {
    /// Every kernel, in the order they first appear in a frame.
    pub const ALL: [Self; 14] = [
        Self::Integrate,
        Self::CellHash,
        Self::RadixHistogram,
        Self::RadixScan,
        Self::RadixScatter,
        Self::CellRanges,
        Self::Neighbours,
        Self::Lambda,
        Self::DeltaPosition,
        Self::PositionUpdate,
        Self::VelocityUpdate,
        Self::VelocityCache,
        Self::Viscosity,
        Self::Vorticity,
    ];

    /// Name of the SPIR-V entry point.
    #[inline]
    #[must_use]
    pub const fn entry_point(self) -> &'static str {
        match self {
            Self::Integrate => "integrate",
            Self::CellHash => "cell_hash",
            Self::RadixHistogram => "radix_histogram",
            Self::RadixScan => "radix_scan",
            Self::RadixScatter => "radix_scatter",
            Self::CellRanges => "cell_ranges",
            Self::Neighbours => "neighbours",
            Self::Lambda => "lambda",
            Self::DeltaPosition => "delta_position",
            Self::PositionUpdate => "position_update",
            Self::VelocityUpdate => "velocity_update",
            Self::VelocityCache => "velocity_cache",
            Self::Viscosity => "viscosity",
            Self::Vorticity => "vorticity",
        }
    }

    /// Invocations per workgroup, as declared by the entry point.
    #[inline]
    #[must_use]
    pub const fn workgroup_size(self) -> u32 {
        match self {
            Self::RadixHistogram => RADIX_BUCKETS,
            Self::RadixScan => 1,
            _ => WORKGROUP_SIZE,
        }
    }

    /// Whether the kernel reads the `RadixPass` push constant.
    #[inline]
    #[must_use]
    pub const fn uses_radix_pass(self) -> bool {
        matches!(self, Self::RadixHistogram | Self::RadixScatter)
    }

    /// The bindings the kernel touches and how.
    #[inline]
    #[must_use]
    pub const fn accesses(self) -> &'static [(Binding, Access)] {
        match self {
            Self::Integrate => &[
                SIM,
                BOX,
                (Binding::PreviousParticles, Access::Read),
                (Binding::Particles, Access::Write),
            ],
            Self::CellHash => &[
                SEARCH,
                (Binding::Particles, Access::ReadWrite),
                (Binding::CellHashes, Access::Write),
                (Binding::CellRanges, Access::Write),
            ],
            Self::RadixHistogram => &[
                SEARCH,
                (Binding::CellHashes, Access::Read),
                (Binding::SortedSource, Access::Read),
                (Binding::Buckets, Access::Write),
                (Binding::Ranks, Access::Write),
            ],
            Self::RadixScan => &[SEARCH, (Binding::Buckets, Access::ReadWrite)],
            Self::RadixScatter => &[
                SEARCH,
                (Binding::CellHashes, Access::Read),
                (Binding::SortedSource, Access::Read),
                (Binding::Buckets, Access::Read),
                (Binding::Ranks, Access::Read),
                (Binding::SortedDestination, Access::Write),
            ],
            Self::CellRanges => &[
                SEARCH,
                (Binding::CellHashes, Access::Read),
                (Binding::SortedSource, Access::Read),
                (Binding::CellRanges, Access::ReadWrite),
            ],
            Self::Neighbours => &[
                SEARCH,
                (Binding::Particles, Access::Read),
                (Binding::SortedSource, Access::Read),
                (Binding::CellRanges, Access::Read),
                (Binding::Neighbours, Access::Write),
            ],
            Self::Lambda
            | Self::DeltaPosition
            | Self::VelocityCache
            | Self::Viscosity
            | Self::Vorticity => NEIGHBOURHOOD_SOLVER,
            Self::PositionUpdate => &[SEARCH, BOX, (Binding::Particles, Access::ReadWrite)],
            Self::VelocityUpdate => &[SIM, SEARCH, (Binding::Particles, Access::ReadWrite)],
        }
    }
}

/// A concrete buffer. Bindings resolve to resources through a [`BindingSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    /// `SimulationSettings` uniform buffer
    SimulationSettings,
    /// `NeighbourSearchSettings` uniform buffer
    NeighbourSearchSettings,
    /// `BoxSettings` uniform buffer
    BoxSettings,
    /// A slot's particle buffer
    Particles(FrameSlot),
    /// Cell hash buffer
    CellHashes,
    /// One of the two sorted permutation buffers
    Sorted(usize),
    /// Global bucket table
    Buckets,
    /// Local rank buffer
    Ranks,
    /// Cell range table
    CellRanges,
    /// A slot's neighbour list buffer
    Neighbours(FrameSlot),
}

/// Everything that decides which resources the bindings point at. The GPU runner keeps one
/// bind group per set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindingSet {
    /// The slot being simulated
    pub slot: FrameSlot,
    /// The slot simulated last frame
    pub previous: FrameSlot,
    /// Which sorted buffer is the source
    pub parity: Parity,
}

impl BindingSet {
    /// The set for simulating `slot` with the given sort parity.
    #[inline]
    #[must_use]
    pub const fn new(slot: FrameSlot, frames_in_flight: usize, parity: Parity) -> Self {
        Self {
            slot,
            previous: slot.previous(frames_in_flight),
            parity,
        }
    }

    /// What `binding` points at in this set.
    #[inline]
    #[must_use]
    pub const fn resource(&self, binding: Binding) -> Resource {
        match binding {
            Binding::SimulationSettings => Resource::SimulationSettings,
            Binding::NeighbourSearchSettings => Resource::NeighbourSearchSettings,
            Binding::BoxSettings => Resource::BoxSettings,
            Binding::PreviousParticles => Resource::Particles(self.previous),
            Binding::Particles => Resource::Particles(self.slot),
            Binding::CellHashes => Resource::CellHashes,
            Binding::SortedSource => Resource::Sorted(self.parity.source_index()),
            Binding::SortedDestination => Resource::Sorted(self.parity.destination_index()),
            Binding::Buckets => Resource::Buckets,
            Binding::Ranks => Resource::Ranks,
            Binding::CellRanges => Resource::CellRanges,
            Binding::Neighbours => Resource::Neighbours(self.slot),
        }
    }
}

/// One dispatch of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stage {
    /// What runs
    pub kernel: Kernel,
    /// What it is bound to
    pub bindings: BindingSet,
    /// Workgroup counts in x, y and z
    pub workgroups: [u32; 3],
    /// The digit pass, for the radix sort kernels
    pub radix_pass: Option<u32>,
}

impl Stage {
    /// The resources this stage touches and how.
    #[inline]
    pub fn accesses(&self) -> impl Iterator<Item = (Resource, Access)> + '_ {
        self.kernel
            .accesses()
            .iter()
            .map(|&(binding, access)| (self.bindings.resource(binding), access))
    }

    /// Total invocations launched.
    #[inline]
    #[must_use]
    pub fn invocations(&self) -> u64 {
        self.workgroups
            .iter()
            .fold(u64::from(self.kernel.workgroup_size()), |total, &count| {
                total.saturating_mul(u64::from(count))
            })
    }
}

/// Builds the fixed kernel sequence of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineDescriptor {
    /// Number of particles
    particle_count: u32,
    /// Per-particle workgroups
    workgroup_count: u32,
}

impl PipelineDescriptor {
    /// A descriptor for `particle_count` particles.
    ///
    /// # Errors
    /// If the count is 0 or not below [`pbf_cpu_gpu_shared::PARTICLE_COUNT_LIMIT`].
    #[inline]
    pub fn new(particle_count: usize) -> Result<Self, Error> {
        let count = particles::validate_count(particle_count)?;
        Ok(Self {
            particle_count: count,
            workgroup_count: workgroup_count(count),
        })
    }

    /// Number of particles.
    #[inline]
    #[must_use]
    pub const fn particle_count(&self) -> u32 {
        self.particle_count
    }

    /// Per-particle workgroups, also the histogram's workgroup count.
    #[inline]
    #[must_use]
    pub const fn workgroup_count(&self) -> u32 {
        self.workgroup_count
    }

    /// The invocations `kernel` must launch to cover its work.
    #[inline]
    #[must_use]
    pub fn required_invocations(&self, kernel: Kernel) -> u64 {
        match kernel {
            Kernel::RadixHistogram => {
                u64::from(self.workgroup_count) * u64::from(RADIX_BUCKETS)
            }
            Kernel::RadixScan => 1,
            _ => u64::from(self.particle_count),
        }
    }

    /// The stages of one frame simulating `slot`, in submission order.
    #[must_use]
    pub fn stages(&self, slot: FrameSlot, frames_in_flight: usize) -> Vec<Stage> {
        let sorted = BindingSet::new(slot, frames_in_flight, Parity::after_passes(RADIX_PASSES));
        let per_particle = |kernel| Stage {
            kernel,
            bindings: sorted,
            workgroups: [self.workgroup_count, 1, 1],
            radix_pass: None,
        };

        let mut stages = vec![per_particle(Kernel::Integrate), per_particle(Kernel::CellHash)];

        for pass in 0..RADIX_PASSES {
            let bindings = BindingSet::new(slot, frames_in_flight, Parity::after_passes(pass));
            stages.push(Stage {
                kernel: Kernel::RadixHistogram,
                bindings,
                workgroups: [self.workgroup_count, 1, 1],
                radix_pass: Some(pass),
            });
            stages.push(Stage {
                kernel: Kernel::RadixScan,
                bindings,
                workgroups: [1, 1, 1],
                radix_pass: None,
            });
            stages.push(Stage {
                kernel: Kernel::RadixScatter,
                bindings,
                workgroups: [self.workgroup_count, 1, 1],
                radix_pass: Some(pass),
            });
        }

        stages.push(per_particle(Kernel::CellRanges));
        stages.push(per_particle(Kernel::Neighbours));

        for _ in 0..CORRECTION_ITERATIONS {
            stages.push(per_particle(Kernel::Lambda));
            stages.push(per_particle(Kernel::DeltaPosition));
            stages.push(per_particle(Kernel::PositionUpdate));
        }

        // The cache is refreshed after viscosity because vorticity reads the curl it computes.
        for kernel in [
            Kernel::VelocityUpdate,
            Kernel::VelocityCache,
            Kernel::Viscosity,
            Kernel::VelocityCache,
            Kernel::Vorticity,
        ] {
            stages.push(per_particle(kernel));
        }

        stages
    }
}
