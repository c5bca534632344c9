//! Code shared by both the CPU and GPU
//!
//! Everything here has the same memory layout on the host and in the kernels, so it can be
//! `bytemuck`ed straight into GPU buffers.

#![cfg_attr(target_arch = "spirv", no_std)]

cfg_if::cfg_if! {
    if #[cfg(target_arch = "spirv")] {
        pub use spirv_std::glam;
    } else {
        pub use glam;
    }
}

#[cfg(not(target_arch = "spirv"))]
use bytemuck::{Pod, Zeroable};

use crate::glam::{Vec3, Vec4};

/// Invocations in one workgroup of the per-particle kernels.
pub const WORKGROUP_SIZE: u32 = 256;

/// Particle counts must stay below this, so that the global bucket table can always be scanned
/// by a single workgroup.
pub const PARTICLE_COUNT_LIMIT: u32 = WORKGROUP_SIZE * WORKGROUP_SIZE;

/// Bits of the cell hash consumed by one radix sort pass.
pub const RADIX_BITS: u32 = 4;

/// Distinct digit values per radix pass.
pub const RADIX_BUCKETS: u32 = 1 << RADIX_BITS;

/// Passes needed to sort a full `u32` key.
pub const RADIX_PASSES: u32 = u32::BITS / RADIX_BITS;

/// The hash table has this many buckets per particle.
pub const HASH_SIZE_FACTOR: u32 = 2;

/// Fixed number of density constraint iterations per frame.
pub const CORRECTION_ITERATIONS: u32 = 3;

/// Marks unused entries at the end of a particle's neighbour list.
pub const NO_NEIGHBOUR: u32 = u32::MAX;

/// The `cell_id` of a cell range record that doesn't hold any particles this frame.
pub const EMPTY_CELL: u32 = u32::MAX;

/// A single fluid particle.
///
/// Only the `xyz` components of the vectors are used, `w` keeps the struct 16 byte aligned for
/// storage buffers.
#[derive(Clone, Copy, Default)]
#[cfg_attr(not(target_arch = "spirv"), derive(Debug, PartialEq, Pod, Zeroable))]
#[repr(C)]
#[expect(clippy::exhaustive_structs, reason = "The layout is fixed by the GPU buffers")]
pub struct Particle {
    /// Predicted, and after the solver, final position
    pub position: Vec4,
    /// Velocity
    pub velocity: Vec4,
    /// Position at the start of the frame, before prediction
    pub previous_position: Vec4,
    /// Snapshot of the velocity, read by the viscosity pass so it never sees half updated data
    pub cached_velocity: Vec4,
    /// Correction calculated by the current solver iteration
    pub delta_position: Vec4,
    /// Curl of the velocity field around the particle
    pub curl: Vec4,
    /// Density from the latest constraint evaluation
    pub density: f32,
    /// Lagrange multiplier of the density constraint
    pub lambda: f32,
    /// Unused
    pub padding: [f32; 2],
}

impl Particle {
    /// A particle at rest apart from its velocity.
    #[inline]
    #[must_use]
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position: position.extend(0.0),
            velocity: velocity.extend(0.0),
            previous_position: position.extend(0.0),
            ..Default::default()
        }
    }
}

/// The contiguous run of sorted particle slots that share a cell hash.
#[derive(Clone, Copy)]
#[cfg_attr(not(target_arch = "spirv"), derive(Debug, PartialEq, Eq, Pod, Zeroable))]
#[repr(C)]
#[expect(clippy::exhaustive_structs, reason = "The layout is fixed by the GPU buffers")]
pub struct CellRange {
    /// The hash this record belongs to, or `EMPTY_CELL`
    pub cell_id: u32,
    /// First sorted slot of the run
    pub start: u32,
    /// One past the last sorted slot of the run
    pub end: u32,
    /// Unused
    pub padding: u32,
}

impl CellRange {
    /// A record for a cell without particles.
    pub const EMPTY: Self = Self {
        cell_id: EMPTY_CELL,
        start: 0,
        end: 0,
        padding: 0,
    };
}

impl Default for CellRange {
    #[inline]
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Per-frame settings for the solver kernels. Bound as a uniform.
#[derive(Clone, Copy, Default)]
#[cfg_attr(not(target_arch = "spirv"), derive(Debug, PartialEq, Pod, Zeroable))]
#[repr(C)]
#[expect(clippy::exhaustive_structs, reason = "The layout is fixed by the GPU buffers")]
pub struct SimulationSettings {
    /// Time step of this frame
    pub dt: f32,
    /// Simulated time since the start, including this frame
    pub accumulated_time: f32,
    /// Number of particles
    pub particle_count: u32,
    /// Unused
    pub padding_0: u32,
    /// Acceleration applied during prediction, `w` unused
    pub gravity: Vec4,
    /// The SPH kernel radius
    pub smoothing_radius: f32,
    /// Target density of the fluid
    pub rest_density: f32,
    /// Mass of every particle
    pub particle_mass: f32,
    /// Constraint force mixing added to the lambda denominator
    pub relaxation: f32,
    /// Strength of the artificial pressure that counters particle clumping
    pub tensile_k: f32,
    /// Reference distance of the artificial pressure, as a fraction of the smoothing radius
    pub tensile_delta_q: f32,
    /// XSPH viscosity coefficient
    pub viscosity: f32,
    /// Vorticity confinement strength
    pub vorticity: f32,
}

/// Settings for the neighbour search kernels. Bound as a uniform.
#[derive(Clone, Copy, Default)]
#[cfg_attr(not(target_arch = "spirv"), derive(Debug, PartialEq, Pod, Zeroable))]
#[repr(C)]
#[expect(clippy::exhaustive_structs, reason = "The layout is fixed by the GPU buffers")]
pub struct NeighbourSearchSettings {
    /// Number of particles
    pub particle_count: u32,
    /// Workgroups covering all the particles, see `workgroup_count()`
    pub workgroup_count: u32,
    /// Number of buckets in the cell hash table
    pub hash_size: u32,
    /// Capacity of each particle's neighbour list
    pub max_neighbours: u32,
    /// Side length of a grid cell
    pub cell_size: f32,
    /// Particles further apart than this are not neighbours
    pub smoothing_radius: f32,
    /// Unused
    pub padding: [f32; 2],
}

/// The axis aligned box the fluid is kept in. Bound as a uniform.
#[derive(Clone, Copy, Default)]
#[cfg_attr(not(target_arch = "spirv"), derive(Debug, PartialEq, Pod, Zeroable))]
#[repr(C)]
#[expect(clippy::exhaustive_structs, reason = "The layout is fixed by the GPU buffers")]
pub struct BoxSettings {
    /// Lowest corner, `w` unused
    pub min: Vec4,
    /// Highest corner, `w` unused
    pub max: Vec4,
}

impl BoxSettings {
    /// Keep a position inside the box.
    #[inline]
    #[must_use]
    pub fn clamp(&self, position: Vec3) -> Vec3 {
        position.clamp(self.min.truncate(), self.max.truncate())
    }
}

/// Push constant telling the radix sort kernels which digit they are working on.
#[derive(Clone, Copy, Default)]
#[cfg_attr(not(target_arch = "spirv"), derive(Debug, PartialEq, Eq, Pod, Zeroable))]
#[repr(C)]
#[expect(clippy::exhaustive_structs, reason = "The layout is fixed by the GPU buffers")]
pub struct RadixPass {
    /// Zero-based pass, the digit is bits `4 * pass .. 4 * pass + 4` of the hash
    pub pass: u32,
}

/// Number of per-particle workgroups needed for `particle_count` particles.
#[inline]
#[must_use]
pub const fn workgroup_count(particle_count: u32) -> u32 {
    particle_count.div_ceil(WORKGROUP_SIZE)
}

/// Number of buckets in the cell hash table.
#[inline]
#[must_use]
pub const fn hash_size(particle_count: u32) -> u32 {
    particle_count * HASH_SIZE_FACTOR
}

/// Length of the global bucket table. Every digit has a column per workgroup plus one holding
/// where the digit's run ends.
#[inline]
#[must_use]
pub const fn bucket_table_len(workgroup_count: u32) -> u32 {
    RADIX_BUCKETS * (workgroup_count + 1)
}

/// Index into the digit-major global bucket table.
#[inline]
#[must_use]
pub const fn bucket_index(digit: u32, workgroup: u32, workgroup_count: u32) -> usize {
    (digit * (workgroup_count + 1) + workgroup) as usize
}
