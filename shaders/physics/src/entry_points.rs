//! SPIR-V entry points. Binding numbers must match the host's bind group layout.

use pbf_cpu_gpu_shared::{
    glam::UVec3, BoxSettings, CellRange, NeighbourSearchSettings, Particle, RadixPass,
    SimulationSettings,
};
use spirv_std::spirv;

use crate::{
    cell_ranges, hash, integrate, neighbours, radix_sort, solver, viscosity, vorticity,
};

/// Prediction entrypoint
#[spirv(compute(threads(256)))]
pub fn integrate(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 0)] settings: &SimulationSettings,
    #[spirv(uniform, descriptor_set = 0, binding = 2)] bounds: &BoxSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 3)] previous: &[Particle],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] particles: &mut [Particle],
) {
    integrate::predict(id.x as usize, settings, bounds, previous, particles);
}

/// Cell hashing entrypoint
#[spirv(compute(threads(256)))]
pub fn cell_hash(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] particles: &mut [Particle],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 5)] cell_hashes: &mut [u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 10)] cell_ranges: &mut [CellRange],
) {
    hash::cell_hash(id.x as usize, search, particles, cell_hashes, cell_ranges);
}

/// Radix sort counting entrypoint, one lane per digit value
#[spirv(compute(threads(16)))]
pub fn radix_histogram(
    #[spirv(workgroup_id)] workgroup: UVec3,
    #[spirv(local_invocation_id)] lane: UVec3,
    #[spirv(push_constant)] radix: &RadixPass,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 5)] cell_hashes: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 6)] source: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 8)] buckets: &mut [u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 9)] ranks: &mut [u32],
) {
    radix_sort::histogram(
        workgroup.x as usize,
        lane.x as usize,
        search,
        radix.pass,
        cell_hashes,
        source,
        buckets,
        ranks,
    );
}

/// Radix sort prefix sum entrypoint
#[spirv(compute(threads(1)))]
pub fn radix_scan(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 8)] buckets: &mut [u32],
) {
    if id.x == 0 {
        radix_sort::scan(search, buckets);
    }
}

/// Radix sort reordering entrypoint
#[spirv(compute(threads(256)))]
pub fn radix_scatter(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(push_constant)] radix: &RadixPass,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 5)] cell_hashes: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 6)] source: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 7)] destination: &mut [u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 8)] buckets: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 9)] ranks: &[u32],
) {
    radix_sort::scatter(
        id.x as usize,
        search,
        radix.pass,
        cell_hashes,
        source,
        buckets,
        ranks,
        destination,
    );
}

/// Cell range fixup entrypoint
#[spirv(compute(threads(256)))]
pub fn cell_ranges(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 5)] cell_hashes: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 6)] sorted: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 10)] cell_ranges: &mut [CellRange],
) {
    cell_ranges::resolve(id.x as usize, search, cell_hashes, sorted, cell_ranges);
}

/// Neighbour list entrypoint
#[spirv(compute(threads(256)))]
pub fn neighbours(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] particles: &[Particle],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 6)] sorted: &[u32],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 10)] cell_ranges: &[CellRange],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 11)] neighbours: &mut [u32],
) {
    neighbours::gather(id.x as usize, search, particles, sorted, cell_ranges, neighbours);
}

/// Density constraint entrypoint
#[spirv(compute(threads(256)))]
pub fn lambda(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 0)] settings: &SimulationSettings,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] particles: &mut [Particle],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 11)] neighbours: &[u32],
) {
    solver::lambda(id.x as usize, settings, search, particles, neighbours);
}

/// Position correction entrypoint
#[spirv(compute(threads(256)))]
pub fn delta_position(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 0)] settings: &SimulationSettings,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] particles: &mut [Particle],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 11)] neighbours: &[u32],
) {
    solver::delta_position(id.x as usize, settings, search, particles, neighbours);
}

/// Applies a correction
#[spirv(compute(threads(256)))]
pub fn position_update(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(uniform, descriptor_set = 0, binding = 2)] bounds: &BoxSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] particles: &mut [Particle],
) {
    solver::position_update(id.x as usize, search, bounds, particles);
}

/// Velocity from displacement entrypoint
#[spirv(compute(threads(256)))]
pub fn velocity_update(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 0)] settings: &SimulationSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] particles: &mut [Particle],
) {
    solver::velocity_update(id.x as usize, settings, particles);
}

/// Velocity snapshot and curl entrypoint
#[spirv(compute(threads(256)))]
pub fn velocity_cache(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 0)] settings: &SimulationSettings,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] particles: &mut [Particle],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 11)] neighbours: &[u32],
) {
    viscosity::velocity_cache(id.x as usize, settings, search, particles, neighbours);
}

/// XSPH entrypoint
#[spirv(compute(threads(256)))]
pub fn viscosity(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 0)] settings: &SimulationSettings,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] particles: &mut [Particle],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 11)] neighbours: &[u32],
) {
    viscosity::viscosity(id.x as usize, settings, search, particles, neighbours);
}

/// Vorticity confinement entrypoint
#[spirv(compute(threads(256)))]
pub fn vorticity(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(uniform, descriptor_set = 0, binding = 0)] settings: &SimulationSettings,
    #[spirv(uniform, descriptor_set = 0, binding = 1)] search: &NeighbourSearchSettings,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] particles: &mut [Particle],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 11)] neighbours: &[u32],
) {
    vorticity::vorticity(id.x as usize, settings, search, particles, neighbours);
}
