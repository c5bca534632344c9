//! Spatial hashing of particles into a uniform grid.

use pbf_cpu_gpu_shared::{
    glam::{IVec3, Vec3},
    CellRange, NeighbourSearchSettings, Particle,
};

/// Large primes from Teschner et al. 2003, "Optimized Spatial Hashing for Collision Detection of
/// Deformable Objects".
const PRIMES: [u32; 3] = [73_856_093, 19_349_663, 83_492_791];

/// The grid cell containing `position`.
pub fn cell_coord(position: Vec3, cell_size: f32) -> IVec3 {
    (position / cell_size).floor().as_ivec3()
}

/// Fold a cell coordinate into `[0, hash_size)`. Different cells can share a hash.
pub fn hash_cell(cell: IVec3, hash_size: u32) -> u32 {
    let folded = (cell.x as u32).wrapping_mul(PRIMES[0])
        ^ (cell.y as u32).wrapping_mul(PRIMES[1])
        ^ (cell.z as u32).wrapping_mul(PRIMES[2]);
    folded % hash_size
}

/// Hash particle `id` and reset its density. Also clears the two cell range records owned by
/// this invocation, so stale runs from last frame can't be found.
pub fn cell_hash(
    id: usize,
    settings: &NeighbourSearchSettings,
    particles: &mut [Particle],
    cell_hashes: &mut [u32],
    cell_ranges: &mut [CellRange],
) {
    if id >= settings.particle_count as usize {
        return;
    }

    let position = particles[id].position.truncate();
    cell_hashes[id] = hash_cell(cell_coord(position, settings.cell_size), settings.hash_size);
    particles[id].density = 0.0;

    let first_record = id * 2;
    cell_ranges[first_record] = CellRange::EMPTY;
    cell_ranges[first_record + 1] = CellRange::EMPTY;
}
