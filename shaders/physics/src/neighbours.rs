//! Gathering each particle's neighbours from the 27 cells around it.
//!
//! Scan order is fixed: `dz` outermost, then `dy`, then `dx`, each over `-1, 0, 1`; within a cell,
//! ascending sorted slot. When a list fills up the remaining candidates are dropped, so in dense
//! regions the list holds the first candidates in scan order, not the nearest ones.

use pbf_cpu_gpu_shared::{
    glam::IVec3, CellRange, NeighbourSearchSettings, Particle, EMPTY_CELL, NO_NEIGHBOUR,
};

use crate::{cell_ranges, hash};

/// Cells in a 3x3x3 neighbourhood.
const NEIGHBOURHOOD_CELLS: usize = 27;

/// Write the neighbour list of particle `id`.
pub fn gather(
    id: usize,
    settings: &NeighbourSearchSettings,
    particles: &[Particle],
    sorted: &[u32],
    ranges: &[CellRange],
    neighbours: &mut [u32],
) {
    if id >= settings.particle_count as usize {
        return;
    }

    let max_neighbours = settings.max_neighbours as usize;
    let list_start = id * max_neighbours;
    let position = particles[id].position.truncate();
    let home = hash::cell_coord(position, settings.cell_size);
    let radius_squared = settings.smoothing_radius * settings.smoothing_radius;

    // Two cells of the neighbourhood can collide into one hash bucket; scanning its run twice
    // would list the same particles twice.
    let mut visited = [EMPTY_CELL; NEIGHBOURHOOD_CELLS];
    let mut visited_count = 0;
    let mut count = 0;

    let mut dz = -1;
    while dz <= 1 {
        let mut dy = -1;
        while dy <= 1 {
            let mut dx = -1;
            while dx <= 1 {
                let cell_hash = hash::hash_cell(home + IVec3::new(dx, dy, dz), settings.hash_size);
                if !contains(&visited, visited_count, cell_hash) {
                    visited[visited_count] = cell_hash;
                    visited_count += 1;

                    let (start, end) = cell_ranges::run(ranges, cell_hash);
                    let mut slot = start as usize;
                    while slot < end as usize && count < max_neighbours {
                        let candidate = sorted[slot];
                        if candidate as usize != id {
                            let offset = particles[candidate as usize].position.truncate() - position;
                            if offset.length_squared() < radius_squared {
                                neighbours[list_start + count] = candidate;
                                count += 1;
                            }
                        }
                        slot += 1;
                    }
                }
                dx += 1;
            }
            dy += 1;
        }
        dz += 1;
    }

    while count < max_neighbours {
        neighbours[list_start + count] = NO_NEIGHBOUR;
        count += 1;
    }
}

fn contains(visited: &[u32; NEIGHBOURHOOD_CELLS], visited_count: usize, cell_hash: u32) -> bool {
    let mut index = 0;
    while index < visited_count {
        if visited[index] == cell_hash {
            return true;
        }
        index += 1;
    }
    false
}

/// Particle `id`'s neighbour list as written by `gather()`. Entries after the first
/// `NO_NEIGHBOUR` are unused.
pub fn list(neighbours: &[u32], id: usize, max_neighbours: u32) -> &[u32] {
    let start = id * max_neighbours as usize;
    &neighbours[start..start + max_neighbours as usize]
}
