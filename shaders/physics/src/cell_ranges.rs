//! The "fixup": finds where each cell's run starts and ends in the sorted permutation.
//!
//! Records are addressed by cell hash. Slot `i` only compares its hash to slot `i - 1`'s, and
//! every field of every record has exactly one writer, so all slots run in parallel.

use pbf_cpu_gpu_shared::{CellRange, NeighbourSearchSettings};

/// Mark any run boundary between sorted slot `id` and the slot before it.
pub fn resolve(
    id: usize,
    settings: &NeighbourSearchSettings,
    cell_hashes: &[u32],
    sorted: &[u32],
    cell_ranges: &mut [CellRange],
) {
    let count = settings.particle_count as usize;
    if id >= count {
        return;
    }

    let hash = cell_hashes[sorted[id] as usize];
    let is_start = if id == 0 {
        true
    } else {
        let previous_hash = cell_hashes[sorted[id - 1] as usize];
        if previous_hash == hash {
            false
        } else {
            cell_ranges[previous_hash as usize].end = id as u32;
            true
        }
    };

    if is_start {
        let record = &mut cell_ranges[hash as usize];
        record.cell_id = hash;
        record.start = id as u32;
    }
    if id == count - 1 {
        cell_ranges[hash as usize].end = count as u32;
    }
}

/// The sorted slots holding particles hashed to `hash`, empty if there are none.
pub fn run(cell_ranges: &[CellRange], hash: u32) -> (u32, u32) {
    let record = cell_ranges[hash as usize];
    if record.cell_id == hash {
        (record.start, record.end)
    } else {
        (0, 0)
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "Tests aren't so strict")]
mod tests {
    use super::*;

    fn settings(particle_count: u32) -> NeighbourSearchSettings {
        NeighbourSearchSettings {
            particle_count,
            hash_size: particle_count * 2,
            ..Default::default()
        }
    }

    fn resolve_all(
        settings: &NeighbourSearchSettings,
        cell_hashes: &[u32],
        sorted: &[u32],
        cell_ranges: &mut [CellRange],
    ) {
        for id in 0..settings.particle_count as usize {
            resolve(id, settings, cell_hashes, sorted, cell_ranges);
        }
    }

    #[test]
    fn finding_runs_in_a_sorted_permutation() {
        let settings = settings(5);
        // Particles 0 and 3 in cell 7, 1 and 4 in cell 2, 2 alone in cell 9.
        let cell_hashes = [7, 2, 9, 7, 2];
        let sorted = [1, 4, 0, 3, 2];
        let mut cell_ranges = vec![CellRange::EMPTY; 10];

        resolve_all(&settings, &cell_hashes, &sorted, &mut cell_ranges);

        assert_eq!(run(&cell_ranges, 2), (0, 2));
        assert_eq!(run(&cell_ranges, 7), (2, 4));
        assert_eq!(run(&cell_ranges, 9), (4, 5));
        assert_eq!(run(&cell_ranges, 0), (0, 0));
        assert_eq!(cell_ranges[5], CellRange::EMPTY);
    }

    #[test]
    fn a_single_cell_spans_everything() {
        let settings = settings(3);
        let cell_hashes = [4, 4, 4];
        let sorted = [2, 0, 1];
        let mut cell_ranges = vec![CellRange::EMPTY; 6];

        resolve_all(&settings, &cell_hashes, &sorted, &mut cell_ranges);

        assert_eq!(run(&cell_ranges, 4), (0, 3));
    }

    #[test]
    fn resolving_twice_gives_identical_tables() {
        let settings = settings(6);
        let cell_hashes = [3, 1, 3, 8, 1, 0];
        let sorted = [5, 1, 4, 0, 2, 3];
        let mut once = vec![CellRange::EMPTY; 12];
        resolve_all(&settings, &cell_hashes, &sorted, &mut once);

        let mut twice = once.clone();
        resolve_all(&settings, &cell_hashes, &sorted, &mut twice);

        assert_eq!(once, twice);
        assert_eq!(run(&twice, 1), (1, 3));
    }
}
