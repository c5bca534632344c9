//! Least significant digit radix sort of particle indices by cell hash.
//!
//! Each of the 8 passes is three kernels separated by barriers:
//!   1. `histogram`: one workgroup of 16 lanes per chunk of `WORKGROUP_SIZE` sorted slots. Lane
//!      `d` counts digit `d` in its chunk and records each matching slot's rank.
//!   2. `scan`: a single invocation turns the counts into exclusive global offsets.
//!   3. `scatter`: one invocation per slot writes its particle index to offset + rank in the
//!      other ping-pong buffer.
//!
//! Ranks follow slot order, so every pass is stable and 8 passes fully sort a `u32` key.

use pbf_cpu_gpu_shared::{
    bucket_index, NeighbourSearchSettings, RADIX_BITS, RADIX_BUCKETS, WORKGROUP_SIZE,
};

/// The 4 bit digit of `hash` sorted on by `pass`.
pub const fn digit(hash: u32, pass: u32) -> u32 {
    (hash >> (pass * RADIX_BITS)) & (RADIX_BUCKETS - 1)
}

/// Count one digit value over one chunk of the source permutation.
pub fn histogram(
    workgroup: usize,
    lane: usize,
    settings: &NeighbourSearchSettings,
    pass: u32,
    cell_hashes: &[u32],
    source: &[u32],
    buckets: &mut [u32],
    ranks: &mut [u32],
) {
    if workgroup >= settings.workgroup_count as usize || lane >= RADIX_BUCKETS as usize {
        return;
    }

    let chunk_size = WORKGROUP_SIZE as usize;
    let first = workgroup * chunk_size;
    let end = usize::min(first + chunk_size, settings.particle_count as usize);
    let wanted = lane as u32;

    let mut count = 0;
    let mut slot = first;
    while slot < end {
        let particle = source[slot] as usize;
        if digit(cell_hashes[particle], pass) == wanted {
            ranks[slot] = count;
            count += 1;
        }
        slot += 1;
    }

    buckets[bucket_index(wanted, workgroup as u32, settings.workgroup_count)] = count;
}

/// Exclusive prefix sum over the digit-major bucket table. The spare column of each digit ends
/// up holding where that digit's run ends.
pub fn scan(settings: &NeighbourSearchSettings, buckets: &mut [u32]) {
    let workgroups = settings.workgroup_count;
    let mut running = 0;
    let mut digit_value = 0;
    while digit_value < RADIX_BUCKETS {
        let mut workgroup = 0;
        while workgroup < workgroups {
            let index = bucket_index(digit_value, workgroup, workgroups);
            let count = buckets[index];
            buckets[index] = running;
            running += count;
            workgroup += 1;
        }
        buckets[bucket_index(digit_value, workgroups, workgroups)] = running;
        digit_value += 1;
    }
}

/// Move the particle index in sorted slot `id` to its place for this pass.
pub fn scatter(
    id: usize,
    settings: &NeighbourSearchSettings,
    pass: u32,
    cell_hashes: &[u32],
    source: &[u32],
    buckets: &[u32],
    ranks: &[u32],
    destination: &mut [u32],
) {
    if id >= settings.particle_count as usize {
        return;
    }

    let particle = source[id];
    let workgroup = (id / WORKGROUP_SIZE as usize) as u32;
    let offset = buckets[bucket_index(
        digit(cell_hashes[particle as usize], pass),
        workgroup,
        settings.workgroup_count,
    )];
    destination[(offset + ranks[id]) as usize] = particle;
}
