use std::sync::atomic::{AtomicBool, Ordering};

use rand::prelude::*;

use once_cell::sync::OnceCell;

/// Provides a set of byte patterns useful for testing and benchmarking the split.

// --- Public ---

pub fn random(size: usize) -> Vec<u8> {
    //     .
    // : . : :
    // :.:::.::

    random_vec(size)
}

pub fn random_uniform<R>(size: usize, range: R) -> Vec<u8>
where
    R: Into<rand::distributions::Uniform<u8>>,
{
    // :.:.:.::
    let mut rng = rand::rngs::StdRng::from(new_seed());

    let dist: rand::distributions::Uniform<u8> = range.into();

    (0..size).map(|_| dist.sample(&mut rng)).collect()
}

pub fn random_random_size(max_size: usize) -> Vec<u8> {
    //     .
    // : . : :
    // :.:::.::
    // < size > is random from call to call, with max_size as maximum size.

    let mut rng = rand::rngs::StdRng::from(new_seed());
    random(rng.gen_range(0..=max_size))
}

pub fn all_equal(size: usize) -> Vec<u8> {
    // ......
    // ::::::

    vec![66; size]
}

pub fn ascending(size: usize) -> Vec<u8> {
    //     .:
    //   .:::
    // .:::::

    // Wraps around for sizes beyond 256.
    (0..size).map(|i| i as u8).collect()
}

pub fn descending(size: usize) -> Vec<u8> {
    // :.
    // :::.
    // :::::.

    (0..size).rev().map(|i| i as u8).collect()
}

pub fn saw_mixed(size: usize, saw_count: usize) -> Vec<u8> {
    // :.  :.    .::.    .:
    // :::.:::..::::::..:::

    if size == 0 {
        return Vec::new();
    }

    let mut vals = random_vec(size);
    let chunks_size = size / saw_count.max(1);
    let saw_directions = random_uniform((size / chunks_size.max(1)) + 1, 0..=1u8);

    for (i, chunk) in vals.chunks_mut(chunks_size.max(1)).enumerate() {
        if saw_directions[i] == 0 {
            chunk.sort();
        } else {
            chunk.sort_by_key(|&e| std::cmp::Reverse(e));
        }
    }

    vals
}

pub fn pipe_organ(size: usize) -> Vec<u8> {
    //   .:.
    // .:::::.

    let mut vals = random_vec(size);

    let first_half = &mut vals[0..(size / 2)];
    first_half.sort();

    let second_half = &mut vals[(size / 2)..size];
    second_half.sort_by_key(|&e| std::cmp::Reverse(e));

    vals
}

/// `size` values where none equals `excluded`.
pub fn random_without(size: usize, excluded: u8) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::from(new_seed());

    (0..size)
        .map(|_| loop {
            let val = rng.gen::<u8>();
            if val != excluded {
                break val;
            }
        })
        .collect()
}

static USE_FIXED_SEED: AtomicBool = AtomicBool::new(true);

pub fn disable_fixed_seed() {
    USE_FIXED_SEED.store(false, Ordering::Release);
}

pub fn random_init_seed() -> u64 {
    if USE_FIXED_SEED.load(Ordering::Acquire) {
        static SEED: OnceCell<u64> = OnceCell::new();
        *SEED.get_or_init(|| -> u64 { thread_rng().gen() })
    } else {
        thread_rng().gen()
    }
}

// --- Private ---

fn new_seed() -> StdRng {
    // Random seed, but prints it for repeatability.
    rand::SeedableRng::seed_from_u64(random_init_seed())
}

fn random_vec(size: usize) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::from(new_seed());

    (0..size).map(|_| rng.gen::<u8>()).collect()
}
