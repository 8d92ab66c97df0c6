#![no_main]

use libfuzzer_sys::fuzz_target;

use parsplit::{split_bytes, RemainderPolicy, SplitConfig};

fuzz_target!(|data: &[u8]| {
    // First byte picks the group shape, the rest is the input.
    let Some((&shape, input)) = data.split_first() else {
        return;
    };

    let ranks = (shape & 0x7) as usize + 1;
    let policy = if shape & 0x8 == 0 {
        RemainderPolicy::Drop
    } else {
        RemainderPolicy::LastRank
    };

    let config = SplitConfig::default().with_ranks(ranks).remainder(policy);
    let report = split_bytes(input, &config).unwrap();

    let assigned = input.len() - report.dropped;
    let pivot = report.job.pivot;
    let prefix = &input[..assigned];

    assert!(prefix.iter().copied().filter(|&x| x < pivot).eq(report.partition.smaller.iter().copied()));
    assert!(prefix.iter().copied().filter(|&x| x == pivot).eq(report.partition.equal.iter().copied()));
    assert!(prefix.iter().copied().filter(|&x| x > pivot).eq(report.partition.larger.iter().copied()));
});
