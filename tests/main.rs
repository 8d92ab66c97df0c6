use std::env;
use std::fs;
use std::io::{self, Write};
use std::sync::Mutex;

use parsplit::classify::{scan_branchless, scan_branchy};
use parsplit::{
    midpoint_pivot, patterns, run_rank, split, split_bytes, split_file, Category, ClassifierKind,
    Classify, Communicator, GlobalPartition, GroupError, LocalGroup, LocalPartition,
    RemainderPolicy, Role, SlicePlan, SplitConfig, SplitError, SplitReport,
};

#[cfg(miri)]
const TEST_SIZES: [usize; 12] = [0, 1, 2, 3, 4, 5, 7, 8, 9, 16, 17, 33];

#[cfg(not(miri))]
const TEST_SIZES: [usize; 22] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 15, 16, 17, 33, 50, 100, 255, 256, 257, 1_000, 4_096, 10_000,
];

const RANK_COUNTS: [usize; 7] = [1, 2, 3, 4, 5, 7, 8];

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn get_or_init_random_seed() -> u64 {
    static SEED_WRITTEN: Mutex<bool> = Mutex::new(false);
    let seed = patterns::random_init_seed();

    let mut seed_writer = SEED_WRITTEN.lock().unwrap();
    if !*seed_writer {
        // Always write the seed before doing anything to ensure reproducibility of failures.
        io::stdout()
            .write_all(format!("\nSeed: {seed}\n\n").as_bytes())
            .unwrap();
        io::stdout().flush().unwrap();

        *seed_writer = true;
    }

    seed
}

/// Sequential three-way partition, the result the group has to reproduce.
fn reference_split(v: &[u8], pivot: u8) -> LocalPartition {
    LocalPartition {
        smaller: v.iter().copied().filter(|&x| x < pivot).collect(),
        equal: v.iter().copied().filter(|&x| x == pivot).collect(),
        larger: v.iter().copied().filter(|&x| x > pivot).collect(),
    }
}

fn report_failure(input: &[u8], expected: &GlobalPartition, got: &GlobalPartition) -> ! {
    let seed = get_or_init_random_seed();

    if input.len() <= 100 {
        eprintln!("Original: {:?}", input);
        eprintln!("Expected:\n{expected}");
        eprintln!("Got:\n{got}");
    } else if env::var("WRITE_LARGE_FAILURE").is_ok() {
        // Large inputs output them as files.
        let input_name = format!("input_{}.txt", seed);
        let expected_name = format!("expected_{}.txt", seed);
        let got_name = format!("got_{}.txt", seed);

        fs::write(&input_name, format!("{:?}", input)).unwrap();
        fs::write(&expected_name, expected.to_string()).unwrap();
        fs::write(&got_name, got.to_string()).unwrap();

        eprintln!("Failed comparison, see files {input_name}, {expected_name}, and {got_name}");
    } else {
        eprintln!("Failed comparison, re-run with WRITE_LARGE_FAILURE env var set, to get output.");
    }

    panic!("Test assertion failed!")
}

/// Checks that every rank's contribution sits at its offset, in its scan order.
fn check_segments(input: &[u8], report: &SplitReport, plan: &SlicePlan) {
    for rank in 0..plan.counts().len() {
        let start = plan.displs()[rank];
        let slice = &input[start..start + plan.count(rank)];
        let local = reference_split(slice, report.job.pivot);

        assert_eq!(report.sizes.row(rank).total(), slice.len());

        for category in Category::ALL {
            let segment = report.offsets.segment(category, rank);
            assert_eq!(segment.start, report.offsets.offset(category, rank));
            assert_eq!(&report.partition.get(category)[segment], local.get(category));
        }
    }
}

fn split_comp(input: &[u8], config: &SplitConfig) -> SplitReport {
    let _seed = get_or_init_random_seed();

    let report = split_bytes(input, config).unwrap();

    let pivot = midpoint_pivot(input).unwrap_or(0);
    assert_eq!(report.job.pivot, pivot);
    assert_eq!(report.job.total_len, input.len());

    let plan = SlicePlan::new(input.len(), config.ranks(), config.remainder_policy());
    let assigned = plan.assigned();
    assert_eq!(report.dropped, input.len() - assigned);
    assert_eq!(report.partition.len(), assigned);

    let expected = GlobalPartition::from(reference_split(&input[..assigned], pivot));
    if report.partition != expected {
        report_failure(input, &expected, &report.partition);
    }

    check_segments(input, &report, &plan);

    for category in Category::ALL {
        assert!(report
            .partition
            .get(category)
            .iter()
            .all(|&x| Category::of(x, pivot) == category));
    }

    report
}

fn test_impl(config: SplitConfig, pattern_fn: impl Fn(usize) -> Vec<u8>) {
    init_logger();

    for ranks in RANK_COUNTS {
        for test_size in TEST_SIZES {
            let input = pattern_fn(test_size);
            split_comp(&input, &config.clone().with_ranks(ranks));
        }
    }
}

fn classify_comp<C: Classify>(v: &[u8], pivot: u8) {
    let expected = reference_split(v, pivot);
    let got = C::classify(v, pivot);

    if got != expected {
        eprintln!("Classifier: {}", C::name());
        eprintln!("Original: {:?} pivot {pivot}", v);
        eprintln!("Expected: {:?}", expected);
        eprintln!("Got:      {:?}", got);
        panic!("Test assertion failed!")
    }

    assert_eq!(got.len(), v.len());
}

// --- Per classifier ---

fn classify_basic<C: Classify>() {
    classify_comp::<C>(&[], 0);
    classify_comp::<C>(&[7], 7);
    classify_comp::<C>(&[7], 0);
    classify_comp::<C>(&[7], 255);
    classify_comp::<C>(&[5, 1, 9, 3], 3);
    classify_comp::<C>(&[7, 2, 8, 4], 3);
    classify_comp::<C>(&[0, 255, 0, 255, 128], 128);
    classify_comp::<C>(&[3, 3, 3, 3], 3);
}

fn classify_every_pivot<C: Classify>() {
    let _seed = get_or_init_random_seed();

    let v = patterns::random(300);
    for pivot in 0..=u8::MAX {
        classify_comp::<C>(&v, pivot);
    }
}

fn classify_patterns<C: Classify>() {
    let _seed = get_or_init_random_seed();

    let pattern_fns: [fn(usize) -> Vec<u8>; 6] = [
        patterns::random,
        patterns::all_equal,
        patterns::ascending,
        patterns::descending,
        patterns::pipe_organ,
        |size| patterns::random_uniform(size, 0..=3u8),
    ];

    for pattern_fn in pattern_fns {
        for test_size in TEST_SIZES {
            let v = pattern_fn(test_size);
            let pivot = midpoint_pivot(&v).unwrap_or(0);
            classify_comp::<C>(&v, pivot);
        }
    }
}

fn classify_is_pure<C: Classify>() {
    let _seed = get_or_init_random_seed();

    let v = patterns::random(1_000);
    let first = C::classify(&v, 100);
    for _ in 0..3 {
        assert_eq!(C::classify(&v, 100), first);
    }
}

fn classify_keeps_scan_order<C: Classify>() {
    let v = [9, 1, 8, 2, 5, 7, 3, 5, 6, 4];
    let out = C::classify(&v, 5);

    assert_eq!(out.smaller, vec![1, 2, 3, 4]);
    assert_eq!(out.equal, vec![5, 5]);
    assert_eq!(out.larger, vec![9, 8, 7, 6]);
}

macro_rules! instantiate_classify_tests {
    ($classify_impl:ty, $kind:expr, $prefix:ident) => {
        paste::paste! {
            #[test]
            fn [<$prefix _basic>]() {
                classify_basic::<$classify_impl>();
            }

            #[test]
            fn [<$prefix _every_pivot>]() {
                classify_every_pivot::<$classify_impl>();
            }

            #[test]
            fn [<$prefix _patterns>]() {
                classify_patterns::<$classify_impl>();
            }

            #[test]
            fn [<$prefix _is_pure>]() {
                classify_is_pure::<$classify_impl>();
            }

            #[test]
            fn [<$prefix _keeps_scan_order>]() {
                classify_keeps_scan_order::<$classify_impl>();
            }

            #[test]
            #[cfg(not(miri))]
            fn [<$prefix _group_random>]() {
                test_impl(SplitConfig::default().classifier($kind), patterns::random);
            }

            #[test]
            #[cfg(not(miri))]
            fn [<$prefix _group_narrow>]() {
                test_impl(SplitConfig::default().classifier($kind), |size| {
                    patterns::random_uniform(size, 0..=4u8)
                });
            }
        }
    };
}

instantiate_classify_tests!(scan_branchy::ClassifyImpl, ClassifierKind::Branchy, scan_branchy);
instantiate_classify_tests!(
    scan_branchless::ClassifyImpl,
    ClassifierKind::Branchless,
    scan_branchless
);

// --- Group ---

#[test]
fn two_ranks_eight_bytes() {
    init_logger();

    let input = [5, 1, 9, 3, 7, 2, 8, 4];
    let report = split_comp(&input, &SplitConfig::default().with_ranks(2));

    assert_eq!(report.job.pivot, 3);
    assert_eq!(report.partition.smaller, vec![1, 2]);
    assert_eq!(report.partition.equal, vec![3]);
    assert_eq!(report.partition.larger, vec![5, 9, 7, 8, 4]);

    assert_eq!(report.sizes.row(0).as_array(), [1, 1, 2]);
    assert_eq!(report.sizes.row(1).as_array(), [1, 0, 3]);
    assert_eq!(report.offsets.displacements(Category::Larger), &[0, 2, 5]);

    assert_eq!(
        report.partition.to_string(),
        "L: [ 1 2 ]\nE: [ 3 ]\nG: [ 5 9 7 8 4 ]\n"
    );
}

#[test]
fn single_rank_is_sequential() {
    let _seed = get_or_init_random_seed();

    for test_size in TEST_SIZES {
        let input = patterns::random(test_size);
        let report = split_comp(&input, &SplitConfig::default().with_ranks(1));

        let pivot = midpoint_pivot(&input).unwrap_or(0);
        assert_eq!(report.dropped, 0);
        assert_eq!(
            report.partition,
            GlobalPartition::from(reference_split(&input, pivot))
        );
    }
}

#[test]
fn distribute_then_classify_locally() {
    init_logger();

    let input = [5u8, 1, 9, 3, 3, 7, 2, 8];
    let config = SplitConfig::default().with_ranks(2);

    let results = LocalGroup::new(2).unwrap().run(|comm| {
        let role = if comm.is_root() {
            Role::Coordinator(&input)
        } else {
            Role::Worker
        };
        let distribution = split::distribute(comm, role, config.remainder_policy())?;
        Ok::<_, SplitError>(split::classify_local(comm, &distribution, &config))
    });

    let rank0 = results[0].as_ref().unwrap();
    assert_eq!(rank0.smaller, vec![1]);
    assert_eq!(rank0.equal, vec![3]);
    assert_eq!(rank0.larger, vec![5, 9]);

    let rank1 = results[1].as_ref().unwrap();
    assert_eq!(rank1.smaller, vec![2]);
    assert_eq!(rank1.equal, vec![3]);
    assert_eq!(rank1.larger, vec![7, 8]);
}

#[test]
fn empty_equal_category() {
    init_logger();

    // Rank r contributes r smaller bytes, nothing equal and two larger bytes.
    let results = LocalGroup::new(4).unwrap().run(|comm| {
        let rank = comm.rank() as u8;
        let local = LocalPartition {
            smaller: vec![rank; comm.rank()],
            equal: Vec::new(),
            larger: vec![100 + rank; 2],
        };

        let layout = split::aggregate(comm, &local)?;
        let offsets = layout.as_ref().map(|layout| &layout.offsets);
        split::consolidate(comm, &local, offsets)
    });

    let partition = results[0].as_ref().unwrap().as_ref().unwrap();
    assert!(partition.equal.is_empty());
    assert_eq!(partition.smaller, vec![1, 2, 2, 3, 3, 3]);
    assert_eq!(partition.larger, vec![100, 100, 101, 101, 102, 102, 103, 103]);

    for result in &results[1..] {
        assert!(result.as_ref().unwrap().is_none());
    }
}

#[test]
fn every_byte_dropped() {
    // With more ranks than bytes every job is empty, so are all three gathers.
    let input = [4, 5, 7];
    let report = split_comp(&input, &SplitConfig::default().with_ranks(4));

    assert_eq!(report.job.pivot, 5);
    assert_eq!(report.dropped, 3);
    assert_eq!(report.offsets.displacements(Category::Equal), &[0, 0, 0, 0, 0]);
    assert_eq!(report.partition.to_string(), "L: [ ]\nE: [ ]\nG: [ ]\n");
}

#[test]
fn remainder_holds_largest_bytes() {
    // Rank 0 holds [4], rank 1 holds [5], 7 sits in the dropped tail.
    let input = [4, 5, 7];
    let report = split_comp(&input, &SplitConfig::default().with_ranks(2));

    assert_eq!(report.job.pivot, 5);
    assert_eq!(report.dropped, 1);
    assert_eq!(report.partition.smaller, vec![4]);
    assert_eq!(report.partition.equal, vec![5]);
    assert!(report.partition.larger.is_empty());
    assert_eq!(report.partition.to_string(), "L: [ 4 ]\nE: [ 5 ]\nG: [ ]\n");
}

#[test]
fn remainder_is_dropped_by_default() {
    let input = [10, 20, 30, 40, 50, 60, 70];
    let report = split_comp(&input, &SplitConfig::default().with_ranks(3));

    // Two jobs of 2 bytes per rank, 70 never reaches a rank.
    assert_eq!(report.dropped, 1);
    assert_eq!(report.job.pivot, 40);
    assert_eq!(report.partition.smaller, vec![10, 20, 30]);
    assert_eq!(report.partition.equal, vec![40]);
    assert_eq!(report.partition.larger, vec![50, 60]);
}

#[test]
fn remainder_goes_to_last_rank() {
    let input = [10, 20, 30, 40, 50, 60, 70];
    let config = SplitConfig::default()
        .with_ranks(3)
        .remainder(RemainderPolicy::LastRank);
    let report = split_comp(&input, &config);

    assert_eq!(report.dropped, 0);
    assert_eq!(report.partition.larger, vec![50, 60, 70]);
    assert_eq!(report.sizes.row(2).as_array(), [0, 0, 3]);
}

#[test]
fn more_ranks_than_bytes() {
    let input = [3, 1, 2];

    let report = split_comp(&input, &SplitConfig::default().with_ranks(8));
    assert!(report.partition.is_empty());
    assert_eq!(report.dropped, 3);

    let config = SplitConfig::default()
        .with_ranks(8)
        .remainder(RemainderPolicy::LastRank);
    let report = split_comp(&input, &config);
    assert_eq!(report.job.pivot, 1);
    assert!(report.partition.smaller.is_empty());
    assert_eq!(report.partition.equal, vec![1]);
    assert_eq!(report.partition.larger, vec![3, 2]);
}

#[test]
fn empty_input() {
    for ranks in RANK_COUNTS {
        let report = split_comp(&[], &SplitConfig::default().with_ranks(ranks));
        assert!(report.partition.is_empty());
        assert_eq!(report.partition.to_string(), "L: [ ]\nE: [ ]\nG: [ ]\n");
    }
}

#[test]
#[cfg(not(miri))]
fn last_rank_random() {
    test_impl(
        SplitConfig::default().remainder(RemainderPolicy::LastRank),
        patterns::random,
    );
}

#[test]
#[cfg(not(miri))]
fn all_equal() {
    test_impl(SplitConfig::default(), patterns::all_equal);
}

#[test]
#[cfg(not(miri))]
fn ascending() {
    test_impl(SplitConfig::default(), patterns::ascending);
}

#[test]
#[cfg(not(miri))]
fn descending() {
    test_impl(SplitConfig::default(), patterns::descending);
}

#[test]
#[cfg(not(miri))]
fn saw_mixed() {
    test_impl(SplitConfig::default(), |size| {
        patterns::saw_mixed(size, ((size as f64).log2().round()) as usize)
    });
}

#[test]
#[cfg(not(miri))]
fn pipe_organ() {
    test_impl(SplitConfig::default(), patterns::pipe_organ);
}

#[test]
fn random_random_size() {
    for ranks in RANK_COUNTS {
        let input = patterns::random_random_size(5_000);
        split_comp(&input, &SplitConfig::default().with_ranks(ranks));
    }
}

#[test]
fn zero_ranks_is_a_config_error() {
    let err = split_bytes(&[1, 2, 3], &SplitConfig::default().with_ranks(0)).unwrap_err();
    assert!(matches!(err, SplitError::Config(_)));
}

#[test]
fn missing_input_aborts_the_group() {
    init_logger();

    let path = env::temp_dir().join(format!(
        "parsplit-missing-{}-{}",
        std::process::id(),
        get_or_init_random_seed()
    ));

    let err = split_file(&path, &SplitConfig::default().with_ranks(4)).unwrap_err();
    match err {
        SplitError::Input { path: err_path, .. } => assert_eq!(err_path, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn oversized_input_aborts_the_group() {
    let input = vec![0u8; parsplit::job::MAX_TOTAL_LEN + 1];

    let err = split_bytes(&input, &SplitConfig::default().with_ranks(3)).unwrap_err();
    assert!(matches!(err, SplitError::InputTooLarge { .. }));
}

#[test]
fn split_from_file() {
    let path = env::temp_dir().join(format!(
        "parsplit-input-{}-{}",
        std::process::id(),
        get_or_init_random_seed()
    ));
    fs::write(&path, [5, 1, 9, 3, 7, 2, 8, 4]).unwrap();

    let report = split_file(&path, &SplitConfig::default().with_ranks(2));
    fs::remove_file(&path).unwrap();

    let report = report.unwrap();
    assert_eq!(
        report.partition.to_string(),
        "L: [ 1 2 ]\nE: [ 3 ]\nG: [ 5 9 7 8 4 ]\n"
    );
}

#[test]
fn worker_role_on_coordinator_is_rejected() {
    let config = SplitConfig::default().with_ranks(2);
    let results = LocalGroup::new(2)
        .unwrap()
        .run(|comm| run_rank(comm, Role::Worker, &config));

    assert!(matches!(results[0], Err(SplitError::Config(_))));
    assert!(matches!(
        results[1],
        Err(SplitError::Group(GroupError::Aborted { by: 0, .. }))
    ));
}
