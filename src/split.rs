//! The distributed three-way split, one function per stage.
//!
//! Every rank calls the stages in the same order with the same call shape, including ranks whose
//! contribution to a stage is empty. Only the coordinator ends up with the size table, the offsets
//! and the consolidated partition.

use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::classify::{Category, LocalPartition};
use crate::comm::{Communicator, LocalGroup, VarLayout, ROOT_RANK};
use crate::config::SplitConfig;
use crate::error::{GroupError, SplitError};
use crate::job::{JobDescriptor, RemainderPolicy, SlicePlan};
use crate::layout::{GlobalPartition, GlobalSizeTable, OffsetTable, SizeVector};
use crate::wire;

/// Which side of the algorithm a rank plays. Only the coordinator holds the input.
#[derive(Copy, Clone, Debug)]
pub enum Role<'a> {
    Coordinator(&'a [u8]),
    Worker,
}

impl Role<'_> {
    pub fn is_coordinator(&self) -> bool {
        matches!(self, Role::Coordinator(_))
    }
}

/// Result of job distribution on one rank.
#[derive(Clone, Debug)]
pub struct Distribution {
    pub job: JobDescriptor,
    pub plan: SlicePlan,
    pub slice: Vec<u8>,
}

/// Size table and offsets, computed by the coordinator from all size vectors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SizeLayout {
    pub sizes: GlobalSizeTable,
    pub offsets: OffsetTable,
}

/// Everything the coordinator knows after the last stage.
#[derive(Clone, Debug)]
pub struct SplitReport {
    pub job: JobDescriptor,
    pub sizes: GlobalSizeTable,
    pub offsets: OffsetTable,
    pub partition: GlobalPartition,
    /// Trailing input bytes that were never assigned to a rank.
    pub dropped: usize,
}

#[derive(Clone, Debug)]
pub enum RankOutcome {
    Coordinator(SplitReport),
    Worker,
}

impl RankOutcome {
    pub fn into_report(self) -> Option<SplitReport> {
        match self {
            RankOutcome::Coordinator(report) => Some(report),
            RankOutcome::Worker => None,
        }
    }
}

/// Stage 1: broadcast the job descriptor, synchronize, scatter the input.
pub fn distribute<C: Communicator>(
    comm: &C,
    role: Role<'_>,
    policy: RemainderPolicy,
) -> Result<Distribution, SplitError> {
    if role.is_coordinator() != comm.is_root() {
        return Err(SplitError::Config(format!(
            "rank {} plays {role:?} but the coordinator is rank {ROOT_RANK}",
            comm.rank()
        )));
    }

    let descriptor = match role {
        Role::Coordinator(input) => {
            let job = JobDescriptor::for_input(input)?;
            Some(wire::encode_descriptor(&job)?)
        }
        Role::Worker => None,
    };

    let job = wire::decode_descriptor(&comm.broadcast(ROOT_RANK, descriptor)?)?;
    comm.barrier()?;

    let plan = job.plan(comm.size(), policy);
    let send = match role {
        Role::Coordinator(input) => Some((input, VarLayout::new(plan.counts(), plan.displs()))),
        Role::Worker => None,
    };
    let slice = comm.scatterv(ROOT_RANK, send, plan.count(comm.rank()))?;

    debug!(
        "rank {}: pivot {} total {} slice {} bytes",
        comm.rank(),
        job.pivot,
        job.total_len,
        slice.len()
    );

    Ok(Distribution { job, plan, slice })
}

/// Stage 2: classify the received slice. Purely local, no communication.
pub fn classify_local<C: Communicator>(
    comm: &C,
    distribution: &Distribution,
    config: &SplitConfig,
) -> LocalPartition {
    let local = config
        .classifier_kind()
        .classify(&distribution.slice, distribution.job.pivot);
    debug!(
        "rank {}: {} smaller, {} equal, {} larger",
        comm.rank(),
        local.smaller.len(),
        local.equal.len(),
        local.larger.len()
    );

    local
}

/// Stage 3: collect every rank's size vector on the coordinator and derive the offsets.
pub fn aggregate<C: Communicator>(
    comm: &C,
    local: &LocalPartition,
) -> Result<Option<SizeLayout>, SplitError> {
    let sizes = SizeVector::of(local);
    let Some(gathered) = comm.gather(ROOT_RANK, &wire::encode_sizes(&sizes)?)? else {
        return Ok(None);
    };

    let sizes = wire::decode_size_table(&gathered, comm.size())?;
    let offsets = OffsetTable::from_sizes(&sizes);
    debug!("size table {:?}", sizes.rows());

    Ok(Some(SizeLayout { sizes, offsets }))
}

/// Stage 4: one variable-length gather per category, on every rank, even for empty categories.
pub fn consolidate<C: Communicator>(
    comm: &C,
    local: &LocalPartition,
    offsets: Option<&OffsetTable>,
) -> Result<Option<GlobalPartition>, SplitError> {
    let mut global = offsets.map(GlobalPartition::allocate);

    for category in Category::ALL {
        let recv = global
            .as_mut()
            .zip(offsets)
            .map(|(global, offsets)| (global.get_mut(category), offsets.layout(category)));
        comm.gatherv(ROOT_RANK, local.get(category), recv)?;
    }

    Ok(global)
}

/// Runs all stages on one rank.
pub fn run_rank<C: Communicator>(
    comm: &C,
    role: Role<'_>,
    config: &SplitConfig,
) -> Result<RankOutcome, SplitError> {
    let distribution = distribute(comm, role, config.remainder_policy())?;

    let local = classify_local(comm, &distribution, config);

    let layout = aggregate(comm, &local)?;
    let partition = consolidate(comm, &local, layout.as_ref().map(|layout| &layout.offsets))?;

    Ok(match (layout, partition) {
        (Some(SizeLayout { sizes, offsets }), Some(partition)) => {
            RankOutcome::Coordinator(SplitReport {
                job: distribution.job,
                sizes,
                offsets,
                partition,
                dropped: distribution.plan.dropped(),
            })
        }
        _ => RankOutcome::Worker,
    })
}

pub fn load_input(path: &Path) -> Result<Vec<u8>, SplitError> {
    fs::read(path).map_err(|source| SplitError::Input {
        path: path.to_owned(),
        source,
    })
}

/// Spawns a local group and runs the split. The coordinator calls `load` from inside the group,
/// a failure there aborts the other ranks while they wait for the job descriptor.
pub fn split_with<L>(config: &SplitConfig, load: L) -> Result<SplitReport, SplitError>
where
    L: Fn() -> Result<Vec<u8>, SplitError> + Sync,
{
    config.validate()?;

    info!(
        "splitting with {} ranks, classifier {}, remainder {:?}",
        config.ranks(),
        config.classifier_kind().name(),
        config.remainder_policy()
    );

    let results = LocalGroup::new(config.ranks())?.run(|comm| {
        if comm.is_root() {
            let input = load()?;
            run_rank(comm, Role::Coordinator(&input), config)
        } else {
            run_rank(comm, Role::Worker, config)
        }
    });

    collect_report(results)
}

pub fn split_bytes(input: &[u8], config: &SplitConfig) -> Result<SplitReport, SplitError> {
    split_with(config, || Ok(input.to_vec()))
}

pub fn split_file(path: &Path, config: &SplitConfig) -> Result<SplitReport, SplitError> {
    split_with(config, || load_input(path))
}

/// Picks the coordinator's report, or the error that brought the group down. Ranks that merely
/// observed an abort are reported only if nothing better is available.
fn collect_report(
    results: Vec<Result<RankOutcome, SplitError>>,
) -> Result<SplitReport, SplitError> {
    let mut report = None;
    let mut first_err = None;
    let mut cause = None;

    for result in results {
        match result {
            Ok(outcome) => {
                if let Some(r) = outcome.into_report() {
                    report = Some(r);
                }
            }
            Err(SplitError::Group(err @ GroupError::Aborted { .. })) => {
                first_err.get_or_insert(SplitError::Group(err));
            }
            Err(err) => {
                cause.get_or_insert(err);
            }
        }
    }

    match (cause.or(first_err), report) {
        (Some(err), _) => Err(err),
        (None, Some(report)) => Ok(report),
        (None, None) => Err(SplitError::Config(format!(
            "no rank acted as coordinator (rank {ROOT_RANK})"
        ))),
    }
}
