//! Distributed three-way split of a byte sequence around a pivot.
//!
//! A group of ranks cooperates on one partitioning round: the coordinator (rank 0) picks the pivot
//! and scatters the input, every rank classifies its slice into smaller, equal and larger bytes,
//! and the coordinator gathers the three categories back in rank order using prefix-sum offsets.
//! The group is backed by threads that only share data through message passing, see [`comm`].

pub mod classify;
pub mod comm;
pub mod config;
pub mod error;
pub mod job;
pub mod layout;
pub mod patterns;
pub mod split;
pub mod wire;

pub use classify::{Category, ClassifierKind, Classify, LocalPartition};
pub use comm::{Communicator, LocalGroup, ROOT_RANK};
pub use config::SplitConfig;
pub use error::{GroupError, SplitError};
pub use job::{midpoint_pivot, JobDescriptor, RemainderPolicy, SlicePlan};
pub use layout::{GlobalPartition, GlobalSizeTable, OffsetTable, SizeVector};
pub use split::{run_rank, split_bytes, split_file, RankOutcome, Role, SplitReport};
