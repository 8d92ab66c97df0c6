use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::comm::Op;

/// Failures of the process group itself. Any of these leaves the group unable to complete the
/// current collective, so they are fatal to the whole run.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group size must be at least 1, got {0}")]
    InvalidSize(usize),

    #[error("root rank {root} is outside of a group of {size}")]
    InvalidRoot { root: usize, size: usize },

    #[error("rank {by} aborted the group: {reason}")]
    Aborted { by: usize, reason: String },

    #[error("rank {peer} hung up while rank {rank} was communicating with it")]
    Disconnected { rank: usize, peer: usize },

    #[error(
        "rank {rank} expected {expected:?} from rank {peer} in collective #{seq}, got {found:?}"
    )]
    ProtocolViolation {
        rank: usize,
        peer: usize,
        seq: u64,
        expected: Op,
        found: Op,
    },

    #[error("{op:?} on rank {rank} expected {expected} bytes from rank {peer}, got {found}")]
    LengthMismatch {
        op: Op,
        rank: usize,
        peer: usize,
        expected: usize,
        found: usize,
    },

    #[error("{op:?} buffer layout does not fit: {detail}")]
    BadLayout { op: Op, detail: String },

    #[error("root rank must supply a buffer for {0:?}")]
    MissingRootBuffer(Op),

    #[error("rank {0} panicked")]
    RankPanicked(usize),
}

#[derive(Debug, Error)]
pub enum SplitError {
    /// The coordinator could not read the input. Fatal for the whole group.
    #[error("failed to load input {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("input of {len} bytes exceeds the job descriptor limit of {max} bytes")]
    InputTooLarge { len: usize, max: usize },

    #[error("malformed {what}: expected {expected} bytes, got {found}")]
    Wire {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Group(#[from] GroupError),
}
