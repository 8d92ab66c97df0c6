//! Message passing between the ranks of a process group.
//!
//! Every collective is blocking and must be entered by all ranks of the group in the same order
//! with a matching call shape. Ranks that diverge are detected by the transport and reported as
//! [`GroupError::ProtocolViolation`] rather than left to deadlock or mis-assemble data.

use std::ops::Range;

use crate::error::GroupError;

pub mod local;

pub use local::{Endpoint, LocalGroup};

/// Rank of the coordinator. It owns the input and receives every result.
pub const ROOT_RANK: usize = 0;

/// Tag carried by every message, used to check that sender and receiver are in the same
/// collective.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Barrier,
    Release,
    Broadcast,
    Scatter,
    Gather,
    Gatherv,
}

/// Per-rank counts and displacements of a variable-length collective, in bytes.
#[derive(Copy, Clone, Debug)]
pub struct VarLayout<'a> {
    counts: &'a [usize],
    displs: &'a [usize],
}

impl<'a> VarLayout<'a> {
    pub fn new(counts: &'a [usize], displs: &'a [usize]) -> Self {
        Self { counts, displs }
    }

    pub fn range(&self, rank: usize) -> Range<usize> {
        let start = self.displs[rank];
        start..start + self.counts[rank]
    }

    /// Checks that every rank has an entry, that each segment lies inside a buffer of `buf_len`
    /// bytes and that no two non-empty segments overlap.
    pub fn validate(&self, op: Op, size: usize, buf_len: usize) -> Result<(), GroupError> {
        if self.counts.len() != size || self.displs.len() < size {
            return Err(GroupError::BadLayout {
                op,
                detail: format!(
                    "{} counts and {} displacements for {size} ranks",
                    self.counts.len(),
                    self.displs.len()
                ),
            });
        }

        let mut segments = (0..size)
            .filter(|&rank| self.counts[rank] != 0)
            .map(|rank| self.range(rank))
            .collect::<Vec<_>>();
        segments.sort_unstable_by_key(|r| r.start);

        let mut prev_end = 0;
        for segment in segments {
            if segment.start < prev_end {
                return Err(GroupError::BadLayout {
                    op,
                    detail: format!("segment {segment:?} overlaps its predecessor"),
                });
            }
            if segment.end > buf_len {
                return Err(GroupError::BadLayout {
                    op,
                    detail: format!("segment {segment:?} exceeds buffer of {buf_len} bytes"),
                });
            }
            prev_end = segment.end;
        }

        Ok(())
    }
}

/// The collectives the partitioning algorithm is written against.
///
/// Arguments that only matter at the root are passed as `Option`; non-root ranks pass `None` and
/// the root must pass `Some`.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT_RANK
    }

    /// Returns once every rank of the group has arrived.
    fn barrier(&self) -> Result<(), GroupError>;

    /// Delivers a copy of the root's `value` to every rank.
    fn broadcast(&self, root: usize, value: Option<Vec<u8>>) -> Result<Vec<u8>, GroupError>;

    /// Hands rank `i` the segment `layout.range(i)` of the root's buffer. `recv_count` is the
    /// length the calling rank expects.
    fn scatterv(
        &self,
        root: usize,
        send: Option<(&[u8], VarLayout<'_>)>,
        recv_count: usize,
    ) -> Result<Vec<u8>, GroupError>;

    /// Equal sized scatter: rank `i` receives `send[i * count..(i + 1) * count]`.
    fn scatter(
        &self,
        root: usize,
        send: Option<&[u8]>,
        count: usize,
    ) -> Result<Vec<u8>, GroupError> {
        let size = self.size();
        let counts = vec![count; size];
        let displs = (0..size).map(|i| i * count).collect::<Vec<_>>();

        self.scatterv(
            root,
            send.map(|buf| (buf, VarLayout::new(&counts, &displs))),
            count,
        )
    }

    /// Fixed-size gather. Every rank contributes the same number of bytes, the root gets the
    /// contributions concatenated in rank order.
    fn gather(&self, root: usize, send: &[u8]) -> Result<Option<Vec<u8>>, GroupError>;

    /// Variable-length gather. The contribution of rank `i` is written to `layout.range(i)` of the
    /// root's buffer. Empty contributions are still exchanged.
    fn gatherv(
        &self,
        root: usize,
        send: &[u8],
        recv: Option<(&mut [u8], VarLayout<'_>)>,
    ) -> Result<(), GroupError>;

    /// Tears the group down. Every rank blocked in, or later entering, a collective fails with
    /// [`GroupError::Aborted`].
    fn abort(&self, reason: &str);
}
