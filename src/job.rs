//! What every rank needs to know before it can start classifying: the pivot, the input length and
//! which part of the input it owns.

use std::str::FromStr;

use crate::error::SplitError;

/// Largest input the packed descriptor can describe, the length field is 24 bits wide.
pub const MAX_TOTAL_LEN: usize = 0xFF_FFFF;

/// Metadata shared by all ranks, identical everywhere after distribution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JobDescriptor {
    pub pivot: u8,
    pub total_len: usize,
}

impl JobDescriptor {
    /// Builds the descriptor for `input` using [`midpoint_pivot`]. An empty input gets pivot `0`,
    /// there is nothing to classify against it anyway.
    pub fn for_input(input: &[u8]) -> Result<Self, SplitError> {
        if input.len() > MAX_TOTAL_LEN {
            return Err(SplitError::InputTooLarge {
                len: input.len(),
                max: MAX_TOTAL_LEN,
            });
        }

        Ok(Self {
            pivot: midpoint_pivot(input).unwrap_or(0),
            total_len: input.len(),
        })
    }

    /// Packs the descriptor as `pivot | total_len << 8`.
    pub fn pack(&self) -> Result<u32, SplitError> {
        if self.total_len > MAX_TOTAL_LEN {
            return Err(SplitError::InputTooLarge {
                len: self.total_len,
                max: MAX_TOTAL_LEN,
            });
        }

        Ok(self.pivot as u32 | (self.total_len as u32) << 8)
    }

    pub fn unpack(packed: u32) -> Self {
        Self {
            pivot: (packed & 0xFF) as u8,
            total_len: (packed >> 8 & 0xFF_FFFF) as usize,
        }
    }

    /// Bytes every rank receives under [`RemainderPolicy::Drop`].
    pub fn job_size(&self, ranks: usize) -> usize {
        self.total_len / ranks
    }

    pub fn plan(&self, ranks: usize, policy: RemainderPolicy) -> SlicePlan {
        SlicePlan::new(self.total_len, ranks, policy)
    }
}

/// Element at the structural middle of the unsorted input: index `n / 2 - 1` for even `n`, `n / 2`
/// for odd `n`. This is not a statistical median.
pub fn midpoint_pivot(input: &[u8]) -> Option<u8> {
    let len = input.len();
    if len == 0 {
        return None;
    }

    let idx = if len % 2 == 0 { len / 2 - 1 } else { len / 2 };
    Some(input[idx])
}

/// What happens to the `total_len % ranks` trailing bytes that do not fill a whole job.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RemainderPolicy {
    /// The trailing bytes are never scattered and do not show up in any output category.
    #[default]
    Drop,
    /// The last rank takes the trailing bytes in addition to its regular job.
    LastRank,
}

impl FromStr for RemainderPolicy {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(Self::Drop),
            "last-rank" | "last_rank" | "last" => Ok(Self::LastRank),
            _ => Err(SplitError::Config(format!("unknown remainder policy '{s}'"))),
        }
    }
}

/// Contiguous, rank ordered assignment of input bytes to ranks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlicePlan {
    counts: Vec<usize>,
    displs: Vec<usize>,
    dropped: usize,
}

impl SlicePlan {
    pub fn new(total_len: usize, ranks: usize, policy: RemainderPolicy) -> Self {
        let job_size = total_len / ranks;
        let remainder = total_len % ranks;

        let mut counts = vec![job_size; ranks];
        let dropped = match policy {
            RemainderPolicy::Drop => remainder,
            RemainderPolicy::LastRank => {
                counts[ranks - 1] += remainder;
                0
            }
        };
        let displs = (0..ranks).map(|rank| rank * job_size).collect();

        Self {
            counts,
            displs,
            dropped,
        }
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn displs(&self) -> &[usize] {
        &self.displs
    }

    pub fn count(&self, rank: usize) -> usize {
        self.counts[rank]
    }

    /// Number of trailing input bytes no rank will see.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn assigned(&self) -> usize {
        self.counts.iter().sum()
    }
}
