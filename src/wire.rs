//! Byte encodings of the fixed-size records exchanged between ranks. All integers are little
//! endian.

use crate::error::SplitError;
use crate::job::JobDescriptor;
use crate::layout::{GlobalSizeTable, SizeVector};

pub const DESCRIPTOR_LEN: usize = 4;

/// Three `u32` counts: smaller, equal, larger.
pub const SIZE_VECTOR_LEN: usize = 12;

pub fn encode_descriptor(job: &JobDescriptor) -> Result<Vec<u8>, SplitError> {
    Ok(job.pack()?.to_le_bytes().to_vec())
}

pub fn decode_descriptor(bytes: &[u8]) -> Result<JobDescriptor, SplitError> {
    let packed: [u8; DESCRIPTOR_LEN] = bytes.try_into().map_err(|_| SplitError::Wire {
        what: "job descriptor",
        expected: DESCRIPTOR_LEN,
        found: bytes.len(),
    })?;

    Ok(JobDescriptor::unpack(u32::from_le_bytes(packed)))
}

pub fn encode_sizes(sizes: &SizeVector) -> Result<[u8; SIZE_VECTOR_LEN], SplitError> {
    let mut out = [0u8; SIZE_VECTOR_LEN];

    for (chunk, len) in out.chunks_exact_mut(4).zip(sizes.as_array()) {
        let len = u32::try_from(len).map_err(|_| SplitError::InputTooLarge {
            len,
            max: u32::MAX as usize,
        })?;
        chunk.copy_from_slice(&len.to_le_bytes());
    }

    Ok(out)
}

fn decode_sizes(bytes: &[u8]) -> SizeVector {
    debug_assert_eq!(bytes.len(), SIZE_VECTOR_LEN);

    let mut counts = [0usize; 3];
    for (count, chunk) in counts.iter_mut().zip(bytes.chunks_exact(4)) {
        let mut word = [0u8; 4];
        word.copy_from_slice(chunk);
        *count = u32::from_le_bytes(word) as usize;
    }

    SizeVector::from_array(counts)
}

/// Reshapes the gathered size vectors of `ranks` ranks into one row per rank.
pub fn decode_size_table(bytes: &[u8], ranks: usize) -> Result<GlobalSizeTable, SplitError> {
    let expected = SIZE_VECTOR_LEN * ranks;
    if bytes.len() != expected {
        return Err(SplitError::Wire {
            what: "size table",
            expected,
            found: bytes.len(),
        });
    }

    Ok(GlobalSizeTable::from_rows(
        bytes.chunks_exact(SIZE_VECTOR_LEN).map(decode_sizes).collect(),
    ))
}
