//! Mod-N record partitioning over a shared data block
//!
//! Every worker walks the full record header chain of the current block
//! but mutates only the records whose index is congruent to its own id
//! modulo the pool size. Records have one owner each, so the write sets
//! are disjoint and the in-place mutation needs no locks.
//!
//! This module is the crate's only unsafe boundary. The rules that keep
//! it sound:
//!
//! - [`SharedBlock`] is a raw-pointer token published to workers while
//!   they are parked at the barrier; the controller keeps the backing
//!   buffer alive and untouched until the completion rendezvous.
//! - Record headers are read through raw pointer loads; no reference is
//!   ever formed over bytes of a record another worker may own.
//! - `&mut` slices are materialized only over the *body* of an owned
//!   record (the bytes after its 4-byte common header). Header bytes are
//!   outside every body slice, so the raw header reads never overlap a
//!   live `&mut`.

use crate::anon::Anonymizer;
use crate::error::CorruptError;
use crate::nffile::block::DataBlock;
use crate::nffile::record::{
    EXPORTER_INFO_RECORD, EXPORTER_STAT_RECORD, NBAR_RECORD, RECORD_HEADER_LEN, SAMPLER_RECORD,
    V3_RECORD,
};
use crate::pipeline::walker;
use tracing::warn;

/// Raw view of one data block, publishable across threads
///
/// Validity window: from [`SharedBlock::new`] until the controller
/// observes the completion rendezvous for this block.
#[derive(Debug, Clone, Copy)]
pub struct SharedBlock {
    data: *mut u8,
    len: usize,
    num_records: u32,
}

// The partition scheme guarantees disjoint write sets (see module docs);
// the barrier protocol guarantees the pointer outlives its readers.
unsafe impl Send for SharedBlock {}

impl SharedBlock {
    pub fn new(block: &mut DataBlock) -> Self {
        Self {
            data: block.data.as_mut_ptr(),
            len: block.data.len(),
            num_records: block.num_records,
        }
    }

    pub fn num_records(&self) -> u32 {
        self.num_records
    }

    /// Read a record's common header fields `(type, size)`.
    ///
    /// # Safety
    /// `offset + RECORD_HEADER_LEN <= self.len` must hold.
    unsafe fn record_header(&self, offset: usize) -> (u16, u16) {
        let p = self.data.add(offset);
        let rtype = u16::from_le_bytes([p.read(), p.add(1).read()]);
        let size = u16::from_le_bytes([p.add(2).read(), p.add(3).read()]);
        (rtype, size)
    }

    /// Materialize the mutable body of a record.
    ///
    /// # Safety
    /// `offset + size <= self.len` and `size >= RECORD_HEADER_LEN` must
    /// hold, and the caller must own the record under the mod-N scheme.
    unsafe fn record_body(&self, offset: usize, size: usize) -> &mut [u8] {
        std::slice::from_raw_parts_mut(
            self.data.add(offset + RECORD_HEADER_LEN),
            size - RECORD_HEADER_LEN,
        )
    }
}

/// Per-scan record counts, aggregated into the worker statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PartitionCounts {
    /// V3 records anonymized by this worker
    pub anonymized: u64,
    /// Known non-flow records owned and skipped silently
    pub passed: u64,
    /// Unknown record types owned, skipped with a warning
    pub unknown: u64,
}

/// Walk the block's record chain, anonymizing the records owned by
/// `(worker_id, num_workers)`
///
/// Validates the framing invariants for *every* record, owned or not; a
/// violation is fatal corruption and aborts the scan.
pub fn process_block(
    block: SharedBlock,
    worker_id: u32,
    num_workers: u32,
    anon: &Anonymizer,
) -> Result<PartitionCounts, CorruptError> {
    let mut counts = PartitionCounts::default();
    let mut offset = 0usize;

    for index in 0..block.num_records {
        if offset + RECORD_HEADER_LEN > block.len {
            return Err(CorruptError::TruncatedRecord {
                index,
                num_records: block.num_records,
            });
        }

        // SAFETY: bounds checked just above.
        let (rtype, size) = unsafe { block.record_header(offset) };
        let size_usize = size as usize;

        if size_usize < RECORD_HEADER_LEN {
            return Err(CorruptError::RecordTooSmall { index, size });
        }
        if offset + size_usize > block.len {
            return Err(CorruptError::BlockOverrun {
                index,
                accumulated: offset,
                size,
                block_size: block.len,
            });
        }

        if index % num_workers == worker_id {
            match rtype {
                V3_RECORD => {
                    // SAFETY: bounds checked above; this worker owns
                    // record `index` under the mod-N partition.
                    let body = unsafe { block.record_body(offset, size_usize) };
                    walker::anonymize_v3_body(body, anon)?;
                    counts.anonymized += 1;
                }
                EXPORTER_INFO_RECORD | EXPORTER_STAT_RECORD | SAMPLER_RECORD | NBAR_RECORD => {
                    // exporter/sampler metadata carries no addresses
                    counts.passed += 1;
                }
                unknown => {
                    warn!(record = index, rtype = unknown, "Skip unknown record");
                    counts.unknown += 1;
                }
            }
        }

        offset += size_usize;
    }

    Ok(counts)
}
