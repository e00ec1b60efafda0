//! Data block framing
//!
//! An archive is a sequence of framed data blocks. Each block carries a
//! 16-byte on-disk header followed by its (possibly compressed) record
//! area. In memory the record area is always held uncompressed; the
//! `stored` field only exists on disk.

/// Block types carrying flow records
pub const DATA_BLOCK_TYPE_2: u16 = 2;
pub const DATA_BLOCK_TYPE_3: u16 = 3;

/// On-disk block header length: `type u16, flags u16, num_records u32,
/// size u32, stored u32`
pub const BLOCK_HEADER_LEN: usize = 16;

/// One framed data block, record area uncompressed
///
/// Invariant (enforced by the partitioner, not here): for flow-data
/// blocks the sizes of the first `num_records` records sum to
/// `data.len()`.
#[derive(Debug, Default)]
pub struct DataBlock {
    /// Block type; only [`DATA_BLOCK_TYPE_2`] and [`DATA_BLOCK_TYPE_3`]
    /// carry flow records
    pub block_type: u16,

    /// Per-block flags, preserved verbatim
    pub flags: u16,

    /// Number of logical records in the record area
    pub num_records: u32,

    /// Uncompressed record area
    pub data: Vec<u8>,
}

impl DataBlock {
    /// Byte length of the record area
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether this block type is subject to anonymization
    pub fn is_flow_data(&self) -> bool {
        self.block_type == DATA_BLOCK_TYPE_2 || self.block_type == DATA_BLOCK_TYPE_3
    }

    /// Reset for buffer reuse, keeping the data allocation
    pub fn clear(&mut self) {
        self.block_type = 0;
        self.flags = 0;
        self.num_records = 0;
        self.data.clear();
    }
}
