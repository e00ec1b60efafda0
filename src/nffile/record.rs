//! Record and extension layout inside a data block
//!
//! A block's record area is a sequence of tag-length-value frames. Every
//! record starts with a 4-byte common header `{type: u16, size: u16}`;
//! `size` covers the header itself. V3 flow records extend the common
//! header to 12 bytes and carry `num_elements` typed extensions, each with
//! its own 4-byte `{type: u16, length: u16}` element header.
//!
//! All integers are little-endian. The offsets here are the single source
//! of truth for the walker and for test fixtures.

/// Record type carrying anonymizable flow data
pub const V3_RECORD: u16 = 11;

/// Exporter metadata, passed through untouched
pub const EXPORTER_INFO_RECORD: u16 = 7;
/// Exporter statistics, passed through untouched
pub const EXPORTER_STAT_RECORD: u16 = 8;
/// Sampler configuration, passed through untouched
pub const SAMPLER_RECORD: u16 = 9;
/// Application classification data, passed through untouched
pub const NBAR_RECORD: u16 = 12;

/// Common record header: `type: u16, size: u16`
pub const RECORD_HEADER_LEN: usize = 4;

/// Full V3 record header length
///
/// Layout: `type u16, size u16, num_elements u16, engine_type u8,
/// engine_id u8, exporter_id u16, flags u8, nf_version u8`.
pub const V3_HEADER_LEN: usize = 12;

/// Offsets of the V3 header fields within the record *body* (the bytes
/// following the 4-byte common header)
pub const V3_BODY_NUM_ELEMENTS: usize = 0;
pub const V3_BODY_FLAGS: usize = 6;
/// V3 body length (header remainder) preceding the first extension
pub const V3_BODY_HEADER_LEN: usize = V3_HEADER_LEN - RECORD_HEADER_LEN;

/// Flag set on a V3 record once its addresses have been anonymized
pub const V3_FLAG_ANON: u8 = 0x04;

/// Element header: `type: u16, length: u16`; `length` covers the header
pub const ELEMENT_HEADER_LEN: usize = 4;

// Extension type tags. Only the address-bearing ones are mutated; the
// rest are walked over by length.
pub const EXT_NULL: u16 = 0;
pub const EXT_GENERIC_FLOW: u16 = 1;
pub const EXT_IPV4_FLOW: u16 = 2;
pub const EXT_IPV6_FLOW: u16 = 3;
pub const EXT_FLOW_MISC: u16 = 4;
pub const EXT_CNT_FLOW: u16 = 5;
pub const EXT_VLAN: u16 = 6;
pub const EXT_AS_ROUTING: u16 = 7;
pub const EXT_BGP_NEXT_HOP_V4: u16 = 8;
pub const EXT_BGP_NEXT_HOP_V6: u16 = 9;
pub const EXT_IP_NEXT_HOP_V4: u16 = 10;
pub const EXT_IP_NEXT_HOP_V6: u16 = 11;
pub const EXT_IP_RECEIVED_V4: u16 = 12;
pub const EXT_IP_RECEIVED_V6: u16 = 13;
pub const EXT_MPLS_LABEL: u16 = 14;
pub const EXT_MAC_ADDR: u16 = 15;
pub const EXT_AS_ADJACENT: u16 = 16;
pub const EXT_LATENCY: u16 = 17;
pub const EXT_NSEL_COMMON: u16 = 18;
pub const EXT_NSEL_XLATE_IPV4: u16 = 19;
pub const EXT_NSEL_XLATE_IPV6: u16 = 20;

/// Parsed common record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub rtype: u16,
    pub size: u16,
}

impl RecordHeader {
    /// Parse the common header from the front of `buf`; `None` if `buf` is
    /// shorter than the header
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < RECORD_HEADER_LEN {
            return None;
        }
        Some(Self {
            rtype: u16::from_le_bytes([buf[0], buf[1]]),
            size: u16::from_le_bytes([buf[2], buf[3]]),
        })
    }

    pub fn write(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.rtype.to_le_bytes());
        buf[2..4].copy_from_slice(&self.size.to_le_bytes());
    }
}

/// Parsed element header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub etype: u16,
    pub length: u16,
}

impl ElementHeader {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < ELEMENT_HEADER_LEN {
            return None;
        }
        Some(Self {
            etype: u16::from_le_bytes([buf[0], buf[1]]),
            length: u16::from_le_bytes([buf[2], buf[3]]),
        })
    }
}

pub(crate) fn read_u32_le(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

pub(crate) fn write_u32_le(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn read_u64_le(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

pub(crate) fn write_u64_le(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_header_roundtrip() {
        let hdr = RecordHeader {
            rtype: V3_RECORD,
            size: 44,
        };
        let mut buf = [0u8; RECORD_HEADER_LEN];
        hdr.write(&mut buf);
        assert_eq!(RecordHeader::parse(&buf), Some(hdr));
    }

    #[test]
    fn test_record_header_short_buffer() {
        assert_eq!(RecordHeader::parse(&[1, 0]), None);
    }

    #[test]
    fn test_element_header_parse() {
        let buf = [2u8, 0, 12, 0];
        let hdr = ElementHeader::parse(&buf).unwrap();
        assert_eq!(hdr.etype, EXT_IPV4_FLOW);
        assert_eq!(hdr.length, 12);
    }
}
