//! Typed walk over one V3 flow record
//!
//! Takes the record body (everything after the 4-byte common header),
//! marks it anonymized, and steps through its extension list replacing
//! every address-bearing field in place. The dispatch table below is also
//! the definition of which fields count as identifying:
//!
//! | extension            | fields rewritten                      |
//! |----------------------|---------------------------------------|
//! | ipv4 flow            | src/dst address → pseudonym           |
//! | ipv6 flow            | src/dst address → pseudonym           |
//! | AS routing           | src/dst AS → 0                        |
//! | bgp/ip next hop v4   | address → pseudonym                   |
//! | bgp/ip next hop v6   | address → pseudonym                   |
//! | ip received v4/v6    | address → pseudonym                   |
//! | adjacent AS          | next/prev AS → 0                      |
//! | NSEL xlate v4/v6     | xlate src/dst address → pseudonym     |
//!
//! Unknown extension tags are tolerated and skipped by length; a cursor
//! that would pass the end of the record is fatal corruption.

use crate::anon::Anonymizer;
use crate::error::CorruptError;
use crate::nffile::record::{
    read_u32_le, read_u64_le, write_u32_le, write_u64_le, ElementHeader, ELEMENT_HEADER_LEN,
    EXT_AS_ADJACENT, EXT_AS_ROUTING, EXT_BGP_NEXT_HOP_V4, EXT_BGP_NEXT_HOP_V6, EXT_IPV4_FLOW,
    EXT_IPV6_FLOW, EXT_IP_NEXT_HOP_V4, EXT_IP_NEXT_HOP_V6, EXT_IP_RECEIVED_V4, EXT_IP_RECEIVED_V6,
    EXT_NSEL_XLATE_IPV4, EXT_NSEL_XLATE_IPV6, V3_BODY_FLAGS, V3_BODY_HEADER_LEN,
    V3_BODY_NUM_ELEMENTS, V3_FLAG_ANON,
};
use tracing::warn;

fn anon4_at(payload: &mut [u8], off: usize, anon: &Anonymizer) {
    let addr = read_u32_le(payload, off);
    write_u32_le(payload, off, anon.anon4(addr));
}

fn anon6_at(payload: &mut [u8], off: usize, anon: &Anonymizer) {
    let addr = [read_u64_le(payload, off), read_u64_le(payload, off + 8)];
    let out = anon.anon6(addr);
    write_u64_le(payload, off, out[0]);
    write_u64_le(payload, off + 8, out[1]);
}

/// Payload length required before an extension's fields may be rewritten
fn required_payload_len(ext_type: u16) -> usize {
    match ext_type {
        EXT_IPV4_FLOW | EXT_AS_ROUTING | EXT_AS_ADJACENT | EXT_NSEL_XLATE_IPV4 => 8,
        EXT_IPV6_FLOW | EXT_NSEL_XLATE_IPV6 => 32,
        EXT_BGP_NEXT_HOP_V4 | EXT_IP_NEXT_HOP_V4 | EXT_IP_RECEIVED_V4 => 4,
        EXT_BGP_NEXT_HOP_V6 | EXT_IP_NEXT_HOP_V6 | EXT_IP_RECEIVED_V6 => 16,
        _ => 0,
    }
}

/// Anonymize one V3 record in place
///
/// `body` is the record minus its 4-byte common header. A body too short
/// to hold the V3 header is logged and left untouched; any cursor
/// violation while walking the extensions is fatal corruption.
pub fn anonymize_v3_body(body: &mut [u8], anon: &Anonymizer) -> Result<(), CorruptError> {
    if body.len() < V3_BODY_HEADER_LEN {
        warn!(
            size = body.len() + crate::nffile::record::RECORD_HEADER_LEN,
            "v3 record - unexpected size"
        );
        return Ok(());
    }

    body[V3_BODY_FLAGS] |= V3_FLAG_ANON;

    let num_elements = u16::from_le_bytes([
        body[V3_BODY_NUM_ELEMENTS],
        body[V3_BODY_NUM_ELEMENTS + 1],
    ]);

    let end = body.len();
    let mut cursor = V3_BODY_HEADER_LEN;

    for index in 0..num_elements {
        if cursor + ELEMENT_HEADER_LEN > end {
            return Err(CorruptError::ExtensionOverrun {
                index,
                cursor: cursor + ELEMENT_HEADER_LEN,
                end,
            });
        }

        let header = ElementHeader::parse(&body[cursor..]).expect("bounds checked above");
        let length = header.length as usize;
        if length < ELEMENT_HEADER_LEN {
            return Err(CorruptError::BadElementLength {
                index,
                length: header.length,
            });
        }

        let next = cursor + length;
        if next > end {
            return Err(CorruptError::ExtensionOverrun {
                index,
                cursor: next,
                end,
            });
        }

        let payload = &mut body[cursor + ELEMENT_HEADER_LEN..next];
        let need = required_payload_len(header.etype);
        if payload.len() < need {
            return Err(CorruptError::ShortExtension {
                index,
                ext_type: header.etype,
                got: payload.len(),
                need,
            });
        }

        match header.etype {
            EXT_IPV4_FLOW => {
                anon4_at(payload, 0, anon);
                anon4_at(payload, 4, anon);
            }
            EXT_IPV6_FLOW => {
                anon6_at(payload, 0, anon);
                anon6_at(payload, 16, anon);
            }
            EXT_AS_ROUTING => {
                write_u32_le(payload, 0, 0);
                write_u32_le(payload, 4, 0);
            }
            EXT_BGP_NEXT_HOP_V4 | EXT_IP_NEXT_HOP_V4 | EXT_IP_RECEIVED_V4 => {
                anon4_at(payload, 0, anon);
            }
            EXT_BGP_NEXT_HOP_V6 | EXT_IP_NEXT_HOP_V6 | EXT_IP_RECEIVED_V6 => {
                anon6_at(payload, 0, anon);
            }
            EXT_AS_ADJACENT => {
                write_u32_le(payload, 0, 0);
                write_u32_le(payload, 4, 0);
            }
            EXT_NSEL_XLATE_IPV4 => {
                anon4_at(payload, 0, anon);
                anon4_at(payload, 4, anon);
            }
            EXT_NSEL_XLATE_IPV6 => {
                anon6_at(payload, 0, anon);
                anon6_at(payload, 16, anon);
            }
            // every other extension is inspected but left unmodified
            _ => {}
        }

        cursor = next;
    }

    Ok(())
}
