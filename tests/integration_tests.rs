//! End-to-end tests for the anonymization pipeline
//!
//! Each test authors a synthetic flow archive with the file layer, runs
//! a full pipeline over it, and inspects the output archive byte by
//! byte.

use nfanon::anon::{Anonymizer, KEY_LEN};
use nfanon::error::AnonError;
use nfanon::nffile::block::{DataBlock, DATA_BLOCK_TYPE_2};
use nfanon::nffile::record::{
    ElementHeader, RecordHeader, ELEMENT_HEADER_LEN, EXT_AS_ROUTING, EXT_IPV4_FLOW, EXT_IPV6_FLOW,
    RECORD_HEADER_LEN, V3_FLAG_ANON, V3_HEADER_LEN, V3_RECORD,
};
use nfanon::nffile::{Compression, FileReader, FileWriter, StatRecord};
use nfanon::pipeline::Pipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

// ─── fixtures ────────────────────────────────────────────────────────────

fn test_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    for (i, b) in key.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(17).wrapping_add(3);
    }
    key
}

fn rd32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn rd64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

/// Serialize a V3 record from `(extension type, payload)` pairs
fn v3_record(extensions: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let ext_bytes: usize = extensions
        .iter()
        .map(|(_, p)| ELEMENT_HEADER_LEN + p.len())
        .sum();
    let size = (V3_HEADER_LEN + ext_bytes) as u16;

    let mut rec = Vec::with_capacity(size as usize);
    rec.extend_from_slice(&V3_RECORD.to_le_bytes());
    rec.extend_from_slice(&size.to_le_bytes());
    rec.extend_from_slice(&(extensions.len() as u16).to_le_bytes());
    rec.extend_from_slice(&[0, 0]); // engine type/id
    rec.extend_from_slice(&[0, 0]); // exporter id
    rec.push(0); // flags
    rec.push(3); // nf version
    for (etype, payload) in extensions {
        let length = (ELEMENT_HEADER_LEN + payload.len()) as u16;
        rec.extend_from_slice(&etype.to_le_bytes());
        rec.extend_from_slice(&length.to_le_bytes());
        rec.extend_from_slice(payload);
    }
    rec
}

fn ipv4_ext(src: u32, dst: u32) -> (u16, Vec<u8>) {
    let mut p = Vec::new();
    p.extend_from_slice(&src.to_le_bytes());
    p.extend_from_slice(&dst.to_le_bytes());
    (EXT_IPV4_FLOW, p)
}

fn ipv6_ext(src: [u64; 2], dst: [u64; 2]) -> (u16, Vec<u8>) {
    let mut p = Vec::new();
    for w in src.iter().chain(dst.iter()) {
        p.extend_from_slice(&w.to_le_bytes());
    }
    (EXT_IPV6_FLOW, p)
}

fn as_ext(src_as: u32, dst_as: u32) -> (u16, Vec<u8>) {
    let mut p = Vec::new();
    p.extend_from_slice(&src_as.to_le_bytes());
    p.extend_from_slice(&dst_as.to_le_bytes());
    (EXT_AS_ROUTING, p)
}

fn block_of(block_type: u16, records: &[Vec<u8>]) -> DataBlock {
    let mut data = Vec::new();
    for rec in records {
        data.extend_from_slice(rec);
    }
    DataBlock {
        block_type,
        flags: 0,
        num_records: records.len() as u32,
        data,
    }
}

fn sample_stat() -> StatRecord {
    StatRecord {
        num_flows: 12,
        num_bytes: 34_567,
        num_packets: 89,
        flows_tcp: 8,
        flows_udp: 4,
        flows_icmp: 0,
        flows_other: 0,
        sequence_failures: 0,
        msec_first: 1_700_000_000_000,
        msec_last: 1_700_000_300_000,
    }
}

fn write_archive(path: &Path, ident: &str, blocks: Vec<DataBlock>) {
    let mut writer =
        FileWriter::create(path, ident, "collector", Compression::None, &sample_stat()).unwrap();
    for block in blocks {
        writer.write_block(block).unwrap();
    }
    writer.finalize().unwrap();
}

fn read_blocks(path: &Path) -> (FileReader, Vec<DataBlock>) {
    let mut reader = FileReader::open(path).unwrap();
    let mut blocks = Vec::new();
    while let Some(block) = reader.read_block(None).unwrap() {
        blocks.push(block);
    }
    (reader, blocks)
}

fn run_pipeline(workers: usize, inputs: &[PathBuf], output: Option<PathBuf>) -> nfanon::Result<nfanon::PipelineStats> {
    let anon = Arc::new(Anonymizer::with_key(&test_key()));
    let pipeline = Pipeline::new(workers, output, anon).unwrap();
    pipeline.run(inputs, |_| {})
}

// ─── scenarios ───────────────────────────────────────────────────────────

/// S1: one IPv4 flow record, one worker; output differs from input only
/// in the two address fields and the ANON flag
#[test]
fn test_single_ipv4_flow_single_worker() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("nfcapd.in");
    let output = dir.path().join("nfcapd.out");

    let src = 0x0A000001u32; // 10.0.0.1
    let dst = 0x0A000002u32; // 10.0.0.2
    let record = v3_record(&[ipv4_ext(src, dst)]);
    write_archive(&input, "ident-s1", vec![block_of(DATA_BLOCK_TYPE_2, &[record.clone()])]);

    run_pipeline(1, &[input.clone()], Some(output.clone())).unwrap();

    let (reader, blocks) = read_blocks(&output);
    assert_eq!(reader.creator(), "nfanon");
    assert_eq!(reader.ident(), "ident-s1");
    assert_eq!(reader.stat(), &sample_stat());

    assert_eq!(blocks.len(), 1);
    let out = &blocks[0];
    assert_eq!(out.num_records, 1);
    assert_eq!(out.data.len(), record.len());

    let anon = Anonymizer::with_key(&test_key());
    let addr_off = V3_HEADER_LEN + ELEMENT_HEADER_LEN;
    assert_eq!(rd32(&out.data, addr_off), anon.anon4(src));
    assert_eq!(rd32(&out.data, addr_off + 4), anon.anon4(dst));
    assert_ne!(rd32(&out.data, addr_off), src);

    // ANON flag set, all other bytes untouched
    assert_eq!(out.data[10] & V3_FLAG_ANON, V3_FLAG_ANON);
    let mut expected = record;
    expected[10] |= V3_FLAG_ANON;
    expected[addr_off..addr_off + 4].copy_from_slice(&anon.anon4(src).to_le_bytes());
    expected[addr_off + 4..addr_off + 8].copy_from_slice(&anon.anon4(dst).to_le_bytes());
    assert_eq!(out.data, expected);
}

/// S2: 12 records cycling ipv4/ipv6/AS extensions across four workers
#[test]
fn test_mixed_records_four_workers() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("nfcapd.in");
    let output = dir.path().join("nfcapd.out");

    let records: Vec<Vec<u8>> = (0..12u32)
        .map(|i| match i % 3 {
            0 => v3_record(&[ipv4_ext(0x0A000000 + i, 0xC0A80000 + i)]),
            1 => v3_record(&[ipv6_ext([0x2001_0db8, i as u64], [0x2001_0db8, 0x100 + i as u64])]),
            _ => v3_record(&[as_ext(65000 + i, 64000 + i)]),
        })
        .collect();
    write_archive(&input, "ident-s2", vec![block_of(DATA_BLOCK_TYPE_2, &records)]);

    let stats = run_pipeline(4, &[input.clone()], Some(output.clone())).unwrap();
    assert_eq!(stats.records_anonymized, 12);
    assert_eq!(stats.flow_blocks, 1);

    let (_, blocks) = read_blocks(&output);
    let data = &blocks[0].data;
    let anon = Anonymizer::with_key(&test_key());

    let mut offset = 0usize;
    for (i, original) in records.iter().enumerate() {
        let hdr = RecordHeader::parse(&data[offset..]).unwrap();
        assert_eq!(hdr.rtype, V3_RECORD);
        assert_eq!(hdr.size as usize, original.len(), "order preserved");
        assert_eq!(data[offset + 10] & V3_FLAG_ANON, V3_FLAG_ANON, "record {}", i);

        let ext = ElementHeader::parse(&data[offset + V3_HEADER_LEN..]).unwrap();
        let payload = offset + V3_HEADER_LEN + ELEMENT_HEADER_LEN;
        match i % 3 {
            0 => {
                assert_eq!(ext.etype, EXT_IPV4_FLOW);
                assert_eq!(rd32(data, payload), anon.anon4(0x0A000000 + i as u32));
            }
            1 => {
                assert_eq!(ext.etype, EXT_IPV6_FLOW);
                let got = [rd64(data, payload), rd64(data, payload + 8)];
                assert_eq!(got, anon.anon6([0x2001_0db8, i as u64]));
            }
            _ => {
                assert_eq!(ext.etype, EXT_AS_ROUTING);
                assert_eq!(rd32(data, payload), 0);
                assert_eq!(rd32(data, payload + 4), 0);
            }
        }
        offset += hdr.size as usize;
    }
    assert_eq!(offset, data.len());
}

/// S3: a block of a type that carries no flow records passes through
/// byte-identical
#[test]
fn test_passthrough_block_unchanged() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("nfcapd.in");
    let output = dir.path().join("nfcapd.out");

    let payload: Vec<u8> = (0..200u8).collect();
    let odd = DataBlock {
        block_type: 1,
        flags: 0x55,
        num_records: 7, // opaque to the pipeline
        data: payload.clone(),
    };
    write_archive(&input, "", vec![odd]);

    let stats = run_pipeline(2, &[input], Some(output.clone())).unwrap();
    assert_eq!(stats.blocks, 1);
    assert_eq!(stats.flow_blocks, 0);

    let (_, blocks) = read_blocks(&output);
    assert_eq!(blocks[0].block_type, 1);
    assert_eq!(blocks[0].flags, 0x55);
    assert_eq!(blocks[0].num_records, 7);
    assert_eq!(blocks[0].data, payload);
}

/// S4: two input files, no explicit output: both are replaced in place
/// with statistics and identity preserved and no -tmp files left behind
#[test]
fn test_two_file_in_place_run() {
    let dir = tempdir().unwrap();
    let file_a = dir.path().join("nfcapd.a");
    let file_b = dir.path().join("nfcapd.b");

    for (path, ident) in [(&file_a, "ident-a"), (&file_b, "ident-b")] {
        let record = v3_record(&[ipv4_ext(0x0A010203, 0x0A010204)]);
        write_archive(path, ident, vec![block_of(DATA_BLOCK_TYPE_2, &[record])]);
    }

    let stats = run_pipeline(2, &[file_a.clone(), file_b.clone()], None).unwrap();
    assert_eq!(stats.files, 2);

    // originals replaced, no temporaries left
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let name = entry.unwrap().file_name();
        assert!(!name.to_string_lossy().ends_with("-tmp"), "leftover {:?}", name);
    }

    for (path, ident) in [(&file_a, "ident-a"), (&file_b, "ident-b")] {
        let (reader, blocks) = read_blocks(path);
        assert_eq!(reader.creator(), "nfanon");
        assert_eq!(reader.ident(), ident);
        assert_eq!(reader.stat(), &sample_stat());
        assert_eq!(blocks[0].data[10] & V3_FLAG_ANON, V3_FLAG_ANON);
    }
}

/// S5: an unknown extension sandwiched between two IPv4 flow extensions
/// is preserved while both neighbors are anonymized
#[test]
fn test_unknown_extension_sandwich() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("nfcapd.in");
    let output = dir.path().join("nfcapd.out");

    let mystery: Vec<u8> = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03, 0x04];
    let record = v3_record(&[
        ipv4_ext(0x08080808, 0x08080404),
        (4242, mystery.clone()),
        ipv4_ext(0x01010101, 0x09090909),
    ]);
    write_archive(&input, "", vec![block_of(DATA_BLOCK_TYPE_2, &[record])]);

    run_pipeline(1, &[input], Some(output.clone())).unwrap();

    let (_, blocks) = read_blocks(&output);
    let data = &blocks[0].data;
    let anon = Anonymizer::with_key(&test_key());

    let first = V3_HEADER_LEN + ELEMENT_HEADER_LEN;
    assert_eq!(rd32(data, first), anon.anon4(0x08080808));
    assert_eq!(rd32(data, first + 4), anon.anon4(0x08080404));

    let mystery_off = first + 8 + ELEMENT_HEADER_LEN;
    assert_eq!(&data[mystery_off..mystery_off + mystery.len()], &mystery[..]);

    let second = mystery_off + mystery.len() + ELEMENT_HEADER_LEN;
    assert_eq!(rd32(data, second), anon.anon4(0x01010101));
    assert_eq!(rd32(data, second + 4), anon.anon4(0x09090909));
}

/// S6: a record declaring a size beyond the block aborts the run with a
/// corruption error; the input survives and the -tmp output is never
/// renamed over it
#[test]
fn test_corrupt_block_aborts_run() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("nfcapd.bad");

    let mut record = v3_record(&[ipv4_ext(1, 2)]);
    record[2..4].copy_from_slice(&0xFFFFu16.to_le_bytes()); // size >> block
    write_archive(&input, "ident-bad", vec![block_of(DATA_BLOCK_TYPE_2, &[record])]);
    let original = std::fs::read(&input).unwrap();

    let err = run_pipeline(2, &[input.clone()], None).unwrap_err();
    assert!(matches!(err, AnonError::Corrupt(_)), "got {:?}", err);

    // input untouched; the abandoned temporary was never renamed over it
    assert_eq!(std::fs::read(&input).unwrap(), original);
    let tmp = dir.path().join("nfcapd.bad-tmp");
    assert!(tmp.exists(), "abandoned -tmp output should remain");
}

// ─── properties ──────────────────────────────────────────────────────────

/// Determinism: two runs with the same key produce byte-identical output
#[test]
fn test_determinism() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("nfcapd.in");
    let out_a = dir.path().join("a.out");
    let out_b = dir.path().join("b.out");

    let records: Vec<Vec<u8>> = (0..6u32)
        .map(|i| v3_record(&[ipv4_ext(0xC0A80000 + i, 0x0A000000 + i)]))
        .collect();
    write_archive(&input, "same", vec![block_of(DATA_BLOCK_TYPE_2, &records)]);

    run_pipeline(3, &[input.clone()], Some(out_a.clone())).unwrap();
    run_pipeline(1, &[input], Some(out_b.clone())).unwrap();

    // worker count does not influence the bytes either
    assert_eq!(std::fs::read(&out_a).unwrap(), std::fs::read(&out_b).unwrap());
}

/// Key sensitivity: distinct keys disagree on any non-zero address
#[test]
fn test_key_sensitivity() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("nfcapd.in");
    let out_a = dir.path().join("a.out");
    let out_b = dir.path().join("b.out");

    let record = v3_record(&[ipv4_ext(0x0A141E28, 0x0A141E29)]);
    write_archive(&input, "", vec![block_of(DATA_BLOCK_TYPE_2, &[record])]);

    let run_with = |key: [u8; KEY_LEN], out: &Path| {
        let anon = Arc::new(Anonymizer::with_key(&key));
        let pipeline = Pipeline::new(1, Some(out.to_path_buf()), anon).unwrap();
        pipeline.run(&[input.clone()], |_| {}).unwrap();
    };

    let mut other_key = test_key();
    other_key[5] ^= 0x80;
    run_with(test_key(), &out_a);
    run_with(other_key, &out_b);

    let (_, blocks_a) = read_blocks(&out_a);
    let (_, blocks_b) = read_blocks(&out_b);
    assert_ne!(blocks_a[0].data, blocks_b[0].data);
}

/// A second pass over already-anonymized output keeps the ANON flag set
/// and the records structurally valid
#[test]
fn test_second_pass_stays_valid() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("nfcapd.in");

    let records: Vec<Vec<u8>> = (0..4u32)
        .map(|i| v3_record(&[ipv4_ext(0x0A000000 + i, 0x0B000000 + i)]))
        .collect();
    write_archive(&input, "twice", vec![block_of(DATA_BLOCK_TYPE_2, &records)]);

    run_pipeline(2, &[input.clone()], None).unwrap();
    let stats = run_pipeline(2, &[input.clone()], None).unwrap();
    assert_eq!(stats.records_anonymized, 4);

    let (_, blocks) = read_blocks(&input);
    let data = &blocks[0].data;
    let mut offset = 0;
    for _ in 0..blocks[0].num_records {
        let hdr = RecordHeader::parse(&data[offset..]).unwrap();
        assert_eq!(data[offset + 10] & V3_FLAG_ANON, V3_FLAG_ANON);
        offset += hdr.size as usize;
    }
    assert_eq!(offset, data.len());
}

/// Compression mode survives the trip: deflate input produces deflate
/// output with the record area intact
#[test]
fn test_compression_propagated() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("nfcapd.z");
    let output = dir.path().join("anon.z");

    let record = v3_record(&[ipv4_ext(0x0A0A0A0A, 0x0B0B0B0B)]);
    let block = block_of(DATA_BLOCK_TYPE_2, &[record]);
    let mut writer = FileWriter::create(
        &input,
        "packed",
        "collector",
        Compression::Deflate,
        &sample_stat(),
    )
    .unwrap();
    writer.write_block(block).unwrap();
    writer.finalize().unwrap();

    run_pipeline(1, &[input], Some(output.clone())).unwrap();

    let (reader, blocks) = read_blocks(&output);
    assert_eq!(reader.compression(), Compression::Deflate);
    assert_eq!(blocks[0].num_records, 1);
    assert_eq!(blocks[0].data[10] & V3_FLAG_ANON, V3_FLAG_ANON);
}

/// Pass-through record types inside a flow block keep their bytes
#[test]
fn test_non_flow_records_inside_flow_block() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("nfcapd.in");
    let output = dir.path().join("nfcapd.out");

    // an exporter-info record framed between two flow records
    let mut exporter = Vec::new();
    exporter.extend_from_slice(&7u16.to_le_bytes()); // ExporterInfoRecord
    exporter.extend_from_slice(&((RECORD_HEADER_LEN + 12) as u16).to_le_bytes());
    exporter.extend_from_slice(&[0x11; 12]);

    let records = vec![
        v3_record(&[ipv4_ext(1, 2)]),
        exporter.clone(),
        v3_record(&[ipv4_ext(3, 4)]),
    ];
    write_archive(&input, "", vec![block_of(DATA_BLOCK_TYPE_2, &records)]);

    let stats = run_pipeline(2, &[input], Some(output.clone())).unwrap();
    assert_eq!(stats.records_anonymized, 2);
    assert_eq!(stats.records_passed, 1);

    let (_, blocks) = read_blocks(&output);
    let exporter_off = records[0].len();
    assert_eq!(
        &blocks[0].data[exporter_off..exporter_off + exporter.len()],
        &exporter[..]
    );
}
