//! Flow archive file layer
//!
//! Binary layout of an archive (all integers little-endian):
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │ magic u16 │ version u16 │ comp u8 │ enc u8     │
//! │ reserved u16 │ num_blocks u32                  │
//! │ creator [u8; 16]                               │
//! │ ident_len u16 │ ident bytes                    │
//! │ stat record (80 bytes)                         │
//! ├────────────────────────────────────────────────┤
//! │ block 0: header (16 bytes) + stored payload    │
//! │ block 1: ...                                   │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! `num_blocks` is written as zero at creation and patched in place by
//! [`FileWriter::finalize`]; a reader therefore only trusts finalized
//! files. Block payloads are stored raw or deflate-compressed depending
//! on the per-file compression mode, which the pipeline propagates from
//! input to output.

pub mod block;
pub mod record;

use crate::error::{AnonError, ConfigError, FileError, Result};
use block::{DataBlock, BLOCK_HEADER_LEN};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Archive file magic
pub const MAGIC: u16 = 0xA50C;

/// Archive layout version understood by this crate
pub const LAYOUT_VERSION: u16 = 1;

/// Fixed length of the NUL-padded creator tag
pub const CREATOR_LEN: usize = 16;

/// Serialized statistics record length
pub const STAT_RECORD_LEN: usize = 80;

/// Sanity cap for the identity string
const MAX_IDENT_LEN: usize = 1024;

/// Byte offset of `num_blocks` in the file header, patched at finalize
const NUM_BLOCKS_OFFSET: u64 = 8;

/// Per-file block payload compression mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Payloads stored raw
    None,
    /// Payloads deflate-compressed
    Deflate,
}

impl Compression {
    pub fn from_mode(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(Compression::None),
            1 => Some(Compression::Deflate),
            _ => None,
        }
    }

    pub fn mode(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Deflate => 1,
        }
    }
}

/// Aggregate statistics for one archive
///
/// The pipeline copies this byte-exact from input to output; only the
/// file layer ever interprets the fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatRecord {
    pub num_flows: u64,
    pub num_bytes: u64,
    pub num_packets: u64,
    pub flows_tcp: u64,
    pub flows_udp: u64,
    pub flows_icmp: u64,
    pub flows_other: u64,
    pub sequence_failures: u64,
    pub msec_first: u64,
    pub msec_last: u64,
}

impl StatRecord {
    pub fn to_bytes(&self) -> [u8; STAT_RECORD_LEN] {
        let fields = [
            self.num_flows,
            self.num_bytes,
            self.num_packets,
            self.flows_tcp,
            self.flows_udp,
            self.flows_icmp,
            self.flows_other,
            self.sequence_failures,
            self.msec_first,
            self.msec_last,
        ];
        let mut out = [0u8; STAT_RECORD_LEN];
        for (i, f) in fields.iter().enumerate() {
            out[i * 8..(i + 1) * 8].copy_from_slice(&f.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(buf: &[u8; STAT_RECORD_LEN]) -> Self {
        let mut fields = [0u64; 10];
        for (i, f) in fields.iter_mut().enumerate() {
            let mut b = [0u8; 8];
            b.copy_from_slice(&buf[i * 8..(i + 1) * 8]);
            *f = u64::from_le_bytes(b);
        }
        Self {
            num_flows: fields[0],
            num_bytes: fields[1],
            num_packets: fields[2],
            flows_tcp: fields[3],
            flows_udp: fields[4],
            flows_icmp: fields[5],
            flows_other: fields[6],
            sequence_failures: fields[7],
            msec_first: fields[8],
            msec_last: fields[9],
        }
    }
}

fn io_err(path: &Path, source: std::io::Error) -> FileError {
    FileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Sequential reader over one archive file
pub struct FileReader {
    path: PathBuf,
    inner: BufReader<File>,
    compression: Compression,
    creator: String,
    ident: String,
    stat: StatRecord,
    num_blocks: u32,
    blocks_read: u32,
}

impl FileReader {
    /// Open an archive and parse its header
    pub fn open(path: &Path) -> std::result::Result<Self, FileError> {
        let file = File::open(path).map_err(|e| io_err(path, e))?;
        let mut inner = BufReader::new(file);

        let mut fixed = [0u8; 12];
        inner
            .read_exact(&mut fixed)
            .map_err(|_| FileError::Truncated {
                path: path.to_path_buf(),
                what: "file header".into(),
            })?;

        let magic = u16::from_le_bytes([fixed[0], fixed[1]]);
        if magic != MAGIC {
            return Err(FileError::BadMagic {
                path: path.to_path_buf(),
                found: magic,
            });
        }

        let version = u16::from_le_bytes([fixed[2], fixed[3]]);
        if version != LAYOUT_VERSION {
            return Err(FileError::UnsupportedVersion {
                path: path.to_path_buf(),
                version,
            });
        }

        let compression = Compression::from_mode(fixed[4]).ok_or(FileError::UnknownCompression {
            path: path.to_path_buf(),
            mode: fixed[4],
        })?;

        if fixed[5] != 0 {
            return Err(FileError::Encrypted {
                path: path.to_path_buf(),
            });
        }

        let num_blocks = u32::from_le_bytes([fixed[8], fixed[9], fixed[10], fixed[11]]);

        let mut creator_buf = [0u8; CREATOR_LEN];
        inner
            .read_exact(&mut creator_buf)
            .map_err(|_| FileError::Truncated {
                path: path.to_path_buf(),
                what: "creator tag".into(),
            })?;
        let creator_end = creator_buf
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(CREATOR_LEN);
        let creator = String::from_utf8_lossy(&creator_buf[..creator_end]).into_owned();

        let mut len_buf = [0u8; 2];
        inner
            .read_exact(&mut len_buf)
            .map_err(|_| FileError::Truncated {
                path: path.to_path_buf(),
                what: "ident length".into(),
            })?;
        let ident_len = u16::from_le_bytes(len_buf) as usize;
        if ident_len > MAX_IDENT_LEN {
            return Err(FileError::Truncated {
                path: path.to_path_buf(),
                what: format!("ident length {} exceeds cap", ident_len),
            });
        }

        let mut ident_buf = vec![0u8; ident_len];
        inner
            .read_exact(&mut ident_buf)
            .map_err(|_| FileError::Truncated {
                path: path.to_path_buf(),
                what: "ident".into(),
            })?;
        let ident = String::from_utf8_lossy(&ident_buf).into_owned();

        let mut stat_buf = [0u8; STAT_RECORD_LEN];
        inner
            .read_exact(&mut stat_buf)
            .map_err(|_| FileError::Truncated {
                path: path.to_path_buf(),
                what: "stat record".into(),
            })?;
        let stat = StatRecord::from_bytes(&stat_buf);

        debug!(
            path = %path.display(),
            blocks = num_blocks,
            compression = ?compression,
            "Opened archive"
        );

        Ok(Self {
            path: path.to_path_buf(),
            inner,
            compression,
            creator,
            ident,
            stat,
            num_blocks,
            blocks_read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub fn stat(&self) -> &StatRecord {
        &self.stat
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    /// Read the next data block, reusing `reuse`'s allocation when given.
    /// Returns `None` once all blocks have been read.
    pub fn read_block(
        &mut self,
        reuse: Option<DataBlock>,
    ) -> std::result::Result<Option<DataBlock>, FileError> {
        if self.blocks_read >= self.num_blocks {
            return Ok(None);
        }

        let mut header = [0u8; BLOCK_HEADER_LEN];
        self.inner
            .read_exact(&mut header)
            .map_err(|_| FileError::Truncated {
                path: self.path.clone(),
                what: format!("block {} header", self.blocks_read),
            })?;

        let block_type = u16::from_le_bytes([header[0], header[1]]);
        let flags = u16::from_le_bytes([header[2], header[3]]);
        let num_records = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let size = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
        let stored = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as usize;

        let mut stored_buf = vec![0u8; stored];
        self.inner
            .read_exact(&mut stored_buf)
            .map_err(|_| FileError::Truncated {
                path: self.path.clone(),
                what: format!("block {} payload", self.blocks_read),
            })?;

        let mut block = reuse.unwrap_or_default();
        block.clear();
        block.block_type = block_type;
        block.flags = flags;
        block.num_records = num_records;

        match self.compression {
            Compression::None => {
                if stored != size {
                    return Err(FileError::InflateMismatch {
                        expected: size,
                        got: stored,
                    });
                }
                block.data.extend_from_slice(&stored_buf);
            }
            Compression::Deflate => {
                block.data.reserve(size);
                let mut decoder = flate2::read::DeflateDecoder::new(&stored_buf[..]);
                decoder
                    .read_to_end(&mut block.data)
                    .map_err(|e| io_err(&self.path, e))?;
                if block.data.len() != size {
                    return Err(FileError::InflateMismatch {
                        expected: size,
                        got: block.data.len(),
                    });
                }
            }
        }

        self.blocks_read += 1;
        Ok(Some(block))
    }
}

/// Sequential writer producing one archive file
pub struct FileWriter {
    path: PathBuf,
    inner: BufWriter<File>,
    compression: Compression,
    num_blocks: u32,
}

impl FileWriter {
    /// Create an archive, writing the full header up front with
    /// `num_blocks = 0`; [`finalize`](Self::finalize) patches the count.
    pub fn create(
        path: &Path,
        ident: &str,
        creator: &str,
        compression: Compression,
        stat: &StatRecord,
    ) -> std::result::Result<Self, FileError> {
        let file = File::create(path).map_err(|e| io_err(path, e))?;
        let mut inner = BufWriter::new(file);

        let mut fixed = [0u8; 12];
        fixed[0..2].copy_from_slice(&MAGIC.to_le_bytes());
        fixed[2..4].copy_from_slice(&LAYOUT_VERSION.to_le_bytes());
        fixed[4] = compression.mode();
        fixed[5] = 0; // encryption disabled
        inner.write_all(&fixed).map_err(|e| io_err(path, e))?;

        let mut creator_buf = [0u8; CREATOR_LEN];
        let creator_bytes = creator.as_bytes();
        let n = creator_bytes.len().min(CREATOR_LEN);
        creator_buf[..n].copy_from_slice(&creator_bytes[..n]);
        inner.write_all(&creator_buf).map_err(|e| io_err(path, e))?;

        let ident_bytes = ident.as_bytes();
        let ident_len = ident_bytes.len().min(MAX_IDENT_LEN) as u16;
        inner
            .write_all(&ident_len.to_le_bytes())
            .map_err(|e| io_err(path, e))?;
        inner
            .write_all(&ident_bytes[..ident_len as usize])
            .map_err(|e| io_err(path, e))?;

        inner
            .write_all(&stat.to_bytes())
            .map_err(|e| io_err(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            inner,
            compression,
            num_blocks: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one block and hand the buffer back for reuse
    pub fn write_block(
        &mut self,
        block: DataBlock,
    ) -> std::result::Result<DataBlock, FileError> {
        let stored: std::borrow::Cow<[u8]> = match self.compression {
            Compression::None => std::borrow::Cow::Borrowed(&block.data),
            Compression::Deflate => {
                let mut encoder = flate2::write::DeflateEncoder::new(
                    Vec::with_capacity(block.data.len() / 2 + 16),
                    flate2::Compression::default(),
                );
                encoder
                    .write_all(&block.data)
                    .map_err(|e| io_err(&self.path, e))?;
                std::borrow::Cow::Owned(encoder.finish().map_err(|e| io_err(&self.path, e))?)
            }
        };

        let mut header = [0u8; BLOCK_HEADER_LEN];
        header[0..2].copy_from_slice(&block.block_type.to_le_bytes());
        header[2..4].copy_from_slice(&block.flags.to_le_bytes());
        header[4..8].copy_from_slice(&block.num_records.to_le_bytes());
        header[8..12].copy_from_slice(&(block.data.len() as u32).to_le_bytes());
        header[12..16].copy_from_slice(&(stored.len() as u32).to_le_bytes());

        self.inner
            .write_all(&header)
            .map_err(|e| io_err(&self.path, e))?;
        self.inner
            .write_all(&stored)
            .map_err(|e| io_err(&self.path, e))?;

        self.num_blocks += 1;
        Ok(block)
    }

    /// Flush, patch the block count into the header, and close
    pub fn finalize(self) -> std::result::Result<(), FileError> {
        let path = self.path;
        let mut file = self
            .inner
            .into_inner()
            .map_err(|e| io_err(&path, e.into_error()))?;

        file.seek(SeekFrom::Start(NUM_BLOCKS_OFFSET))
            .map_err(|e| io_err(&path, e))?;
        file.write_all(&self.num_blocks.to_le_bytes())
            .map_err(|e| io_err(&path, e))?;
        file.sync_all().map_err(|e| io_err(&path, e))?;

        debug!(path = %path.display(), blocks = self.num_blocks, "Finalized archive");
        Ok(())
    }
}

/// Enumerate the input file sequence
///
/// A single file is processed alone; a directory contributes its regular
/// files in name order (no recursion).
pub fn discover_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)
            .map_err(AnonError::Io)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(ConfigError::EmptyInput {
                path: path.to_path_buf(),
            }
            .into());
        }
        return Ok(files);
    }

    Err(ConfigError::InvalidInputPath {
        path: path.to_path_buf(),
    }
    .into())
}
