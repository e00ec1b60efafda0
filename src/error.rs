//! Error types for nfanon
//!
//! This module defines the error hierarchy for the anonymization pipeline:
//! - Configuration and CLI errors (bad key, bad input path)
//! - Archive file errors (framing, compression, rename)
//! - Worker thread errors
//! - Stream corruption errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include context about what to do
//! - Corruption errors are fatal: the pipeline aborts and never retries

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the nfanon application
#[derive(Error, Debug)]
pub enum AnonError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Archive file errors
    #[error("File error: {0}")]
    File(#[from] FileError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Fatal stream corruption
    #[error("Corrupt data file: {0}")]
    Corrupt(#[from] CorruptError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No -K key flag was given
    #[error("Expect -K <key>")]
    MissingKey,

    /// No -r input flag was given
    #[error("Expect -r <path>")]
    MissingInput,

    /// Key does not parse as a CryptoPAn key
    #[error("Invalid CryptoPAn key: {reason}")]
    InvalidKey { reason: String },

    /// Key argument exceeds the accepted length
    #[error("Key argument too long: {len} characters (maximum {max})")]
    KeyTooLong { len: usize, max: usize },

    /// Input path is neither a file nor a directory
    #[error("'{path}' is not a file or directory")]
    InvalidInputPath { path: PathBuf },

    /// Input directory contains no files
    #[error("No files to process in '{path}'")]
    EmptyInput { path: PathBuf },

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },
}

/// Archive file errors
#[derive(Error, Debug)]
pub enum FileError {
    /// File does not start with the archive magic
    #[error("'{path}' is not a flow archive (bad magic 0x{found:04x})")]
    BadMagic { path: PathBuf, found: u16 },

    /// Archive layout version not understood
    #[error("Unsupported archive version {version} in '{path}'")]
    UnsupportedVersion { path: PathBuf, version: u16 },

    /// Encrypted archives are not processed
    #[error("'{path}' is encrypted; encrypted archives are not supported")]
    Encrypted { path: PathBuf },

    /// Unknown compression mode byte
    #[error("Unknown compression mode {mode} in '{path}'")]
    UnknownCompression { path: PathBuf, mode: u8 },

    /// Header or block ended before its declared length
    #[error("Truncated archive '{path}': {what}")]
    Truncated { path: PathBuf, what: String },

    /// Decompressed payload length disagrees with the block header
    #[error("Block payload decompressed to {got} bytes, header says {expected}")]
    InflateMismatch { expected: usize, got: usize },

    /// Failed to replace the input file with the anonymized output
    #[error("Failed to rename '{from}' to '{to}': {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    /// I/O error while reading or writing an archive
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker thread creation failed
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Worker panicked
    #[error("Worker {id} panicked")]
    Panicked { id: usize },
}

/// Fatal stream corruption
///
/// Any of these means the block framing can no longer be trusted; the
/// pipeline terminates without writing further output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorruptError {
    /// A record declares a size smaller than its own header
    #[error("record {index} declares size {size}, smaller than the record header")]
    RecordTooSmall { index: u32, size: u16 },

    /// Accumulated record sizes exceed the block size
    #[error("record {index} overruns the block: {accumulated} + {size} > {block_size}")]
    BlockOverrun {
        index: u32,
        accumulated: usize,
        size: u16,
        block_size: usize,
    },

    /// The block ended before all declared records were seen
    #[error("block truncated at record {index} of {num_records}")]
    TruncatedRecord { index: u32, num_records: u32 },

    /// An extension header declares a length smaller than itself
    #[error("extension {index} declares length {length}, smaller than the element header")]
    BadElementLength { index: u16, length: u16 },

    /// The extension cursor walked past the end of its record
    #[error("extension {index} overruns its record: cursor {cursor} > record end {end}")]
    ExtensionOverrun { index: u16, cursor: usize, end: usize },

    /// An address-bearing extension is shorter than its payload layout
    #[error("extension {index} (type {ext_type}) payload is {got} bytes, need {need}")]
    ShortExtension {
        index: u16,
        ext_type: u16,
        got: usize,
        need: usize,
    },
}

/// Result type alias for AnonError
pub type Result<T> = std::result::Result<T, AnonError>;
