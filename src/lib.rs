//! nfanon - Flow Archive Anonymizer
//!
//! Anonymizes the IP addresses in flow-record archives: every address is
//! replaced with a prefix-preserving CryptoPAn pseudonym derived from a
//! user-supplied key, AS numbers are cleared, and the records are written
//! back with file framing, statistics and compression intact.
//!
//! # Features
//!
//! - **Prefix-preserving**: addresses sharing a network prefix before
//!   anonymization share one after, so traffic analysis on the output
//!   still groups hosts correctly.
//!
//! - **In-place mutation**: records are rewritten inside their data
//!   block; output archives are byte-identical to the input outside the
//!   recognized address fields.
//!
//! - **Parallel**: a pool of worker threads splits each block by record
//!   index, coordinated by a two-sided barrier with one fork/join cycle
//!   per block.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Input archives                         │
//! │               (file, or directory of files)                 │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ framed data blocks
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Controller: read block ─ publish ─ release ─ wait ─ write  │
//! │                                                             │
//! │   ┌─────────┐  ┌─────────┐  ┌─────────┐      ┌─────────┐    │
//! │   │Worker 0 │  │Worker 1 │  │Worker 2 │ ...  │Worker N │    │
//! │   │ i%N==0  │  │ i%N==1  │  │ i%N==2  │      │i%N==N-1 │    │
//! │   └─────────┘  └─────────┘  └─────────┘      └─────────┘    │
//! │        each rewrites the address fields of its records      │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               ▼
//!                  ┌─────────────────────────┐
//!                  │    Output archives      │
//!                  │ (<input>-tmp + rename,  │
//!                  │  or a single -w file)   │
//!                  └─────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Anonymize one capture file in place
//! nfanon -K 0123456789abcdef0123456789abcdef -r nfcapd.202601011200
//!
//! # A whole directory, quietly, with an explicit pool size
//! nfanon -K 0x00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff \
//!        -r /data/flows -q --workers 4
//! ```

pub mod anon;
pub mod config;
pub mod error;
pub mod nffile;
pub mod pipeline;
pub mod progress;

pub use anon::Anonymizer;
pub use config::{AnonConfig, CliArgs};
pub use error::{AnonError, Result};
pub use pipeline::{Pipeline, PipelineStats, ProgressEvent};
