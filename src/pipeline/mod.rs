//! Anonymization pipeline
//!
//! One controller thread streams data blocks from the input archives
//! through a fixed pool of worker threads and writes each mutated block
//! back out, preserving framing, order, statistics and compression.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!                  │         Controller           │
//!                  │  read block → publish → wait │
//!                  │  → write block               │
//!                  └──────────────┬───────────────┘
//!                                 │ barrier release / rendezvous
//!        ┌────────────────────────┼────────────────────────┐
//!        │                        │                        │
//!  ┌─────▼─────┐            ┌─────▼─────┐            ┌─────▼─────┐
//!  │ Worker 0  │            │ Worker 1  │            │ Worker N-1│
//!  │ records   │            │ records   │            │ records   │
//!  │ 0,N,2N,.. │            │ 1,N+1,..  │            │ N-1,2N-1..│
//!  └───────────┘            └───────────┘            └───────────┘
//! ```
//!
//! Exactly one block is in flight at a time; workers mutate disjoint
//! mod-N slices of it in place. Blocks that carry no flow records bypass
//! the pool entirely.

pub mod barrier;
pub mod partition;
pub mod walker;
pub mod worker;

use crate::anon::Anonymizer;
use crate::error::{AnonError, FileError, Result};
use crate::nffile::block::DataBlock;
use crate::nffile::{FileReader, FileWriter};
use barrier::Barrier;
use partition::SharedBlock;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use worker::{Poison, WorkSlot, Worker};

/// Creator tag stamped into every output archive
pub const CREATOR: &str = "nfanon";

/// Totals for a completed run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Input files fully processed
    pub files: u64,
    /// Blocks read (flow data or not)
    pub blocks: u64,
    /// Blocks run through the worker pool
    pub flow_blocks: u64,
    /// Record-area bytes streamed
    pub bytes: u64,
    /// V3 records anonymized
    pub records_anonymized: u64,
    /// Known non-flow records passed through
    pub records_passed: u64,
    /// Unknown records passed through with a warning
    pub records_unknown: u64,
    pub duration: Duration,
}

/// Progress callbacks emitted while the pipeline runs
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    /// Starting on the next input file
    File { index: usize, path: &'a Path },
    /// A block finished (running total)
    Block { blocks: u64 },
}

/// The controller plus its worker pool
pub struct Pipeline {
    worker_count: usize,
    output: Option<PathBuf>,
    barrier: Arc<Barrier>,
    slots: Vec<Arc<WorkSlot>>,
    poison: Arc<Poison>,
    workers: Vec<Worker>,
    stat_handles: Vec<Arc<worker::WorkerStats>>,
    files: u64,
    blocks: u64,
    flow_blocks: u64,
    bytes: u64,
}

impl Pipeline {
    /// Spawn the worker pool
    ///
    /// `output` of `None` selects in-place mode: each input is rewritten
    /// via `<input>-tmp` and an atomic rename. A spawn failure tears down
    /// every worker already started and reports an error.
    pub fn new(
        worker_count: usize,
        output: Option<PathBuf>,
        anon: Arc<Anonymizer>,
    ) -> Result<Self> {
        let barrier = Arc::new(Barrier::new(worker_count));
        let poison = Arc::new(Poison::new());

        let mut slots = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let slot = Arc::new(WorkSlot::new());
            match Worker::spawn(
                id,
                worker_count,
                Arc::clone(&slot),
                Arc::clone(&barrier),
                Arc::clone(&anon),
                Arc::clone(&poison),
            ) {
                Ok(w) => {
                    slots.push(slot);
                    workers.push(w);
                }
                Err(e) => {
                    barrier.abort();
                    for w in workers {
                        let _ = w.join();
                    }
                    return Err(e.into());
                }
            }
        }

        info!(workers = worker_count, "Worker pool ready");

        let stat_handles = workers.iter().map(|w| w.shared_stats()).collect();

        Ok(Self {
            worker_count,
            output,
            barrier,
            slots,
            poison,
            workers,
            stat_handles,
            files: 0,
            blocks: 0,
            flow_blocks: 0,
            bytes: 0,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Process every input file in sequence, then shut the pool down
    ///
    /// On error the pool is still torn down cleanly; whatever `-tmp`
    /// output existed for the failing file is left unrenamed.
    pub fn run<F>(mut self, inputs: &[PathBuf], mut on_progress: F) -> Result<PipelineStats>
    where
        F: FnMut(ProgressEvent<'_>),
    {
        let start = Instant::now();

        // all workers park right after spawn; wait for that
        self.barrier.controller_wait();

        let outcome = self.process_files(inputs, &mut on_progress);

        self.shutdown();

        let mut stats = PipelineStats {
            files: self.files,
            blocks: self.blocks,
            flow_blocks: self.flow_blocks,
            bytes: self.bytes,
            duration: start.elapsed(),
            ..Default::default()
        };
        for w in &self.stat_handles {
            stats.records_anonymized += w.anonymized.load(Ordering::Relaxed);
            stats.records_passed += w.passed.load(Ordering::Relaxed);
            stats.records_unknown += w.unknown.load(Ordering::Relaxed);
        }

        outcome.map(|_| stats)
    }

    fn process_files<F>(&mut self, inputs: &[PathBuf], on_progress: &mut F) -> Result<()>
    where
        F: FnMut(ProgressEvent<'_>),
    {
        for (index, input) in inputs.iter().enumerate() {
            on_progress(ProgressEvent::File { index, path: input });
            self.process_file(input, on_progress)?;
            self.files += 1;
        }
        Ok(())
    }

    fn process_file<F>(&mut self, input: &Path, on_progress: &mut F) -> Result<()>
    where
        F: FnMut(ProgressEvent<'_>),
    {
        let mut reader = FileReader::open(input).map_err(AnonError::File)?;

        let out_path = match &self.output {
            Some(path) => path.clone(),
            None => tmp_path(input),
        };

        let mut writer = FileWriter::create(
            &out_path,
            reader.ident(),
            CREATOR,
            reader.compression(),
            reader.stat(),
        )
        .map_err(AnonError::File)?;

        debug!(
            input = %input.display(),
            output = %out_path.display(),
            blocks = reader.num_blocks(),
            "Processing archive"
        );

        let mut reuse: Option<DataBlock> = None;
        while let Some(mut block) = reader.read_block(reuse.take()).map_err(AnonError::File)? {
            self.blocks += 1;
            self.bytes += block.size() as u64;
            on_progress(ProgressEvent::Block {
                blocks: self.blocks,
            });

            if !block.is_flow_data() {
                warn!(
                    block_type = block.block_type,
                    "Can't process block type; writing block unmodified"
                );
                reuse = Some(writer.write_block(block).map_err(AnonError::File)?);
                continue;
            }
            self.flow_blocks += 1;

            // publish the block to every worker, run one fork/join cycle
            let shared = SharedBlock::new(&mut block);
            for slot in &self.slots {
                slot.publish(Some(shared));
            }
            self.barrier.release();
            self.barrier.controller_wait();

            if let Some(err) = self.poison.take() {
                // the block framing cannot be trusted; abandon the run
                return Err(err.into());
            }

            reuse = Some(writer.write_block(block).map_err(AnonError::File)?);
        }

        writer.finalize().map_err(AnonError::File)?;

        if self.output.is_none() {
            std::fs::rename(&out_path, input).map_err(|e| {
                AnonError::File(FileError::RenameFailed {
                    from: out_path.clone(),
                    to: input.to_path_buf(),
                    source: e,
                })
            })?;
        }

        Ok(())
    }

    /// Signal all workers to terminate and join them.
    /// Precondition: all workers parked (holds on every exit path of
    /// `process_files`, since errors only surface between rendezvous).
    fn shutdown(&mut self) {
        for slot in &self.slots {
            slot.publish(None);
        }
        self.barrier.release();

        for w in std::mem::take(&mut self.workers) {
            let id = w.id();
            if let Err(e) = w.join() {
                warn!(worker = id, error = %e, "Worker did not shut down cleanly");
            }
        }
    }
}

/// In-place output path: `<input>-tmp` alongside the input
fn tmp_path(input: &Path) -> PathBuf {
    let mut os = input.as_os_str().to_os_string();
    os.push("-tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmp_path_appends_suffix() {
        let p = tmp_path(Path::new("/data/nfcapd.202601011200"));
        assert_eq!(p, PathBuf::from("/data/nfcapd.202601011200-tmp"));
    }
}
