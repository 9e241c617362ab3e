//! Chunked bulk loader.
//!
//! Drains an adapter stream into fixed-size chunks and hands each chunk
//! to the writer. Per-row problems (adapter rejections, constraint
//! fallbacks from the writer) are tallied on the job and never stop the
//! run; a structural stream error or writer error aborts it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use gazex_common::{GazetteerSource, GazexError, ImportJob, PlaceRecord, Result};
use gazex_db::PlaceWriter;

use crate::adapters::AdapterItem;
use crate::pipeline::ImportProgress;

/// Cooperative cancellation handle shared between an import run and its
/// controller. Checked before every chunk flush, so at most one chunk
/// of work happens after cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ChunkedLoader {
    writer: Arc<dyn PlaceWriter>,
    chunk_size: usize,
    progress_every_chunks: u64,
    progress: Option<broadcast::Sender<ImportProgress>>,
}

impl ChunkedLoader {
    pub fn new(writer: Arc<dyn PlaceWriter>, chunk_size: usize, progress_every_chunks: u64) -> Self {
        Self {
            writer,
            chunk_size: chunk_size.max(1),
            progress_every_chunks: progress_every_chunks.max(1),
            progress: None,
        }
    }

    /// Broadcast a progress snapshot at every throughput-log point.
    /// Lagging or absent receivers never slow the load.
    pub fn with_progress(mut self, sender: broadcast::Sender<ImportProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn emit_progress(&self, job: &ImportJob) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(ImportProgress::from(job));
        }
    }

    /// Stream every item into the destination table, updating `job`
    /// counters as it goes. The caller is responsible for the job's
    /// status transitions.
    #[instrument(skip(self, items, job, cancel), fields(source = %source))]
    pub async fn load(
        &self,
        source: GazetteerSource,
        items: impl Iterator<Item = Result<AdapterItem>>,
        job: &mut ImportJob,
        cancel: &CancelFlag,
    ) -> Result<()> {
        let started = Instant::now();
        let mut buffer: Vec<PlaceRecord> = Vec::with_capacity(self.chunk_size);
        let mut chunks: u64 = 0;

        for item in items {
            match item? {
                AdapterItem::Record(record) => {
                    job.records_seen += 1;
                    buffer.push(record);
                    if buffer.len() >= self.chunk_size {
                        self.flush(source, &mut buffer, job, cancel).await?;
                        chunks += 1;
                        if chunks % self.progress_every_chunks == 0 {
                            log_progress(source, job, chunks, &started);
                            self.emit_progress(job);
                        }
                    }
                }
                AdapterItem::Rejected(rejected) => {
                    job.records_seen += 1;
                    debug!(
                        source = %source,
                        external_id = ?rejected.external_id,
                        reason = rejected.reason.as_str(),
                        "rejected row"
                    );
                    job.record_rejection(rejected);
                }
            }
        }

        if !buffer.is_empty() {
            self.flush(source, &mut buffer, job, cancel).await?;
            chunks += 1;
        }
        log_progress(source, job, chunks, &started);
        self.emit_progress(job);
        Ok(())
    }

    async fn flush(
        &self,
        source: GazetteerSource,
        buffer: &mut Vec<PlaceRecord>,
        job: &mut ImportJob,
        cancel: &CancelFlag,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(GazexError::Cancelled);
        }
        let outcome = self.writer.insert_chunk(source, buffer).await?;
        job.records_loaded += outcome.inserted as u64;
        for rejected in outcome.rejected {
            job.record_rejection(rejected);
        }
        buffer.clear();
        Ok(())
    }
}

fn log_progress(source: GazetteerSource, job: &ImportJob, chunks: u64, started: &Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    let rate = if elapsed > 0.0 {
        job.records_loaded as f64 / elapsed
    } else {
        0.0
    };
    info!(
        source = %source,
        chunks,
        seen = job.records_seen,
        loaded = job.records_loaded,
        rejected = job.records_rejected,
        records_per_sec = format_args!("{rate:.0}"),
        "bulk load progress"
    );
}
