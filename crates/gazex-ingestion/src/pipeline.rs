//! Import orchestration.
//!
//! One [`ImportRunner`] drives a full run per source: fetch the payload,
//! truncate the destination table once, then stream every payload file
//! through its adapter into the chunked loader. Failures land on the
//! job, not as errors; `run_import` always hands back the finished job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use gazex_common::{GazetteerSource, GazexError, ImportJob, IngestConfig, JobStatus, Result};
use gazex_db::PlaceWriter;

use crate::adapters::{
    btaa::BtaaAdapter, fast::FastAdapter, geonames::GeonamesAdapter, wof::WofAdapter, RecordStream,
};
use crate::fetch::PayloadProvider;
use crate::loader::{CancelFlag, ChunkedLoader};

/// Channel capacity for progress snapshots; a slow subscriber loses
/// old snapshots rather than stalling the import.
const PROGRESS_CAPACITY: usize = 64;

/// Point-in-time view of a job, broadcast on every status transition
/// and at each throughput-log point. Subscribers may lag or drop out
/// freely; the import never waits on them.
#[derive(Debug, Clone, Serialize)]
pub struct ImportProgress {
    pub source: GazetteerSource,
    pub status: JobStatus,
    pub records_seen: u64,
    pub records_loaded: u64,
    pub records_rejected: u64,
}

impl From<&ImportJob> for ImportProgress {
    fn from(job: &ImportJob) -> Self {
        Self {
            source: job.source,
            status: job.status,
            records_seen: job.records_seen,
            records_loaded: job.records_loaded,
            records_rejected: job.records_rejected,
        }
    }
}

pub struct ImportRunner {
    provider: Arc<dyn PayloadProvider>,
    writer: Arc<dyn PlaceWriter>,
    ingest: IngestConfig,
    progress: broadcast::Sender<ImportProgress>,
}

impl ImportRunner {
    pub fn new(
        provider: Arc<dyn PayloadProvider>,
        writer: Arc<dyn PlaceWriter>,
        ingest: IngestConfig,
    ) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            provider,
            writer,
            ingest,
            progress,
        }
    }

    /// Subscribe to progress snapshots for every run on this runner.
    pub fn subscribe(&self) -> broadcast::Receiver<ImportProgress> {
        self.progress.subscribe()
    }

    fn emit(&self, job: &ImportJob) {
        let _ = self.progress.send(ImportProgress::from(job));
    }

    /// Full truncate-and-reload run for one source. Errors of any kind
    /// finish the job as Failed; the job itself is always returned.
    #[instrument(skip(self, cancel), fields(source = %source))]
    pub async fn run_import(&self, source: GazetteerSource, cancel: &CancelFlag) -> ImportJob {
        let mut job = ImportJob::new(source);

        job.transition(JobStatus::Fetching);
        self.emit(&job);
        let payload_dir = match self.provider.fetch(source).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(source = %source, error = %e, "payload fetch failed");
                job.fail(e.to_string());
                self.emit(&job);
                return job;
            }
        };

        job.transition(JobStatus::Loading);
        self.emit(&job);
        if let Err(e) = self.load(source, &payload_dir, &mut job, cancel).await {
            warn!(source = %source, error = %e, "import run failed");
            job.fail(e.to_string());
            self.emit(&job);
            return job;
        }

        job.complete();
        self.emit(&job);
        info!("{}", job.summary());
        job
    }

    /// Run every source concurrently. Order of the result follows
    /// [`GazetteerSource::all`]; one source failing never affects the
    /// others.
    pub async fn run_all(&self, cancel: &CancelFlag) -> Vec<ImportJob> {
        let runs = GazetteerSource::all()
            .map(|source| self.run_import(source, cancel));
        join_all(runs).await
    }

    async fn load(
        &self,
        source: GazetteerSource,
        payload_dir: &Path,
        job: &mut ImportJob,
        cancel: &CancelFlag,
    ) -> Result<()> {
        let streams = open_streams(source, payload_dir)?;

        // Truncate exactly once, after the payload proved openable.
        self.writer.truncate(source).await?;

        let loader = ChunkedLoader::new(
            self.writer.clone(),
            self.ingest.chunk_size(source),
            self.ingest.progress_every_chunks as u64,
        )
        .with_progress(self.progress.clone());
        loader
            .load(source, streams.into_iter().flatten(), job, cancel)
            .await
    }
}

/// One adapter stream per payload file, in file-name order so reruns
/// are deterministic. WOF is directory-shaped and yields one stream.
fn open_streams(source: GazetteerSource, dir: &Path) -> Result<Vec<RecordStream>> {
    match source {
        GazetteerSource::Wof => Ok(vec![Box::new(WofAdapter::open(dir)?)]),
        GazetteerSource::Geonames => {
            let mut streams: Vec<RecordStream> = Vec::new();
            for path in payload_files(dir, &["txt", "tsv"])? {
                streams.push(Box::new(GeonamesAdapter::open(&path)?));
            }
            Ok(streams)
        }
        GazetteerSource::Btaa => {
            let mut streams: Vec<RecordStream> = Vec::new();
            for path in payload_files(dir, &["csv"])? {
                streams.push(Box::new(BtaaAdapter::open(&path)?));
            }
            Ok(streams)
        }
        GazetteerSource::Fast => {
            let mut streams: Vec<RecordStream> = Vec::new();
            for path in payload_files(dir, &["xml", "marcxml"])? {
                streams.push(Box::new(FastAdapter::open(&path)?));
            }
            Ok(streams)
        }
    }
}

/// Files in `dir` with one of `extensions`, sorted by name. GeoNames
/// dumps ship a readme alongside the data, so readme files are skipped.
fn payload_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
                && !p
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|s| s.eq_ignore_ascii_case("readme"))
        })
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(GazexError::StructuralParse(format!(
            "no payload files with extension {:?} under {}",
            extensions,
            dir.display()
        )));
    }
    Ok(files)
}
