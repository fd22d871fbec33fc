use crate::aggregate::Aggregate;
use crate::constants::WARN_SKIPPED_LINES;
use crate::error::{MalformedLine, PipelineError, Result};
use crate::io::map_input;
use crate::parse::parse_line;
use crate::split::Partition;
use crate::store::write_artifact;
use crate::utils::elapsed_ms;
use memchr::memchr;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub worker: usize,
    pub start: u64,
    pub end: Option<u64>,
    /// Every physical line consumed, including blank and malformed ones.
    pub lines_read: u64,
    pub lines_skipped: u64,
    pub blank_lines: u64,
    pub bytes_scanned: u64,
    pub urls: u64,
    pub pairs: u64,
    pub wall_ms: u64,
}

/// What one worker hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResult {
    pub worker: usize,
    pub stats: WorkerStats,
    pub aggregate: Aggregate,
}

/// Counts every line whose first byte lies in `partition`.
///
/// The line in progress at `partition.end` is always read to its newline, so a
/// range whose end is not on a line boundary still sees whole lines.
pub fn scan_range(bytes: &[u8], partition: &Partition) -> PartialResult {
    let worker = partition.index;
    let len = bytes.len() as u64;
    let start = partition.start.min(len);

    let mut aggregate = Aggregate::new();
    let mut stats = WorkerStats { worker, start: partition.start, end: partition.end, ..Default::default() };

    let mut off = start as usize;
    while (off as u64) < len && partition.owns(off as u64) {
        let next = memchr(b'\n', &bytes[off..]).map(|i| off + i + 1).unwrap_or(bytes.len());
        stats.lines_read += 1;
        match parse_line(&bytes[off..next]) {
            Ok(visit) => aggregate.record(visit.url, visit.date),
            Err(MalformedLine::Empty) => stats.blank_lines += 1,
            Err(reason) => {
                stats.lines_skipped += 1;
                if stats.lines_skipped <= WARN_SKIPPED_LINES {
                    warn!(worker, offset = off, %reason, "skipping malformed line");
                } else {
                    debug!(worker, offset = off, %reason, "skipping malformed line");
                }
            }
        }
        off = next;
    }

    stats.bytes_scanned = off as u64 - start;
    stats.urls = aggregate.url_count() as u64;
    stats.pairs = aggregate.pair_count() as u64;
    PartialResult { worker, stats, aggregate }
}

/// Opens and maps `input` independently of any other worker, then scans
/// `partition`. I/O failures are fatal for this worker.
pub fn run_partition(input: &Path, partition: &Partition) -> Result<PartialResult> {
    let started = Instant::now();
    let worker = partition.index;
    let file = File::open(input).map_err(|e| PipelineError::worker(worker, format!("open {}: {}", input.display(), e)))?;
    let map = map_input(&file).map_err(|e| PipelineError::worker(worker, format!("mmap {}: {}", input.display(), e)))?;
    let bytes: &[u8] = map.as_deref().unwrap_or(&[]);

    let mut result = scan_range(bytes, partition);
    result.stats.wall_ms = elapsed_ms(started);
    debug!(
        worker,
        start = partition.start,
        end = ?partition.end,
        lines_read = result.stats.lines_read,
        lines_skipped = result.stats.lines_skipped,
        wall_ms = result.stats.wall_ms,
        "partition scanned"
    );
    Ok(result)
}

/// A worker run in its own process: scan one partition and leave the result
/// as an artifact file for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInvocation {
    pub input: PathBuf,
    pub partition: Partition,
    pub artifact: PathBuf,
}

impl WorkerInvocation {
    /// Arguments for `pageviews worker`.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "worker".into(),
            "--input".into(),
            self.input.clone().into_os_string(),
            "--index".into(),
            self.partition.index.to_string().into(),
            "--start".into(),
            self.partition.start.to_string().into(),
            "--artifact".into(),
            self.artifact.clone().into_os_string(),
        ];
        if let Some(end) = self.partition.end {
            args.push("--end".into());
            args.push(end.to_string().into());
        }
        args
    }

    pub fn execute(&self) -> Result<WorkerStats> {
        let result = run_partition(&self.input, &self.partition)?;
        write_artifact(&self.artifact, &result)?;
        Ok(result.stats)
    }
}
