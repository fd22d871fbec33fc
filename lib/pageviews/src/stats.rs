use crate::config::PipelineConfig;
use crate::split::Partition;
use crate::worker::WorkerStats;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub workers: usize,
    pub lines_read: u64,
    pub lines_skipped: u64,
    pub blank_lines: u64,
    pub bytes_scanned: u64,
    pub min_worker_ms: u64,
    pub max_worker_ms: u64,
    pub wall_ms: u64,
}

impl ScanStats {
    pub fn from_workers(per_worker: &[WorkerStats], wall_ms: u64) -> Self {
        Self {
            workers: per_worker.len(),
            lines_read: per_worker.iter().map(|w| w.lines_read).sum(),
            lines_skipped: per_worker.iter().map(|w| w.lines_skipped).sum(),
            blank_lines: per_worker.iter().map(|w| w.blank_lines).sum(),
            bytes_scanned: per_worker.iter().map(|w| w.bytes_scanned).sum(),
            min_worker_ms: per_worker.iter().map(|w| w.wall_ms).min().unwrap_or(0),
            max_worker_ms: per_worker.iter().map(|w| w.wall_ms).max().unwrap_or(0),
            wall_ms,
        }
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub urls: u64,
    pub pairs: u64,
    pub visits: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub file_size: u64,
    pub scan: ScanStats,
    pub merge: MergeStats,
    pub write_ms: u64,
    pub wall_ms: u64,
}

/// Everything a finished run can tell about itself.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub config: PipelineConfig,
    pub partitions: Vec<Partition>,
    pub workers: Vec<WorkerStats>,
    pub stats: RunStats,
}

impl RunReport {
    pub fn lines_skipped(&self) -> u64 {
        self.stats.scan.lines_skipped
    }
}
