use crate::aggregate::{Aggregate, SortedAggregate};
use crate::api::PartialStore;
use crate::config::{Isolation, PipelineConfig, StoreKind};
use crate::error::{PipelineError, Result};
use crate::io::write_atomic;
use crate::split::{split_file, Partition};
use crate::stats::{MergeStats, RunReport, RunStats, ScanStats};
use crate::store::{FileArtifact, FileStore, MemoryStore};
use crate::utils::{elapsed_ms, panic_message};
use crate::worker::{run_partition, PartialResult, WorkerInvocation, WorkerStats};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::process::Command;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Split, scan in parallel, merge, sort, write.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Runs the whole pipeline. Nothing is written to `output` unless every
    /// stage succeeds; a previous output file is replaced atomically.
    pub fn run(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<RunReport> {
        let (input, output) = (input.as_ref(), output.as_ref());
        self.config.validate()?;
        let run_start = Instant::now();

        let (file_size, partitions) = split_file(input, self.config.workers)?;
        if let Some(limit) = self.config.memory_limit_bytes {
            if file_size > limit {
                warn!(file_size, memory_limit = limit, "input is larger than the configured memory ceiling");
            }
        }
        let cpus = num_cpus::get();
        if self.config.workers > cpus {
            debug!(workers = self.config.workers, cpus, "more workers than cpus");
        }
        info!(
            input = %input.display(), file_size, workers = self.config.workers,
            isolation = ?self.config.isolation, store = %self.config.store,
            "pageviews starting scan phase"
        );

        // Scan: the only barrier is waiting on every worker here.
        let scan_start = Instant::now();
        let results = self.scan(input, output, &partitions)?;
        let scan_ms = elapsed_ms(scan_start);
        let worker_stats: Vec<WorkerStats> = results.iter().map(|r| r.stats.clone()).collect();
        let scan = ScanStats::from_workers(&worker_stats, scan_ms);
        info!(phase = "scan",
              workers = scan.workers, lines_read = scan.lines_read, lines_skipped = scan.lines_skipped,
              bytes_scanned = scan.bytes_scanned,
              min_worker_ms = scan.min_worker_ms, max_worker_ms = scan.max_worker_ms,
              wall_ms = scan_ms,
              "Scan phase complete");
        if scan.lines_skipped > 0 {
            warn!(lines_skipped = scan.lines_skipped, "malformed lines were skipped");
        }

        // Merge in worker order, then sort dates.
        let merge_start = Instant::now();
        let merged = Aggregate::merge_all(results.into_iter().map(|r| r.aggregate));
        let merge = MergeStats {
            urls: merged.url_count() as u64,
            pairs: merged.pair_count() as u64,
            visits: merged.total(),
            wall_ms: 0,
        };
        let sorted = merged.into_sorted();
        let merge = MergeStats { wall_ms: elapsed_ms(merge_start), ..merge };
        info!(phase = "merge", urls = merge.urls, pairs = merge.pairs, visits = merge.visits,
              wall_ms = merge.wall_ms, "Merge phase complete");

        let write_start = Instant::now();
        write_output(output, &sorted)?;
        let write_ms = elapsed_ms(write_start);
        info!(phase = "write", output = %output.display(), wall_ms = write_ms, "Output written");

        Ok(RunReport {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            config: self.config.clone(),
            partitions,
            workers: worker_stats,
            stats: RunStats { file_size, scan, merge, write_ms, wall_ms: elapsed_ms(run_start) },
        })
    }

    fn scan(&self, input: &Path, output: &Path, partitions: &[Partition]) -> Result<Vec<PartialResult>> {
        match (&self.config.isolation, self.config.store) {
            (Isolation::Threads, StoreKind::File) => {
                let store = FileStore::new(output);
                let launched = self.launch_threads(&store, input, partitions)?;
                self.collect(&store, launched)
            }
            (Isolation::Threads, StoreKind::Memory) => {
                let store = MemoryStore::new();
                let launched = self.launch_threads(&store, input, partitions)?;
                self.collect(&store, launched)
            }
            (Isolation::Processes { program }, StoreKind::File) => {
                let store = FileStore::new(output);
                let launched = launch_processes(program, &store, input, partitions);
                self.collect(&store, launched)
            }
            (Isolation::Processes { .. }, StoreKind::Memory) => {
                Err(PipelineError::Config("process isolation needs the file store".into()))
            }
        }
    }

    /// One pool thread per partition; each worker saves its own result.
    fn launch_threads<S>(&self, store: &S, input: &Path, partitions: &[Partition]) -> Result<Vec<Result<S::Handle>>>
    where
        S: PartialStore + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("pageviews-worker-{}", i))
            .build()
            .map_err(|e| PipelineError::Config(format!("worker pool: {}", e)))?;

        Ok(pool.install(|| {
            partitions
                .par_iter()
                .map(|p| {
                    let scanned = panic::catch_unwind(AssertUnwindSafe(|| run_partition(input, p)))
                        .map_err(|payload| PipelineError::worker(p.index, panic_message(payload.as_ref())))?;
                    store.save(p.index, &scanned?)
                })
                .collect()
        }))
    }

    /// Waits out every launch, then loads artifacts in worker order. Artifacts
    /// are deleted as they are consumed, or all at once when the run fails.
    fn collect<S: PartialStore>(&self, store: &S, launched: Vec<Result<S::Handle>>) -> Result<Vec<PartialResult>> {
        let keep = self.config.keep_intermediates;
        let mut handles = Vec::with_capacity(launched.len());
        let mut failure: Option<PipelineError> = None;
        for (worker, outcome) in launched.into_iter().enumerate() {
            match outcome {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!(worker, stage = e.stage(), error = %e, "worker failed");
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(err) = failure {
            if !keep {
                handles.into_iter().for_each(|h| discard(store, h));
            }
            return Err(err);
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut pending = handles.into_iter();
        while let Some(handle) = pending.next() {
            let loaded = store.load(&handle);
            if !keep {
                discard(store, handle);
            }
            match loaded {
                Ok(r) => results.push(r),
                Err(e) => {
                    error!(stage = e.stage(), error = %e, "collecting partial results failed");
                    if !keep {
                        pending.by_ref().for_each(|h| discard(store, h));
                    }
                    return Err(e);
                }
            }
        }
        Ok(results)
    }
}

/// Spawns one child per partition, then waits for all of them.
fn launch_processes(
    program: &Path,
    store: &FileStore,
    input: &Path,
    partitions: &[Partition],
) -> Vec<Result<FileArtifact>> {
    let children: Vec<_> = partitions
        .iter()
        .map(|p| {
            let invocation = WorkerInvocation { input: input.to_path_buf(), partition: *p, artifact: store.artifact_path(p.index) };
            debug!(worker = p.index, program = %program.display(), "spawning worker process");
            Command::new(program)
                .args(invocation.args())
                .spawn()
                .map_err(|e| PipelineError::worker(p.index, format!("spawn {}: {}", program.display(), e)))
        })
        .collect();

    children
        .into_iter()
        .zip(partitions)
        .map(|(child, p)| {
            let status = child?
                .wait()
                .map_err(|e| PipelineError::worker(p.index, format!("wait: {}", e)))?;
            if !status.success() {
                return Err(PipelineError::worker(p.index, format!("worker process exited with {}", status)));
            }
            Ok(store.handle_for(p.index))
        })
        .collect()
}

fn discard<S: PartialStore>(store: &S, handle: S::Handle) {
    if let Err(e) = store.delete(handle) {
        warn!(error = %e, "could not delete intermediate artifact");
    }
}

fn write_output(output: &Path, sorted: &SortedAggregate) -> Result<()> {
    write_atomic(output, |w| sorted.write_json(w))
        .map_err(|e| PipelineError::OutputWrite { path: output.to_path_buf(), source: e })
}

/// Runs with default settings and `partitions` workers.
pub fn run(input: impl AsRef<Path>, output: impl AsRef<Path>, partitions: usize) -> Result<RunReport> {
    Pipeline::new(PipelineConfig::default().with_workers(partitions)).run(input, output)
}

/// Single-pass count over the whole file, with no splitting.
pub fn count_sequential(input: impl AsRef<Path>) -> Result<Aggregate> {
    let input = input.as_ref();
    crate::io::open_input(input)?;
    Ok(run_partition(input, &Partition::whole())?.aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SCENARIO: &str = "http://a.com/x,2024-01-01,ref1\nhttp://a.com/x,2024-01-01,ref2\nhttp://b.com/y,2024-01-02,ref3\n";

    #[test]
    fn scenario_counts_match_for_every_store() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("visits.csv");
        fs::write(&input, SCENARIO).unwrap();
        for store in [StoreKind::File, StoreKind::Memory] {
            let output = dir.path().join(format!("out-{}.json", store));
            let cfg = PipelineConfig::default().with_store(store);
            let report = Pipeline::new(cfg).run(&input, &output).unwrap();
            let json: serde_json::Value = serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
            assert_eq!(json, serde_json::json!({"/x": {"2024-01-01": 2}, "/y": {"2024-01-02": 1}}));
            assert_eq!(report.stats.merge.visits, 3);
            assert_eq!(report.partitions.len(), 2);
        }
    }

    #[test]
    fn failed_collect_discards_remaining_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("out.json"));
        let pipeline = Pipeline::new(PipelineConfig::default());
        let ok = |i: usize| {
            let r = crate::worker::scan_range(SCENARIO.as_bytes(), &Partition { index: i, start: 0, end: None });
            store.save(i, &r)
        };
        let launched = vec![ok(0), Err(PipelineError::worker(1, "boom")), ok(2)];
        let err = pipeline.collect(&store, launched).unwrap_err();
        assert!(matches!(err, PipelineError::WorkerFailure { worker: 1, .. }));
        assert!(!store.artifact_path(0).exists());
        assert!(!store.artifact_path(2).exists());
    }

    #[test]
    fn missing_artifact_fails_the_collect() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("out.json"));
        let pipeline = Pipeline::new(PipelineConfig::default());
        let launched = vec![Ok(store.handle_for(0))];
        let err = pipeline.collect(&store, launched).unwrap_err();
        assert_eq!(err.stage(), "collect");
    }
}
