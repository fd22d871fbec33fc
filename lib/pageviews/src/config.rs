use crate::constants::{
    DEFAULT_MEMORY_LIMIT_BYTES, DEFAULT_WORKERS, ENV_KEEP_INTERMEDIATES, ENV_MEMORY_LIMIT, ENV_STORE, ENV_WORKERS,
};
use crate::error::{PipelineError, Result};
use crate::utils::{env_parse, env_var_truthy};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How workers are isolated from the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// One thread per partition in a dedicated pool.
    Threads,
    /// One child process per partition, running `program worker ...`.
    Processes { program: PathBuf },
}

/// Where partial results are parked between scan and merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// `<output>.<worker>` files next to the output.
    File,
    /// In-process buffers; threads only.
    Memory,
}

impl FromStr for StoreKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(StoreKind::File),
            "memory" | "mem" => Ok(StoreKind::Memory),
            other => Err(PipelineError::Config(format!("unknown store kind '{}'", other))),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreKind::File => "file",
            StoreKind::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    /// Number of partitions, and of workers scanning them concurrently.
    pub workers: usize,
    pub isolation: Isolation,
    pub store: StoreKind,
    pub keep_intermediates: bool,
    /// Informational memory ceiling for the run.
    pub memory_limit_bytes: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            isolation: Isolation::Threads,
            store: StoreKind::File,
            keep_intermediates: false,
            memory_limit_bytes: Some(DEFAULT_MEMORY_LIMIT_BYTES),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `PAGEVIEWS_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = env_parse::<usize>(ENV_WORKERS) {
            cfg.workers = n;
        }
        if let Some(store) = env_parse::<StoreKind>(ENV_STORE) {
            cfg.store = store;
        }
        if env_var_truthy(ENV_KEEP_INTERMEDIATES) {
            cfg.keep_intermediates = true;
        }
        if let Some(limit) = env_parse::<u64>(ENV_MEMORY_LIMIT) {
            cfg.memory_limit_bytes = (limit > 0).then_some(limit);
        }
        cfg
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_store(mut self, store: StoreKind) -> Self {
        self.store = store;
        self
    }

    pub fn keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PipelineError::Config("workers must be at least 1".into()));
        }
        if matches!(self.isolation, Isolation::Processes { .. }) && self.store == StoreKind::Memory {
            return Err(PipelineError::Config(
                "process isolation needs the file store; workers cannot reach orchestrator memory".into(),
            ));
        }
        Ok(())
    }
}
