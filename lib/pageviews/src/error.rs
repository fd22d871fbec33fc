use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Why a single log line could not be turned into a (path, date) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedLine {
    #[error("line is empty")]
    Empty,
    #[error("no comma separating the url from the date")]
    MissingComma,
    #[error("url has no path component")]
    MissingPath,
    #[error("fewer than 10 bytes follow the comma")]
    ShortDate,
    #[error("url or date is not valid utf-8")]
    InvalidUtf8,
}

/// Run-level failures. Everything here aborts the run; malformed lines never
/// reach this type because workers absorb them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("input {path} does not exist")]
    InputNotFound { path: PathBuf },
    #[error("input {path} is not readable: {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("worker {worker} failed: {reason}")]
    WorkerFailure { worker: usize, reason: String },
    #[error("artifact for worker {worker} is missing at {path}")]
    ArtifactMissing { worker: usize, path: PathBuf },
    #[error("artifact for worker {worker} is corrupt: {reason}")]
    ArtifactCorrupt { worker: usize, reason: String },
    #[error("could not delete artifact for worker {worker} at {path}: {source}")]
    ArtifactDelete {
        worker: usize,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write output {path} (existing output, if any, was not updated): {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    /// Short name of the pipeline stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::InputNotFound { .. } | PipelineError::InputUnreadable { .. } => "input",
            PipelineError::WorkerFailure { .. } => "scan",
            PipelineError::ArtifactMissing { .. }
            | PipelineError::ArtifactCorrupt { .. }
            | PipelineError::ArtifactDelete { .. } => "collect",
            PipelineError::OutputWrite { .. } => "output",
        }
    }

    pub(crate) fn worker(worker: usize, reason: impl std::fmt::Display) -> Self {
        PipelineError::WorkerFailure { worker, reason: reason.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_name_the_failed_phase() {
        let err = PipelineError::worker(3, "boom");
        assert_eq!(err.stage(), "scan");
        assert_eq!(err.to_string(), "worker 3 failed: boom");

        let err = PipelineError::InputNotFound { path: PathBuf::from("/nope") };
        assert_eq!(err.stage(), "input");
    }
}
