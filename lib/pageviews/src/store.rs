use crate::api::PartialStore;
use crate::constants::{ARTIFACT_MAGIC, ARTIFACT_VERSION};
use crate::error::{PipelineError, Result};
use crate::io::{artifact_path, write_atomic};
use crate::worker::PartialResult;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const HEADER_LEN: usize = ARTIFACT_MAGIC.len() + 1;

pub fn encode(result: &PartialResult) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_LEN + 4096);
    buf.extend_from_slice(ARTIFACT_MAGIC);
    buf.push(ARTIFACT_VERSION);
    bincode::serialize_into(&mut buf, result)
        .map_err(|e| PipelineError::worker(result.worker, format!("encode partial result: {}", e)))?;
    Ok(buf)
}

pub fn decode(worker: usize, bytes: &[u8]) -> Result<PartialResult> {
    let corrupt = |reason: String| PipelineError::ArtifactCorrupt { worker, reason };
    if bytes.len() < HEADER_LEN || &bytes[..ARTIFACT_MAGIC.len()] != ARTIFACT_MAGIC {
        return Err(corrupt("bad magic".into()));
    }
    let version = bytes[ARTIFACT_MAGIC.len()];
    if version != ARTIFACT_VERSION {
        return Err(corrupt(format!("unsupported version {}", version)));
    }
    let result: PartialResult = bincode::deserialize(&bytes[HEADER_LEN..]).map_err(|e| corrupt(e.to_string()))?;
    if result.worker != worker {
        return Err(corrupt(format!("artifact belongs to worker {}", result.worker)));
    }
    Ok(result)
}

pub fn write_artifact(path: &Path, result: &PartialResult) -> Result<()> {
    let bytes = encode(result)?;
    write_atomic(path, |w| w.write_all(&bytes))
        .map_err(|e| PipelineError::worker(result.worker, format!("write artifact {}: {}", path.display(), e)))
}

pub fn read_artifact(worker: usize, path: &Path) -> Result<PartialResult> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PipelineError::ArtifactMissing { worker, path: path.to_path_buf() },
        _ => PipelineError::ArtifactCorrupt { worker, reason: format!("read {}: {}", path.display(), e) },
    })?;
    decode(worker, &bytes)
}

/// One `<output>.<worker>` file per worker.
#[derive(Debug, Clone)]
pub struct FileStore {
    output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    pub worker: usize,
    pub path: PathBuf,
}

impl FileStore {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self { output: output.into() }
    }

    pub fn artifact_path(&self, worker: usize) -> PathBuf {
        artifact_path(&self.output, worker)
    }
}

impl PartialStore for FileStore {
    type Handle = FileArtifact;

    fn save(&self, worker: usize, result: &PartialResult) -> Result<FileArtifact> {
        let handle = self.handle_for(worker);
        write_artifact(&handle.path, result)?;
        Ok(handle)
    }

    fn load(&self, handle: &FileArtifact) -> Result<PartialResult> {
        read_artifact(handle.worker, &handle.path)
    }

    fn delete(&self, handle: FileArtifact) -> Result<()> {
        match fs::remove_file(&handle.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PipelineError::ArtifactDelete { worker: handle.worker, path: handle.path, source }),
        }
    }

    fn handle_for(&self, worker: usize) -> FileArtifact {
        FileArtifact { worker, path: self.artifact_path(worker) }
    }
}

/// Encoded results kept in orchestrator memory, for thread workers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<usize, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialStore for MemoryStore {
    type Handle = usize;

    fn save(&self, worker: usize, result: &PartialResult) -> Result<usize> {
        let bytes = encode(result)?;
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).insert(worker, bytes);
        Ok(worker)
    }

    fn load(&self, worker: &usize) -> Result<PartialResult> {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        let bytes = slots.get(worker).ok_or_else(|| PipelineError::ArtifactMissing {
            worker: *worker,
            path: PathBuf::from(format!("memory:{}", worker)),
        })?;
        decode(*worker, bytes)
    }

    fn delete(&self, worker: usize) -> Result<()> {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).remove(&worker);
        Ok(())
    }

    fn handle_for(&self, worker: usize) -> usize {
        worker
    }
}
