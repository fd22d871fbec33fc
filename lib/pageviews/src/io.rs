use crate::error::{PipelineError, Result};
use memmap2::Mmap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub fn ensure_dir(path: impl AsRef<Path>) -> io::Result<()> {
    fs::create_dir_all(path.as_ref())
}

/// Opens the input for reading and returns it with its size.
pub fn open_input(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PipelineError::InputNotFound { path: path.to_path_buf() },
        _ => PipelineError::InputUnreadable { path: path.to_path_buf(), source: e },
    })?;
    let meta = file
        .metadata()
        .map_err(|e| PipelineError::InputUnreadable { path: path.to_path_buf(), source: e })?;
    if meta.is_dir() {
        return Err(PipelineError::InputUnreadable {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "is a directory"),
        });
    }
    Ok((file, meta.len()))
}

/// Maps the whole file read-only. Empty files yield `None`.
pub fn map_input(file: &File) -> io::Result<Option<Mmap>> {
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    // The input is only ever read during a run.
    let map = unsafe { Mmap::map(file) }?;
    Ok(Some(map))
}

/// Artifact path for one worker: `<output>.<worker>`.
pub fn artifact_path(output: &Path, worker: usize) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(format!(".{}", worker));
    PathBuf::from(name)
}

/// Writes `path` by filling a temporary sibling and renaming it into place,
/// so readers never observe a half-written file.
pub fn write_atomic<F>(path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<&File>) -> io::Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;
    let tmp = NamedTempFile::new_in(parent)?;
    {
        let mut w = BufWriter::new(tmp.as_file());
        fill(&mut w)?;
        w.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
