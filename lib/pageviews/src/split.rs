//! Line-aligned byte range planning.
//!
//! The file is cut into `n` roughly equal byte ranges; each cut point is then
//! pushed forward past the next `\n` so every range starts on a line. A line
//! belongs to the range its first byte falls in.

use crate::error::{PipelineError, Result};
use crate::io::open_input;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Half-open byte range `[start, end)` handed to one worker; `end == None`
/// runs to end of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub index: usize,
    pub start: u64,
    pub end: Option<u64>,
}

impl Partition {
    /// Whole-file partition.
    pub fn whole() -> Self {
        Self { index: 0, start: 0, end: None }
    }

    /// True when a line starting at `offset` belongs to this partition.
    pub fn owns(&self, offset: u64) -> bool {
        offset >= self.start && self.end.map_or(true, |end| offset < end)
    }
}

/// Start offsets of partitions `1..partitions`. Partition 0 starts at 0.
pub fn compute_splits<R: BufRead + Seek>(reader: &mut R, file_size: u64, partitions: usize) -> io::Result<Vec<u64>> {
    if partitions <= 1 {
        return Ok(Vec::new());
    }
    let width = file_size / partitions as u64;
    let mut splits = Vec::with_capacity(partitions - 1);
    let mut rest_of_line = Vec::new();
    for i in 1..partitions {
        let target = width * i as u64;
        if target >= file_size {
            splits.push(file_size);
            continue;
        }
        reader.seek(SeekFrom::Start(target))?;
        rest_of_line.clear();
        let skipped = reader.read_until(b'\n', &mut rest_of_line)? as u64;
        splits.push((target + skipped).min(file_size));
    }
    Ok(splits)
}

pub fn plan_partitions(splits: &[u64]) -> Vec<Partition> {
    let starts = std::iter::once(0).chain(splits.iter().copied());
    let ends = splits.iter().copied().map(Some).chain(std::iter::once(None));
    starts
        .zip(ends)
        .enumerate()
        .map(|(index, (start, end))| Partition { index, start, end })
        .collect()
}

/// Opens `path` and plans `partitions` line-aligned ranges over it.
/// Returns the file size alongside the plan.
pub fn split_file(path: &Path, partitions: usize) -> Result<(u64, Vec<Partition>)> {
    if partitions == 0 {
        return Err(PipelineError::Config("partition count must be at least 1".into()));
    }
    let (file, file_size) = open_input(path)?;
    let mut reader = BufReader::new(file);
    let splits = compute_splits(&mut reader, file_size, partitions)
        .map_err(|e| PipelineError::InputUnreadable { path: path.to_path_buf(), source: e })?;
    Ok((file_size, plan_partitions(&splits)))
}
