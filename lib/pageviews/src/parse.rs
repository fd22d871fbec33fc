//! Record parsing: one raw log line in, one (path, date) pair out.
//!
//! Lines look like `https://host/some/path,2024-01-31T10:00:00+00:00,...`.
//! The counted url is the path component only, the date is the 10 bytes
//! after the first comma taken verbatim.

use crate::error::MalformedLine;
use memchr::{memchr, memmem};

pub const DATE_LEN: usize = 10;
const SCHEME_SEP: &[u8] = b"://";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit<'a> {
    pub url: &'a str,
    pub date: &'a str,
}

/// Strips a trailing `\n` or `\r\n`.
pub fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

pub fn parse_line(line: &[u8]) -> Result<Visit<'_>, MalformedLine> {
    let line = trim_line_end(line);
    if line.is_empty() {
        return Err(MalformedLine::Empty);
    }
    let comma = memchr(b',', line).ok_or(MalformedLine::MissingComma)?;
    let head = &line[..comma];

    // Host begins after the scheme separator; schemeless records start with the host.
    // A `://` past the first slash belongs to the path, not to a scheme.
    let first_slash = memchr(b'/', head);
    let host_start = memmem::find(head, SCHEME_SEP)
        .filter(|&i| first_slash == Some(i + 1))
        .map(|i| i + SCHEME_SEP.len())
        .unwrap_or(0);
    let slash = memchr(b'/', &head[host_start..])
        .map(|i| host_start + i)
        .ok_or(MalformedLine::MissingPath)?;

    let date = line
        .get(comma + 1..comma + 1 + DATE_LEN)
        .ok_or(MalformedLine::ShortDate)?;

    let url = std::str::from_utf8(&head[slash..]).map_err(|_| MalformedLine::InvalidUtf8)?;
    let date = std::str::from_utf8(date).map_err(|_| MalformedLine::InvalidUtf8)?;
    Ok(Visit { url, date })
}
