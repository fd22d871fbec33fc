//! Centralized environment variable names and default values for pipeline tuning.

// Environment variable names
pub const ENV_WORKERS: &str = "PAGEVIEWS_WORKERS";
pub const ENV_KEEP_INTERMEDIATES: &str = "PAGEVIEWS_KEEP_INTERMEDIATES";
pub const ENV_STORE: &str = "PAGEVIEWS_STORE";
/// Informational only; exceeding it logs a warning.
pub const ENV_MEMORY_LIMIT: &str = "PAGEVIEWS_MEMORY_LIMIT";

// Defaults
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 1024 * 1024 * 1024; // 1 GiB

/// Malformed lines logged at warn level per worker before dropping to debug.
pub const WARN_SKIPPED_LINES: u64 = 5;

// Artifact framing: [magic][version][bincode payload]
pub const ARTIFACT_MAGIC: &[u8; 4] = b"PVAG";
pub const ARTIFACT_VERSION: u8 = 1;

pub const OUTPUT_INDENT: &[u8] = b"    ";
