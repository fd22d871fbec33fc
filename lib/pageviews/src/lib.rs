pub mod aggregate;
pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod parse;
pub mod runtime;
pub mod split;
pub mod stats;
pub mod store;
pub mod utils;
pub mod worker;

pub use aggregate::{Aggregate, SortedAggregate};
pub use api::PartialStore;
pub use config::{Isolation, PipelineConfig, StoreKind};
pub use error::{MalformedLine, PipelineError, Result};
pub use runtime::{count_sequential, run, Pipeline};
pub use split::{compute_splits, plan_partitions, split_file, Partition};
pub use stats::RunReport;
pub use store::{FileStore, MemoryStore};
pub use worker::{run_partition, PartialResult, WorkerInvocation, WorkerStats};
