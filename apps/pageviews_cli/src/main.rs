use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pageviews::{Isolation, Partition, Pipeline, PipelineConfig, StoreKind, WorkerInvocation};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pageviews", version, about = "Count visits per url path and day in a large visit log")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split the input, count in parallel, write merged counts as JSON
    Run(RunArgs),
    /// Scan a single partition and write its artifact
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Input log file (`url,date,...` per line)
    #[arg(long)]
    input: PathBuf,
    /// Output JSON file; replaced if it exists
    #[arg(long)]
    output: PathBuf,
    /// Number of partitions and workers [env: PAGEVIEWS_WORKERS, default 2]
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, value_enum, default_value_t = IsolationArg::Threads)]
    isolation: IsolationArg,
    /// Where partial results wait for the merge: file or memory [env: PAGEVIEWS_STORE]
    #[arg(long)]
    store: Option<StoreKind>,
    /// Leave `<output>.<n>` artifacts on disk
    #[arg(long)]
    keep_intermediates: bool,
    /// Print the run report as JSON on stdout
    #[arg(long)]
    stats: bool,
}

#[derive(Args, Debug)]
struct WorkerArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    index: usize,
    #[arg(long)]
    start: u64,
    #[arg(long)]
    end: Option<u64>,
    #[arg(long)]
    artifact: PathBuf,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum IsolationArg {
    Threads,
    Processes,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    match Cli::parse().command {
        Command::Run(args) => run(args),
        Command::Worker(args) => worker(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = PipelineConfig::from_env();
    if let Some(n) = args.workers {
        config = config.with_workers(n);
    }
    if let Some(store) = args.store {
        config = config.with_store(store);
    }
    if args.keep_intermediates {
        config = config.keep_intermediates(true);
    }
    if args.isolation == IsolationArg::Processes {
        let program = std::env::current_exe().context("locate the pageviews executable")?;
        config = config.with_isolation(Isolation::Processes { program });
    }

    let report = Pipeline::new(config).run(&args.input, &args.output).map_err(|e| {
        let stage = e.stage();
        anyhow::Error::new(e).context(format!("run failed at stage '{}'", stage))
    })?;
    if args.stats {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn worker(args: WorkerArgs) -> Result<()> {
    let index = args.index;
    let invocation = WorkerInvocation {
        input: args.input,
        partition: Partition { index, start: args.start, end: args.end },
        artifact: args.artifact,
    };
    let stats = invocation.execute().with_context(|| format!("worker {} failed", index))?;
    info!(worker = index, lines_read = stats.lines_read, lines_skipped = stats.lines_skipped,
          wall_ms = stats.wall_ms, "worker finished");
    Ok(())
}
