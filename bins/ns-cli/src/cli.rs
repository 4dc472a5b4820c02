//! Flags for the system test driver (spec.md §6), grounded in
//! `original_source/tests/systest/src/SystestStarter.cpp`: `run` compiles
//! and executes the discovered tests, `cache` only (re)generates the
//! compiled-pipeline cache files a later `run --useCache` will pick up.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ns-cli", about = "System test driver for the streaming dataflow engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the discovered tests (or just list them with `--list`).
    Run(RunArgs),
    /// Compile the discovered tests and write their pipeline cache files,
    /// without executing them.
    Cache(CacheArgs),
}

#[derive(Debug, Args)]
pub struct DiscoveryArgs {
    /// `<file|dir[:N[,M-K]...]>` — a single test file, or a directory
    /// searched recursively for test fixtures.
    #[arg(long = "testLocation")]
    pub test_location: PathBuf,

    /// Only run tests belonging to this group.
    #[arg(long = "group")]
    pub group: Option<String>,

    /// List the discovered tests and exit, without running anything.
    #[arg(long = "list")]
    pub list: bool,

    /// Enable debug-level logging regardless of `RUST_LOG`.
    #[arg(long = "debug")]
    pub debug: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Compile and cache pipelines during this run instead of re-running
    /// them, same as the `cache` subcommand.
    #[arg(long = "generateCache")]
    pub generate_cache: bool,

    #[arg(long = "cacheDir")]
    pub cache_dir: Option<PathBuf>,

    /// Load compiled pipelines from `--cacheDir` instead of recompiling.
    #[arg(long = "useCache")]
    pub use_cache: bool,

    #[arg(long = "workerConfig")]
    pub worker_config: Option<PathBuf>,

    #[arg(long = "queryCompilerConfig")]
    pub query_compiler_config: Option<PathBuf>,

    /// Where expected-result fixtures and failure diffs are written/read.
    #[arg(long = "resultDir")]
    pub result_dir: Option<PathBuf>,

    /// Run against a remote worker instead of an in-process engine.
    #[arg(long = "server")]
    pub server: Option<String>,

    /// Run tests in a randomized order instead of discovery order.
    #[arg(long = "shuffle")]
    pub shuffle: bool,

    #[arg(long = "numberConcurrentQueries", default_value_t = 1)]
    pub number_concurrent_queries: usize,

    /// Force one test at a time even if `--numberConcurrentQueries` allows
    /// more; useful when diagnosing a flaky test in isolation.
    #[arg(long = "sequential")]
    pub sequential: bool,
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    #[arg(long = "cacheDir")]
    pub cache_dir: PathBuf,

    #[arg(long = "queryCompilerConfig")]
    pub query_compiler_config: Option<PathBuf>,
}
